//! Error types for grammar construction and parsing
//!
//! Each phase has its own error enum: `GrammarError` for the one-shot
//! combinator-to-grammar compile, `ParseError` for recognition and valuation.
//! Engine diagnostics are never swallowed; they ride along as context inside
//! the wrapping variant. All failures are fatal to the current call — there
//! is no retry path and no partial result.

use crate::engine::EngineError;
use std::fmt;

/// Errors raised while compiling a combinator tree into a grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// A terminal pattern failed to compile as a regular expression.
    Pattern { pattern: String, message: String },
    /// An atom was built twice through the duplicate-build guard.
    DuplicateSymbol { atom: String },
    /// A discard declaration named an atom that is not a terminal pattern.
    Discard { atom: String },
    /// Rule or sequence-rule creation failed in the engine.
    Rule { atom: String, source: EngineError },
    /// A named rule was referenced but its definition was never registered.
    UndefinedRule { name: String },
    /// Alternative priorities do not form a contiguous non-increasing
    /// sequence with adjacent deltas in {0, 1}.
    PrioritySequence { atom: String },
    /// Precompute emitted events; all events are treated as fatal.
    Precompute { events: Vec<String> },
    /// Any other engine diagnostic.
    Engine(EngineError),
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::Pattern { pattern, message } => {
                write!(f, "invalid terminal pattern {:?}: {}", pattern, message)
            }
            GrammarError::DuplicateSymbol { atom } => {
                write!(f, "tried to create duplicate symbol for atom [{}]", atom)
            }
            GrammarError::Discard { atom } => {
                write!(f, "discard atom [{}] is not a terminal pattern", atom)
            }
            GrammarError::Rule { atom, source } => {
                write!(f, "error creating rule for atom [{}]: {}", atom, source)
            }
            GrammarError::UndefinedRule { name } => {
                write!(f, "rule({:?}) was referenced but never defined", name)
            }
            GrammarError::PrioritySequence { atom } => {
                write!(f, "unexpected priority sequence in alternative [{}]", atom)
            }
            GrammarError::Precompute { events } => {
                write!(
                    f,
                    "unexpected event(s) while precomputing grammar: {}",
                    events.join(", ")
                )
            }
            GrammarError::Engine(e) => write!(f, "engine error: {}", e),
        }
    }
}

impl std::error::Error for GrammarError {}

impl From<EngineError> for GrammarError {
    fn from(e: EngineError) -> Self {
        GrammarError::Engine(e)
    }
}

/// Errors raised while recognizing or evaluating an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No expected terminal matched at a position and the recognizer could
    /// not advance past it.
    NoViableTerminal { at: usize, excerpt: String },
    /// Input was exhausted with a recognized prefix but non-discardable
    /// trailing content left over.
    PartialMatch { consumed: usize },
    /// More than one top-ranked derivation and no caller-supplied policy.
    Ambiguous { derivations: usize },
    /// Engine-reported failure during feed, complete, forest, ordering or
    /// valuation.
    Engine(EngineError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NoViableTerminal { at, excerpt } => {
                write!(f, "don't know what to do with {:?} at offset {}", excerpt, at)
            }
            ParseError::PartialMatch { consumed } => {
                write!(
                    f,
                    "input only partially matched: {} byte(s) consumed before trailing content",
                    consumed
                )
            }
            ParseError::Ambiguous { derivations } => {
                write!(f, "parse is ambiguous: {} top-ranked derivations", derivations)
            }
            ParseError::Engine(e) => write!(f, "engine error: {}", e),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<EngineError> for ParseError {
    fn from(e: EngineError) -> Self {
        ParseError::Engine(e)
    }
}
