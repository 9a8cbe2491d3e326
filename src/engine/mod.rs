//! Recognition and ambiguity engine
//!
//! This module is the collaborator the combinator layer is written against:
//! symbol and rule storage, the incremental recognizer, derivation ordering,
//! and the step-wise valuator. The rest of the crate consumes it only through
//! the surface re-exported here — grammar creation, symbol/rule/sequence-rule
//! creation, precompute with events, recognizer feeding, forest/order/tree
//! construction, and valuation stepping.
//!
//! Handle lifetimes are expressed as borrows: a `Recognizer` borrows its
//! `Grammar`, a `Forest` borrows the recognizer, an `Order` borrows the
//! forest, a `Tree` borrows the order mutably, and a `Valuator` borrows the
//! tree. The protocol requirement that a valuator be released before the next
//! tree advance is therefore checked by the compiler.

mod forest;
mod grammar;
mod recognizer;
mod valuator;

pub use forest::{Forest, Order, Tree};
pub use grammar::{Grammar, Rule, RuleId, Symbol};
pub use recognizer::Recognizer;
pub use valuator::{Step, Valuator};

use std::fmt;

/// Events emitted by grammar precompute and recognizer operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A sequence rule's item or separator is nullable; the grammar cannot
    /// count repetitions of something that can match nothing.
    CountedNullable(Symbol),
    /// The recognizer can accept no further input.
    Exhausted,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::CountedNullable(s) => write!(f, "counted nullable symbol S{}", s.0),
            Event::Exhausted => write!(f, "parse exhausted"),
        }
    }
}

/// Engine-level failure codes, each translatable to a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A symbol id passed to the engine does not exist.
    InvalidSymbol(i32),
    /// A rule id passed to the engine does not exist.
    InvalidRule(i32),
    /// Rules cannot be added or ranked after precompute.
    Precomputed,
    /// The operation requires a precomputed grammar.
    NotPrecomputed,
    /// No start symbol was set before precompute.
    NoStartSymbol,
    /// The LHS of a sequence rule is already the LHS of another rule.
    SequenceLhsNotUnique(Symbol),
    /// A submitted alternative's symbol is not expected at the current
    /// earleme.
    UnexpectedToken(Symbol),
    /// An alternative was submitted with a zero or negative earleme length.
    InvalidLength(usize),
    /// Token value 0 is reserved.
    ReservedTokenValue,
    /// The recognizer is exhausted and cannot complete further earlemes.
    ParseExhausted,
    /// No complete parse of the start symbol spans the requested range.
    NoParse { end: usize },
    /// The ordering was already enumerated; its rank policy is frozen.
    OrderFrozen,
    /// The tree iterator has no current derivation to evaluate.
    TreeExhausted,
    /// The valuation stack protocol was violated (missing argument slot).
    ValuationProtocol { slot: usize },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidSymbol(id) => write!(f, "invalid symbol id {}", id),
            EngineError::InvalidRule(id) => write!(f, "invalid rule id {}", id),
            EngineError::Precomputed => write!(f, "grammar is already precomputed"),
            EngineError::NotPrecomputed => write!(f, "grammar is not precomputed"),
            EngineError::NoStartSymbol => write!(f, "no start symbol set"),
            EngineError::SequenceLhsNotUnique(s) => {
                write!(f, "sequence LHS S{} is also the LHS of another rule", s.0)
            }
            EngineError::UnexpectedToken(s) => {
                write!(f, "token symbol S{} is not expected here", s.0)
            }
            EngineError::InvalidLength(len) => {
                write!(f, "alternative length {} is not positive", len)
            }
            EngineError::ReservedTokenValue => write!(f, "token value 0 is reserved"),
            EngineError::ParseExhausted => write!(f, "recognizer is exhausted"),
            EngineError::NoParse { end } => {
                write!(f, "no complete parse ending at earleme {}", end)
            }
            EngineError::OrderFrozen => write!(f, "ordering is frozen after enumeration"),
            EngineError::TreeExhausted => write!(f, "no further derivation trees"),
            EngineError::ValuationProtocol { slot } => {
                write!(f, "valuation protocol violation: empty argument slot {}", slot)
            }
        }
    }
}

impl std::error::Error for EngineError {}
