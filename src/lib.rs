//! Combinator grammars over an Earley-style recognition engine
//!
//! This crate builds context-free grammars from small composable pieces —
//! terminals, sequences, prioritized alternatives, repetitions, optionals,
//! and named recursive rules — compiles them into an engine grammar, and
//! drives recognition and valuation over whole inputs.
//!
//! The shape of a parse:
//!
//! ```no_run
//! use earlex::grammar::GrammarBuilder;
//!
//! let mut b = GrammarBuilder::new();
//! b.rule("greeting", |b| {
//!     let hello = b.stri("hello")?;
//!     let who = b.lex("[a-z]+")?;
//!     let ws = b.lex("[ \\t]+")?;
//!     b.discard(ws);
//!     Ok(b.seq(&[hello, who]))
//! });
//! let grammar = b.compile("greeting")?;
//! let value = grammar.parse("Hello world")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Grammars are immutable after compilation and safe to share across
//! threads; every call to [`grammar::Grammar::parse`] or a
//! [`parser::Parser`] method builds its own per-parse state.
//!
//! Ambiguity is a first-class outcome. Alternatives carry relative
//! priorities ([`grammar::GrammarBuilder::fallback`] prefers its left side),
//! derivations are enumerated in rank order, and a parse that is still
//! ambiguous at the top rank fails loudly unless the caller opts in to a
//! policy.

pub mod atoms;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod parser;

pub use atoms::AtomId;
pub use error::{GrammarError, ParseError};
pub use grammar::{Grammar, GrammarBuilder};
pub use parser::{Parser, Value};
