//! Recognition and valuation driver
//!
//! A parse runs in two passes over the engine:
//!
//! 1. Recognition. The input is fed one earleme per byte. At each position
//!    the driver first skips discard patterns to a fixed point, then probes
//!    every expected terminal at the post-discard position. A match becomes a
//!    token alternative spanning the discarded prefix plus the match, with
//!    the token value encoding where the non-discarded text starts (offset
//!    plus one; zero is reserved by the engine). A position where nothing
//!    matches is only fatal when no earlier token already reaches past it.
//! 2. Valuation. The bocage over the furthest earleme is ordered by rank and
//!    each derivation is replayed through the step valuator into a value
//!    stack. Slots hold lists of semantic values: tokens and nulled symbols
//!    contribute zero or one value, anonymous reductions splice their
//!    arguments through, and named reductions collapse their arguments into
//!    a single value via the rule action.
//!
//! Ambiguity is surfaced, not hidden: with more than one top-ranked
//! derivation [`Parser::parse`] fails unless told to ignore it, and
//! [`Parser::parse_each`] hands every derivation to the caller in rank
//! order.

use log::{debug, trace};
use serde::Serialize;

use crate::engine::{EngineError, Event, Forest, Order, Recognizer, Step, Tree, Valuator};
use crate::error::ParseError;
use crate::grammar::Grammar;

/// Default semantic value: a lexeme, a named node, or an explicit null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Value {
    Null,
    Token(String),
    Node { name: String, children: Vec<Value> },
}

type TokenFn<'g, V> = Box<dyn Fn(&str, &str) -> Option<V> + 'g>;
type RuleFn<'g, V> = Box<dyn Fn(&str, Vec<V>) -> V + 'g>;
type NullFn<'g, V> = Box<dyn Fn(&str) -> Option<V> + 'g>;

/// Reusable parse driver over a compiled grammar.
///
/// The actions receive user-facing names only: the token action gets the
/// terminal's display name and the matched text, the rule action gets the
/// rule or label name and the already-evaluated children. Returning `None`
/// from the token or null action drops that value from its parent's
/// children.
pub struct Parser<'g, V> {
    grammar: &'g Grammar,
    ignore_ambiguity: bool,
    top_rank_only: bool,
    token_fn: TokenFn<'g, V>,
    rule_fn: RuleFn<'g, V>,
    null_fn: NullFn<'g, V>,
}

impl<'g> Parser<'g, Value> {
    /// A parser producing the default [`Value`] tree.
    pub fn new(grammar: &'g Grammar) -> Self {
        Parser::with_actions(
            grammar,
            |_, text| Some(Value::Token(text.to_string())),
            |name, children| Value::Node {
                name: name.to_string(),
                children,
            },
            |_| Some(Value::Null),
        )
    }
}

impl<'g, V> Parser<'g, V> {
    /// A parser with caller-supplied semantics.
    pub fn with_actions(
        grammar: &'g Grammar,
        token_fn: impl Fn(&str, &str) -> Option<V> + 'g,
        rule_fn: impl Fn(&str, Vec<V>) -> V + 'g,
        null_fn: impl Fn(&str) -> Option<V> + 'g,
    ) -> Self {
        Parser {
            grammar,
            ignore_ambiguity: false,
            top_rank_only: true,
            token_fn: Box::new(token_fn),
            rule_fn: Box::new(rule_fn),
            null_fn: Box::new(null_fn),
        }
    }

    /// On ambiguity, evaluate the highest-ranked derivation instead of
    /// failing.
    pub fn ignore_ambiguity(mut self, on: bool) -> Self {
        self.ignore_ambiguity = on;
        self
    }

    /// When disabled, derivation enumeration keeps lower-ranked parses too
    /// instead of pruning to the top rank at each choice point.
    pub fn top_rank_only(mut self, on: bool) -> Self {
        self.top_rank_only = on;
        self
    }

    /// Parse `input` to a single value. Fails on ambiguity unless
    /// [`Parser::ignore_ambiguity`] is set.
    pub fn parse(&self, input: &str) -> Result<V, ParseError> {
        let (rec, end) = self.recognize(input)?;
        let forest = Forest::new(&rec, end).map_err(|e| match e {
            EngineError::NoParse { .. } => ParseError::PartialMatch { consumed: end },
            other => ParseError::Engine(other),
        })?;
        let mut order = Order::new(&forest);
        if !self.top_rank_only {
            order.set_high_rank_only(false)?;
        }
        let derivations = order.ambiguity_metric();
        debug!("parse of {} byte(s): {} derivation(s)", input.len(), derivations);
        if derivations > 1 && !self.ignore_ambiguity {
            return Err(ParseError::Ambiguous { derivations });
        }
        let mut tree = Tree::new(&mut order);
        if !tree.next() {
            return Err(ParseError::Engine(EngineError::NoParse { end }));
        }
        self.evaluate(input, &tree)
    }

    /// Parse `input` and hand every derivation to `visit` in rank order,
    /// best first. Stops early when `visit` returns false. Returns the
    /// number of derivations visited.
    pub fn parse_each(
        &self,
        input: &str,
        mut visit: impl FnMut(V) -> bool,
    ) -> Result<usize, ParseError> {
        let (rec, end) = self.recognize(input)?;
        let forest = Forest::new(&rec, end).map_err(|e| match e {
            EngineError::NoParse { .. } => ParseError::PartialMatch { consumed: end },
            other => ParseError::Engine(other),
        })?;
        let mut order = Order::new(&forest);
        if !self.top_rank_only {
            order.set_high_rank_only(false)?;
        }
        let mut tree = Tree::new(&mut order);
        let mut visited = 0;
        while tree.next() {
            let value = self.evaluate(input, &tree)?;
            visited += 1;
            if !visit(value) {
                break;
            }
        }
        Ok(visited)
    }

    /// Feed the whole input and return the recognizer plus the parse end
    /// earleme.
    fn recognize(&self, input: &str) -> Result<(Recognizer<'g>, usize), ParseError> {
        let mut rec = Recognizer::new(self.grammar.engine())?;
        rec.start_input()?;

        let mut pos = 0;
        while pos < input.len() {
            let scan_at = self.skip_discards(input, pos);
            if scan_at > pos {
                trace!("discarded {} byte(s) at {}", scan_at - pos, pos);
            }
            let expected = rec.terminals_expected();
            let mut matched_any = false;
            for sym in &expected {
                let lexer = match self.grammar.lexer_for(*sym) {
                    Some(l) => l,
                    None => continue,
                };
                if let Some(len) = lexer.match_at(input, scan_at) {
                    let span = scan_at - pos + len;
                    if span == 0 {
                        // An empty lexeme with nothing discarded before it
                        // would not advance the timeline.
                        continue;
                    }
                    rec.alternative(*sym, (1 + scan_at) as i32, span)?;
                    matched_any = true;
                }
            }
            if !matched_any && rec.furthest_earleme() <= pos && scan_at < input.len() {
                return Err(ParseError::NoViableTerminal {
                    at: scan_at,
                    excerpt: excerpt(input, scan_at),
                });
            }
            let events = rec.earleme_complete()?;
            if events.contains(&Event::Exhausted) {
                trace!("recognizer exhausted after earleme {}", pos);
                break;
            }
            pos += 1;
        }

        let end = rec.furthest_earleme();
        let tail = self.skip_discards(input, end);
        if tail < input.len() {
            return Err(ParseError::PartialMatch { consumed: end });
        }
        Ok((rec, end))
    }

    /// Advance `at` over discard matches to a fixed point.
    fn skip_discards(&self, input: &str, mut at: usize) -> usize {
        loop {
            let mut advanced = false;
            for discard in self.grammar.discards() {
                if let Some(len) = discard.match_at(input, at) {
                    if len > 0 {
                        at += len;
                        advanced = true;
                        break;
                    }
                }
            }
            if !advanced {
                return at;
            }
        }
    }

    /// Replay one derivation through the step valuator.
    fn evaluate(&self, input: &str, tree: &Tree<'_, '_>) -> Result<V, ParseError> {
        let grammar = self.grammar;
        let mut valuator = Valuator::new(tree)?;
        let mut slots: Vec<Option<Vec<V>>> = Vec::new();
        loop {
            match valuator.step()? {
                Step::Initial => {}
                Step::Token {
                    symbol,
                    value,
                    result,
                } => {
                    let start = (value - 1) as usize;
                    let lexer = grammar
                        .lexer_for(symbol)
                        .ok_or(EngineError::InvalidSymbol(symbol.id() as i32))?;
                    let len = lexer
                        .match_at(input, start)
                        .ok_or(EngineError::ValuationProtocol { slot: result })?;
                    let text = &input[start..start + len];
                    let out = (self.token_fn)(grammar.name_of(symbol), text)
                        .into_iter()
                        .collect();
                    store(&mut slots, result, out);
                }
                Step::NullingSymbol { symbol, result } => {
                    let out = match grammar.named_of(symbol) {
                        Some(name) => (self.null_fn)(name).into_iter().collect(),
                        None => Vec::new(),
                    };
                    store(&mut slots, result, out);
                }
                Step::Rule {
                    rule,
                    arg_first,
                    arg_last,
                    result,
                } => {
                    let lhs = grammar.engine().rule_lhs(rule)?;
                    let mut args = Vec::new();
                    for slot in arg_first..=arg_last {
                        let vals = slots
                            .get_mut(slot)
                            .and_then(Option::take)
                            .ok_or(EngineError::ValuationProtocol { slot })?;
                        args.extend(vals);
                    }
                    let out = match grammar.named_of(lhs) {
                        Some(name) => vec![(self.rule_fn)(name, args)],
                        None => args,
                    };
                    store(&mut slots, result, out);
                }
                Step::Inactive => break,
            }
        }
        let mut finished = slots
            .get_mut(0)
            .and_then(Option::take)
            .ok_or(EngineError::ValuationProtocol { slot: 0 })?;
        if finished.len() != 1 {
            return Err(ParseError::Engine(EngineError::ValuationProtocol {
                slot: 0,
            }));
        }
        Ok(finished.remove(0))
    }
}

impl Grammar {
    /// Parse with the default [`Value`] semantics.
    pub fn parse(&self, input: &str) -> Result<Value, ParseError> {
        Parser::new(self).parse(input)
    }
}

fn store<V>(slots: &mut Vec<Option<Vec<V>>>, slot: usize, values: Vec<V>) {
    if slots.len() <= slot {
        slots.resize_with(slot + 1, || None);
    }
    slots[slot] = Some(values);
}

/// A short, char-boundary-safe slice of the input for error messages.
fn excerpt(input: &str, at: usize) -> String {
    let mut start = at.min(input.len());
    while start > 0 && !input.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (start + 12).min(input.len());
    while end < input.len() && !input.is_char_boundary(end) {
        end += 1;
    }
    input[start..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarBuilder;

    #[test]
    fn excerpt_respects_char_boundaries() {
        let s = "héllo wörld plus more";
        assert_eq!(excerpt(s, 0), "héllo wörld");
        assert_eq!(excerpt(s, s.len()), "");
    }

    #[test]
    fn single_terminal_round_trip() {
        let mut b = GrammarBuilder::new();
        b.rule("word", |b| b.lex("[a-z]+"));
        let g = b.compile("word").unwrap();
        let v = g.parse("hello").unwrap();
        assert_eq!(
            v,
            Value::Node {
                name: "word".to_string(),
                children: vec![Value::Token("hello".to_string())],
            }
        );
    }

    #[test]
    fn trailing_garbage_is_a_partial_match() {
        let mut b = GrammarBuilder::new();
        b.rule("word", |b| b.lex("[a-z]+"));
        let g = b.compile("word").unwrap();
        let err = g.parse("abc123").unwrap_err();
        assert_eq!(err, ParseError::PartialMatch { consumed: 3 });
    }

    #[test]
    fn unmatchable_input_names_the_offset() {
        let mut b = GrammarBuilder::new();
        b.rule("num", |b| b.lex("[0-9]+"));
        let g = b.compile("num").unwrap();
        let err = g.parse("x").unwrap_err();
        match err {
            ParseError::NoViableTerminal { at, excerpt } => {
                assert_eq!(at, 0);
                assert_eq!(excerpt, "x");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
