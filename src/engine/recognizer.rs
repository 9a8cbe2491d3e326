//! Incremental recognizer
//!
//! The recognizer advances one earleme at a time; with the driver feeding
//! text, one earleme corresponds to one input byte. Token alternatives are
//! submitted at the current earleme with an explicit length, so a single
//! token may span many earlemes (this is how leading discarded text is
//! absorbed into the following token). Each `earleme_complete` call closes
//! the current position and moves the timeline forward by one.
//!
//! The item sets use the nullable-prediction shortcut: when an item expects
//! a nullable symbol, the advanced item is added alongside the prediction,
//! which keeps within-set completions order-independent.

use super::grammar::{Grammar, Rule, RuleId, Symbol};
use super::{EngineError, Event};
use log::trace;
use std::collections::{HashMap, HashSet};

/// Position of an item inside its rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Dot {
    /// Next RHS index of a BNF rule.
    Bnf(usize),
    /// Progress through a sequence rule: items matched so far, and whether
    /// the last matched child was the separator.
    Seq { items: u32, after_sep: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Item {
    rule: RuleId,
    dot: Dot,
    origin: usize,
}

#[derive(Debug, Clone, Copy)]
struct PendingToken {
    symbol: Symbol,
    start: usize,
    end: usize,
}

/// A single-use recognizer over one input.
#[derive(Debug)]
pub struct Recognizer<'g> {
    grammar: &'g Grammar,
    sets: Vec<Vec<Item>>,
    current: usize,
    pending: Vec<PendingToken>,
    /// Accepted token alternatives keyed by (symbol, start, end) with their
    /// caller-supplied values.
    tokens: HashMap<(Symbol, usize, usize), i32>,
    /// Completed rule spans, the raw material of the forest.
    completed: HashSet<(RuleId, usize, usize)>,
    furthest: usize,
    exhausted: bool,
}

impl<'g> Recognizer<'g> {
    /// Create a recognizer for a precomputed grammar.
    pub fn new(grammar: &'g Grammar) -> Result<Self, EngineError> {
        if !grammar.is_precomputed() {
            return Err(EngineError::NotPrecomputed);
        }
        Ok(Recognizer {
            grammar,
            sets: Vec::new(),
            current: 0,
            pending: Vec::new(),
            tokens: HashMap::new(),
            completed: HashSet::new(),
            furthest: 0,
            exhausted: false,
        })
    }

    /// Prime earleme 0 with predictions from the start symbol. The start
    /// symbol must be a nonterminal; the combinator layer guarantees this by
    /// always rooting the grammar at a named rule.
    pub fn start_input(&mut self) -> Result<(), EngineError> {
        let start = self
            .grammar
            .start_symbol()
            .ok_or(EngineError::NoStartSymbol)?;
        self.sets.push(Vec::new());
        self.predict(0, start);
        self.closure(0);
        Ok(())
    }

    /// Terminal symbols that can begin at the current earleme.
    pub fn terminals_expected(&self) -> Vec<Symbol> {
        let mut out: Vec<Symbol> = Vec::new();
        if let Some(set) = self.sets.get(self.current) {
            for item in set {
                for s in self.next_symbols(item) {
                    if self.grammar.is_terminal(s) && !out.contains(&s) {
                        out.push(s);
                    }
                }
            }
        }
        out.sort();
        out
    }

    /// Submit one token alternative at the current earleme. `value` is the
    /// caller's token identity (0 is reserved), `length` the number of
    /// earlemes the token spans.
    pub fn alternative(
        &mut self,
        symbol: Symbol,
        value: i32,
        length: usize,
    ) -> Result<(), EngineError> {
        if self.exhausted {
            return Err(EngineError::ParseExhausted);
        }
        if value == 0 {
            return Err(EngineError::ReservedTokenValue);
        }
        if length == 0 {
            return Err(EngineError::InvalidLength(length));
        }
        let expected = self
            .sets
            .get(self.current)
            .map(|set| {
                set.iter()
                    .any(|item| self.next_symbols(item).contains(&symbol))
            })
            .unwrap_or(false);
        if !expected {
            return Err(EngineError::UnexpectedToken(symbol));
        }
        let start = self.current;
        let end = start + length;
        self.tokens.insert((symbol, start, end), value);
        self.pending.push(PendingToken { symbol, start, end });
        self.furthest = self.furthest.max(end);
        trace!("alternative S{} at {}..{} value {}", symbol.0, start, end, value);
        Ok(())
    }

    /// Close the current earleme and advance the timeline by one. Returns
    /// the events emitted while completing, notably exhaustion.
    pub fn earleme_complete(&mut self) -> Result<Vec<Event>, EngineError> {
        if self.exhausted {
            return Err(EngineError::ParseExhausted);
        }
        self.current += 1;
        while self.sets.len() <= self.current {
            self.sets.push(Vec::new());
        }

        // Scan: advance parent items over every token ending here.
        let arriving: Vec<PendingToken> = self
            .pending
            .iter()
            .copied()
            .filter(|t| t.end == self.current)
            .collect();
        self.pending.retain(|t| t.end != self.current);
        for token in arriving {
            let parents = self.sets[token.start].clone();
            for parent in parents {
                if self.next_symbols(&parent).contains(&token.symbol) {
                    let advanced = self.advance(&parent);
                    self.add_item(self.current, advanced);
                }
            }
        }

        self.closure(self.current);
        if !self.sets[self.current].is_empty() {
            self.furthest = self.furthest.max(self.current);
        }

        let mut events = Vec::new();
        let more_tokens = self.pending.iter().any(|t| t.end > self.current);
        if self.terminals_expected().is_empty() && !more_tokens {
            self.exhausted = true;
            events.push(Event::Exhausted);
        }
        Ok(events)
    }

    /// Furthest earleme reached by any item set or pending token.
    pub fn furthest_earleme(&self) -> usize {
        self.furthest
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn current_earleme(&self) -> usize {
        self.current
    }

    pub(super) fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub(super) fn token_table(&self) -> &HashMap<(Symbol, usize, usize), i32> {
        &self.tokens
    }

    pub(super) fn completed_spans(&self) -> &HashSet<(RuleId, usize, usize)> {
        &self.completed
    }

    /// Symbols the item expects next; empty when the item is complete.
    fn next_symbols(&self, item: &Item) -> Vec<Symbol> {
        let rule = match self.grammar.rule(item.rule) {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };
        match (rule, item.dot) {
            (Rule::Bnf { rhs, .. }, Dot::Bnf(d)) => {
                rhs.get(d).map(|s| vec![*s]).unwrap_or_default()
            }
            (
                Rule::Sequence {
                    item: item_sym,
                    separator,
                    ..
                },
                Dot::Seq { items, after_sep },
            ) => {
                if items == 0 || after_sep {
                    vec![*item_sym]
                } else {
                    match separator {
                        Some(sep) => vec![*sep],
                        None => vec![*item_sym],
                    }
                }
            }
            _ => Vec::new(),
        }
    }

    /// True if the item constitutes a complete match of its rule.
    fn is_complete(&self, item: &Item) -> bool {
        let rule = match self.grammar.rule(item.rule) {
            Ok(r) => r,
            Err(_) => return false,
        };
        match (rule, item.dot) {
            (Rule::Bnf { rhs, .. }, Dot::Bnf(d)) => d >= rhs.len(),
            (
                Rule::Sequence { min, proper, .. },
                Dot::Seq { items, after_sep },
            ) => items >= *min && (!after_sep || !proper),
            _ => false,
        }
    }

    /// The item advanced over its (single) expected symbol.
    fn advance(&self, item: &Item) -> Item {
        let dot = match item.dot {
            Dot::Bnf(d) => Dot::Bnf(d + 1),
            Dot::Seq { items, after_sep } => {
                if items == 0 || after_sep {
                    Dot::Seq {
                        items: items + 1,
                        after_sep: false,
                    }
                } else {
                    // Only sequences with a separator ever sit in this state
                    // expecting something other than the item.
                    let rule = self.grammar.rule(item.rule);
                    match rule {
                        Ok(Rule::Sequence {
                            separator: Some(_), ..
                        }) => Dot::Seq {
                            items,
                            after_sep: true,
                        },
                        _ => Dot::Seq {
                            items: items + 1,
                            after_sep: false,
                        },
                    }
                }
            }
        };
        Item {
            rule: item.rule,
            dot,
            origin: item.origin,
        }
    }

    fn add_item(&mut self, at: usize, item: Item) -> bool {
        if self.sets[at].contains(&item) {
            false
        } else {
            self.sets[at].push(item);
            true
        }
    }

    fn predict(&mut self, at: usize, symbol: Symbol) {
        for rid in self.grammar.rules_for(symbol).to_vec() {
            let dot = match self.grammar.rule(rid) {
                Ok(Rule::Bnf { .. }) => Dot::Bnf(0),
                Ok(Rule::Sequence { .. }) => Dot::Seq {
                    items: 0,
                    after_sep: false,
                },
                Err(_) => continue,
            };
            self.add_item(
                at,
                Item {
                    rule: rid,
                    dot,
                    origin: at,
                },
            );
        }
    }

    /// Predictor/completer fixed point over one set.
    fn closure(&mut self, at: usize) {
        let mut idx = 0;
        while idx < self.sets[at].len() {
            let item = self.sets[at][idx];
            idx += 1;
            if self.is_complete(&item) {
                self.completed.insert((item.rule, item.origin, at));
                if item.origin < at {
                    let lhs = match self.grammar.rule_lhs(item.rule) {
                        Ok(s) => s,
                        Err(_) => continue,
                    };
                    let parents = self.sets[item.origin].clone();
                    for parent in parents {
                        if self.next_symbols(&parent).contains(&lhs) {
                            let advanced = self.advance(&parent);
                            self.add_item(at, advanced);
                        }
                    }
                }
                // Same-set completions (origin == at) imply a nullable LHS;
                // the nullable shortcut below already advances the parents.
                continue;
            }
            for s in self.next_symbols(&item) {
                if !self.grammar.is_terminal(s) {
                    self.predict(at, s);
                }
                if self.grammar.is_nullable(s) {
                    let advanced = self.advance(&item);
                    self.add_item(at, advanced);
                }
            }
        }
    }
}
