//! Forest, ordering and tree views over a finished recognition
//!
//! The forest is built from the recognizer's completed-span chart at a chosen
//! end earleme and fails if the start symbol does not span the whole range.
//! The ordering view enumerates derivation trees: at every ambiguity choice
//! the candidate rules are sorted by rank, highest first, and the
//! top-rank-only policy optionally drops everything below the best rank
//! before enumeration. The tree view then iterates derivations in that
//! order, one at a time, for the valuator to walk.
//!
//! Cyclic derivations (a symbol deriving itself over the same span)
//! contribute no trees.

use super::grammar::{Grammar, Rule, RuleId, Symbol};
use super::recognizer::Recognizer;
use super::EngineError;
use std::collections::{BTreeSet, HashMap, HashSet};

/// One concrete derivation tree.
#[derive(Debug, Clone)]
pub(super) enum DTree {
    /// A matched token with its caller-supplied value.
    Token { symbol: Symbol, value: i32 },
    /// A symbol whose derivation matched the empty string.
    Null { symbol: Symbol },
    /// A rule application; children are in RHS order (for sequence rules,
    /// items and separators interleaved as matched).
    Rule { rule: RuleId, children: Vec<DTree> },
}

/// The recognized-input forest: everything needed to enumerate derivations.
#[derive(Debug)]
pub struct Forest<'a> {
    grammar: &'a Grammar,
    tokens: &'a HashMap<(Symbol, usize, usize), i32>,
    completed: &'a HashSet<(RuleId, usize, usize)>,
    /// Candidate end positions per (symbol, start), for split enumeration.
    ends: HashMap<(Symbol, usize), BTreeSet<usize>>,
    start: Symbol,
    end: usize,
}

impl<'a> Forest<'a> {
    /// Build the forest over `rec` for the span ending at `end`. Fails when
    /// no complete parse of the start symbol covers that span.
    pub fn new(rec: &'a Recognizer<'_>, end: usize) -> Result<Self, EngineError> {
        let grammar = rec.grammar();
        let start = grammar.start_symbol().ok_or(EngineError::NoStartSymbol)?;
        let mut ends: HashMap<(Symbol, usize), BTreeSet<usize>> = HashMap::new();
        for (symbol, i, j) in rec.token_table().keys() {
            ends.entry((*symbol, *i)).or_default().insert(*j);
        }
        for (rule, i, j) in rec.completed_spans() {
            let lhs = grammar.rule_lhs(*rule)?;
            ends.entry((lhs, *i)).or_default().insert(*j);
        }
        let forest = Forest {
            grammar,
            tokens: rec.token_table(),
            completed: rec.completed_spans(),
            ends,
            start,
            end,
        };
        if !forest.derivable(start, 0, end) {
            return Err(EngineError::NoParse { end });
        }
        Ok(forest)
    }

    fn derivable(&self, symbol: Symbol, i: usize, j: usize) -> bool {
        if i == j {
            return self.grammar.is_nullable(symbol);
        }
        self.ends
            .get(&(symbol, i))
            .map(|set| set.contains(&j))
            .unwrap_or(false)
    }

    /// Candidate end positions for `symbol` starting at `at`, clamped to
    /// `limit`, with the zero-length span included when nullable.
    fn span_ends(&self, symbol: Symbol, at: usize, limit: usize) -> Vec<usize> {
        let mut out = Vec::new();
        if self.grammar.is_nullable(symbol) {
            out.push(at);
        }
        if at < limit {
            if let Some(set) = self.ends.get(&(symbol, at)) {
                for &e in set.range((at + 1)..=limit) {
                    out.push(e);
                }
            }
        }
        out
    }

    /// All derivation trees for the whole recognized span, in rank order.
    fn derivations(&self, high_rank_only: bool) -> Vec<DTree> {
        let mut guard = HashSet::new();
        self.derive(self.start, 0, self.end, high_rank_only, &mut guard)
    }

    fn derive(
        &self,
        symbol: Symbol,
        i: usize,
        j: usize,
        high_rank_only: bool,
        guard: &mut HashSet<(Symbol, usize, usize)>,
    ) -> Vec<DTree> {
        if i == j {
            return if self.grammar.is_nullable(symbol) {
                vec![DTree::Null { symbol }]
            } else {
                Vec::new()
            };
        }
        if let Some(&value) = self.tokens.get(&(symbol, i, j)) {
            return vec![DTree::Token { symbol, value }];
        }
        if !guard.insert((symbol, i, j)) {
            return Vec::new();
        }

        // Rank-ordered rule alternatives completed over this exact span.
        let mut alts: Vec<(i32, RuleId)> = self
            .grammar
            .rules_for(symbol)
            .iter()
            .filter(|rid| self.completed.contains(&(**rid, i, j)))
            .map(|rid| (self.grammar.rule(*rid).map(Rule::rank).unwrap_or(0), *rid))
            .collect();
        alts.sort_by_key(|(rank, _)| std::cmp::Reverse(*rank));
        if high_rank_only {
            if let Some(&(top, _)) = alts.first() {
                alts.retain(|(rank, _)| *rank == top);
            }
        }

        let mut out = Vec::new();
        for (_, rid) in alts {
            let rule = match self.grammar.rule(rid) {
                Ok(r) => r.clone(),
                Err(_) => continue,
            };
            let layouts = match &rule {
                Rule::Bnf { rhs, .. } => self.bnf_layouts(rhs, i, j),
                Rule::Sequence {
                    item,
                    separator,
                    min,
                    proper,
                    ..
                } => self.sequence_layouts(*item, *separator, *min, *proper, i, j),
            };
            for layout in layouts {
                let child_options: Vec<Vec<DTree>> = layout
                    .iter()
                    .map(|(s, ci, cj)| self.derive(*s, *ci, *cj, high_rank_only, guard))
                    .collect();
                if child_options.iter().any(Vec::is_empty) {
                    continue;
                }
                for children in cartesian(&child_options) {
                    out.push(DTree::Rule {
                        rule: rid,
                        children,
                    });
                }
            }
        }
        guard.remove(&(symbol, i, j));
        out
    }

    /// Ways to lay the RHS symbols over the span, as (symbol, start, end)
    /// triples per child.
    fn bnf_layouts(
        &self,
        rhs: &[Symbol],
        i: usize,
        j: usize,
    ) -> Vec<Vec<(Symbol, usize, usize)>> {
        if rhs.is_empty() {
            return if i == j { vec![Vec::new()] } else { Vec::new() };
        }
        let first = rhs[0];
        let mut out = Vec::new();
        for e in self.span_ends(first, i, j) {
            if !self.derivable(first, i, e) {
                continue;
            }
            for mut rest in self.bnf_layouts(&rhs[1..], e, j) {
                let mut layout = vec![(first, i, e)];
                layout.append(&mut rest);
                out.push(layout);
            }
        }
        out
    }

    /// Ways to lay a sequence rule over the span: items (and separators)
    /// alternating, at least `min` items, and a trailing separator only when
    /// separation is not proper. Zero-length child spans never occur here;
    /// counted nullables are rejected at precompute.
    fn sequence_layouts(
        &self,
        item: Symbol,
        separator: Option<Symbol>,
        min: u32,
        proper: bool,
        i: usize,
        j: usize,
    ) -> Vec<Vec<(Symbol, usize, usize)>> {
        let mut out = Vec::new();
        let mut layout = Vec::new();
        self.sequence_walk(
            item, separator, min, proper, j, i, 0, false, &mut layout, &mut out,
        );
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn sequence_walk(
        &self,
        item: Symbol,
        separator: Option<Symbol>,
        min: u32,
        proper: bool,
        j: usize,
        at: usize,
        items: u32,
        after_sep: bool,
        layout: &mut Vec<(Symbol, usize, usize)>,
        out: &mut Vec<Vec<(Symbol, usize, usize)>>,
    ) {
        if at == j && items >= min && items > 0 && (!after_sep || !proper) {
            out.push(layout.clone());
        }
        let expect_item = items == 0 || after_sep || separator.is_none();
        let next = if expect_item { item } else { separator.unwrap_or(item) };
        for e in self.span_ends(next, at, j) {
            if e == at {
                continue;
            }
            layout.push((next, at, e));
            let (items2, after2) = if expect_item {
                (items + 1, false)
            } else {
                (items, true)
            };
            self.sequence_walk(
                item, separator, min, proper, j, e, items2, after2, layout, out,
            );
            layout.pop();
        }
    }

    pub(super) fn grammar(&self) -> &'a Grammar {
        self.grammar
    }
}

/// Lexicographic cartesian product; the first position varies slowest, so
/// higher-ranked choices of earlier children come first.
fn cartesian(options: &[Vec<DTree>]) -> Vec<Vec<DTree>> {
    let mut out: Vec<Vec<DTree>> = vec![Vec::new()];
    for opts in options {
        let mut next = Vec::with_capacity(out.len() * opts.len());
        for prefix in &out {
            for opt in opts {
                let mut row = prefix.clone();
                row.push(opt.clone());
                next.push(row);
            }
        }
        out = next;
    }
    out
}

/// Rank-aware ordering over the forest's derivations.
#[derive(Debug)]
pub struct Order<'a> {
    forest: &'a Forest<'a>,
    high_rank_only: bool,
    trees: Option<Vec<DTree>>,
}

impl<'a> Order<'a> {
    pub fn new(forest: &'a Forest<'a>) -> Self {
        Order {
            forest,
            high_rank_only: true,
            trees: None,
        }
    }

    /// Toggle the top-rank-only policy. Must happen before the ordering is
    /// enumerated; afterwards the ordering is frozen.
    pub fn set_high_rank_only(&mut self, on: bool) -> Result<(), EngineError> {
        if self.trees.is_some() {
            return Err(EngineError::OrderFrozen);
        }
        self.high_rank_only = on;
        Ok(())
    }

    /// Number of derivations surviving the rank policy. Freezes the
    /// ordering.
    pub fn ambiguity_metric(&mut self) -> usize {
        self.freeze();
        self.trees.as_ref().map(Vec::len).unwrap_or(0)
    }

    fn freeze(&mut self) {
        if self.trees.is_none() {
            self.trees = Some(self.forest.derivations(self.high_rank_only));
        }
    }

    pub(super) fn tree_at(&self, idx: usize) -> Option<&DTree> {
        self.trees.as_ref().and_then(|ts| ts.get(idx))
    }

    pub(super) fn grammar(&self) -> &'a Grammar {
        self.forest.grammar()
    }
}

/// Iterator over the ordered derivations. Each advance invalidates the
/// previous derivation's valuator — the valuator borrows the tree, so the
/// release-before-advance protocol is enforced by the compiler.
#[derive(Debug)]
pub struct Tree<'o, 'a> {
    order: &'o mut Order<'a>,
    next_idx: usize,
    current: Option<usize>,
}

impl<'o, 'a> Tree<'o, 'a> {
    pub fn new(order: &'o mut Order<'a>) -> Self {
        Tree {
            order,
            next_idx: 0,
            current: None,
        }
    }

    /// Advance to the next derivation; false when none remain.
    pub fn next(&mut self) -> bool {
        self.order.freeze();
        if self.order.tree_at(self.next_idx).is_some() {
            self.current = Some(self.next_idx);
            self.next_idx += 1;
            true
        } else {
            self.current = None;
            false
        }
    }

    pub(super) fn current(&self) -> Option<&DTree> {
        self.current.and_then(|idx| self.order.tree_at(idx))
    }

    pub(super) fn grammar(&self) -> &'a Grammar {
        self.order.grammar()
    }
}
