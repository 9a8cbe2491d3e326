//! Step-wise valuator
//!
//! The valuator walks one derivation tree bottom-up and hands the caller a
//! stream of instructions for a stack machine: children of a rule occupy a
//! contiguous run of value slots, the rule's result replaces the first of
//! them, and the finished value sits in slot 0 when INACTIVE is reached.
//! Sequence-rule separators carry no semantics and are dropped from the
//! argument slots. A subtree that matched nothing at all was already
//! collapsed to a single nulling-symbol node by the forest.

use super::forest::{DTree, Tree};
use super::grammar::{Grammar, Rule, RuleId, Symbol};
use super::EngineError;
use std::marker::PhantomData;

/// One valuation instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Priming step; carries nothing.
    Initial,
    /// A matched token: its symbol, the caller-supplied token value, and the
    /// slot to store the semantic value in.
    Token {
        symbol: Symbol,
        value: i32,
        result: usize,
    },
    /// A rule reduction over the closed slot range `arg_first..=arg_last`;
    /// the result lands in `result` (always the first argument slot).
    Rule {
        rule: RuleId,
        arg_first: usize,
        arg_last: usize,
        result: usize,
    },
    /// A symbol whose production matched the empty string.
    NullingSymbol { symbol: Symbol, result: usize },
    /// Valuation is finished; the final value is in slot 0.
    Inactive,
}

/// Valuator over the tree iterator's current derivation.
///
/// Holds a borrow of the tree, so it must be dropped before the next tree
/// advance — the engine's release-before-advance protocol, enforced here by
/// the borrow checker.
#[derive(Debug)]
pub struct Valuator<'t> {
    steps: Vec<Step>,
    at: usize,
    _tree: PhantomData<&'t ()>,
}

impl<'t> Valuator<'t> {
    /// Create a valuator for the tree's current derivation.
    pub fn new(tree: &'t Tree<'_, '_>) -> Result<Self, EngineError> {
        let node = tree.current().ok_or(EngineError::TreeExhausted)?;
        let mut steps = vec![Step::Initial];
        emit(tree.grammar(), node, 0, &mut steps);
        steps.push(Step::Inactive);
        Ok(Valuator {
            steps,
            at: 0,
            _tree: PhantomData,
        })
    }

    /// Next instruction; keeps returning `Inactive` once finished.
    pub fn step(&mut self) -> Result<Step, EngineError> {
        let step = self.steps.get(self.at).copied().unwrap_or(Step::Inactive);
        if self.at < self.steps.len() {
            self.at += 1;
        }
        Ok(step)
    }
}

/// Post-order emission: child k of a node with slot `s` owns slot `s + k`,
/// so argument runs are contiguous and the result overwrites the first.
fn emit(grammar: &Grammar, node: &DTree, slot: usize, steps: &mut Vec<Step>) {
    match node {
        DTree::Token { symbol, value } => steps.push(Step::Token {
            symbol: *symbol,
            value: *value,
            result: slot,
        }),
        DTree::Null { symbol } => steps.push(Step::NullingSymbol {
            symbol: *symbol,
            result: slot,
        }),
        DTree::Rule { rule, children } => {
            let separated = matches!(
                grammar.rule(*rule),
                Ok(Rule::Sequence {
                    separator: Some(_),
                    ..
                })
            );
            let mut args = 0;
            for (k, child) in children.iter().enumerate() {
                // With a separator the children alternate item, sep, item…;
                // only the items carry semantics.
                if separated && k % 2 == 1 {
                    continue;
                }
                emit(grammar, child, slot + args, steps);
                args += 1;
            }
            let last = slot + args.max(1) - 1;
            steps.push(Step::Rule {
                rule: *rule,
                arg_first: slot,
                arg_last: last,
                result: slot,
            });
        }
    }
}
