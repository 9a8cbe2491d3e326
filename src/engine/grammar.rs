//! Engine grammar: symbol and rule storage plus precompute
//!
//! Symbols are dense integer ids handed out in creation order. Rules are
//! either plain BNF productions (LHS plus ordered RHS, with an integer rank
//! used only for derivation ordering) or native sequence rules (item,
//! optional separator, minimum count, proper-separation flag).
//!
//! Precompute is one-shot: it freezes the rule set, computes nullability,
//! and reports compile-time events. After precompute the grammar is
//! read-only and can back any number of sequential recognizers.

use super::{EngineError, Event};

/// Engine-assigned integer identity for a terminal or nonterminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub(crate) u32);

impl Symbol {
    /// Raw id, mainly for diagnostics.
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Identity of one rule inside the engine grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub(crate) u32);

impl RuleId {
    /// Raw id, mainly for diagnostics.
    pub fn id(self) -> u32 {
        self.0
    }
}

/// One stored rule.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Plain BNF production.
    Bnf {
        lhs: Symbol,
        rhs: Vec<Symbol>,
        rank: i32,
    },
    /// Native repetition rule.
    Sequence {
        lhs: Symbol,
        item: Symbol,
        separator: Option<Symbol>,
        min: u32,
        proper: bool,
    },
}

impl Rule {
    pub fn lhs(&self) -> Symbol {
        match self {
            Rule::Bnf { lhs, .. } | Rule::Sequence { lhs, .. } => *lhs,
        }
    }

    pub fn rank(&self) -> i32 {
        match self {
            Rule::Bnf { rank, .. } => *rank,
            Rule::Sequence { .. } => 0,
        }
    }
}

/// The engine grammar handle.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    rules: Vec<Rule>,
    /// Rule ids grouped by LHS, indexed by symbol id.
    by_lhs: Vec<Vec<RuleId>>,
    start: Option<Symbol>,
    precomputed: bool,
    nullable: Vec<bool>,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh symbol and return its id.
    pub fn symbol_new(&mut self) -> Symbol {
        let id = self.by_lhs.len() as u32;
        self.by_lhs.push(Vec::new());
        Symbol(id)
    }

    pub fn symbol_count(&self) -> u32 {
        self.by_lhs.len() as u32
    }

    pub fn rule_count(&self) -> u32 {
        self.rules.len() as u32
    }

    fn check_symbol(&self, s: Symbol) -> Result<(), EngineError> {
        if (s.0 as usize) < self.by_lhs.len() {
            Ok(())
        } else {
            Err(EngineError::InvalidSymbol(s.0 as i32))
        }
    }

    fn check_mutable(&self) -> Result<(), EngineError> {
        if self.precomputed {
            Err(EngineError::Precomputed)
        } else {
            Ok(())
        }
    }

    /// True if the symbol never appears as an LHS.
    pub fn is_terminal(&self, s: Symbol) -> bool {
        self.by_lhs
            .get(s.0 as usize)
            .map(|rules| rules.is_empty())
            .unwrap_or(false)
    }

    /// Create a BNF production with default rank 0.
    pub fn rule_new(&mut self, lhs: Symbol, rhs: &[Symbol]) -> Result<RuleId, EngineError> {
        self.check_mutable()?;
        self.check_symbol(lhs)?;
        for s in rhs {
            self.check_symbol(*s)?;
        }
        if self.lhs_is_sequence(lhs) {
            return Err(EngineError::SequenceLhsNotUnique(lhs));
        }
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(Rule::Bnf {
            lhs,
            rhs: rhs.to_vec(),
            rank: 0,
        });
        self.by_lhs[lhs.0 as usize].push(id);
        Ok(id)
    }

    /// Create a native sequence rule. The LHS must not be the LHS of any
    /// other rule.
    pub fn sequence_new(
        &mut self,
        lhs: Symbol,
        item: Symbol,
        separator: Option<Symbol>,
        min: u32,
        proper: bool,
    ) -> Result<RuleId, EngineError> {
        self.check_mutable()?;
        self.check_symbol(lhs)?;
        self.check_symbol(item)?;
        if let Some(sep) = separator {
            self.check_symbol(sep)?;
        }
        if !self.by_lhs[lhs.0 as usize].is_empty() {
            return Err(EngineError::SequenceLhsNotUnique(lhs));
        }
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(Rule::Sequence {
            lhs,
            item,
            separator,
            min,
            proper,
        });
        self.by_lhs[lhs.0 as usize].push(id);
        Ok(id)
    }

    fn lhs_is_sequence(&self, lhs: Symbol) -> bool {
        self.by_lhs[lhs.0 as usize]
            .iter()
            .any(|rid| matches!(self.rules[rid.0 as usize], Rule::Sequence { .. }))
    }

    /// Set the rank of a BNF rule. Higher ranks are preferred during
    /// derivation ordering; recognition ignores ranks entirely.
    pub fn rule_set_rank(&mut self, rule: RuleId, new_rank: i32) -> Result<(), EngineError> {
        self.check_mutable()?;
        match self.rules.get_mut(rule.0 as usize) {
            Some(Rule::Bnf { rank, .. }) => {
                *rank = new_rank;
                Ok(())
            }
            _ => Err(EngineError::InvalidRule(rule.0 as i32)),
        }
    }

    pub fn start_symbol_set(&mut self, s: Symbol) -> Result<(), EngineError> {
        self.check_mutable()?;
        self.check_symbol(s)?;
        self.start = Some(s);
        Ok(())
    }

    pub fn start_symbol(&self) -> Option<Symbol> {
        self.start
    }

    pub fn is_precomputed(&self) -> bool {
        self.precomputed
    }

    /// Freeze the grammar and compute derived tables. Returns the emitted
    /// compile-time events; the caller decides their severity.
    pub fn precompute(&mut self) -> Result<Vec<Event>, EngineError> {
        if self.precomputed {
            return Err(EngineError::Precomputed);
        }
        if self.start.is_none() {
            return Err(EngineError::NoStartSymbol);
        }
        self.compute_nullable();
        let mut events = Vec::new();
        for rule in &self.rules {
            if let Rule::Sequence {
                item, separator, ..
            } = rule
            {
                if self.nullable[item.0 as usize] {
                    events.push(Event::CountedNullable(*item));
                }
                if let Some(sep) = separator {
                    if self.nullable[sep.0 as usize] {
                        events.push(Event::CountedNullable(*sep));
                    }
                }
            }
        }
        self.precomputed = true;
        Ok(events)
    }

    /// Fixed-point nullability: empty productions seed it, a BNF rule with an
    /// all-nullable RHS propagates it, and a min-0 sequence rule grants it.
    fn compute_nullable(&mut self) {
        self.nullable = vec![false; self.by_lhs.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for rule in &self.rules {
                let lhs = rule.lhs();
                if self.nullable[lhs.0 as usize] {
                    continue;
                }
                let derives_empty = match rule {
                    Rule::Bnf { rhs, .. } => {
                        rhs.iter().all(|s| self.nullable[s.0 as usize])
                    }
                    Rule::Sequence { min, .. } => *min == 0,
                };
                if derives_empty {
                    self.nullable[lhs.0 as usize] = true;
                    changed = true;
                }
            }
        }
    }

    /// True if the symbol can derive the empty string. Only meaningful after
    /// precompute.
    pub fn is_nullable(&self, s: Symbol) -> bool {
        self.nullable.get(s.0 as usize).copied().unwrap_or(false)
    }

    pub fn rule(&self, id: RuleId) -> Result<&Rule, EngineError> {
        self.rules
            .get(id.0 as usize)
            .ok_or(EngineError::InvalidRule(id.0 as i32))
    }

    pub fn rule_lhs(&self, id: RuleId) -> Result<Symbol, EngineError> {
        self.rule(id).map(Rule::lhs)
    }

    pub fn rules_for(&self, lhs: Symbol) -> &[RuleId] {
        self.by_lhs
            .get(lhs.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, r)| (RuleId(i as u32), r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminals_have_no_productions() {
        let mut g = Grammar::new();
        let a = g.symbol_new();
        let s = g.symbol_new();
        g.rule_new(s, &[a]).unwrap();
        assert!(g.is_terminal(a));
        assert!(!g.is_terminal(s));
    }

    #[test]
    fn nullability_propagates_through_rules() {
        let mut g = Grammar::new();
        let a = g.symbol_new();
        let maybe = g.symbol_new();
        let pair = g.symbol_new();
        g.rule_new(maybe, &[]).unwrap();
        g.rule_new(maybe, &[a]).unwrap();
        g.rule_new(pair, &[maybe, maybe]).unwrap();
        g.start_symbol_set(pair).unwrap();
        let events = g.precompute().unwrap();
        assert!(events.is_empty());
        assert!(g.is_nullable(maybe));
        assert!(g.is_nullable(pair));
        assert!(!g.is_nullable(a));
    }

    #[test]
    fn nullable_sequence_item_emits_event() {
        let mut g = Grammar::new();
        let a = g.symbol_new();
        let maybe = g.symbol_new();
        let seq = g.symbol_new();
        g.rule_new(maybe, &[]).unwrap();
        g.rule_new(maybe, &[a]).unwrap();
        g.sequence_new(seq, maybe, None, 0, true).unwrap();
        g.start_symbol_set(seq).unwrap();
        let events = g.precompute().unwrap();
        assert_eq!(events, vec![Event::CountedNullable(maybe)]);
    }

    #[test]
    fn sequence_lhs_must_be_unique() {
        let mut g = Grammar::new();
        let a = g.symbol_new();
        let s = g.symbol_new();
        g.sequence_new(s, a, None, 0, true).unwrap();
        assert_eq!(
            g.rule_new(s, &[a]),
            Err(EngineError::SequenceLhsNotUnique(s))
        );
    }

    #[test]
    fn precompute_is_one_shot() {
        let mut g = Grammar::new();
        let a = g.symbol_new();
        g.start_symbol_set(a).unwrap();
        g.precompute().unwrap();
        assert!(g.is_precomputed());
        assert_eq!(g.precompute(), Err(EngineError::Precomputed));
        assert_eq!(g.rule_new(a, &[a]), Err(EngineError::Precomputed));
    }
}
