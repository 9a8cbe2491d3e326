//! Grammar building and compilation
//!
//! `GrammarBuilder` assembles a combinator tree out of atoms and compiles it
//! into an immutable [`Grammar`]. The compile proceeds in three phases:
//!
//! 1. Resolve: every deferred rule body registered with [`GrammarBuilder::rule`]
//!    is evaluated exactly once, in registration order. Bodies may register
//!    further rules and reference each other (including recursively) through
//!    [`GrammarBuilder::call`].
//! 2. Lower: the atom tree rooted at the requested start rule is walked and
//!    each distinct atom gets exactly one engine symbol, keyed by atom
//!    identity. Entities allocate their symbol before compiling their body,
//!    which is what makes recursive rules terminate. Alternatives become one
//!    rule per branch with ranks derived from the normalized priorities;
//!    repetitions become native sequence rules.
//! 3. Precompute: the engine grammar is frozen. Any precompute event is
//!    treated as fatal and reported verbatim.
//!
//! The resulting `Grammar` is immutable and shareable across threads; all
//! per-parse state lives in [`crate::parser`].

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::atoms::{display_atom, AtomId, AtomKind, AtomNode, LexPattern};
use crate::engine::{self, Event, Symbol};
use crate::error::GrammarError;

type RuleBody = Box<dyn FnOnce(&mut GrammarBuilder) -> Result<AtomId, GrammarError>>;

/// Assembles combinator atoms and named rules, then compiles them.
#[derive(Default)]
pub struct GrammarBuilder {
    nodes: Vec<AtomNode>,
    entities: HashMap<String, AtomId>,
    pending: HashMap<String, RuleBody>,
    order: Vec<String>,
    resolved: HashSet<String>,
    discards: Vec<AtomId>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        GrammarBuilder::default()
    }

    fn push(&mut self, kind: AtomKind) -> AtomId {
        let id = AtomId(self.nodes.len());
        self.nodes.push(AtomNode::new(kind));
        id
    }

    /// A terminal matching the given regex pattern, anchored at the probe
    /// position.
    pub fn lex(&mut self, pattern: &str) -> Result<AtomId, GrammarError> {
        let lp = LexPattern::new(pattern)?;
        Ok(self.push(AtomKind::Lex(lp)))
    }

    /// A terminal matching `text` verbatim.
    pub fn str(&mut self, text: &str) -> Result<AtomId, GrammarError> {
        let lp = LexPattern::verbatim(text)?;
        Ok(self.push(AtomKind::Lex(lp)))
    }

    /// A terminal matching `text` verbatim, case-insensitively.
    pub fn stri(&mut self, text: &str) -> Result<AtomId, GrammarError> {
        let lp = LexPattern::verbatim_ci(text)?;
        Ok(self.push(AtomKind::Lex(lp)))
    }

    /// An ordered sequence of parts. An unlabeled sequence in first position
    /// is spliced rather than nested, so chained concatenation stays flat.
    pub fn seq(&mut self, parts: &[AtomId]) -> AtomId {
        let mut children = Vec::with_capacity(parts.len());
        for (idx, &p) in parts.iter().enumerate() {
            if idx == 0 {
                if let AtomNode {
                    kind: AtomKind::Sequence { children: inner },
                    label: None,
                } = &self.nodes[p.0]
                {
                    children.extend(inner.iter().copied());
                    continue;
                }
            }
            children.push(p);
        }
        self.push(AtomKind::Sequence { children })
    }

    fn extend_alternative(&mut self, left: AtomId, right: AtomId, delta: i32) -> AtomId {
        let mut children = match &self.nodes[left.0] {
            AtomNode {
                kind: AtomKind::Alternative { children },
                label: None,
            } => children.clone(),
            _ => vec![(left, 0)],
        };
        let last = children.last().map(|&(_, p)| p).unwrap_or(0);
        if delta == 0 {
            // Equal-preference merge splices an unlabeled alternative on the
            // right too, shifting its levels so its first branch joins at
            // the left's last level.
            if let AtomNode {
                kind: AtomKind::Alternative { children: spliced },
                label: None,
            } = &self.nodes[right.0]
            {
                let first = spliced.first().map(|&(_, p)| p).unwrap_or(0);
                let offset = last - first;
                let shifted: Vec<_> =
                    spliced.iter().map(|&(c, p)| (c, p + offset)).collect();
                children.extend(shifted);
                return self.push(AtomKind::Alternative { children });
            }
        }
        children.push((right, last - delta));
        self.push(AtomKind::Alternative { children })
    }

    /// `left` or `right` at equal preference. Unlabeled alternatives on
    /// either side are spliced rather than nested, keeping one flat
    /// preference ladder; `right` joins at the left's lowest level.
    pub fn alt(&mut self, left: AtomId, right: AtomId) -> AtomId {
        self.extend_alternative(left, right, 0)
    }

    /// `left`, falling back to `right` at strictly lower preference. When
    /// both match the same span only the preferred branch survives ordering.
    pub fn fallback(&mut self, left: AtomId, right: AtomId) -> AtomId {
        self.extend_alternative(left, right, 1)
    }

    /// All choices at equal preference.
    pub fn any_of(&mut self, choices: &[AtomId]) -> AtomId {
        let children = choices.iter().map(|&c| (c, 0)).collect();
        self.push(AtomKind::Alternative { children })
    }

    /// An alternative with explicit relative priorities. Priorities must be
    /// non-increasing and step down by at most one; compilation rejects
    /// anything else.
    pub fn alternative(&mut self, choices: &[(AtomId, i32)]) -> AtomId {
        self.push(AtomKind::Alternative {
            children: choices.to_vec(),
        })
    }

    /// `item` repeated `min` or more times.
    pub fn repeat(&mut self, item: AtomId, min: u32) -> AtomId {
        self.push(AtomKind::Repetition {
            item,
            separator: None,
            min,
            proper: true,
        })
    }

    /// `item` repeated `min` or more times with `separator` between items.
    /// With `proper` a trailing separator is rejected; without it one is
    /// allowed.
    pub fn repeat_sep(&mut self, item: AtomId, separator: AtomId, min: u32, proper: bool) -> AtomId {
        self.push(AtomKind::Repetition {
            item,
            separator: Some(separator),
            min,
            proper,
        })
    }

    /// Zero or one occurrence of `child`.
    pub fn maybe(&mut self, child: AtomId) -> AtomId {
        self.push(AtomKind::Maybe { child })
    }

    /// Attach a display label used in diagnostics and rule listings.
    pub fn label(&mut self, id: AtomId, name: &str) -> AtomId {
        self.nodes[id.0].label = Some(name.to_string());
        id
    }

    /// Declare a terminal whose matches are skipped between tokens instead
    /// of entering the grammar. The atom must be a terminal pattern.
    pub fn discard(&mut self, id: AtomId) {
        self.discards.push(id);
    }

    /// Register a named rule. The body runs once, during compilation.
    /// Registering the same name again replaces an unresolved body; once a
    /// body has been evaluated the binding is final and later registrations
    /// are ignored.
    pub fn rule<F>(&mut self, name: &str, body: F)
    where
        F: FnOnce(&mut GrammarBuilder) -> Result<AtomId, GrammarError> + 'static,
    {
        if self.resolved.contains(name) {
            return;
        }
        if !self.pending.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.pending.insert(name.to_string(), Box::new(body));
    }

    /// Reference a named rule. The same name always yields the same atom, so
    /// recursive and mutually recursive references stay identity-stable.
    pub fn call(&mut self, name: &str) -> AtomId {
        if let Some(&id) = self.entities.get(name) {
            return id;
        }
        let id = self.push(AtomKind::Entity {
            name: name.to_string(),
        });
        self.entities.insert(name.to_string(), id);
        id
    }

    /// Compile the registered rules into an immutable grammar with `root` as
    /// the start rule.
    pub fn compile(mut self, root: &str) -> Result<Grammar, GrammarError> {
        let root_atom = self.call(root);

        // Resolve rule bodies in registration order; bodies may register
        // further rules, which the loop picks up.
        let mut bodies: HashMap<String, AtomId> = HashMap::new();
        let mut i = 0;
        while i < self.order.len() {
            let name = self.order[i].clone();
            if let Some(body) = self.pending.remove(&name) {
                self.resolved.insert(name.clone());
                let atom = body(&mut self)?;
                bodies.insert(name, atom);
            }
            i += 1;
        }

        let mut lowering = Lowering {
            nodes: &self.nodes,
            bodies: &bodies,
            engine: engine::Grammar::new(),
            atom_to_sym: HashMap::new(),
            sym_to_atom: HashMap::new(),
            lexers: HashMap::new(),
            names: HashMap::new(),
            named: HashMap::new(),
        };
        let start = lowering.symbol_for(root_atom)?;
        lowering.engine.start_symbol_set(start)?;

        let events = lowering.engine.precompute()?;
        if !events.is_empty() {
            let rendered = events
                .iter()
                .map(|e| lowering.render_event(e))
                .collect::<Vec<_>>();
            return Err(GrammarError::Precompute { events: rendered });
        }

        let mut discards = Vec::with_capacity(self.discards.len());
        for id in &self.discards {
            match &self.nodes[id.0].kind {
                AtomKind::Lex(lp) => discards.push(lp.clone()),
                _ => {
                    return Err(GrammarError::Discard {
                        atom: display_atom(&self.nodes, *id),
                    })
                }
            }
        }

        debug!(
            "compiled grammar [{}]: {} symbols, {} rules, {} discard patterns",
            root,
            lowering.engine.symbol_count(),
            lowering.engine.rule_count(),
            discards.len()
        );

        Ok(Grammar {
            engine: lowering.engine,
            atom_to_sym: lowering.atom_to_sym,
            sym_to_atom: lowering.sym_to_atom,
            lexers: lowering.lexers,
            names: lowering.names,
            named: lowering.named,
            discards,
            start,
        })
    }
}

/// Walks the atom tree and emits engine symbols and rules.
struct Lowering<'b> {
    nodes: &'b [AtomNode],
    bodies: &'b HashMap<String, AtomId>,
    engine: engine::Grammar,
    atom_to_sym: HashMap<AtomId, Symbol>,
    sym_to_atom: HashMap<Symbol, AtomId>,
    lexers: HashMap<Symbol, LexPattern>,
    names: HashMap<Symbol, String>,
    named: HashMap<Symbol, String>,
}

impl Lowering<'_> {
    fn display(&self, atom: AtomId) -> String {
        display_atom(self.nodes, atom)
    }

    /// Allocate a fresh symbol for an atom that must not have one yet.
    fn create_symbol(&mut self, atom: AtomId) -> Result<Symbol, GrammarError> {
        if self.atom_to_sym.contains_key(&atom) {
            return Err(GrammarError::DuplicateSymbol {
                atom: self.display(atom),
            });
        }
        let sym = self.engine.symbol_new();
        self.atom_to_sym.insert(atom, sym);
        self.sym_to_atom.insert(sym, atom);
        self.names.insert(sym, self.display(atom));
        let node = &self.nodes[atom.0];
        let user_name = match (&node.label, &node.kind) {
            (Some(label), _) => Some(label.clone()),
            (None, AtomKind::Entity { name }) => Some(name.clone()),
            _ => None,
        };
        if let Some(name) = user_name {
            self.named.insert(sym, name);
        }
        Ok(sym)
    }

    fn rule_err(&self, atom: AtomId) -> impl Fn(engine::EngineError) -> GrammarError {
        let atom = self.display(atom);
        move |source| GrammarError::Rule {
            atom: atom.clone(),
            source,
        }
    }

    /// The symbol for an atom, building it and its rules on first use. The
    /// symbol is registered before children are compiled, so recursive
    /// references resolve to the symbol under construction.
    fn symbol_for(&mut self, atom: AtomId) -> Result<Symbol, GrammarError> {
        if let Some(&sym) = self.atom_to_sym.get(&atom) {
            return Ok(sym);
        }
        let kind = self.nodes[atom.0].kind.clone();
        let sym = self.create_symbol(atom)?;
        match kind {
            AtomKind::Lex(lp) => {
                self.lexers.insert(sym, lp);
            }
            AtomKind::Entity { name } => {
                let body = *self
                    .bodies
                    .get(&name)
                    .ok_or(GrammarError::UndefinedRule { name: name.clone() })?;
                let child = self.symbol_for(body)?;
                self.engine
                    .rule_new(sym, &[child])
                    .map_err(self.rule_err(atom))?;
            }
            AtomKind::Sequence { children } => {
                let rhs = children
                    .iter()
                    .map(|&c| self.symbol_for(c))
                    .collect::<Result<Vec<_>, _>>()?;
                self.engine
                    .rule_new(sym, &rhs)
                    .map_err(self.rule_err(atom))?;
            }
            AtomKind::Alternative { children } => {
                let mut prev: Option<i32> = None;
                for &(_, pri) in &children {
                    if let Some(p) = prev {
                        let step = p - pri;
                        if step != 0 && step != 1 {
                            return Err(GrammarError::PrioritySequence {
                                atom: self.display(atom),
                            });
                        }
                    }
                    prev = Some(pri);
                }
                // Shift so the least preferred branch has rank zero.
                let floor = children.iter().map(|&(_, p)| p).min().unwrap_or(0);
                for &(child, pri) in &children {
                    let cs = self.symbol_for(child)?;
                    let rid = self
                        .engine
                        .rule_new(sym, &[cs])
                        .map_err(self.rule_err(atom))?;
                    self.engine
                        .rule_set_rank(rid, pri - floor)
                        .map_err(self.rule_err(atom))?;
                }
            }
            AtomKind::Repetition {
                item,
                separator,
                min,
                proper,
            } => {
                let item_s = self.symbol_for(item)?;
                let sep_s = match separator {
                    Some(s) => Some(self.symbol_for(s)?),
                    None => None,
                };
                self.engine
                    .sequence_new(sym, item_s, sep_s, min, proper)
                    .map_err(self.rule_err(atom))?;
            }
            AtomKind::Maybe { child } => {
                let cs = self.symbol_for(child)?;
                self.engine
                    .rule_new(sym, &[])
                    .map_err(self.rule_err(atom))?;
                self.engine
                    .rule_new(sym, &[cs])
                    .map_err(self.rule_err(atom))?;
            }
        }
        Ok(sym)
    }

    fn render_event(&self, event: &Event) -> String {
        match event {
            Event::CountedNullable(sym) => {
                let name = self
                    .names
                    .get(sym)
                    .map(String::as_str)
                    .unwrap_or("<unknown>");
                format!("counted nullable symbol [{}]", name)
            }
            Event::Exhausted => "parse exhausted".to_string(),
        }
    }
}

/// A compiled, immutable grammar. Shareable across threads; every parse
/// builds its own recognizer against it.
#[derive(Debug)]
pub struct Grammar {
    engine: engine::Grammar,
    atom_to_sym: HashMap<AtomId, Symbol>,
    sym_to_atom: HashMap<Symbol, AtomId>,
    lexers: HashMap<Symbol, LexPattern>,
    names: HashMap<Symbol, String>,
    named: HashMap<Symbol, String>,
    discards: Vec<LexPattern>,
    start: Symbol,
}

impl Grammar {
    /// The underlying engine grammar, for inspection.
    pub fn engine(&self) -> &engine::Grammar {
        &self.engine
    }

    pub(crate) fn lexer_for(&self, sym: Symbol) -> Option<&LexPattern> {
        self.lexers.get(&sym)
    }

    pub(crate) fn discards(&self) -> &[LexPattern] {
        &self.discards
    }

    /// The start symbol, always the entity compiled for the root rule.
    pub fn start_symbol(&self) -> Symbol {
        self.start
    }

    /// The user-facing name of a symbol, if it came from a named rule or a
    /// labeled atom. Anonymous intermediate symbols return `None`.
    pub(crate) fn named_of(&self, sym: Symbol) -> Option<&str> {
        self.named.get(&sym).map(String::as_str)
    }

    /// Display name of an engine symbol.
    pub fn name_of(&self, sym: Symbol) -> &str {
        self.names.get(&sym).map(String::as_str).unwrap_or("?")
    }

    /// The engine symbol compiled for an atom, if the atom was reachable
    /// from the start rule.
    pub fn symbol_for(&self, atom: AtomId) -> Option<Symbol> {
        self.atom_to_sym.get(&atom).copied()
    }

    /// The atom a symbol was compiled from.
    pub fn atom_for(&self, sym: Symbol) -> Option<AtomId> {
        self.sym_to_atom.get(&sym).copied()
    }

    /// One line per symbol, in symbol order.
    pub fn describe_symbols(&self) -> Vec<String> {
        (0..self.engine.symbol_count())
            .map(|i| {
                let sym = Symbol(i);
                format!("S{}: {}", i, self.name_of(sym))
            })
            .collect()
    }

    /// One line per rule, in rule order.
    pub fn describe_rules(&self) -> Vec<String> {
        self.engine
            .rules()
            .map(|(_, rule)| match rule {
                engine::Rule::Bnf { lhs, rhs, rank } => {
                    let rhs_names = rhs
                        .iter()
                        .map(|s| self.name_of(*s))
                        .collect::<Vec<_>>()
                        .join(" ");
                    if *rank != 0 {
                        format!("{} ::= {} rank {}", self.name_of(*lhs), rhs_names, rank)
                    } else {
                        format!("{} ::= {}", self.name_of(*lhs), rhs_names)
                    }
                }
                engine::Rule::Sequence {
                    lhs,
                    item,
                    separator,
                    min,
                    proper,
                } => {
                    let mut line = format!(
                        "{} ::= {}{{{},}}",
                        self.name_of(*lhs),
                        self.name_of(*item),
                        min
                    );
                    if let Some(sep) = separator {
                        line.push_str(&format!(" sep {}", self.name_of(*sep)));
                        if !proper {
                            line.push_str(" trailing");
                        }
                    }
                    line
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_atoms_compile_to_one_symbol() {
        let mut b = GrammarBuilder::new();
        b.rule("pair", |b| {
            let a = b.str("a")?;
            Ok(b.seq(&[a, a]))
        });
        let g = b.compile("pair").unwrap();
        // pair entity, sequence, and one shared terminal
        assert_eq!(g.engine().symbol_count(), 3);
        assert_eq!(g.name_of(g.start_symbol()), "pair");
        let root_atom = g.atom_for(g.start_symbol()).unwrap();
        assert_eq!(g.symbol_for(root_atom), Some(g.start_symbol()));
    }

    #[test]
    fn undefined_rule_is_reported_by_name() {
        let mut b = GrammarBuilder::new();
        b.rule("top", |b| Ok(b.call("missing")));
        let err = b.compile("top").unwrap_err();
        assert_eq!(
            err,
            GrammarError::UndefinedRule {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn recursive_rule_compiles() {
        let mut b = GrammarBuilder::new();
        b.rule("expr", |b| {
            let open = b.str("(")?;
            let close = b.str(")")?;
            let inner = b.call("expr");
            let nested = b.seq(&[open, inner, close]);
            let leaf = b.str("x")?;
            Ok(b.alt(nested, leaf))
        });
        let g = b.compile("expr").unwrap();
        assert!(g.engine().is_precomputed());
    }

    #[test]
    fn fallback_priorities_become_ranks() {
        let mut b = GrammarBuilder::new();
        b.rule("v", |b| {
            let a = b.str("a")?;
            let bb = b.str("b")?;
            let c = b.str("c")?;
            let preferred = b.alt(a, bb);
            Ok(b.fallback(preferred, c))
        });
        let g = b.compile("v").unwrap();
        let ranks: Vec<i32> = g
            .engine()
            .rules()
            .filter_map(|(_, r)| match r {
                engine::Rule::Bnf { rhs, rank, .. } if rhs.len() == 1 => Some(*rank),
                _ => None,
            })
            .collect();
        // entity wrapper rule plus three branches, top two outranking the
        // fallback
        assert!(ranks.contains(&1));
        assert!(ranks.contains(&0));
    }

    #[test]
    fn alt_splices_a_ranked_right_operand() {
        let mut b = GrammarBuilder::new();
        b.rule("v", |b| {
            let x = b.str("x")?;
            let digits = b.lex("[0-9]+")?;
            let letters = b.lex("[a-z]+")?;
            let ranked = b.fallback(digits, letters);
            Ok(b.alt(x, ranked))
        });
        let g = b.compile("v").unwrap();
        // entity, merged alternative, and three terminals; a nested
        // alternative would add a sixth symbol
        assert_eq!(g.engine().symbol_count(), 5);
        let ranks: Vec<i32> = g
            .engine()
            .rules()
            .filter_map(|(_, r)| match r {
                engine::Rule::Bnf { lhs, rank, .. } if g.name_of(*lhs) != "v" => Some(*rank),
                _ => None,
            })
            .collect();
        // "x" joins the ladder at the fallback's top level
        assert_eq!(ranks, vec![1, 1, 0]);
    }

    #[test]
    fn late_re_registration_does_not_rebind() {
        let mut b = GrammarBuilder::new();
        b.rule("word", |b| b.str("a"));
        b.rule("top", |b| {
            b.rule("word", |b| b.str("b"));
            Ok(b.call("word"))
        });
        let g = b.compile("top").unwrap();
        let symbols = g.describe_symbols();
        assert!(symbols.iter().any(|s| s.contains("\"a\"")));
        assert!(!symbols.iter().any(|s| s.contains("\"b\"")));
    }

    #[test]
    fn bad_priority_sequence_is_rejected() {
        let mut b = GrammarBuilder::new();
        b.rule("v", |b| {
            let a = b.str("a")?;
            let c = b.str("c")?;
            // gap of two preference levels
            Ok(b.alternative(&[(a, 0), (c, -2)]))
        });
        let err = b.compile("v").unwrap_err();
        assert!(matches!(err, GrammarError::PrioritySequence { .. }));
    }

    #[test]
    fn discard_must_be_terminal() {
        let mut b = GrammarBuilder::new();
        b.rule("top", |b| b.str("a"));
        let x = b.str("x").unwrap();
        let y = b.str("y").unwrap();
        let s = b.seq(&[x, y]);
        b.discard(s);
        let err = b.compile("top").unwrap_err();
        assert!(matches!(err, GrammarError::Discard { .. }));
    }

    #[test]
    fn describe_rules_names_branches() {
        let mut b = GrammarBuilder::new();
        b.rule("bool", |b| {
            let t = b.str("true")?;
            let f = b.str("false")?;
            Ok(b.alt(t, f))
        });
        let g = b.compile("bool").unwrap();
        let rules = g.describe_rules();
        assert!(rules.iter().any(|r| r.contains("\"true\"")));
        assert!(rules.iter().any(|r| r.starts_with("bool ::=")));
    }
}
