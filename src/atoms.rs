//! Combinator atoms
//!
//! An atom is one node in the grammar-expression tree: a terminal pattern, a
//! sequence, a prioritized alternative, a native repetition, an optional
//! element, or a named (possibly recursive) rule reference. Atoms live in an
//! arena owned by the grammar builder and are addressed by `AtomId`; two
//! atoms are the same atom exactly when their ids are equal, so symbol
//! deduplication is index equality rather than structural comparison.
//!
//! Atoms are immutable once constructed. Construction happens through the
//! builder methods in [`crate::grammar::GrammarBuilder`]; this module holds
//! the storage, terminal matching, and display rendering.

use crate::error::GrammarError;
use regex::Regex;

/// Stable index of an atom inside its builder's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomId(pub(crate) usize);

/// A compiled terminal pattern with anchored matching.
#[derive(Debug, Clone)]
pub(crate) struct LexPattern {
    regex: Regex,
    display: String,
}

impl LexPattern {
    /// Compile a regex pattern, anchored to match at the probe position.
    pub(crate) fn new(pattern: &str) -> Result<Self, GrammarError> {
        let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
            GrammarError::Pattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(LexPattern {
            regex,
            display: format!("/{}/", pattern),
        })
    }

    /// A pattern matching `text` verbatim.
    pub(crate) fn verbatim(text: &str) -> Result<Self, GrammarError> {
        let mut lp = Self::new(&regex::escape(text))?;
        lp.display = format!("{:?}", text);
        Ok(lp)
    }

    /// A pattern matching `text` verbatim, case-insensitively.
    pub(crate) fn verbatim_ci(text: &str) -> Result<Self, GrammarError> {
        let mut lp = Self::new(&format!("(?i:{})", regex::escape(text)))?;
        lp.display = format!("{:?}i", text);
        Ok(lp)
    }

    /// Match at exactly `at`; returns the matched length in bytes. A probe
    /// position that is not a character boundary never matches.
    pub(crate) fn match_at(&self, input: &str, at: usize) -> Option<usize> {
        if at > input.len() || !input.is_char_boundary(at) {
            return None;
        }
        self.regex.find(&input[at..]).map(|m| m.end())
    }

    pub(crate) fn display(&self) -> &str {
        &self.display
    }
}

/// The closed set of atom variants.
#[derive(Debug, Clone)]
pub(crate) enum AtomKind {
    /// Terminal pattern; a symbol with no productions.
    Lex(LexPattern),
    /// Ordered children; one production.
    Sequence { children: Vec<AtomId> },
    /// Children with relative priorities; one production per child.
    Alternative { children: Vec<(AtomId, i32)> },
    /// Native repetition of `item`, optionally separated.
    Repetition {
        item: AtomId,
        separator: Option<AtomId>,
        min: u32,
        proper: bool,
    },
    /// Present-or-absent child.
    Maybe { child: AtomId },
    /// Named reference to a deferred rule definition.
    Entity { name: String },
}

/// One arena slot: a variant plus an optional display label.
#[derive(Debug, Clone)]
pub(crate) struct AtomNode {
    pub(crate) kind: AtomKind,
    pub(crate) label: Option<String>,
}

impl AtomNode {
    pub(crate) fn new(kind: AtomKind) -> Self {
        AtomNode { kind, label: None }
    }
}

/// Render an atom for diagnostics and rule pretty-printing. Labels win over
/// structure; entity references stop the recursion, so cycles are safe.
pub(crate) fn display_atom(nodes: &[AtomNode], id: AtomId) -> String {
    let node = match nodes.get(id.0) {
        Some(n) => n,
        None => return format!("atom#{}", id.0),
    };
    if let Some(label) = &node.label {
        return label.clone();
    }
    match &node.kind {
        AtomKind::Lex(lp) => lp.display().to_string(),
        AtomKind::Sequence { children } => children
            .iter()
            .map(|c| display_atom(nodes, *c))
            .collect::<Vec<_>>()
            .join(" "),
        AtomKind::Alternative { children } => {
            let mut out = String::new();
            let mut prev: Option<i32> = None;
            for (child, pri) in children {
                match prev {
                    None => {}
                    Some(p) if p == *pri => out.push_str(" | "),
                    _ => out.push_str(" / "),
                }
                out.push_str(&display_atom(nodes, *child));
                prev = Some(*pri);
            }
            out
        }
        AtomKind::Repetition {
            item,
            separator,
            min,
            ..
        } => {
            let base = format!("{}{{{},}}", display_atom(nodes, *item), min);
            match separator {
                Some(sep) => format!("{} sep {}", base, display_atom(nodes, *sep)),
                None => base,
            }
        }
        AtomKind::Maybe { child } => format!("{}?", display_atom(nodes, *child)),
        AtomKind::Entity { name } => name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_anchored() {
        let lp = LexPattern::new("[0-9]+").unwrap();
        assert_eq!(lp.match_at("a12b", 1), Some(2));
        assert_eq!(lp.match_at("a12b", 0), None);
        assert_eq!(lp.match_at("a12b", 4), None);
        assert_eq!(lp.match_at("a12b", 5), None);
    }

    #[test]
    fn verbatim_escapes_metacharacters() {
        let lp = LexPattern::verbatim("a.b").unwrap();
        assert_eq!(lp.match_at("a.b", 0), Some(3));
        assert_eq!(lp.match_at("axb", 0), None);
    }

    #[test]
    fn case_insensitive_verbatim() {
        let lp = LexPattern::verbatim_ci("class").unwrap();
        assert_eq!(lp.match_at("Class", 0), Some(5));
        assert_eq!(lp.match_at("CLASS", 0), Some(5));
    }

    #[test]
    fn bad_pattern_reports_the_pattern() {
        let err = LexPattern::new("(").unwrap_err();
        match err {
            GrammarError::Pattern { pattern, .. } => assert_eq!(pattern, "("),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn display_shows_alternative_preference() {
        let nodes = vec![
            AtomNode::new(AtomKind::Lex(LexPattern::verbatim("a").unwrap())),
            AtomNode::new(AtomKind::Lex(LexPattern::verbatim("b").unwrap())),
            AtomNode::new(AtomKind::Lex(LexPattern::verbatim("c").unwrap())),
            AtomNode::new(AtomKind::Alternative {
                children: vec![(AtomId(0), 0), (AtomId(1), 0), (AtomId(2), -1)],
            }),
        ];
        assert_eq!(display_atom(&nodes, AtomId(3)), r#""a" | "b" / "c""#);
    }
}
