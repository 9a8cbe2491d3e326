//! Grammar construction and compilation behavior
//!
//! Covers rule registration, recursive references, priority validation, and
//! the stability of compiling the same structure twice.

use earlex::error::GrammarError;
use earlex::grammar::{Grammar, GrammarBuilder};

fn list_grammar() -> Result<Grammar, GrammarError> {
    let mut b = GrammarBuilder::new();
    b.rule("list", |b| {
        let open = b.str("(")?;
        let close = b.str(")")?;
        let word = b.lex("[a-z]+")?;
        let item = b.call("item");
        let comma = b.str(",")?;
        let items = b.repeat_sep(item, comma, 0, true);
        b.rule("item", move |b| {
            let nested = b.call("list");
            Ok(b.alt(word, nested))
        });
        Ok(b.seq(&[open, items, close]))
    });
    b.compile("list")
}

#[test]
fn mutually_recursive_rules_compile() {
    let g = list_grammar().unwrap();
    assert!(g.engine().is_precomputed());
}

#[test]
fn compilation_is_deterministic() {
    let a = list_grammar().unwrap();
    let b = list_grammar().unwrap();
    assert_eq!(a.engine().symbol_count(), b.engine().symbol_count());
    assert_eq!(a.engine().rule_count(), b.engine().rule_count());
    assert_eq!(a.describe_rules(), b.describe_rules());
}

#[test]
fn rule_listing_covers_every_rule() {
    let g = list_grammar().unwrap();
    let listing = g.describe_rules();
    assert_eq!(listing.len(), g.engine().rule_count() as usize);
    assert!(listing.iter().any(|l| l.starts_with("list ::=")));
    assert!(listing.iter().any(|l| l.contains("{0,}")));
}

#[test]
fn symbols_outside_the_start_rule_are_not_compiled() {
    let mut b = GrammarBuilder::new();
    b.rule("used", |b| b.str("a"));
    b.rule("unused", |b| b.str("zzzz"));
    let g = b.compile("used").unwrap();
    // entity plus its terminal only
    assert_eq!(g.engine().symbol_count(), 2);
}

#[test]
fn missing_root_rule_fails_by_name() {
    let b = GrammarBuilder::new();
    let err = b.compile("nowhere").unwrap_err();
    assert_eq!(
        err,
        GrammarError::UndefinedRule {
            name: "nowhere".to_string()
        }
    );
}

#[test]
fn repeating_an_optional_item_is_rejected_at_compile() {
    let mut b = GrammarBuilder::new();
    b.rule("bad", |b| {
        let a = b.str("a")?;
        let opt = b.maybe(a);
        Ok(b.repeat(opt, 1))
    });
    let err = b.compile("bad").unwrap_err();
    assert!(matches!(err, GrammarError::Precompute { .. }));
}

#[test]
fn label_names_the_symbol() {
    let mut b = GrammarBuilder::new();
    b.rule("top", |b| {
        let a = b.str("a")?;
        let bb = b.str("b")?;
        let pair = b.seq(&[a, bb]);
        Ok(b.label(pair, "pair"))
    });
    let g = b.compile("top").unwrap();
    assert!(g.describe_rules().iter().any(|l| l.starts_with("pair ::=")));
}

mod priorities {
    use super::*;
    use proptest::prelude::*;

    const LETTERS: &[&str] = &["a", "b", "c", "d", "e", "f"];

    /// Build an alternative over distinct single-letter terminals with the
    /// given explicit priorities, then compile it.
    fn compile_with_priorities(priorities: Vec<i32>) -> Result<Grammar, GrammarError> {
        let mut b = GrammarBuilder::new();
        b.rule("choice", move |b| {
            let mut choices = Vec::new();
            for (i, pri) in priorities.iter().enumerate() {
                let atom = b.str(LETTERS[i])?;
                choices.push((atom, *pri));
            }
            Ok(b.alternative(&choices))
        });
        b.compile("choice")
    }

    proptest! {
        #[test]
        fn contiguous_non_increasing_priorities_compile(
            deltas in prop::collection::vec(0..=1i32, 0..5)
        ) {
            let mut priorities = vec![0];
            for d in deltas {
                let last = *priorities.last().unwrap();
                priorities.push(last - d);
            }
            prop_assert!(compile_with_priorities(priorities).is_ok());
        }

        #[test]
        fn a_preference_gap_is_rejected(
            prefix in prop::collection::vec(0..=1i32, 0..4),
            gap in 2..=4i32
        ) {
            let mut priorities = vec![0];
            for d in prefix {
                let last = *priorities.last().unwrap();
                priorities.push(last - d);
            }
            let last = *priorities.last().unwrap();
            priorities.push(last - gap);
            let err = compile_with_priorities(priorities).unwrap_err();
            let is_priority_error = matches!(err, GrammarError::PrioritySequence { .. });
            prop_assert!(is_priority_error, "unexpected error: {:?}", err);
        }
    }
}
