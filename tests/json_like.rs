//! A JSON-flavored grammar exercising recursion, separated repetition,
//! discards, and custom semantic actions over one shared grammar.

use earlex::grammar::{Grammar, GrammarBuilder};
use earlex::parser::{Parser, Value};
use once_cell::sync::Lazy;

static GRAMMAR: Lazy<Grammar> = Lazy::new(|| {
    let mut b = GrammarBuilder::new();
    b.rule("value", |b| {
        let t = b.str("true")?;
        let f = b.str("false")?;
        let n = b.str("null")?;
        let number = b.lex("-?[0-9]+")?;
        let string = b.lex("\"[^\"]*\"")?;
        let array = b.call("array");
        Ok(b.any_of(&[t, f, n, number, string, array]))
    });
    b.rule("array", |b| {
        let open = b.str("[")?;
        let close = b.str("]")?;
        let comma = b.str(",")?;
        let value = b.call("value");
        let elements = b.repeat_sep(value, comma, 0, true);
        let ws = b.lex("[ \\t\\n]+")?;
        b.discard(ws);
        Ok(b.seq(&[open, elements, close]))
    });
    b.compile("value").expect("grammar compiles")
});

/// Parser that drops punctuation and nulled element lists.
fn bare_parser() -> Parser<'static, Value> {
    Parser::with_actions(
        &GRAMMAR,
        |_, text| match text {
            "[" | "]" | "," => None,
            _ => Some(Value::Token(text.to_string())),
        },
        |name, children| Value::Node {
            name: name.to_string(),
            children,
        },
        |_| None,
    )
}

fn leaf_tokens(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::Token(t) => out.push(t.clone()),
        Value::Node { children, .. } => {
            for c in children {
                leaf_tokens(c, out);
            }
        }
        Value::Null => {}
    }
}

fn count_nodes(v: &Value, name: &str) -> usize {
    match v {
        Value::Node {
            name: n, children, ..
        } => {
            let own = usize::from(n == name);
            own + children.iter().map(|c| count_nodes(c, name)).sum::<usize>()
        }
        _ => 0,
    }
}

#[test]
fn scalar_values_parse() {
    let v = GRAMMAR.parse("true").unwrap();
    assert_eq!(
        v,
        Value::Node {
            name: "value".to_string(),
            children: vec![Value::Token("true".to_string())],
        }
    );
}

#[test]
fn mixed_array_keeps_leaf_order() {
    let v = bare_parser().parse("[1,\"a\",[],true]").unwrap();
    let mut leaves = Vec::new();
    leaf_tokens(&v, &mut leaves);
    assert_eq!(leaves, vec!["1", "\"a\"", "true"]);
    assert_eq!(count_nodes(&v, "array"), 2);
}

#[test]
fn whitespace_is_transparent_inside_arrays() {
    let parser = bare_parser();
    let tight = parser.parse("[1,[2,3],4]").unwrap();
    let spaced = parser.parse("[ 1 ,\t[ 2 , 3 ] ,\n4 ]").unwrap();
    assert_eq!(tight, spaced);
}

#[test]
fn empty_array_has_no_children() {
    let v = bare_parser().parse("[]").unwrap();
    assert_eq!(
        v,
        Value::Node {
            name: "value".to_string(),
            children: vec![Value::Node {
                name: "array".to_string(),
                children: vec![],
            }],
        }
    );
}

#[test]
fn deep_nesting_round_trips() {
    let v = bare_parser().parse("[[[[\"x\"]]]]").unwrap();
    assert_eq!(count_nodes(&v, "array"), 4);
    let mut leaves = Vec::new();
    leaf_tokens(&v, &mut leaves);
    assert_eq!(leaves, vec!["\"x\""]);
}

#[test]
fn default_values_serialize() {
    let v = GRAMMAR.parse("[1,2]").unwrap();
    let json = serde_json::to_value(&v).unwrap();
    // enum variants serialize externally tagged
    assert!(json.to_string().contains("Token"));
}

#[test]
fn grammar_is_shared_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let input = format!("[{}]", i);
                GRAMMAR.parse(&input).unwrap()
            })
        })
        .collect();
    for h in handles {
        let v = h.join().unwrap();
        assert!(matches!(v, Value::Node { .. }));
    }
}
