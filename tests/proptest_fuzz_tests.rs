//! Property-based fuzzing for the Rill lexer, parser and evaluator
//!
//! Arbitrary input must come back as `Ok` or `Err`, never a panic, and
//! well-formed programs must evaluate the same way every time.

use proptest::prelude::*;
use rill::{
    execute, parse, parse_with_recovery, tokenize, RillValue, RuntimeContext, RuntimeOptions,
};

fn run(source: &str) -> Option<rill::Result<RillValue>> {
    let script = parse(source).ok()?;
    let ctx = RuntimeContext::new(RuntimeOptions::new()).ok()?;
    Some(tokio_test::block_on(execute(&script, &ctx)).map(|result| result.value))
}

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Random printable ASCII with line breaks
fn arbitrary_source_string() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[ -~\n\t]{0,300}").unwrap()
}

/// Sequences of real Rill tokens in random order
fn token_soup() -> impl Strategy<Value = String> {
    prop::collection::vec(rill_token(), 0..40).prop_map(|tokens| tokens.join(" "))
}

fn rill_token() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("->".to_string()),
        Just(":>".to_string()),
        Just("$".to_string()),
        Just("$@".to_string()),
        Just("@".to_string()),
        Just("?".to_string()),
        Just("!".to_string()),
        Just("(".to_string()),
        Just(")".to_string()),
        Just("[".to_string()),
        Just("]".to_string()),
        Just("{".to_string()),
        Just("}".to_string()),
        Just("|".to_string()),
        Just(",".to_string()),
        Just(":".to_string()),
        Just("\n".to_string()),
        Just("*<".to_string()),
        Just("/<".to_string()),
        Just(">".to_string()),
        Just("^".to_string()),
        Just("break".to_string()),
        Just("return".to_string()),
        Just("each".to_string()),
        Just("map".to_string()),
        Just("fold".to_string()),
        Just("filter".to_string()),
        Just(".upper".to_string()),
        Just(".len".to_string()),
        Just("log".to_string()),
        Just("+".to_string()),
        Just("*".to_string()),
        Just("==".to_string()),
        Just("&&".to_string()),
        (-1000i64..1000).prop_map(|n| n.to_string()),
        "[a-z]{1,6}".prop_map(|name| format!("${}", name)),
        "[a-z ]{0,10}".prop_map(|text| format!("\"{}\"", text)),
    ]
}

/// Arithmetic over small literals
fn arith_expr() -> impl Strategy<Value = String> {
    let leaf = (-50i64..50).prop_map(|n| n.to_string());
    leaf.prop_recursive(4, 32, 2, |inner| {
        (inner.clone(), prop::sample::select(vec!["+", "-", "*", "/", "%"]), inner)
            .prop_map(|(l, op, r)| format!("({} {} {})", l, op, r))
    })
}

/// Small pipelines over a list literal
fn pipeline_program() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(-20i64..20, 0..8),
        prop::sample::select(vec![
            "map { $ * 2 }",
            "filter { $ > 0 }",
            "fold(0) { $@ + $ }",
            "each { $ - 1 }",
            "@{ $ + 1 }",
            ".len",
            ".reverse",
        ]),
    )
        .prop_map(|(items, step)| {
            let items: Vec<String> = items.iter().map(|n| n.to_string()).collect();
            format!("[{}] -> {} -> $out\n$out", items.join(", "), step)
        })
}

// =============================================================================
// LEXER AND PARSER FUZZ TESTS
// =============================================================================

proptest! {
    /// The lexer never panics on arbitrary input
    #[test]
    fn lexer_never_panics(source in arbitrary_source_string()) {
        let _ = tokenize(&source);
    }

    /// The parser never panics on token-shaped input
    #[test]
    fn parser_never_panics_on_token_soup(source in token_soup()) {
        let _ = parse(&source);
    }

    /// Recovery mode never panics and yields one placeholder per failure
    #[test]
    fn recovery_always_produces_a_script(source in token_soup()) {
        let outcome = parse_with_recovery(&source);
        prop_assert_eq!(outcome.success, outcome.errors.is_empty());
        if outcome.success {
            prop_assert!(parse(&source).is_ok());
        }
    }

    /// Strict parsing agrees with itself
    #[test]
    fn parse_is_deterministic(source in token_soup()) {
        match (parse(&source), parse(&source)) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(a), Err(b)) => prop_assert_eq!(a.code(), b.code()),
            _ => prop_assert!(false, "parse results differ"),
        }
    }

    /// Nested groups parse without overflowing
    #[test]
    fn parser_handles_nesting(depth in 1usize..40) {
        let source = format!("{}1 + 1{}", "(".repeat(depth), ")".repeat(depth));
        prop_assert!(parse(&source).is_ok());
    }

    /// Unbalanced groups are errors, not panics
    #[test]
    fn parser_handles_unbalanced_parens(opens in 0usize..30, closes in 0usize..30) {
        let source = format!("{}1{}", "(".repeat(opens), ")".repeat(closes));
        let result = parse(&source);
        if opens != closes {
            prop_assert!(result.is_err());
        }
    }
}

// =============================================================================
// EVALUATOR FUZZ TESTS
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arithmetic evaluates to a number or a runtime error
    #[test]
    fn arithmetic_never_panics(source in arith_expr()) {
        match run(&source) {
            Some(Ok(value)) => prop_assert!(matches!(value, RillValue::Number(_))),
            Some(Err(err)) => prop_assert_eq!(err.code().as_str(), "RILL-R005"),
            None => prop_assert!(false, "arithmetic failed to parse: {}", source),
        }
    }

    /// Integer addition matches the host's arithmetic
    #[test]
    fn addition_matches_host(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        let value = run(&format!("{} + {}", a, b)).and_then(Result::ok);
        prop_assert_eq!(value, Some(RillValue::Number((a + b) as f64)));
    }

    /// Pipelines give the same result on every run
    #[test]
    fn evaluation_is_deterministic(source in pipeline_program()) {
        let first = run(&source).map(|r| r.map_err(|e| e.code()));
        let second = run(&source).map(|r| r.map_err(|e| e.code()));
        prop_assert_eq!(first, second);
    }

    /// Index dispatch either hits an element or reports out of bounds
    #[test]
    fn tuple_dispatch_bounds(
        elements in prop::collection::vec(-100i64..100, 1..10),
        index in -12i64..12
    ) {
        let items: Vec<String> = elements.iter().map(|n| n.to_string()).collect();
        let source = format!("{} -> [{}]", index, items.join(", "));
        let len = elements.len() as i64;
        match run(&source) {
            Some(Ok(value)) => {
                let i = if index < 0 { index + len } else { index };
                prop_assert_eq!(value, RillValue::Number(elements[i as usize] as f64));
            }
            Some(Err(err)) => {
                prop_assert_eq!(err.code().as_str(), "RILL-R006");
                prop_assert!(index >= len || index < -len);
            }
            None => prop_assert!(false, "dispatch failed to parse"),
        }
    }

    /// Strings of any content survive interpolation-free round trips
    #[test]
    fn string_literals_round_trip(text in "[a-zA-Z0-9 .,;:'_-]{0,40}") {
        let value = run(&format!("\"{}\"", text)).and_then(Result::ok);
        prop_assert_eq!(value, Some(RillValue::from(text.as_str())));
    }
}

// =============================================================================
// REGRESSIONS
// =============================================================================

#[test]
fn regression_empty_and_blank_input() {
    for source in ["", "   \n\t\r\n   ", "# one\n# two\n"] {
        let script = parse(source).unwrap();
        assert!(script.statements.is_empty(), "source: {:?}", source);
    }
}

#[test]
fn regression_null_bytes() {
    assert!(tokenize("1 \0 + 2").is_err());
}

#[test]
fn regression_very_long_number() {
    let source = format!("1 + {}", "9".repeat(400));
    let value = run(&source).and_then(Result::ok);
    assert!(matches!(value, Some(RillValue::Number(_))));
}

#[test]
fn regression_unterminated_interpolation() {
    assert!(tokenize("\"open {$x\"").is_err());
}
