//! End-to-end behaviour of the core language: pipes, loops, conditionals,
//! dispatch, closures, interpolation and error locations

use pretty_assertions::assert_eq;
use rill::{
    execute, host_fn, parse, ErrorCode, RillValue, RuntimeContext, RuntimeOptions,
};
use std::cell::RefCell;
use std::rc::Rc;

fn run_with(source: &str, options: RuntimeOptions) -> rill::Result<RillValue> {
    let script = parse(source)?;
    let ctx = RuntimeContext::new(options)?;
    Ok(tokio_test::block_on(execute(&script, &ctx))?.value)
}

fn run(source: &str) -> rill::Result<RillValue> {
    run_with(source, RuntimeOptions::new())
}

fn strings(items: &[&str]) -> RillValue {
    RillValue::from(items.iter().map(|s| RillValue::from(*s)).collect::<Vec<_>>())
}

fn numbers(items: &[f64]) -> RillValue {
    RillValue::from(items.iter().map(|n| RillValue::Number(*n)).collect::<Vec<_>>())
}

/// Options with `log` output captured into the returned buffer
fn logging_options() -> (RuntimeOptions, Rc<RefCell<Vec<RillValue>>>) {
    let logged = Rc::new(RefCell::new(Vec::new()));
    let sink = logged.clone();
    let options = RuntimeOptions::new().on_log(move |value| sink.borrow_mut().push(value.clone()));
    (options, logged)
}

// ====================
// Pipes
// ====================

#[test]
fn test_pipe_into_host_function() {
    let greet = host_fn(|args, _| {
        Ok(RillValue::from(format!("Hello, {}!", args[0].as_str()?)))
    });
    let result = run_with(
        r#""World" -> greet"#,
        RuntimeOptions::new().with_function("greet", greet),
    )
    .unwrap();
    assert_eq!(result, RillValue::from("Hello, World!"));
}

#[test]
fn test_pipe_threads_through_methods() {
    let result = run(r#""  Rill  " -> .trim -> .upper"#).unwrap();
    assert_eq!(result, RillValue::from("RILL"));
}

#[test]
fn test_statements_do_not_share_pipe_value() {
    let err = run("1 -> $x\n$").unwrap_err();
    assert_eq!(err.code(), ErrorCode::UndefinedVariable);
}

#[test]
fn test_last_statement_is_the_result() {
    assert_eq!(run("1 -> $a\n$a + 41").unwrap(), RillValue::Number(42.0));
}

// ====================
// Loops
// ====================

#[test]
fn test_for_each_logs_items_in_order() {
    let (options, logged) = logging_options();
    let options = options.with_variable("items", strings(&["apple", "banana", "cherry"]));
    run_with("$items -> @{ $ -> log }", options).unwrap();
    assert_eq!(*logged.borrow(), vec![
        RillValue::from("apple"),
        RillValue::from("banana"),
        RillValue::from("cherry"),
    ]);
}

#[test]
fn test_while_loop_doubles_until_condition_fails() {
    let (options, logged) = logging_options();
    let double = host_fn(|args, _| Ok(RillValue::Number(args[0].as_number()? * 2.0)));
    let script = parse("1 -> $x\n($x < 100) @ { $x -> log  $x -> double -> $x }").unwrap();
    let ctx = RuntimeContext::new(options.with_function("double", double)).unwrap();
    let result = tokio_test::block_on(execute(&script, &ctx)).unwrap();

    let expected: Vec<RillValue> = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]
        .iter()
        .map(|n| RillValue::Number(*n))
        .collect();
    assert_eq!(*logged.borrow(), expected);
    assert_eq!(result.variables["x"], RillValue::Number(128.0));
}

#[test]
fn test_for_each_collects_body_results() {
    assert_eq!(run("[1, 2, 3] -> @{ $ * $ }").unwrap(), numbers(&[1.0, 4.0, 9.0]));
}

#[test]
fn test_do_while_runs_body_before_testing() {
    assert_eq!(run("5 -> @{ $ + 1 } ? ($ < 3)").unwrap(), RillValue::Number(6.0));
}

#[test]
fn test_break_returns_partial_results() {
    let result = run("[1, 2, 3, 4] -> @{ ($ == 3) ? ($ -> break) ! ($ * 10) }").unwrap();
    assert_eq!(result, numbers(&[10.0, 20.0]));
}

#[test]
fn test_break_value_ends_do_while() {
    let result = run("1 -> @{ ($ > 5) ? ($ + 1000 -> break) ! ($ * 2) } ? ($ < 100)").unwrap();
    assert_eq!(result, RillValue::Number(1008.0));
}

#[test]
fn test_loop_limit_annotation() {
    let err = run("^(limit: 3)\n[1, 2, 3, 4] -> @{ $ }").unwrap_err();
    assert_eq!(err.code(), ErrorCode::RuntimeLimitExceeded);
    assert!(run("^(limit: 4)\n[1, 2, 3, 4] -> @{ $ }").is_ok());
}

#[test]
fn test_loop_over_bool_that_never_ends_hits_limit() {
    let err = run("^(limit: 50)\ntrue -> @{ $ }").unwrap_err();
    assert_eq!(err.code(), ErrorCode::RuntimeLimitExceeded);
}

// ====================
// Collections
// ====================

#[test]
fn test_each_with_accumulator_builds_running_list() {
    assert_eq!(run("[1, 2, 3] -> each(0) { $@ + $ }").unwrap(), numbers(&[1.0, 3.0, 6.0]));
}

#[test]
fn test_each_without_accumulator_collects_results() {
    assert_eq!(run("[1, 2, 3] -> each { $ * 2 }").unwrap(), numbers(&[2.0, 4.0, 6.0]));
}

#[test]
fn test_closure_default_supplies_accumulator() {
    assert_eq!(
        run("[1, 2, 3] -> each |x, total = 0| ($total + $x)").unwrap(),
        numbers(&[1.0, 3.0, 6.0])
    );
    assert_eq!(
        run("[1, 2, 3] -> fold |x, total = 10| ($total + $x)").unwrap(),
        RillValue::Number(16.0)
    );
}

#[test]
fn test_accumulator_default_uses_defining_scope() {
    let source = "10 -> $start
|x, acc = $start| ($acc + $x) -> $sum
|start| ([1, 2] -> fold $sum) -> $run
$run(100)";
    assert_eq!(run(source).unwrap(), RillValue::Number(13.0));
}

#[test]
fn test_fold_returns_final_accumulator() {
    assert_eq!(run("[1, 2, 3, 4] -> fold(1) { $@ * $ }").unwrap(), RillValue::Number(24.0));
    assert_eq!(run("[] -> fold(7) { $@ + $ }").unwrap(), RillValue::Number(7.0));
}

#[test]
fn test_fold_requires_accumulator() {
    let err = run("[1, 2] -> fold { $ }").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArguments);
}

#[test]
fn test_filter_keeps_truthy_in_order() {
    assert_eq!(
        run("[3, -1, 4, 0, 5] -> filter { $ > 0 }").unwrap(),
        numbers(&[3.0, 4.0, 5.0])
    );
    assert_eq!(
        run(r#"["a", "", "b"] -> filter { $ }"#).unwrap(),
        strings(&["a", "b"])
    );
}

#[test]
fn test_break_in_collections_returns_partial_results() {
    let body = "{ ($ == 3) ? ($ -> break) ! ($ * 2) }";
    assert_eq!(
        run(&format!("[1, 2, 3, 4] -> each {}", body)).unwrap(),
        numbers(&[2.0, 4.0])
    );
    assert_eq!(
        run(&format!("[1, 2, 3, 4] -> map {}", body)).unwrap(),
        numbers(&[2.0, 4.0])
    );
    assert_eq!(
        run("[1, 2, 3, 4] -> fold(0) { ($ == 3) ? ($ -> break) ! ($@ + $) }").unwrap(),
        RillValue::Number(3.0)
    );
}

#[test]
fn test_collections_over_strings_and_dicts() {
    assert_eq!(run(r#""abc" -> map { $ -> .upper }"#).unwrap(), strings(&["A", "B", "C"]));
    assert_eq!(
        run(r#"[a: 1, b: 2] -> map { "{$.key}={$.value}" }"#).unwrap(),
        strings(&["a=1", "b=2"])
    );
    assert_eq!(
        run("[a: 1, b: 2, c: 3] -> filter { $.value > 1 } -> map { $.key }").unwrap(),
        strings(&["b", "c"])
    );
}

#[test]
fn test_collection_iteration_limit() {
    let err = run("^(limit: 2)\n[1, 2, 3] -> map { $ }").unwrap_err();
    assert_eq!(err.code(), ErrorCode::RuntimeLimitExceeded);
    assert_eq!(err.context().unwrap()["limit"], 2);
    assert!(run("^(limit: 3)\n[1, 2, 3] -> map { $ }").is_ok());
}

// ====================
// Conditionals
// ====================

#[test]
fn test_conditional_on_method_result() {
    let source = |input: &str| format!(r#""{}" -> .empty ? "was empty" ! "was not empty""#, input);
    assert_eq!(run(&source("")).unwrap(), RillValue::from("was empty"));
    assert_eq!(run(&source("hello")).unwrap(), RillValue::from("was not empty"));
}

#[test]
fn test_else_if_chain() {
    let source = |n: i64| format!(r#"{} -> ($ > 10) ? "big" ! ($ > 5) ? "medium" ! "small""#, n);
    assert_eq!(run(&source(20)).unwrap(), RillValue::from("big"));
    assert_eq!(run(&source(7)).unwrap(), RillValue::from("medium"));
    assert_eq!(run(&source(1)).unwrap(), RillValue::from("small"));
}

#[test]
fn test_conditional_without_else_passes_value_through() {
    assert_eq!(run(r#"3 -> ($ > 5) ? "big""#).unwrap(), RillValue::Number(3.0));
}

#[test]
fn test_conditional_requires_bool() {
    let err = run(r#"3 -> $ ? "yes" ! "no""#).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TypeMismatch);
}

// ====================
// Dispatch
// ====================

#[test]
fn test_dict_dispatch_is_type_aware() {
    let table = r#"[1: "number key", "1": "string key"]"#;
    assert_eq!(
        run(&format!("1 -> {}", table)).unwrap(),
        RillValue::from("number key")
    );
    assert_eq!(
        run(&format!(r#""1" -> {}"#, table)).unwrap(),
        RillValue::from("string key")
    );
}

#[test]
fn test_dict_dispatch_default_and_missing_key() {
    let result = run(r#""x" -> [a: 1, default: 0]"#).unwrap();
    assert_eq!(result, RillValue::Number(0.0));

    let err = run(r#""x" -> [a: 1, b: 2]"#).unwrap_err();
    assert_eq!(err.code(), ErrorCode::KeyNotFound);
}

#[test]
fn test_dict_dispatch_tuple_keys_and_closures() {
    let source = r#""GET" -> [["GET", "HEAD"]: |m| "read {$m}", POST: "write"]"#;
    assert_eq!(run(source).unwrap(), RillValue::from("read GET"));
}

#[test]
fn test_tuple_index_dispatch() {
    assert_eq!(run(r#"1 -> ["a", "b", "c"]"#).unwrap(), RillValue::from("b"));
    assert_eq!(run(r#"-1 -> ["a", "b", "c"]"#).unwrap(), RillValue::from("c"));
    let err = run(r#"3 -> ["a", "b", "c"]"#).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IndexOutOfBounds);
}

// ====================
// Closures
// ====================

#[test]
fn test_closure_late_binding() {
    let result = run("1 -> $x  |   | ($x) :> $f\n2 -> $x\n$f()").unwrap();
    assert_eq!(result, RillValue::Number(2.0));
}

#[test]
fn test_closure_params_defaults_and_types() {
    assert_eq!(
        run("|a, b = 10| ($a + $b) -> $add\n$add(1)").unwrap(),
        RillValue::Number(11.0)
    );
    let err = run("|a: number| ($a) -> $f\n$f(\"x\")").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArguments);
    let err = run("|a| ($a) -> $f\n$f(1, 2)").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArguments);
}

#[test]
fn test_return_ends_closure_call() {
    let source = "|n| { ($n > 0) ? (\"positive\" -> return)\n\"not positive\" } -> $sign\n$sign(5)";
    assert_eq!(run(source).unwrap(), RillValue::from("positive"));
}

#[test]
fn test_top_level_return_ends_script() {
    let (options, logged) = logging_options();
    let result = run_with("1 -> return\n2 -> log", options).unwrap();
    assert_eq!(result, RillValue::Number(1.0));
    assert!(logged.borrow().is_empty());
}

#[test]
fn test_zero_param_closure_in_pipe_reads_dollar() {
    assert_eq!(run("|| ($ * 2) -> $twice\n21 -> $twice()").unwrap(), RillValue::Number(42.0));
}

#[test]
fn test_dict_field_closures_bind_the_dict() {
    let source = r#"[name: "rill", shout: || ($.name -> .upper)] -> $obj
$obj.shout"#;
    assert_eq!(run(source).unwrap(), RillValue::from("RILL"));
}

#[test]
fn test_sequential_spread_threads_callables() {
    let source = "|x| ($x + 1) -> $inc\n|x| ($x * 2) -> $double\n3 -> @[$inc, $double]";
    assert_eq!(run(source).unwrap(), RillValue::Number(8.0));
}

// ====================
// Recursion
// ====================

const COUNTDOWN: &str = "|n| { ($n < 1) ? 0 ! ($n - 1 -> $f($)) } -> $f\n";

#[test]
fn test_recursive_closure_within_depth_limit() {
    assert_eq!(run(&format!("{}300 -> $f($)", COUNTDOWN)).unwrap(), RillValue::Number(0.0));
}

#[test]
fn test_runaway_recursion_hits_depth_limit() {
    let err = run(&format!("{}10000 -> $f($)", COUNTDOWN)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::RuntimeLimitExceeded);
    assert_eq!(err.context().unwrap()["limit"], 1000);
}

#[test]
fn test_depth_limit_is_configurable() {
    let shallow = || RuntimeOptions::new().with_max_eval_depth(50);
    assert!(run_with(&format!("{}40 -> $f($)", COUNTDOWN), shallow()).is_ok());
    let err = run_with(&format!("{}60 -> $f($)", COUNTDOWN), shallow()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::RuntimeLimitExceeded);
}

#[test]
fn test_depth_is_released_after_each_call() {
    let source = format!("{}900 -> $f($)\n900 -> $f($)", COUNTDOWN);
    assert_eq!(run(&source).unwrap(), RillValue::Number(0.0));
}

// ====================
// Strings
// ====================

#[test]
fn test_interpolation() {
    let options = RuntimeOptions::new().with_variable("name", "World");
    assert_eq!(
        run_with(r#""Hello, {$name}!""#, options).unwrap(),
        RillValue::from("Hello, World!")
    );
    assert_eq!(
        run(r#""Hello" -> { "Greeting: {$}" }"#).unwrap(),
        RillValue::from("Greeting: Hello")
    );
}

#[test]
fn test_interpolation_formats_numbers_and_lists() {
    assert_eq!(run(r#""{1 + 1} {[1, 2]}""#).unwrap(), RillValue::from("2 [1, 2]"));
}

#[test]
fn test_heredoc() {
    let source = "\"Rill\" -> $name\n<<EOT\nHi {$name}\nEOT";
    assert_eq!(run(source).unwrap(), RillValue::from("Hi Rill"));
}

// ====================
// Slices
// ====================

#[test]
fn test_slices() {
    assert_eq!(run("[1, 2, 3, 4] -> /<1:3>").unwrap(), numbers(&[2.0, 3.0]));
    assert_eq!(run(r#""rill" -> /<::-1>"#).unwrap(), RillValue::from("llir"));
}

#[test]
fn test_slice_with_huge_step() {
    assert_eq!(
        run("[1, 2, 3] -> /<1::10000000000000000000>").unwrap(),
        numbers(&[2.0])
    );
    assert_eq!(
        run("[1, 2, 3] -> /<::-10000000000000000000>").unwrap(),
        numbers(&[3.0])
    );
}

// ====================
// Errors
// ====================

#[test]
fn test_division_by_zero_points_at_operator() {
    let err = run("5 / 0").unwrap_err();
    assert_eq!(err.code(), ErrorCode::DivisionByZero);
    assert_eq!(err.code().as_str(), "RILL-R005");
    let location = err.location().unwrap();
    assert_eq!((location.line, location.column), (1, 3));
}

#[test]
fn test_undefined_names_carry_suggestions() {
    let err = run("1 -> $count\n$cuont").unwrap_err();
    assert_eq!(err.code(), ErrorCode::UndefinedVariable);
    assert_eq!(err.context().unwrap()["suggestion"], "$count");

    let err = run(r#""x" -> lgo"#).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UndefinedFunction);
    assert_eq!(err.context().unwrap()["suggestion"], "log");
}

#[test]
fn test_type_locked_variables() {
    let err = run("1 -> $x\n\"one\" -> $x").unwrap_err();
    assert_eq!(err.code(), ErrorCode::TypeMismatch);
    assert_eq!(run("1 -> $x\n2 -> $x\n$x").unwrap(), RillValue::Number(2.0));
}

#[test]
fn test_auto_exception_pattern() {
    let options = RuntimeOptions::new().with_auto_exception("^ERROR");
    let err = run_with(r#""ERROR: disk full""#, options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AutoException);
    assert_eq!(err.context().unwrap()["pattern"], "^ERROR");
}
