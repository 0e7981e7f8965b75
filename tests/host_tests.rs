//! Host integration: registered functions and methods, validation,
//! namespaced extensions, timeouts, abort and configuration

use pretty_assertions::assert_eq;
use rill::{
    async_host_fn, execute, host_fn, parse, prefix_functions, AbortSignal, DisposeHook,
    ErrorCode, Extension, HostFunctionDef, HostMethodDef, HostParam, RillType, RillValue,
    RuntimeConfig, RuntimeContext, RuntimeOptions,
};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

fn run_with(source: &str, options: RuntimeOptions) -> rill::Result<RillValue> {
    let script = parse(source)?;
    let ctx = RuntimeContext::new(options)?;
    Ok(tokio_test::block_on(execute(&script, &ctx))?.value)
}

fn add() -> HostFunctionDef {
    host_fn(|args, _| Ok(RillValue::Number(args[0].as_number()? + args[1].as_number()?)))
        .with_description("Add two numbers")
        .with_param(HostParam::typed("a", RillType::Number).with_description("Left"))
        .with_param(
            HostParam::typed("b", RillType::Number)
                .with_default(1i64)
                .with_description("Right"),
        )
        .returns(RillType::Number)
}

// ====================
// Functions
// ====================

#[test]
fn test_declared_params_fill_defaults() {
    let options = RuntimeOptions::new().with_function("add", add());
    assert_eq!(run_with("add(2, 3)", options.clone()).unwrap(), RillValue::Number(5.0));
    assert_eq!(run_with("41 -> add", options).unwrap(), RillValue::Number(42.0));
}

#[test]
fn test_declared_param_types_are_enforced() {
    let options = RuntimeOptions::new().with_function("add", add());
    let err = run_with(r#"add("2", 3)"#, options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArguments);
    assert_eq!(err.context().unwrap()["param"], "a");
}

#[test]
fn test_spread_dict_binds_by_name() {
    let options = RuntimeOptions::new().with_function("add", add());
    let result = run_with("[b: 10, a: 5] -> $args\nadd(*$args)", options).unwrap();
    assert_eq!(result, RillValue::Number(15.0));
}

#[test]
fn test_return_type_is_enforced() {
    let liar = host_fn(|_, _| Ok(RillValue::from("not a number"))).returns(RillType::Number);
    let err = run_with("liar()", RuntimeOptions::new().with_function("liar", liar)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TypeMismatch);
}

#[test]
fn test_host_errors_carry_call_stack() {
    let fail = host_fn(|_, _| Err(rill::Error::host("backend unavailable")));
    let options = RuntimeOptions::new().with_function("fail", fail);
    let err = run_with("|| (fail()) -> $wrapper\n$wrapper()", options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::HostError);
    assert!(err.context().unwrap().contains_key("callStack"));
}

#[test]
fn test_host_functions_override_builtins() {
    let quiet = host_fn(|_, _| Ok(RillValue::from("overridden")));
    let result = run_with(r#""x" -> log"#, RuntimeOptions::new().with_function("log", quiet)).unwrap();
    assert_eq!(result, RillValue::from("overridden"));
}

#[test]
fn test_builtin_functions_from_scripts() {
    let options = RuntimeOptions::new;
    assert_eq!(
        run_with("range(3) -> map { $ * 2 }", options()).unwrap(),
        RillValue::from(vec![
            RillValue::from(0i64),
            RillValue::from(2i64),
            RillValue::from(4i64)
        ])
    );
    assert_eq!(run_with("[1, 2] -> type", options()).unwrap(), RillValue::from("list"));
    assert_eq!(
        run_with(r#"[a: 1] -> json -> parse_json -> $.a"#, options()).unwrap(),
        RillValue::Number(1.0)
    );
}

// ====================
// Methods
// ====================

#[test]
fn test_builtin_methods_with_arguments() {
    let result = run_with(r#""a,b,c" -> .split(",") -> .join("-")"#, RuntimeOptions::new()).unwrap();
    assert_eq!(result, RillValue::from("a-b-c"));
}

#[test]
fn test_method_on_wrong_receiver() {
    let err = run_with("42 -> .upper", RuntimeOptions::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UndefinedMethod);
    assert_eq!(err.context().unwrap()["receiver"], "number");
}

#[test]
fn test_unknown_method_suggests_closest() {
    let err = run_with(r#""x" -> .uper"#, RuntimeOptions::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UndefinedMethod);
    assert_eq!(err.context().unwrap()["suggestion"], ".upper");
}

#[test]
fn test_registered_method() {
    let shout = HostMethodDef::new(
        host_fn(|args, _| Ok(RillValue::from(format!("{}!", args[0].as_str()?.to_uppercase()))))
            .with_description("Uppercase with emphasis"),
    )
    .on(&[RillType::String]);
    let options = RuntimeOptions::new().with_method("shout", shout);
    assert_eq!(run_with(r#""hey" -> .shout"#, options).unwrap(), RillValue::from("HEY!"));
}

#[test]
fn test_field_access_falls_back_to_methods() {
    let result = run_with("[\"a\", \"b\"] -> $xs\n$xs.len", RuntimeOptions::new()).unwrap();
    assert_eq!(result, RillValue::Number(2.0));
}

// ====================
// Registration
// ====================

#[test]
fn test_invalid_registrations_are_rejected() {
    let bad_name = RuntimeOptions::new().with_function("not valid", add());
    let err = RuntimeContext::new(bad_name).err().unwrap();
    assert_eq!(err.code(), ErrorCode::InvalidRegistration);

    let bad_default = RuntimeOptions::new().with_function(
        "f",
        host_fn(|_, _| Ok(RillValue::Null))
            .with_param(HostParam::typed("n", RillType::Number).with_default("one")),
    );
    let err = RuntimeContext::new(bad_default).err().unwrap();
    assert_eq!(err.code(), ErrorCode::InvalidRegistration);

    let bad_pattern = RuntimeOptions::new().with_auto_exception("(");
    let err = RuntimeContext::new(bad_pattern).err().unwrap();
    assert_eq!(err.code(), ErrorCode::InvalidRegistration);
}

#[test]
fn test_descriptions_required_on_request() {
    let undocumented = RuntimeOptions::new()
        .require_descriptions(true)
        .with_function("f", host_fn(|_, _| Ok(RillValue::Null)));
    let err = RuntimeContext::new(undocumented).err().unwrap();
    assert_eq!(err.code(), ErrorCode::InvalidRegistration);

    let documented = RuntimeOptions::new()
        .require_descriptions(true)
        .with_function("add", add());
    assert!(RuntimeContext::new(documented).is_ok());
}

// ====================
// Extensions
// ====================

#[test]
fn test_prefixed_extension_functions() {
    let disposed = Rc::new(Cell::new(false));
    let flag = disposed.clone();
    let extension = Extension::new()
        .with_function("read", host_fn(|args, _| Ok(RillValue::from(format!("contents of {}", args[0].as_str()?)))))
        .with_dispose(DisposeHook::Sync(Box::new(move || flag.set(true))));

    let prefixed = prefix_functions("fs", extension).unwrap();
    assert!(prefixed.functions.contains_key("fs::read"));

    let options = RuntimeOptions::new().with_functions(prefixed.functions);
    let result = run_with(r#""notes.txt" -> fs::read"#, options).unwrap();
    assert_eq!(result, RillValue::from("contents of notes.txt"));

    tokio_test::block_on(prefixed.dispose.unwrap().run());
    assert!(disposed.get());
}

#[test]
fn test_invalid_namespace() {
    let err = prefix_functions("bad ns", Extension::new()).err().unwrap();
    assert_eq!(err.code(), ErrorCode::InvalidRegistration);
}

// ====================
// Timeouts and abort
// ====================

#[tokio::test]
async fn test_slow_host_function_times_out() {
    let slow = async_host_fn(|_, _| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(RillValue::from("late"))
    });
    let options = RuntimeOptions::new()
        .with_function("slow", slow)
        .with_timeout(Duration::from_millis(20));
    let ctx = RuntimeContext::new(options).unwrap();
    let script = parse("slow()").unwrap();

    let err = execute(&script, &ctx).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert_eq!(err.context().unwrap()["function"], "slow");
}

#[tokio::test]
async fn test_async_host_function_completes_within_timeout() {
    let fetch = async_host_fn(|args, _| async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(args.into_iter().next().unwrap_or(RillValue::Null))
    });
    let options = RuntimeOptions::new()
        .with_function("fetch", fetch)
        .with_timeout(Duration::from_secs(5));
    let ctx = RuntimeContext::new(options).unwrap();
    let script = parse(r#""payload" -> fetch"#).unwrap();

    let result = execute(&script, &ctx).await.unwrap();
    assert_eq!(result.value, RillValue::from("payload"));
}

#[test]
fn test_abort_stops_execution() {
    let signal = AbortSignal::new();
    let trigger = signal.clone();
    let stop = host_fn(move |_, _| {
        trigger.abort();
        Ok(RillValue::Bool(true))
    });
    let options = RuntimeOptions::new()
        .with_function("stop", stop)
        .with_signal(signal);

    let err = run_with("stop()\n\"unreachable\"", options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Aborted);
}

#[test]
fn test_abort_interrupts_loops() {
    let signal = AbortSignal::new();
    let trigger = signal.clone();
    let tick = host_fn(move |args, _| {
        let n = args[0].as_number()?;
        if n >= 3.0 {
            trigger.abort();
        }
        Ok(RillValue::Number(n + 1.0))
    });
    let options = RuntimeOptions::new()
        .with_function("tick", tick)
        .with_signal(signal);

    let err = run_with("0 -> $n\n(true) @ { $n -> tick -> $n }", options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Aborted);
}

// ====================
// Configuration
// ====================

#[test]
fn test_config_from_json() {
    let config = RuntimeConfig::from_json(r#"{"max_loop_iterations": 2, "auto_exceptions": ["^FAIL"]}"#)
        .unwrap();
    assert_eq!(config.max_loop_iterations, 2);
    assert_eq!(config.max_call_stack_depth, 100);

    let options = || RuntimeOptions::new().with_config(config.clone());
    let err = run_with("[1, 2, 3] -> @{ $ }", options()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::RuntimeLimitExceeded);
    let err = run_with(r#""FAIL now""#, options()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AutoException);
}

#[test]
fn test_config_sets_call_depth() {
    let config = RuntimeConfig::from_json(r#"{"max_eval_depth": 3}"#).unwrap();
    assert_eq!(config.max_eval_depth, 3);

    let options = || RuntimeOptions::new().with_config(config.clone());
    let nested = "|| ($) -> $a\n|| ($ -> $a()) -> $b\n|| ($ -> $b()) -> $c\n";
    assert_eq!(
        run_with(&format!("{}7 -> $c()", nested), options()).unwrap(),
        RillValue::Number(7.0)
    );
    let source = format!("{}|| ($ -> $c()) -> $d\n7 -> $d()", nested);
    let err = run_with(&source, options()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::RuntimeLimitExceeded);
    assert_eq!(err.context().unwrap()["limit"], 3);
}

#[test]
fn test_invalid_config_json() {
    let err = RuntimeConfig::from_json(r#"{"max_loop_iterations": "lots"}"#).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRegistration);
}
