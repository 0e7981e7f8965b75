//! Statement-at-a-time execution, observability callbacks and parse recovery

use pretty_assertions::assert_eq;
use rill::runtime::{CaptureEvent, LogEvent, StepEvent};
use rill::{
    execute, parse, parse_with_recovery, tokenize, ErrorCode, RillValue, RuntimeContext,
    RuntimeOptions, Stepper,
};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_stepper_walks_statements() {
    let script = parse("1 -> $a\n$a + 1 -> $b\n$b * 10").unwrap();
    let ctx = RuntimeContext::new(RuntimeOptions::new()).unwrap();
    let mut stepper = Stepper::new(&script, ctx);
    assert_eq!(stepper.total(), 3);

    tokio_test::block_on(async {
        let first = stepper.step().await.unwrap();
        assert_eq!((first.index, first.total, first.done), (0, 3, false));
        let captured = first.captured.unwrap();
        assert_eq!(captured.name, "a");
        assert_eq!(captured.value, RillValue::Number(1.0));

        let second = stepper.step().await.unwrap();
        assert_eq!(second.value, RillValue::Number(2.0));
        assert_eq!(stepper.index(), 2);

        let third = stepper.step().await.unwrap();
        assert!(third.done);
        assert!(third.captured.is_none());
        assert_eq!(third.value, RillValue::Number(20.0));
    });

    assert!(stepper.done());
    let result = stepper.get_result().unwrap();
    assert_eq!(result.value, RillValue::Number(20.0));
    assert_eq!(result.variables["b"], RillValue::Number(2.0));
}

#[test]
fn test_stepper_stops_on_failure() {
    let script = parse("1\n$missing\n3").unwrap();
    let ctx = RuntimeContext::new(RuntimeOptions::new()).unwrap();
    let mut stepper = Stepper::new(&script, ctx);

    tokio_test::block_on(async {
        assert!(stepper.step().await.is_ok());
        let err = stepper.step().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UndefinedVariable);
        assert_eq!(err.location().map(|loc| loc.line), Some(2));
    });
    assert!(stepper.done());
}

#[test]
fn test_step_callbacks_fire_per_statement() {
    let starts = Rc::new(RefCell::new(Vec::<StepEvent>::new()));
    let ends = Rc::new(RefCell::new(Vec::<StepEvent>::new()));
    let (s, e) = (starts.clone(), ends.clone());
    let options = RuntimeOptions::new()
        .on_step_start(move |event| s.borrow_mut().push(event.clone()))
        .on_step_end(move |event| e.borrow_mut().push(event.clone()));

    let script = parse("\"a\"\n\"b\" -> .upper").unwrap();
    let ctx = RuntimeContext::new(options).unwrap();
    tokio_test::block_on(execute(&script, &ctx)).unwrap();

    let starts = starts.borrow();
    let ends = ends.borrow();
    assert_eq!(starts.len(), 2);
    assert_eq!(ends.len(), 2);
    assert!(starts.iter().all(|event| event.value.is_none()));
    assert_eq!(starts[1].span.start.line, 2);
    assert_eq!(ends[1].value, Some(RillValue::from("B")));
    assert_eq!(ends[1].total, 2);
}

#[test]
fn test_error_callback_sees_failure() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let options = RuntimeOptions::new().on_error(move |err| sink.borrow_mut().push(err.code()));

    let script = parse("1 / 0").unwrap();
    let ctx = RuntimeContext::new(options).unwrap();
    assert!(tokio_test::block_on(execute(&script, &ctx)).is_err());
    assert_eq!(*seen.borrow(), vec![ErrorCode::DivisionByZero]);
}

#[test]
fn test_capture_callback_reports_every_binding() {
    let captures = Rc::new(RefCell::new(Vec::<CaptureEvent>::new()));
    let sink = captures.clone();
    let options = RuntimeOptions::new().on_capture(move |event| sink.borrow_mut().push(event.clone()));

    let script = parse("\"hi\" :> $raw -> .upper -> $loud").unwrap();
    let ctx = RuntimeContext::new(options).unwrap();
    tokio_test::block_on(execute(&script, &ctx)).unwrap();

    let names: Vec<_> = captures.borrow().iter().map(|c| c.name.clone()).collect();
    assert_eq!(names, vec!["raw".to_string(), "loud".to_string()]);
    assert_eq!(captures.borrow()[1].value, RillValue::from("HI"));
}

#[test]
fn test_log_events_report_call_depth() {
    let events = Rc::new(RefCell::new(Vec::<LogEvent>::new()));
    let sink = events.clone();
    let options = RuntimeOptions::new().on_log_event(move |event| sink.borrow_mut().push(event.clone()));

    let script = parse("1 -> log\n|| ($ -> log) -> $inner\n2 -> $inner()").unwrap();
    let ctx = RuntimeContext::new(options).unwrap();
    tokio_test::block_on(execute(&script, &ctx)).unwrap();

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].message, "1");
    assert!(events[1].call_depth > events[0].call_depth);
}

#[test]
fn test_empty_script_uses_initial_pipe_value() {
    let script = parse("# nothing but a comment\n").unwrap();
    let ctx = RuntimeContext::new(RuntimeOptions::new().with_pipe_value(5i64)).unwrap();
    let result = tokio_test::block_on(execute(&script, &ctx)).unwrap();
    assert_eq!(result.value, RillValue::Number(5.0));

    let ctx = RuntimeContext::new(RuntimeOptions::new()).unwrap();
    let err = tokio_test::block_on(execute(&script, &ctx)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UndefinedVariable);
}

#[test]
fn test_initial_pipe_value_reaches_every_statement() {
    let script = parse("$ -> .upper -> $a\n$ -> .len").unwrap();
    let ctx = RuntimeContext::new(RuntimeOptions::new().with_pipe_value("abc")).unwrap();
    let result = tokio_test::block_on(execute(&script, &ctx)).unwrap();
    assert_eq!(result.value, RillValue::Number(3.0));
    assert_eq!(result.variables["a"], RillValue::from("ABC"));
}

// ====================
// Parse recovery
// ====================

#[test]
fn test_recovered_script_fails_at_placeholder() {
    let outcome = parse_with_recovery("1 -> $a\n$a = 2\n3");
    assert!(!outcome.success);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].code(), ErrorCode::UnexpectedToken);

    let ctx = RuntimeContext::new(RuntimeOptions::new()).unwrap();
    let mut stepper = Stepper::new(&outcome.ast, ctx);
    tokio_test::block_on(async {
        assert!(stepper.step().await.is_ok());
        let err = stepper.step().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecoveryNode);
    });
}

#[test]
fn test_clean_source_recovers_without_errors() {
    let outcome = parse_with_recovery("1 -> $a\n$a + 1");
    assert!(outcome.success);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.ast, parse("1 -> $a\n$a + 1").unwrap());
}

// ====================
// Diagnostics
// ====================

#[test]
fn test_lexer_error_codes() {
    let cases = [
        ("1 ~ 2", "RILL-L001"),
        ("\"open", "RILL-L002"),
        ("<<EOT\nnever closed", "RILL-L003"),
        ("\"bad \\q escape\"", "RILL-L004"),
    ];
    for (source, code) in cases {
        let err = tokenize(source).unwrap_err();
        assert_eq!(err.code().as_str(), code, "source: {:?}", source);
        assert!(err.location().is_some());
    }
}

#[test]
fn test_parse_errors_carry_hints() {
    let err = parse("$x = 1").unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnexpectedToken);
    assert!(err.message().contains("Help:"));

    let err = parse("(1 + 2").unwrap_err();
    assert_eq!(err.code().as_str(), "RILL-P002");
}

#[test]
fn test_error_payload_serializes() {
    let err = parse("(1 + 2").unwrap_err();
    let payload = serde_json::to_value(err.to_payload()).unwrap();
    assert_eq!(payload["code"], "RILL-P002");
}
