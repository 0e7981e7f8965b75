//! Script execution: run to completion, or one statement at a time
//!
//! Each top-level statement sees `$` as the context's initial pipe value;
//! values do not flow from one statement to the next. A top-level `return`
//! ends the script with its value.

use serde::Serialize;
use tracing::debug;

use super::context::{CaptureEvent, RuntimeContext, StepEvent};
use super::evaluator::{Evaluator, Signal};
use super::value::{RillDict, RillValue};
use crate::error::{Error, Result};
use crate::parser::{Script, Statement, Terminator};

/// Outcome of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Value of the last statement executed
    pub value: RillValue,
    /// Variables bound in the top-level scope
    pub variables: RillDict,
}

/// Outcome of one [`Stepper::step`]
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Value of the statement just executed
    pub value: RillValue,
    /// True when no statements remain
    pub done: bool,
    /// Index of the statement just executed
    pub index: usize,
    /// Number of top-level statements
    pub total: usize,
    /// Variable bound by the statement's terminating capture, if any
    pub captured: Option<CaptureEvent>,
}

/// Execute every statement of `script` in order
pub async fn execute(script: &Script, ctx: &RuntimeContext) -> Result<ExecutionResult> {
    let mut stepper = Stepper::new(script, ctx.clone());
    while !stepper.done() {
        stepper.step().await?;
    }
    stepper.get_result()
}

/// Statement-at-a-time driver for debuggers and progress reporting
pub struct Stepper<'a> {
    script: &'a Script,
    ctx: RuntimeContext,
    evaluator: Evaluator,
    index: usize,
    last: Option<RillValue>,
    done: bool,
}

impl<'a> Stepper<'a> {
    /// Prepare to run `script` against `ctx`
    pub fn new(script: &'a Script, ctx: RuntimeContext) -> Self {
        Stepper {
            done: script.statements.is_empty(),
            script,
            ctx,
            evaluator: Evaluator::new(),
            index: 0,
            last: None,
        }
    }

    /// True once every statement ran, a `return` ended the script, or a
    /// statement failed
    pub fn done(&self) -> bool {
        self.done
    }

    /// Index of the next statement
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of top-level statements
    pub fn total(&self) -> usize {
        self.script.statements.len()
    }

    /// Context the script runs in
    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    /// Execute the next statement
    pub async fn step(&mut self) -> Result<StepResult> {
        let total = self.total();
        if self.done {
            return Ok(StepResult {
                value: self.last.clone().unwrap_or(RillValue::Null),
                done: true,
                index: self.index.saturating_sub(1),
                total,
                captured: None,
            });
        }

        let index = self.index;
        let script = self.script;
        let statement = &script.statements[index];
        let span = statement.span();
        debug!(index, total, line = span.start.line, "step");

        let observability = self.ctx.observability().clone();
        if let Some(on_step_start) = &observability.on_step_start {
            on_step_start(&StepEvent {
                index,
                total,
                span,
                value: None,
            });
        }

        let value = match self.evaluator.exec_statement(statement, &self.ctx).await {
            Ok(value) => value,
            Err(Signal::Return(value)) => {
                self.done = true;
                value
            }
            Err(signal) => {
                self.done = true;
                return Err(self.report(signal.into_error().at(span.start)));
            }
        };

        self.index += 1;
        if self.index >= total {
            self.done = true;
        }
        self.last = Some(value.clone());

        if let Some(on_step_end) = &observability.on_step_end {
            on_step_end(&StepEvent {
                index,
                total,
                span,
                value: Some(value.clone()),
            });
        }

        let captured = terminal_capture(statement).map(|name| CaptureEvent {
            name: name.to_string(),
            value: value.clone(),
        });

        Ok(StepResult {
            value,
            done: self.done,
            index,
            total,
            captured,
        })
    }

    /// Final value and top-level variables.
    ///
    /// A script with no statements yields the initial `$`, and fails with
    /// `RILL-R002` when none was supplied.
    pub fn get_result(&self) -> Result<ExecutionResult> {
        let value = match (&self.last, &self.ctx.pipe_value) {
            (Some(value), _) => value.clone(),
            (None, Some(piped)) => piped.clone(),
            (None, None) => return Err(self.report(Error::undefined_variable("$"))),
        };
        Ok(ExecutionResult {
            value,
            variables: self.ctx.variables(),
        })
    }

    fn report(&self, err: Error) -> Error {
        if let Some(on_error) = &self.ctx.observability().on_error {
            on_error(&err);
        }
        err
    }
}

/// Name bound by a statement ending in `-> $name`
fn terminal_capture(statement: &Statement) -> Option<&str> {
    match statement {
        Statement::Expression { chain, .. } => match &chain.terminator {
            Some(Terminator::Capture(capture)) => Some(&capture.name),
            _ => None,
        },
        Statement::Annotated { statement, .. } => terminal_capture(statement),
        Statement::Error(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::parser::parse;
    use crate::runtime::RuntimeOptions;

    #[test]
    fn test_terminal_capture() {
        let script = parse("1 -> $a\n^(k: 1) 2 -> $b\n3").unwrap();
        let names: Vec<_> = script.statements.iter().map(terminal_capture).collect();
        assert_eq!(names, vec![Some("a"), Some("b"), None]);
    }

    #[test]
    fn test_empty_script_needs_pipe_value() {
        let script = parse("").unwrap();
        let ctx = RuntimeContext::new(RuntimeOptions::new()).unwrap();
        let err = tokio_test::block_on(execute(&script, &ctx)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UndefinedVariable);

        let ctx = RuntimeContext::new(RuntimeOptions::new().with_pipe_value("in")).unwrap();
        let result = tokio_test::block_on(execute(&script, &ctx)).unwrap();
        assert_eq!(result.value, RillValue::from("in"));
    }

    #[test]
    fn test_step_after_done_repeats_last_value() {
        let script = parse("7").unwrap();
        let ctx = RuntimeContext::new(RuntimeOptions::new()).unwrap();
        let mut stepper = Stepper::new(&script, ctx);
        tokio_test::block_on(async {
            let first = stepper.step().await.unwrap();
            assert!(first.done);
            let again = stepper.step().await.unwrap();
            assert_eq!(again.value, RillValue::Number(7.0));
        });
    }
}
