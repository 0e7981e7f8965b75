//! Tree-walking evaluator
//!
//! One [`Evaluator`] type walks the AST. Its concerns are split over several
//! files as separate `impl` blocks:
//!
//! - `expressions`: literals, operators, strings, postfix chains
//! - `variables`: variable references, access chains, captures
//! - `control_flow`: conditionals and loops
//! - `collections`: `each`, `map`, `fold`, `filter`
//! - `closures`: closure creation and invocation, host functions, methods
//! - `extraction`: dispatch tables, destructuring, slices, spreads, type ops
//!
//! Recursive entry points return [`LocalBoxFuture`]s so evaluation can await
//! host functions without requiring `Send`; each poll grows the native stack
//! when it runs low, and script and host calls are bounded by the context's
//! call-depth limit. `break` and `return` travel up as
//! [`Signal`] values rather than errors.

mod closures;
mod collections;
mod control_flow;
mod expressions;
mod extraction;
mod variables;

use futures_util::future::LocalBoxFuture;
use tracing::{debug, trace};

use self::closures::implicit_args;
use super::context::RuntimeContext;
use super::value::{RillDict, RillValue};
use crate::error::{Error, ErrorCode, Result};
use crate::lexer::SourceLocation;
use crate::parser::{Expr, PipeChain, PipeStep, Statement, Terminator};
use crate::stack::on_sufficient_stack;

/// Non-local exit travelling up the evaluation stack
#[derive(Debug)]
pub(crate) enum Signal {
    /// `-> break`, caught by the nearest loop or collection operator
    Break(RillValue),
    /// `-> return`, caught by the nearest closure call or the script
    Return(RillValue),
    /// Runtime error
    Fault(Error),
}

impl Signal {
    /// Attach a location to a fault that has none yet
    pub(crate) fn at(self, location: SourceLocation) -> Self {
        match self {
            Signal::Fault(err) => Signal::Fault(err.at(location)),
            other => other,
        }
    }

    /// Turn an uncaught `break`/`return` into `RILL-R015`
    pub(crate) fn into_error(self) -> Error {
        match self {
            Signal::Fault(err) => err,
            Signal::Break(_) => Error::runtime(
                ErrorCode::InvalidControlFlow,
                "`break` used outside of a loop or collection operator",
            ),
            Signal::Return(_) => Error::runtime(
                ErrorCode::InvalidControlFlow,
                "`return` used outside of a closure or script",
            ),
        }
    }
}

impl From<Error> for Signal {
    fn from(err: Error) -> Self {
        Signal::Fault(err)
    }
}

/// Result of evaluating a node: a value or a signal
pub(crate) type Flow<T> = std::result::Result<T, Signal>;

/// Stateless tree-walking evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Creates an evaluator
    pub fn new() -> Self {
        Evaluator
    }

    /// Evaluate one expression; `break`/`return` escaping it are errors
    pub async fn evaluate_expression(&self, expr: &Expr, ctx: &RuntimeContext) -> Result<RillValue> {
        self.eval_expr(expr, ctx).await.map_err(Signal::into_error)
    }

    /// Execute one statement; `break`/`return` escaping it are errors
    pub async fn execute_statement(
        &self,
        statement: &Statement,
        ctx: &RuntimeContext,
    ) -> Result<RillValue> {
        self.exec_statement(statement, ctx)
            .await
            .map_err(Signal::into_error)
    }

    /// Execute a statement, letting signals through
    pub(crate) fn exec_statement<'a>(
        &'a self,
        statement: &'a Statement,
        ctx: &'a RuntimeContext,
    ) -> LocalBoxFuture<'a, Flow<RillValue>> {
        on_sufficient_stack(async move {
            ctx.check_abort()?;
            let span = statement.span();
            let value = match statement {
                Statement::Expression { chain, .. } => {
                    debug!(line = span.start.line, "executing statement");
                    self.eval_chain(chain, ctx).await
                }
                Statement::Annotated {
                    annotations,
                    statement,
                    ..
                } => {
                    let mut values = RillDict::new();
                    for arg in annotations {
                        let value = self.eval_expr(&arg.value, ctx).await?;
                        values.insert(arg.key.clone(), value);
                    }
                    ctx.push_annotations(values);
                    let result = self.exec_statement(statement, ctx).await;
                    ctx.pop_annotations();
                    return result;
                }
                Statement::Error(node) => Err(Signal::Fault(
                    Error::runtime(
                        ErrorCode::RecoveryNode,
                        format!("Cannot execute unparsed source: {}", node.message),
                    )
                    .with_context("text", node.text.as_str()),
                )),
            }
            .map_err(|signal| signal.at(span.start))?;

            self.check_auto_exceptions(&value, ctx)
                .map_err(|err| Signal::Fault(err.at(span.start)))?;
            Ok(value)
        })
    }

    /// Run statements in order; the last value wins, `$` when there are none
    pub(crate) async fn exec_statements(
        &self,
        statements: &[Statement],
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let mut last = ctx.pipe_value.clone().unwrap_or(RillValue::Null);
        for statement in statements {
            last = self.exec_statement(statement, ctx).await?;
        }
        Ok(last)
    }

    /// Evaluate `head -> target ... -> terminator`
    pub(crate) fn eval_chain<'a>(
        &'a self,
        chain: &'a PipeChain,
        ctx: &'a RuntimeContext,
    ) -> LocalBoxFuture<'a, Flow<RillValue>> {
        on_sufficient_stack(async move {
            let mut value = self.eval_expr(&chain.head, ctx).await?;

            for step in &chain.steps {
                match step {
                    PipeStep::Target(target) => {
                        trace!(target = ?target.span().start, "pipe step");
                        let piped = ctx.with_pipe(value);
                        value = self.eval_target(target, &piped).await?;
                    }
                    PipeStep::Capture(capture) => {
                        self.capture(capture, value.clone(), ctx)?;
                    }
                }
            }

            match &chain.terminator {
                Some(Terminator::Capture(capture)) => {
                    self.capture(capture, value.clone(), ctx)?;
                    Ok(value)
                }
                Some(Terminator::Break(_)) => Err(Signal::Break(value)),
                Some(Terminator::Return(_)) => Err(Signal::Return(value)),
                None => Ok(value),
            }
        })
    }

    /// Evaluate an expression in value position
    pub(crate) fn eval_expr<'a>(
        &'a self,
        expr: &'a Expr,
        ctx: &'a RuntimeContext,
    ) -> LocalBoxFuture<'a, Flow<RillValue>> {
        on_sufficient_stack(async move {
            let result = match expr {
                Expr::Number { value, .. } => Ok(RillValue::Number(*value)),
                Expr::Bool { value, .. } => Ok(RillValue::Bool(*value)),
                Expr::Str(lit) => self.eval_string(lit, ctx).await,
                Expr::Tuple(lit) => self.eval_tuple(lit, ctx).await,
                Expr::Dict(lit) => self.eval_dict(lit, ctx).await,
                Expr::Variable(var) => self.eval_variable(var, ctx).await,
                Expr::Binary(bin) => self.eval_binary(bin, ctx).await,
                Expr::Unary(un) => self.eval_unary(un, ctx).await,
                Expr::Postfix(post) => self.eval_postfix(post, ctx).await,
                Expr::Grouped { chain, .. } => self.eval_chain(chain, ctx).await,
                Expr::Closure(def) => Ok(self.make_closure(def, ctx)),
                Expr::Block(block) => Ok(self.make_block_closure(block, ctx)),
                Expr::HostCall(call) => self.eval_host_call(call, ctx).await,
                Expr::ClosureCall(call) => self.eval_closure_call(call, ctx).await,
                Expr::MethodCall(call) => self.eval_method_call(call, ctx).await,
                Expr::PipeInvoke { args, span } => self.eval_pipe_invoke(args, *span, ctx).await,
                Expr::Conditional(cond) => self.eval_conditional(cond, ctx).await,
                Expr::Loop(lp) => self.eval_loop(lp, ctx).await,
                Expr::Collection(op) => self.eval_collection(op, ctx).await,
                Expr::Destructure(pattern) => self.eval_destructure(pattern, ctx),
                Expr::Slice(slice) => self.eval_slice(slice, ctx).await,
                Expr::Spread { operand, .. } => self.eval_spread(operand.as_deref(), ctx).await,
                Expr::SequentialSpread { callables, span } => {
                    self.eval_sequential_spread(callables, *span, ctx).await
                }
                Expr::TypeAssertion(op) => self.eval_type_op(op, true, ctx).await,
                Expr::TypeCheck(op) => self.eval_type_op(op, false, ctx).await,
            };
            result.map_err(|signal| signal.at(expr.span().start))
        })
    }

    /// Evaluate an expression in pipe-target position, where `$` is the
    /// value flowing through the chain.
    ///
    /// Differences from value position: dict and tuple literals dispatch on
    /// a scalar `$`, blocks run instead of becoming closures, and variables
    /// or closure literals holding a callable are invoked with `$`.
    pub(crate) fn eval_target<'a>(
        &'a self,
        expr: &'a Expr,
        ctx: &'a RuntimeContext,
    ) -> LocalBoxFuture<'a, Flow<RillValue>> {
        on_sufficient_stack(async move {
            let piped = ctx.pipe_value.clone().unwrap_or(RillValue::Null);
            let result = match expr {
                Expr::Dict(lit) if piped.is_scalar() => self.dispatch_dict(lit, &piped, ctx).await,
                Expr::Tuple(lit) if matches!(piped, RillValue::Number(_)) => {
                    self.dispatch_tuple(lit, &piped, ctx).await
                }
                Expr::Block(block) => self.exec_block(block, ctx).await,
                Expr::Variable(_) | Expr::Closure(_) => {
                    let value = self.eval_expr(expr, ctx).await?;
                    match value {
                        RillValue::Callable(callable) => {
                            let args = implicit_args(&callable, piped);
                            self.invoke_callable(callable, args, ctx, expr.span()).await
                        }
                        other => Ok(other),
                    }
                }
                _ => self.eval_expr(expr, ctx).await,
            };
            result.map_err(|signal| signal.at(expr.span().start))
        })
    }

    /// Evaluate a conditional branch: blocks run in a nested scope,
    /// anything else is an ordinary expression
    pub(crate) async fn eval_body(&self, body: &Expr, ctx: &RuntimeContext) -> Flow<RillValue> {
        match body {
            Expr::Block(block) => self.exec_block(block, ctx).await,
            other => self.eval_expr(other, ctx).await,
        }
    }

    /// Current `$`, or `RILL-R002` when nothing is piped
    pub(crate) fn require_pipe(&self, ctx: &RuntimeContext) -> Result<RillValue> {
        ctx.pipe_value
            .clone()
            .ok_or_else(|| Error::undefined_variable("$"))
    }

    fn check_auto_exceptions(&self, value: &RillValue, ctx: &RuntimeContext) -> Result<()> {
        if let RillValue::String(text) = value {
            if let Some(pattern) = ctx
                .shared
                .auto_exceptions
                .iter()
                .find(|pattern| pattern.is_match(text))
            {
                return Err(Error::runtime(
                    ErrorCode::AutoException,
                    format!("Value matched auto-exception pattern `{}`", pattern.as_str()),
                )
                .with_context("pattern", pattern.as_str())
                .with_context("value", text.as_str()));
            }
        }
        Ok(())
    }
}
