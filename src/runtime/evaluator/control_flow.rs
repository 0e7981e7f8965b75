//! Conditionals and loops
//!
//! A loop's shape is chosen once, from the runtime type of its input:
//! a bool input gives a while loop, an iterable gives for-each. A trailing
//! `? cond` turns either form into a do-while; without an explicit input the
//! do-while state starts as `$` itself.
//!
//! `break` in a for-each ends the walk with the results gathered so far and
//! drops the break value; while and do-while loops yield the break value.

use tracing::trace;

use super::collections::iterable;
use super::{Evaluator, Flow, Signal};
use crate::error::{Error, ErrorCode, Result};
use crate::parser::{Conditional, Expr, LoopExpr};
use crate::runtime::context::RuntimeContext;
use crate::runtime::value::RillValue;

/// Iteration budget for one loop
struct Budget {
    limit: usize,
    used: usize,
}

impl Budget {
    fn new(limit: usize) -> Self {
        Budget { limit, used: 0 }
    }

    fn tick(&mut self, ctx: &RuntimeContext) -> Result<()> {
        ctx.check_abort()?;
        self.used += 1;
        if self.used > self.limit {
            return Err(Error::runtime(
                ErrorCode::RuntimeLimitExceeded,
                format!("Loop exceeded {} iterations", self.limit),
            )
            .with_context("limit", self.limit as u64));
        }
        Ok(())
    }
}

impl Evaluator {
    pub(super) async fn eval_conditional(
        &self,
        cond: &Conditional,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let test = match &cond.condition {
            Some(condition) => self.resolve_operand(condition, ctx).await?,
            None => self.require_pipe(ctx)?,
        };
        let test = match test {
            RillValue::Bool(b) => b,
            other => {
                return Err(Error::type_mismatch("bool", other.type_name())
                    .with_context("construct", "conditional")
                    .into())
            }
        };

        if test {
            self.eval_body(&cond.then_branch, ctx).await
        } else if let Some(else_branch) = &cond.else_branch {
            self.eval_body(else_branch, ctx).await
        } else {
            Ok(ctx.pipe_value.clone().unwrap_or(RillValue::Null))
        }
    }

    pub(super) async fn eval_loop(&self, lp: &LoopExpr, ctx: &RuntimeContext) -> Flow<RillValue> {
        let mut budget = Budget::new(ctx.iteration_limit()?);
        let input = match &lp.input {
            Some(input) => self.eval_expr(input, ctx).await?,
            None => self.require_pipe(ctx)?,
        };

        let is_bool = matches!(input, RillValue::Bool(_));
        match (is_bool, &lp.condition) {
            (true, None) => {
                let state = ctx.pipe_value.clone().unwrap_or_else(|| input.clone());
                self.run_while(lp, input, state, &mut budget, ctx).await
            }
            (true, Some(condition)) => {
                let state = ctx.pipe_value.clone().unwrap_or(input);
                self.run_do_while(lp, condition, state, &mut budget, ctx)
                    .await
            }
            (false, None) => {
                let items = iterable(&input)?;
                self.run_for_each(lp, items, &mut budget, ctx).await
            }
            (false, Some(condition)) if lp.input.is_none() => {
                self.run_do_while(lp, condition, input, &mut budget, ctx)
                    .await
            }
            (false, Some(condition)) => match iterable(&input)?.into_iter().next() {
                Some(first) => {
                    self.run_do_while(lp, condition, first, &mut budget, ctx)
                        .await
                }
                None => Ok(input),
            },
        }
    }

    async fn run_while(
        &self,
        lp: &LoopExpr,
        input: RillValue,
        mut state: RillValue,
        budget: &mut Budget,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let mut running = input.as_bool()?;
        while running {
            budget.tick(ctx)?;
            match self.eval_target(&lp.body, &ctx.with_pipe(state.clone())).await {
                Ok(value) => state = value,
                Err(Signal::Break(value)) => return Ok(value),
                Err(other) => return Err(other),
            }
            running = self.retest(lp.input.as_deref(), &state, ctx).await?;
        }
        trace!(iterations = budget.used, "while loop finished");
        Ok(state)
    }

    async fn run_do_while(
        &self,
        lp: &LoopExpr,
        condition: &Expr,
        mut state: RillValue,
        budget: &mut Budget,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        loop {
            budget.tick(ctx)?;
            match self.eval_target(&lp.body, &ctx.with_pipe(state.clone())).await {
                Ok(value) => state = value,
                Err(Signal::Break(value)) => return Ok(value),
                Err(other) => return Err(other),
            }
            if !self.retest(Some(condition), &state, ctx).await? {
                break;
            }
        }
        trace!(iterations = budget.used, "do-while loop finished");
        Ok(state)
    }

    async fn run_for_each(
        &self,
        lp: &LoopExpr,
        items: Vec<RillValue>,
        budget: &mut Budget,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            budget.tick(ctx)?;
            match self.eval_target(&lp.body, &ctx.with_pipe(item)).await {
                Ok(value) => results.push(value),
                Err(Signal::Break(_)) => break,
                Err(other) => return Err(other),
            }
        }
        Ok(RillValue::list(results))
    }

    /// Loop condition with `$` bound to the current state; without an
    /// expression the state itself must be a bool
    async fn retest(
        &self,
        condition: Option<&Expr>,
        state: &RillValue,
        ctx: &RuntimeContext,
    ) -> Flow<bool> {
        let value = match condition {
            Some(condition) => {
                self.resolve_operand(condition, &ctx.with_pipe(state.clone()))
                    .await?
            }
            None => state.clone(),
        };
        match value {
            RillValue::Bool(b) => Ok(b),
            other => Err(Error::type_mismatch("bool", other.type_name())
                .with_context("construct", "loop condition")
                .into()),
        }
    }
}
