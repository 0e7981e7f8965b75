//! Collection operators: `each`, `map`, `fold`, `filter`
//!
//! All four walk their input in order. `map` runs sequentially too: there is
//! no concurrency between elements and the first error stops the walk.
//! `break` stops early with the partial results (or the accumulator for
//! `fold`); the break value itself is dropped, matching for-each loops.

use std::rc::Rc;

use super::closures::implicit_args;
use super::{Evaluator, Flow, Signal};
use crate::error::{Error, ErrorCode, Result};
use crate::parser::{CollectionExpr, CollectionKind, Expr};
use crate::runtime::context::RuntimeContext;
use crate::runtime::value::{Callable, RillValue};

/// Elements of an iterable value: list items, string characters, or dict
/// entries as `[key: k, value: v]`
pub(super) fn iterable(value: &RillValue) -> Result<Vec<RillValue>> {
    match value {
        RillValue::List(items) => Ok(items.as_ref().clone()),
        RillValue::String(text) => Ok(text
            .chars()
            .map(|c| RillValue::String(c.to_string()))
            .collect()),
        RillValue::Dict(fields) => Ok(fields
            .iter()
            .map(|(key, value)| {
                RillValue::dict_from([
                    ("key", RillValue::String(key.clone())),
                    ("value", value.clone()),
                ])
            })
            .collect()),
        other => Err(Error::type_mismatch("list, string or dict", other.type_name())),
    }
}

impl Evaluator {
    pub(super) async fn eval_collection(
        &self,
        op: &CollectionExpr,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let keyword = op.kind.keyword();
        let input = self.require_pipe(ctx)?;
        let items = iterable(&input).map_err(|err| err.with_context("operator", keyword))?;

        let callable = self.body_callable(&op.body, ctx).await?;
        let mut acc = self.initial_accumulator(op, callable.as_ref(), ctx).await?;
        if op.kind == CollectionKind::Fold && acc.is_none() {
            return Err(Error::invalid_arguments(
                "fold",
                "an accumulator is required: fold(init) body, or a closure parameter with a default",
            )
            .into());
        }
        if matches!(op.kind, CollectionKind::Map | CollectionKind::Filter) {
            acc = None;
        }

        let limit = ctx.iteration_limit()?;
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            ctx.check_abort()?;
            if index >= limit {
                return Err(Error::runtime(
                    ErrorCode::RuntimeLimitExceeded,
                    format!("{} exceeded {} iterations", keyword, limit),
                )
                .with_context("limit", limit as u64)
                .into());
            }

            let item_ctx = ctx.with_pipe(item.clone()).with_accumulator(acc.clone());
            let outcome = match &callable {
                Some(callable) => {
                    let args = match &acc {
                        Some(acc) if callable.arity() >= 2 => vec![item.clone(), acc.clone()],
                        _ => implicit_args(callable, item.clone()),
                    };
                    self.invoke_callable(callable.clone(), args, &item_ctx, op.span)
                        .await
                }
                None => self.eval_target(&op.body, &item_ctx).await,
            };
            let value = match outcome {
                Ok(value) => value,
                Err(Signal::Break(_)) => break,
                Err(other) => return Err(other),
            };

            match op.kind {
                CollectionKind::Each => {
                    if acc.is_some() {
                        acc = Some(value.clone());
                    }
                    results.push(value);
                }
                CollectionKind::Map => results.push(value),
                CollectionKind::Fold => acc = Some(value),
                CollectionKind::Filter => {
                    if value.is_truthy() {
                        results.push(item);
                    }
                }
            }
        }

        match op.kind {
            CollectionKind::Fold => Ok(acc.unwrap_or(RillValue::Null)),
            _ => Ok(RillValue::list(results)),
        }
    }

    /// Closure literals and variables are invoked per element; every other
    /// body is evaluated as a pipe target
    async fn body_callable(&self, body: &Expr, ctx: &RuntimeContext) -> Flow<Option<Rc<Callable>>> {
        match body {
            Expr::Closure(_) | Expr::Variable(_) => match self.eval_expr(body, ctx).await? {
                RillValue::Callable(callable) => Ok(Some(callable)),
                other => Err(Error::type_mismatch("closure", other.type_name())
                    .with_context("construct", "collection body")
                    .into()),
            },
            _ => Ok(None),
        }
    }

    /// `(init)` prefix, else the default of a closure's second parameter,
    /// evaluated in the closure's defining scope
    async fn initial_accumulator(
        &self,
        op: &CollectionExpr,
        callable: Option<&Rc<Callable>>,
        ctx: &RuntimeContext,
    ) -> Flow<Option<RillValue>> {
        if let Some(init) = &op.accumulator {
            return Ok(Some(self.eval_expr(init, ctx).await?));
        }
        let script = match callable.map(|c| &**c) {
            Some(Callable::Script(script)) => script,
            _ => return Ok(None),
        };
        match script.params().get(1).and_then(|param| param.default.as_ref()) {
            Some(default) => {
                let scope_ctx = ctx.in_scope(script.defining_scope.clone());
                Ok(Some(self.eval_expr(default, &scope_ctx).await?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterable_forms() {
        let chars = iterable(&RillValue::from("ab")).unwrap();
        assert_eq!(chars, vec![RillValue::from("a"), RillValue::from("b")]);

        let dict = RillValue::dict_from([("x", RillValue::from(1i64))]);
        let entries = iterable(&dict).unwrap();
        assert_eq!(
            entries,
            vec![RillValue::dict_from([
                ("key", RillValue::from("x")),
                ("value", RillValue::from(1i64)),
            ])]
        );

        let err = iterable(&RillValue::Number(3.0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
    }
}
