//! Dispatch tables, destructuring, slices, spreads and type operators

use std::rc::Rc;

use super::closures::implicit_args;
use super::variables::normalize_index;
use super::{Evaluator, Flow};
use crate::error::{Error, ErrorCode, Result};
use crate::lexer::SourceSpan;
use crate::parser::{
    DestructureElement, DestructurePattern, DictKey, DictLiteral, Expr, SliceExpr, TupleLiteral,
    TypeOp,
};
use crate::runtime::context::RuntimeContext;
use crate::runtime::value::{RillTuple, RillValue};

impl Evaluator {
    /// Dict literal as a lookup table for the piped scalar.
    ///
    /// Keys compare type-aware (`1` never matches `"1"`), tuple keys match
    /// any member, and a `default` entry catches everything else.
    pub(super) async fn dispatch_dict(
        &self,
        lit: &DictLiteral,
        piped: &RillValue,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let mut fallback = None;
        for entry in &lit.entries {
            if entry.key.is_default() {
                fallback = Some(entry);
            } else if key_matches(&entry.key, piped) {
                return self.dispatch_value(&entry.value, piped, ctx).await;
            }
        }

        match fallback {
            Some(entry) => self.dispatch_value(&entry.value, piped, ctx).await,
            None => Err(Error::runtime(
                ErrorCode::KeyNotFound,
                format!("No dispatch entry for {}", piped),
            )
            .with_context("key", piped.to_json())
            .into()),
        }
    }

    /// Tuple literal indexed by the piped number; negative indices count
    /// from the end
    pub(super) async fn dispatch_tuple(
        &self,
        lit: &TupleLiteral,
        piped: &RillValue,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let index = piped.as_index()?;
        match normalize_index(index, lit.elements.len()) {
            Some(i) => self.dispatch_value(&lit.elements[i], piped, ctx).await,
            None => Err(Error::runtime(
                ErrorCode::IndexOutOfBounds,
                format!(
                    "Index {} out of bounds for dispatch over {} entries",
                    index,
                    lit.elements.len()
                ),
            )
            .with_context("index", index)
            .with_context("length", lit.elements.len() as u64)
            .into()),
        }
    }

    /// Matched entry value; callables are invoked with the piped value
    async fn dispatch_value(
        &self,
        expr: &Expr,
        piped: &RillValue,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        match self.eval_expr(expr, ctx).await? {
            RillValue::Callable(callable) => {
                let args = implicit_args(&callable, piped.clone());
                self.invoke_callable(callable, args, ctx, expr.span()).await
            }
            value => Ok(value),
        }
    }

    /// `*<...>`: bind parts of `$`, then pass `$` through unchanged
    pub(super) fn eval_destructure(
        &self,
        pattern: &DestructurePattern,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let input = self.require_pipe(ctx)?;
        self.destructure(pattern, &input, ctx)?;
        Ok(input)
    }

    fn destructure(
        &self,
        pattern: &DestructurePattern,
        value: &RillValue,
        ctx: &RuntimeContext,
    ) -> Result<()> {
        for (position, element) in pattern.elements.iter().enumerate() {
            match element {
                DestructureElement::Skip(_) => {}
                DestructureElement::Bind(capture) => {
                    let item = positional(value, position).map_err(|err| err.at(capture.span.start))?;
                    self.capture(capture, item, ctx)?;
                }
                DestructureElement::Key { key, capture } => {
                    let fields = value
                        .as_dict()
                        .map_err(|err| err.with_context("key", key.as_str()))?;
                    let item = fields.get(key).cloned().ok_or_else(|| {
                        Error::runtime(ErrorCode::KeyNotFound, format!("Key `{}` not found", key))
                            .with_context("key", key.as_str())
                            .at(capture.span.start)
                    })?;
                    self.capture(capture, item, ctx)?;
                }
                DestructureElement::Nested(inner) => {
                    let item = positional(value, position).map_err(|err| err.at(inner.span.start))?;
                    self.destructure(inner, &item, ctx)?;
                }
            }
        }
        Ok(())
    }

    /// `/<start:stop:step>` over `$`
    pub(super) async fn eval_slice(&self, slice: &SliceExpr, ctx: &RuntimeContext) -> Flow<RillValue> {
        let input = self.require_pipe(ctx)?;
        let start = self.slice_bound(slice.start.as_deref(), ctx).await?;
        let stop = self.slice_bound(slice.stop.as_deref(), ctx).await?;
        let step = self.slice_bound(slice.step.as_deref(), ctx).await?.unwrap_or(1);
        if step == 0 {
            return Err(Error::invalid_arguments("slice", "step cannot be zero").into());
        }

        match &input {
            RillValue::List(items) => {
                let picked = slice_positions(items.len(), start, stop, step)
                    .into_iter()
                    .map(|i| items[i].clone())
                    .collect();
                Ok(RillValue::list(picked))
            }
            RillValue::String(text) => {
                let chars: Vec<char> = text.chars().collect();
                let picked: String = slice_positions(chars.len(), start, stop, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect();
                Ok(RillValue::String(picked))
            }
            other => Err(Error::type_mismatch("list or string", other.type_name())
                .with_context("construct", "slice")
                .into()),
        }
    }

    async fn slice_bound(&self, expr: Option<&Expr>, ctx: &RuntimeContext) -> Flow<Option<i64>> {
        match expr {
            Some(expr) => Ok(Some(self.eval_expr(expr, ctx).await?.as_index()?)),
            None => Ok(None),
        }
    }

    /// `*expr` / `*`: list to positional tuple, dict to named tuple
    pub(super) async fn eval_spread(
        &self,
        operand: Option<&Expr>,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let value = match operand {
            Some(expr) => self.eval_expr(expr, ctx).await?,
            None => self.require_pipe(ctx)?,
        };
        match value {
            RillValue::List(items) => Ok(RillValue::Tuple(RillTuple::Positional(items))),
            RillValue::Dict(fields) => Ok(RillValue::Tuple(RillTuple::Named(fields))),
            tuple @ RillValue::Tuple(_) => Ok(tuple),
            other => Err(Error::type_mismatch("list or dict", other.type_name())
                .with_context("construct", "spread")
                .into()),
        }
    }

    /// `@[$f, $g]`: feed `$` through each callable in turn
    pub(super) async fn eval_sequential_spread(
        &self,
        callables: &Expr,
        span: SourceSpan,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let mut value = self.require_pipe(ctx)?;
        let steps = match self.eval_expr(callables, ctx).await? {
            RillValue::List(items) => items,
            RillValue::Callable(single) => Rc::new(vec![RillValue::Callable(single)]),
            other => {
                return Err(Error::type_mismatch("list of closures", other.type_name())
                    .with_context("construct", "sequential spread")
                    .into())
            }
        };

        for step in steps.iter() {
            let callable = match step {
                RillValue::Callable(callable) => callable.clone(),
                other => {
                    return Err(Error::type_mismatch("closure", other.type_name())
                        .with_context("construct", "sequential spread")
                        .into())
                }
            };
            let args = implicit_args(&callable, value.clone());
            value = self
                .invoke_callable(callable, args, &ctx.with_pipe(value), span)
                .await?;
        }
        Ok(value)
    }

    /// `:type` returns the value or fails; `:?type` answers with a bool
    pub(super) async fn eval_type_op(
        &self,
        op: &TypeOp,
        assert: bool,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let value = match &op.operand {
            Some(expr) => self.eval_expr(expr, ctx).await?,
            None => self.require_pipe(ctx)?,
        };
        let matches = op.ty.accepts(value.type_of());
        if !assert {
            return Ok(RillValue::Bool(matches));
        }
        if matches {
            Ok(value)
        } else {
            Err(Error::type_mismatch(op.ty, value.type_name()).into())
        }
    }
}

fn key_matches(key: &DictKey, value: &RillValue) -> bool {
    match (key, value) {
        (DictKey::Name(k), RillValue::String(s)) | (DictKey::Str(k), RillValue::String(s)) => k == s,
        (DictKey::Number(k), RillValue::Number(n)) => k == n,
        (DictKey::Bool(k), RillValue::Bool(b)) => k == b,
        (DictKey::Tuple(keys), _) => keys.iter().any(|key| key_matches(key, value)),
        _ => false,
    }
}

fn positional(value: &RillValue, position: usize) -> Result<RillValue> {
    let items = match value {
        RillValue::List(items) | RillValue::Tuple(RillTuple::Positional(items)) => items,
        other => {
            return Err(Error::type_mismatch("list", other.type_name())
                .with_context("construct", "positional destructure"))
        }
    };
    items.get(position).cloned().ok_or_else(|| {
        Error::runtime(
            ErrorCode::IndexOutOfBounds,
            format!(
                "Cannot destructure position {} of a list of length {}",
                position,
                items.len()
            ),
        )
        .with_context("index", position as u64)
        .with_context("length", items.len() as u64)
    })
}

/// Positions picked by a Python-style slice over `len` elements
pub(super) fn slice_positions(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
) -> Vec<usize> {
    let len = len as i64;
    let resolve = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound.saturating_add(len) } else { bound };
        bound.clamp(low, high)
    };

    let mut positions = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| resolve(s, 0, len));
        let stop = stop.map_or(len, |s| resolve(s, 0, len));
        while i < stop {
            positions.push(i as usize);
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    } else {
        let mut i = start.map_or(len - 1, |s| resolve(s, -1, len - 1));
        let stop = stop.map_or(-1, |s| resolve(s, -1, len - 1));
        while i > stop {
            positions.push(i as usize);
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_positions_forward() {
        assert_eq!(slice_positions(5, None, None, 1), vec![0, 1, 2, 3, 4]);
        assert_eq!(slice_positions(5, Some(1), Some(3), 1), vec![1, 2]);
        assert_eq!(slice_positions(5, Some(-2), None, 1), vec![3, 4]);
        assert_eq!(slice_positions(5, None, None, 2), vec![0, 2, 4]);
        assert_eq!(slice_positions(5, Some(10), None, 1), Vec::<usize>::new());
    }

    #[test]
    fn test_slice_positions_backward() {
        assert_eq!(slice_positions(5, None, None, -1), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_positions(5, Some(3), Some(0), -1), vec![3, 2, 1]);
        assert_eq!(slice_positions(5, None, None, -2), vec![4, 2, 0]);
        assert_eq!(slice_positions(0, None, None, -1), Vec::<usize>::new());
    }

    #[test]
    fn test_slice_positions_huge_steps() {
        assert_eq!(slice_positions(3, Some(1), None, i64::MAX), vec![1]);
        assert_eq!(slice_positions(3, None, None, i64::MIN), vec![2]);
        assert_eq!(slice_positions(3, Some(i64::MIN), Some(i64::MAX), i64::MAX), vec![0]);
        assert_eq!(slice_positions(3, Some(i64::MAX), Some(i64::MIN), i64::MIN), vec![2]);
    }

    #[test]
    fn test_key_matching_is_type_aware() {
        let one = RillValue::Number(1.0);
        assert!(key_matches(&DictKey::Number(1.0), &one));
        assert!(!key_matches(&DictKey::Str("1".into()), &one));
        assert!(key_matches(
            &DictKey::Tuple(vec![DictKey::Str("a".into()), DictKey::Number(1.0)]),
            &one
        ));
        assert!(key_matches(&DictKey::Name("ok".into()), &RillValue::from("ok")));
    }

    #[test]
    fn test_positional_requires_list() {
        let dict = RillValue::dict_from([("a", RillValue::Null)]);
        assert_eq!(positional(&dict, 0).unwrap_err().code(), ErrorCode::TypeMismatch);
        let list = RillValue::from(vec![RillValue::Null]);
        assert_eq!(positional(&list, 1).unwrap_err().code(), ErrorCode::IndexOutOfBounds);
    }
}
