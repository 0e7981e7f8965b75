//! Literals, operators and postfix chains

use std::rc::Rc;

use super::variables::index_value;
use super::{Evaluator, Flow};
use crate::error::{Error, ErrorCode, Result};
use crate::lexer::SourceSpan;
use crate::parser::{
    BinaryExpr, BinaryOp, DictKey, DictLiteral, Expr, PostfixExpr, PostfixOp, StringLiteral,
    StringSegment, TupleLiteral, UnaryExpr, UnaryOp,
};
use crate::runtime::context::RuntimeContext;
use crate::runtime::value::{RillDict, RillTuple, RillValue};

impl Evaluator {
    pub(super) async fn eval_string(
        &self,
        lit: &StringLiteral,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let mut out = String::new();
        for segment in &lit.segments {
            match segment {
                StringSegment::Text(text) => out.push_str(text),
                StringSegment::Interpolation(chain) => {
                    let value = self.eval_chain(chain, ctx).await?;
                    out.push_str(&value.to_display_string());
                }
            }
        }
        Ok(RillValue::String(out))
    }

    /// `[a, b, *$rest]`: spread elements are flattened in place
    pub(super) async fn eval_tuple(&self, lit: &TupleLiteral, ctx: &RuntimeContext) -> Flow<RillValue> {
        let mut items = Vec::with_capacity(lit.elements.len());
        for element in &lit.elements {
            let value = self.eval_expr(element, ctx).await?;
            match (element, value) {
                (Expr::Spread { .. }, RillValue::Tuple(RillTuple::Positional(spread))) => {
                    items.extend(spread.iter().cloned());
                }
                (Expr::Spread { span, .. }, RillValue::Tuple(RillTuple::Named(_))) => {
                    return Err(Error::runtime(
                        ErrorCode::TypeMismatch,
                        "Cannot spread a dict into a list",
                    )
                    .at(span.start)
                    .into());
                }
                (_, value) => items.push(value),
            }
        }
        Ok(RillValue::list(items))
    }

    /// Plain dict literal; a tuple key stores the value under every member
    pub(super) async fn eval_dict(&self, lit: &DictLiteral, ctx: &RuntimeContext) -> Flow<RillValue> {
        let mut fields = RillDict::with_capacity(lit.entries.len());
        for entry in &lit.entries {
            let value = self.eval_expr(&entry.value, ctx).await?;
            match &entry.key {
                DictKey::Tuple(keys) => {
                    for key in keys {
                        fields.insert(key.to_key_string(), value.clone());
                    }
                }
                key => {
                    fields.insert(key.to_key_string(), value);
                }
            }
        }
        Ok(RillValue::Dict(Rc::new(fields)))
    }

    /// Operand value, invoking zero-parameter closures when `$` is bound
    pub(super) async fn resolve_operand(&self, expr: &Expr, ctx: &RuntimeContext) -> Flow<RillValue> {
        let value = self.eval_expr(expr, ctx).await?;
        match value {
            RillValue::Callable(callable) if ctx.pipe_value.is_some() && callable.is_property() => {
                self.invoke_callable(callable, Vec::new(), ctx, expr.span())
                    .await
            }
            other => Ok(other),
        }
    }

    pub(super) async fn eval_binary(&self, bin: &BinaryExpr, ctx: &RuntimeContext) -> Flow<RillValue> {
        let left = self.resolve_operand(&bin.left, ctx).await?;

        if matches!(bin.op, BinaryOp::And | BinaryOp::Or) {
            let lhs = logical_operand(bin.op, &left).map_err(|err| err.at(bin.op_span.start))?;
            let short_circuit = match bin.op {
                BinaryOp::And => !lhs,
                _ => lhs,
            };
            if short_circuit {
                return Ok(RillValue::Bool(lhs));
            }
            let right = self.resolve_operand(&bin.right, ctx).await?;
            let rhs = logical_operand(bin.op, &right).map_err(|err| err.at(bin.op_span.start))?;
            return Ok(RillValue::Bool(rhs));
        }

        let right = self.resolve_operand(&bin.right, ctx).await?;
        Ok(binary_op(bin.op, left, right, bin.op_span)?)
    }

    pub(super) async fn eval_unary(&self, un: &UnaryExpr, ctx: &RuntimeContext) -> Flow<RillValue> {
        let operand = self.resolve_operand(&un.operand, ctx).await?;
        let value = match un.op {
            UnaryOp::Neg => match operand {
                RillValue::Number(n) => RillValue::Number(-n),
                other => {
                    return Err(Error::type_mismatch("number", other.type_name())
                        .with_context("operator", "-")
                        .into())
                }
            },
            UnaryOp::Not => match operand {
                RillValue::Bool(b) => RillValue::Bool(!b),
                other => {
                    return Err(Error::type_mismatch("bool", other.type_name())
                        .with_context("operator", "!")
                        .into())
                }
            },
        };
        Ok(value)
    }

    /// `base.method(args)[index]...`, applied left to right
    pub(super) async fn eval_postfix(&self, post: &PostfixExpr, ctx: &RuntimeContext) -> Flow<RillValue> {
        let mut value = self.eval_expr(&post.base, ctx).await?;
        for op in &post.ops {
            value = match op {
                PostfixOp::Method { name, args, span } => {
                    let args = self.eval_args(args, ctx).await?;
                    self.call_method(name, value, args, ctx, *span)
                        .await
                        .map_err(|signal| signal.at(span.start))?
                }
                PostfixOp::Index { index, span } => {
                    let key = self.eval_expr(index, ctx).await?;
                    index_value(&value, &key).map_err(|err| err.at(span.start))?
                }
            };
        }
        Ok(value)
    }

    /// Evaluate call arguments; positional spreads are flattened
    pub(super) async fn eval_args(&self, args: &[Expr], ctx: &RuntimeContext) -> Flow<Vec<RillValue>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.eval_expr(arg, ctx).await?;
            match (arg, value) {
                (Expr::Spread { .. }, RillValue::Tuple(RillTuple::Positional(items)))
                    if args.len() > 1 =>
                {
                    values.extend(items.iter().cloned());
                }
                (_, value) => values.push(value),
            }
        }
        Ok(values)
    }
}

fn logical_operand(op: BinaryOp, value: &RillValue) -> Result<bool> {
    value.as_bool().map_err(|_| {
        Error::type_mismatch("bool", value.type_name()).with_context("operator", op.symbol())
    })
}

/// Apply a binary operator to evaluated operands
pub(super) fn binary_op(
    op: BinaryOp,
    left: RillValue,
    right: RillValue,
    op_span: SourceSpan,
) -> Result<RillValue> {
    let located = |err: Error| err.at(op_span.start);

    match op {
        BinaryOp::And | BinaryOp::Or => {
            let a = logical_operand(op, &left).map_err(located)?;
            let b = logical_operand(op, &right).map_err(located)?;
            let result = if op == BinaryOp::And { a && b } else { a || b };
            return Ok(RillValue::Bool(result));
        }
        BinaryOp::Eq => return Ok(RillValue::Bool(left == right)),
        BinaryOp::NotEq => return Ok(RillValue::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
            let ordering = match (&left, &right) {
                (RillValue::Number(a), RillValue::Number(b)) => a.partial_cmp(b),
                (RillValue::String(a), RillValue::String(b)) => Some(a.cmp(b)),
                _ => return Err(located(operand_mismatch(op, &left, &right))),
            };
            let result = match ordering {
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::LtEq => ordering.is_le(),
                    _ => ordering.is_ge(),
                },
                None => false,
            };
            return Ok(RillValue::Bool(result));
        }
        _ => {}
    }

    if op == BinaryOp::Add {
        match (&left, &right) {
            (RillValue::String(_), _) | (_, RillValue::String(_)) => {
                return Ok(RillValue::String(format!(
                    "{}{}",
                    left.to_display_string(),
                    right.to_display_string()
                )));
            }
            (RillValue::List(a), RillValue::List(b)) => {
                let mut items = Vec::with_capacity(a.len() + b.len());
                items.extend(a.iter().cloned());
                items.extend(b.iter().cloned());
                return Ok(RillValue::list(items));
            }
            _ => {}
        }
    }

    let (a, b) = match (&left, &right) {
        (RillValue::Number(a), RillValue::Number(b)) => (*a, *b),
        _ => return Err(located(operand_mismatch(op, &left, &right))),
    };

    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ => {
            if b == 0.0 {
                return Err(located(
                    Error::runtime(ErrorCode::DivisionByZero, "Division by zero")
                        .with_context("operator", op.symbol()),
                ));
            }
            if op == BinaryOp::Div {
                a / b
            } else {
                a % b
            }
        }
    };
    Ok(RillValue::Number(value))
}

fn operand_mismatch(op: BinaryOp, left: &RillValue, right: &RillValue) -> Error {
    let expected = match op {
        BinaryOp::Add => "numbers, strings or lists",
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
            "two numbers or two strings"
        }
        _ => "numbers",
    };
    Error::runtime(
        ErrorCode::TypeMismatch,
        format!(
            "Operator {} expects {}, got {} and {}",
            op.symbol(),
            expected,
            left.type_name(),
            right.type_name()
        ),
    )
    .with_context("operator", op.symbol())
    .with_context("left", left.type_name())
    .with_context("right", right.type_name())
}
