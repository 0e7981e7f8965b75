//! Variable references, access chains and captures

use std::rc::Rc;

use super::{Evaluator, Flow, Signal};
use crate::error::{Error, ErrorCode, Result};
use crate::lexer::SourceSpan;
use crate::parser::{Access, Capture, ExistenceCheck, VariableKind, VariableRef};
use crate::runtime::context::RuntimeContext;
use crate::runtime::value::{format_number, Callable, RillTuple, RillValue};

impl Evaluator {
    pub(super) async fn eval_variable(&self, var: &VariableRef, ctx: &RuntimeContext) -> Flow<RillValue> {
        let result = match self.lookup_root(&var.kind, ctx) {
            Ok(root) => self.walk_accesses(root, var, ctx).await,
            Err(err) => Err(Signal::Fault(err)),
        };

        let default = match &var.default {
            Some(default) => default,
            None => return result,
        };
        match result {
            Ok(RillValue::Null) => self.eval_expr(default, ctx).await,
            Err(Signal::Fault(err)) if falls_back(&err) => self.eval_expr(default, ctx).await,
            other => other,
        }
    }

    fn lookup_root(&self, kind: &VariableKind, ctx: &RuntimeContext) -> Result<RillValue> {
        match kind {
            VariableKind::Pipe => self.require_pipe(ctx),
            VariableKind::Named(name) => ctx
                .scope
                .get(name)
                .ok_or_else(|| undefined_named(name, ctx)),
            VariableKind::Accumulator => ctx
                .accumulator
                .clone()
                .ok_or_else(|| Error::undefined_variable("$@")),
        }
    }

    async fn walk_accesses(
        &self,
        root: RillValue,
        var: &VariableRef,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let mut current = root;
        for access in &var.accesses {
            current = match access {
                Access::Field { name, span } => self
                    .access_field(current, name, ctx, *span)
                    .await
                    .map_err(|signal| signal.at(span.start))?,
                Access::Index { index, span } => {
                    let key = self.eval_expr(index, ctx).await?;
                    index_value(&current, &key).map_err(|err| err.at(span.start))?
                }
                Access::Annotation { key, span } => {
                    annotation_of(&current, key).map_err(|err| err.at(span.start))?
                }
            };
        }

        match &var.existence {
            Some(check) => Ok(RillValue::Bool(field_exists(&current, check))),
            None => Ok(current),
        }
    }

    /// `.field`: dict entries first, then a zero-argument method of that name.
    ///
    /// Zero-parameter closures stored in a dict run with `$` bound to the
    /// dict; closures with parameters come back bound to it.
    async fn access_field(
        &self,
        current: RillValue,
        name: &str,
        ctx: &RuntimeContext,
        span: SourceSpan,
    ) -> Flow<RillValue> {
        if let RillValue::Dict(fields) = &current {
            match fields.get(name) {
                Some(RillValue::Callable(callable)) => {
                    let script = match &**callable {
                        Callable::Script(script) => script,
                        Callable::Application(_) => return Ok(RillValue::Callable(callable.clone())),
                    };
                    let bound = Rc::new(Callable::Script(script.bind(fields.clone())));
                    if !script.params().is_empty() {
                        return Ok(RillValue::Callable(bound));
                    }
                    let dict_ctx = ctx.with_pipe(current.clone());
                    return self.invoke_callable(bound, Vec::new(), &dict_ctx, span).await;
                }
                Some(value) => return Ok(value.clone()),
                None => {}
            }
        }

        let has_method = ctx
            .shared
            .methods
            .get(name)
            .map_or(false, |method| method.applies_to(&current));
        if has_method {
            return self.call_method(name, current, Vec::new(), ctx, span).await;
        }

        match &current {
            RillValue::Dict(_) => Err(Error::runtime(
                ErrorCode::KeyNotFound,
                format!("Key `{}` not found", name),
            )
            .with_context("key", name)
            .into()),
            other => Err(Error::runtime(
                ErrorCode::TypeMismatch,
                format!("Cannot access field `{}` on {}", name, other.type_name()),
            )
            .with_context("field", name)
            .into()),
        }
    }

    /// Bind a captured value: `-> $name` / `:> $name` / `-> $name:type`
    pub(super) fn capture(&self, capture: &Capture, value: RillValue, ctx: &RuntimeContext) -> Result<()> {
        if let Some(ty) = capture.type_annotation {
            if !ty.accepts(value.type_of()) {
                return Err(Error::type_mismatch(ty, value.type_name())
                    .with_context("variable", capture.name.as_str())
                    .at(capture.span.start));
            }
        }
        ctx.scope
            .assign(&capture.name, value.clone())
            .map_err(|err| err.at(capture.span.start))?;
        ctx.notify_capture(&capture.name, &value);
        Ok(())
    }
}

fn falls_back(err: &Error) -> bool {
    matches!(
        err.code(),
        ErrorCode::UndefinedVariable | ErrorCode::IndexOutOfBounds | ErrorCode::KeyNotFound
    )
}

fn undefined_named(name: &str, ctx: &RuntimeContext) -> Error {
    let err = Error::undefined_variable(&format!("${}", name));
    let visible = ctx.scope.visible_names();
    let candidates: Vec<&str> = visible.iter().map(String::as_str).collect();
    match crate::parser::closest_name(name, &candidates) {
        Some(suggestion) => err.with_context("suggestion", format!("${}", suggestion)),
        None => err,
    }
}

/// Resolve a possibly negative index against `len`
pub(super) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        Some(resolved as usize)
    } else {
        None
    }
}

fn out_of_bounds(index: i64, len: usize) -> Error {
    Error::runtime(
        ErrorCode::IndexOutOfBounds,
        format!("Index {} out of bounds for length {}", index, len),
    )
    .with_context("index", index)
    .with_context("length", len as u64)
}

fn key_not_found(key: &str) -> Error {
    Error::runtime(ErrorCode::KeyNotFound, format!("Key `{}` not found", key))
        .with_context("key", key)
}

/// `value[key]` for lists, strings, dicts and tuples
pub(super) fn index_value(target: &RillValue, key: &RillValue) -> Result<RillValue> {
    match (target, key) {
        (RillValue::List(items), _) | (RillValue::Tuple(RillTuple::Positional(items)), _) => {
            let index = key.as_index()?;
            normalize_index(index, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| out_of_bounds(index, items.len()))
        }
        (RillValue::String(text), _) => {
            let index = key.as_index()?;
            let chars: Vec<char> = text.chars().collect();
            normalize_index(index, chars.len())
                .map(|i| RillValue::String(chars[i].to_string()))
                .ok_or_else(|| out_of_bounds(index, chars.len()))
        }
        (RillValue::Dict(fields), RillValue::String(name))
        | (RillValue::Tuple(RillTuple::Named(fields)), RillValue::String(name)) => fields
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| key_not_found(name)),
        (RillValue::Dict(fields), RillValue::Number(n))
        | (RillValue::Tuple(RillTuple::Named(fields)), RillValue::Number(n)) => {
            let name = format_number(*n);
            fields.get(&name).cloned().ok_or_else(|| key_not_found(&name))
        }
        (RillValue::Dict(_), other) => Err(Error::type_mismatch("string or number key", other.type_name())),
        (other, _) => Err(Error::runtime(
            ErrorCode::TypeMismatch,
            format!("Cannot index a {}", other.type_name()),
        )),
    }
}

/// `.^key`: annotation recorded on a script closure
fn annotation_of(value: &RillValue, key: &str) -> Result<RillValue> {
    match value {
        RillValue::Callable(callable) => match &**callable {
            Callable::Script(script) => script.annotations.get(key).cloned().ok_or_else(|| {
                Error::runtime(
                    ErrorCode::KeyNotFound,
                    format!("Annotation `{}` not found", key),
                )
                .with_context("key", key)
            }),
            Callable::Application(app) => Err(Error::runtime(
                ErrorCode::KeyNotFound,
                format!("Host function `{}` has no annotations", app.name),
            )
            .with_context("key", key)),
        },
        other => Err(Error::type_mismatch("closure", other.type_name())
            .with_context("annotation", key)),
    }
}

fn field_exists(value: &RillValue, check: &ExistenceCheck) -> bool {
    let fields = match value {
        RillValue::Dict(fields) | RillValue::Tuple(RillTuple::Named(fields)) => fields,
        _ => return false,
    };
    match (fields.get(&check.field), check.type_constraint) {
        (Some(field), Some(ty)) => ty.accepts(field.type_of()),
        (Some(_), None) => true,
        (None, _) => false,
    }
}
