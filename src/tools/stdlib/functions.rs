//! Built-in functions

use async_trait::async_trait;

use crate::error::{Error, ErrorCode, Result};
use crate::runtime::{RillValue, RuntimeContext};
use crate::tools::{HostFunction, HostFunctionDef, HostParam};
use crate::types::RillType;

fn value_param() -> HostParam {
    HostParam::new("value").with_description("Any value")
}

/// `log(value)`: deliver to the host's log callbacks, pass the value on
struct Log;

#[async_trait(?Send)]
impl HostFunction for Log {
    async fn call(&self, args: Vec<RillValue>, ctx: &RuntimeContext) -> Result<RillValue> {
        let value = args.into_iter().next().unwrap_or(RillValue::Null);
        ctx.log(&value);
        Ok(value)
    }
}

pub(super) fn log() -> HostFunctionDef {
    HostFunctionDef::new(Log)
        .with_description("Send a value to the host log and return it unchanged")
        .with_param(value_param())
}

struct Identity;

#[async_trait(?Send)]
impl HostFunction for Identity {
    async fn call(&self, args: Vec<RillValue>, _ctx: &RuntimeContext) -> Result<RillValue> {
        Ok(args.into_iter().next().unwrap_or(RillValue::Null))
    }
}

pub(super) fn identity() -> HostFunctionDef {
    HostFunctionDef::new(Identity)
        .with_description("Return the argument unchanged")
        .with_param(value_param())
}

struct TypeOf;

#[async_trait(?Send)]
impl HostFunction for TypeOf {
    async fn call(&self, args: Vec<RillValue>, _ctx: &RuntimeContext) -> Result<RillValue> {
        let name = args.first().map_or("null", RillValue::type_name);
        Ok(RillValue::from(name))
    }
}

pub(super) fn type_of() -> HostFunctionDef {
    HostFunctionDef::new(TypeOf)
        .with_description("Name of the value's type")
        .with_param(value_param())
        .returns(RillType::String)
}

/// `range(stop)`, `range(start, stop)`, `range(start, stop, step)`
struct Range;

#[async_trait(?Send)]
impl HostFunction for Range {
    async fn call(&self, args: Vec<RillValue>, ctx: &RuntimeContext) -> Result<RillValue> {
        let first = args[0].as_number()?;
        let (start, stop) = match &args[1] {
            RillValue::Null => (0.0, first),
            other => (first, other.as_number()?),
        };
        let step = args[2].as_number()?;
        if step == 0.0 {
            return Err(Error::invalid_arguments("range", "step cannot be zero"));
        }

        let count = ((stop - start) / step).ceil().max(0.0);
        let limit = ctx.iteration_limit()?;
        if count > limit as f64 {
            return Err(Error::runtime(
                ErrorCode::RuntimeLimitExceeded,
                format!("range would produce more than {} values", limit),
            )
            .with_context("limit", limit as u64));
        }

        let values = (0..count as usize)
            .map(|i| RillValue::Number(start + step * i as f64))
            .collect::<Vec<_>>();
        Ok(RillValue::list(values))
    }
}

pub(super) fn range() -> HostFunctionDef {
    HostFunctionDef::new(Range)
        .with_description("List of numbers from start (inclusive) to stop (exclusive)")
        .with_param(
            HostParam::typed("start", RillType::Number)
                .with_description("Start, or the stop when called with one argument"),
        )
        .with_param(
            HostParam::new("stop")
                .with_default(RillValue::Null)
                .with_description("Exclusive end"),
        )
        .with_param(
            HostParam::typed("step", RillType::Number)
                .with_default(1i64)
                .with_description("Increment, may be negative"),
        )
        .returns(RillType::List)
}

struct Json;

#[async_trait(?Send)]
impl HostFunction for Json {
    async fn call(&self, args: Vec<RillValue>, _ctx: &RuntimeContext) -> Result<RillValue> {
        let value = args.first().cloned().unwrap_or(RillValue::Null);
        let text = serde_json::to_string(&value.to_json())
            .map_err(|e| Error::host(format!("json: {}", e)))?;
        Ok(RillValue::String(text))
    }
}

pub(super) fn json() -> HostFunctionDef {
    HostFunctionDef::new(Json)
        .with_description("Encode a value as JSON text")
        .with_param(value_param())
        .returns(RillType::String)
}

struct ParseJson;

#[async_trait(?Send)]
impl HostFunction for ParseJson {
    async fn call(&self, args: Vec<RillValue>, _ctx: &RuntimeContext) -> Result<RillValue> {
        let text = args[0].as_str()?;
        let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| {
            Error::host(format!("parse_json: {}", e)).with_context("line", e.line() as u64)
        })?;
        Ok(RillValue::from_json(&parsed))
    }
}

pub(super) fn parse_json() -> HostFunctionDef {
    HostFunctionDef::new(ParseJson)
        .with_description("Decode JSON text into a value")
        .with_param(HostParam::typed("text", RillType::String).with_description("JSON text"))
}
