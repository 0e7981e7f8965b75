//! Built-in methods
//!
//! Each implementation receives the receiver as `args[0]` followed by the
//! bound arguments.

use crate::error::{Error, ErrorCode, Result};
use crate::runtime::{RillDict, RillValue, RuntimeContext};
use crate::tools::{host_fn, HostMethodDef, HostParam};
use crate::types::RillType;

const SEQUENCES: &[RillType] = &[RillType::String, RillType::List];

fn method<F>(description: &str, receivers: &[RillType], params: Vec<HostParam>, f: F) -> HostMethodDef
where
    F: Fn(&[RillValue], &RuntimeContext) -> Result<RillValue> + 'static,
{
    let function = params
        .into_iter()
        .fold(host_fn(f).with_description(description), |def, param| def.with_param(param));
    HostMethodDef::new(function).on(receivers)
}

fn text_param(name: &str, description: &str) -> HostParam {
    HostParam::typed(name, RillType::String).with_description(description)
}

fn string_map(description: &str, f: fn(&str) -> String) -> HostMethodDef {
    method(description, &[RillType::String], Vec::new(), move |args, _| {
        Ok(RillValue::String(f(args[0].as_str()?)))
    })
}

fn out_of_bounds(index: i64, len: usize) -> Error {
    Error::runtime(
        ErrorCode::IndexOutOfBounds,
        format!("Index {} out of bounds for length {}", index, len),
    )
    .with_context("index", index)
    .with_context("length", len as u64)
}

/// Element `index` of a string or list; negative indexes count from the end
fn element(receiver: &RillValue, index: i64) -> Result<RillValue> {
    let resolve = |len: usize| {
        let i = if index < 0 { len as i64 + index } else { index };
        if i < 0 || i >= len as i64 {
            Err(out_of_bounds(index, len))
        } else {
            Ok(i as usize)
        }
    };
    match receiver {
        RillValue::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve(chars.len())?;
            Ok(RillValue::String(chars[i].to_string()))
        }
        RillValue::List(items) => {
            let i = resolve(items.len())?;
            Ok(items[i].clone())
        }
        other => Err(Error::type_mismatch("string or list", other.type_name())),
    }
}

fn size(value: &RillValue) -> Result<usize> {
    match value {
        RillValue::String(s) => Ok(s.chars().count()),
        RillValue::List(items) => Ok(items.len()),
        RillValue::Dict(fields) => Ok(fields.len()),
        RillValue::Tuple(tuple) => Ok(tuple.len()),
        other => Err(Error::type_mismatch("string, list, dict or tuple", other.type_name())),
    }
}

pub(super) fn len() -> HostMethodDef {
    method(
        "Number of characters, elements or entries",
        &[RillType::String, RillType::List, RillType::Dict, RillType::Tuple],
        Vec::new(),
        |args, _| Ok(RillValue::from(size(&args[0])?)),
    )
}

pub(super) fn empty() -> HostMethodDef {
    method(
        "True when the receiver has no characters, elements or entries",
        &[RillType::String, RillType::List, RillType::Dict, RillType::Tuple],
        Vec::new(),
        |args, _| Ok(RillValue::Bool(size(&args[0])? == 0)),
    )
}

pub(super) fn trim() -> HostMethodDef {
    string_map("Remove leading and trailing whitespace", |s| s.trim().to_string())
}

pub(super) fn upper() -> HostMethodDef {
    string_map("Uppercase copy", str::to_uppercase)
}

pub(super) fn lower() -> HostMethodDef {
    string_map("Lowercase copy", str::to_lowercase)
}

pub(super) fn split() -> HostMethodDef {
    method(
        "Split on a separator, or on runs of whitespace when none is given",
        &[RillType::String],
        vec![text_param("sep", "Separator").with_default("")],
        |args, _| {
            let s = args[0].as_str()?;
            let sep = args[1].as_str()?;
            let parts: Vec<RillValue> = if sep.is_empty() {
                s.split_whitespace().map(RillValue::from).collect()
            } else {
                s.split(sep).map(RillValue::from).collect()
            };
            Ok(RillValue::list(parts))
        },
    )
}

pub(super) fn lines() -> HostMethodDef {
    method("Split into lines", &[RillType::String], Vec::new(), |args, _| {
        let lines = args[0].as_str()?.lines().map(RillValue::from).collect();
        Ok(RillValue::list(lines))
    })
}

pub(super) fn starts_with() -> HostMethodDef {
    method(
        "True when the string begins with the prefix",
        &[RillType::String],
        vec![text_param("prefix", "Prefix to test")],
        |args, _| Ok(RillValue::Bool(args[0].as_str()?.starts_with(args[1].as_str()?))),
    )
}

pub(super) fn ends_with() -> HostMethodDef {
    method(
        "True when the string ends with the suffix",
        &[RillType::String],
        vec![text_param("suffix", "Suffix to test")],
        |args, _| Ok(RillValue::Bool(args[0].as_str()?.ends_with(args[1].as_str()?))),
    )
}

pub(super) fn replace() -> HostMethodDef {
    method(
        "Replace every occurrence of a substring",
        &[RillType::String],
        vec![
            text_param("from", "Substring to find"),
            text_param("to", "Replacement"),
        ],
        |args, _| {
            let replaced = args[0].as_str()?.replace(args[1].as_str()?, args[2].as_str()?);
            Ok(RillValue::String(replaced))
        },
    )
}

pub(super) fn join() -> HostMethodDef {
    method(
        "Join list elements into a string",
        &[RillType::List],
        vec![text_param("sep", "Separator").with_default(",")],
        |args, _| {
            let joined = args[0]
                .as_list()?
                .iter()
                .map(RillValue::to_display_string)
                .collect::<Vec<_>>()
                .join(args[1].as_str()?);
            Ok(RillValue::String(joined))
        },
    )
}

pub(super) fn contains() -> HostMethodDef {
    method(
        "Substring test for strings, element test for lists, key test for dicts",
        &[RillType::String, RillType::List, RillType::Dict],
        vec![HostParam::new("needle").with_description("Value to look for")],
        |args, _| {
            let found = match (&args[0], &args[1]) {
                (RillValue::String(s), RillValue::String(needle)) => s.contains(needle.as_str()),
                (RillValue::String(_), other) => {
                    return Err(Error::type_mismatch("string", other.type_name()))
                }
                (RillValue::List(items), needle) => items.iter().any(|item| item == needle),
                (RillValue::Dict(fields), needle) => fields.contains_key(needle.as_str()?),
                (other, _) => return Err(Error::type_mismatch("string, list or dict", other.type_name())),
            };
            Ok(RillValue::Bool(found))
        },
    )
}

pub(super) fn first() -> HostMethodDef {
    method("First element or character", SEQUENCES, Vec::new(), |args, _| {
        element(&args[0], 0)
    })
}

pub(super) fn last() -> HostMethodDef {
    method("Last element or character", SEQUENCES, Vec::new(), |args, _| {
        element(&args[0], -1)
    })
}

pub(super) fn at() -> HostMethodDef {
    method(
        "Element or character at an index; negative counts from the end",
        SEQUENCES,
        vec![HostParam::typed("index", RillType::Number).with_description("Position")],
        |args, _| element(&args[0], args[1].as_index()?),
    )
}

pub(super) fn reverse() -> HostMethodDef {
    method("Reversed copy", SEQUENCES, Vec::new(), |args, _| match &args[0] {
        RillValue::String(s) => Ok(RillValue::String(s.chars().rev().collect())),
        RillValue::List(items) => Ok(RillValue::list(items.iter().rev().cloned().collect())),
        other => Err(Error::type_mismatch("string or list", other.type_name())),
    })
}

pub(super) fn keys() -> HostMethodDef {
    method("Dict keys in insertion order", &[RillType::Dict], Vec::new(), |args, _| {
        let keys = args[0].as_dict()?.keys().map(|k| RillValue::from(k.as_str())).collect();
        Ok(RillValue::list(keys))
    })
}

pub(super) fn values() -> HostMethodDef {
    method("Dict values in insertion order", &[RillType::Dict], Vec::new(), |args, _| {
        Ok(RillValue::list(args[0].as_dict()?.values().cloned().collect()))
    })
}

pub(super) fn entries() -> HostMethodDef {
    method(
        "List of [key: k, value: v] dicts",
        &[RillType::Dict],
        Vec::new(),
        |args, _| {
            let entries = args[0]
                .as_dict()?
                .iter()
                .map(|(k, v)| {
                    let mut entry = RillDict::new();
                    entry.insert("key".to_string(), RillValue::from(k.as_str()));
                    entry.insert("value".to_string(), v.clone());
                    RillValue::dict(entry)
                })
                .collect();
            Ok(RillValue::list(entries))
        },
    )
}

pub(super) fn has() -> HostMethodDef {
    method(
        "True when the dict has the key",
        &[RillType::Dict],
        vec![text_param("key", "Key to test")],
        |args, _| Ok(RillValue::Bool(args[0].as_dict()?.contains_key(args[1].as_str()?))),
    )
}

pub(super) fn to_str() -> HostMethodDef {
    method("Display form as a string", &[], Vec::new(), |args, _| {
        Ok(RillValue::String(args[0].to_display_string()))
    })
}

pub(super) fn to_num() -> HostMethodDef {
    method(
        "Parse a string as a number; bools become 1 or 0",
        &[RillType::String, RillType::Number, RillType::Bool],
        Vec::new(),
        |args, _| match &args[0] {
            RillValue::Number(n) => Ok(RillValue::Number(*n)),
            RillValue::Bool(b) => Ok(RillValue::Number(if *b { 1.0 } else { 0.0 })),
            RillValue::String(s) => s.trim().parse::<f64>().map(RillValue::Number).map_err(|_| {
                Error::runtime(
                    ErrorCode::TypeMismatch,
                    format!("Cannot convert \"{}\" to a number", s),
                )
                .with_context("value", s.as_str())
            }),
            other => Err(Error::type_mismatch("string, number or bool", other.type_name())),
        },
    )
}
