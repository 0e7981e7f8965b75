//! Built-in functions and methods available to every script
//!
//! Host registrations with the same name replace these.

mod functions;
mod methods;

use std::collections::HashMap;

use crate::tools::{HostFunctionDef, HostMethodDef};

/// Built-in functions keyed by name
pub fn functions() -> HashMap<String, HostFunctionDef> {
    let mut table = HashMap::new();

    // Output
    table.insert("log".to_string(), functions::log());

    // Values and types
    table.insert("identity".to_string(), functions::identity());
    table.insert("type".to_string(), functions::type_of());
    table.insert("range".to_string(), functions::range());

    // JSON
    table.insert("json".to_string(), functions::json());
    table.insert("parse_json".to_string(), functions::parse_json());

    table
}

/// Built-in methods keyed by name
pub fn methods() -> HashMap<String, HostMethodDef> {
    let mut table = HashMap::new();

    // Size
    table.insert("len".to_string(), methods::len());
    table.insert("empty".to_string(), methods::empty());

    // Strings
    table.insert("trim".to_string(), methods::trim());
    table.insert("upper".to_string(), methods::upper());
    table.insert("lower".to_string(), methods::lower());
    table.insert("split".to_string(), methods::split());
    table.insert("lines".to_string(), methods::lines());
    table.insert("starts_with".to_string(), methods::starts_with());
    table.insert("ends_with".to_string(), methods::ends_with());
    table.insert("replace".to_string(), methods::replace());

    // Sequences
    table.insert("join".to_string(), methods::join());
    table.insert("contains".to_string(), methods::contains());
    table.insert("first".to_string(), methods::first());
    table.insert("last".to_string(), methods::last());
    table.insert("at".to_string(), methods::at());
    table.insert("reverse".to_string(), methods::reverse());

    // Dicts
    table.insert("keys".to_string(), methods::keys());
    table.insert("values".to_string(), methods::values());
    table.insert("entries".to_string(), methods::entries());
    table.insert("has".to_string(), methods::has());

    // Conversion
    table.insert("str".to_string(), methods::to_str());
    table.insert("num".to_string(), methods::to_num());

    table
}
