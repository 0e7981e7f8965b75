//! # Rill Dynamic Type Tags
//!
//! Rill is dynamically typed. Type names appear in a handful of places:
//!
//! ```text
//! $value -> :string          # assertion, raises RILL-R001 on mismatch
//! $value -> :?list           # check, yields a bool
//! |name: string, n: number = 1| { ... }   # closure parameters
//! "x" -> $label:string       # typed capture
//! $user.?email&string        # existence check with type
//! ```
//!
//! Host functions declare parameter and return types with the same tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dynamic type tag of a [`crate::RillValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RillType {
    /// Text
    String,
    /// 64-bit float
    Number,
    /// `true` / `false`
    Bool,
    /// Script or host callable
    Closure,
    /// Ordered sequence
    List,
    /// String-keyed map
    Dict,
    /// Argument pack produced by spread
    Tuple,
    /// Absence of a value (host results only; no literal)
    Null,
    /// Matches every value
    Any,
}

impl RillType {
    /// Parse a type name as written in source; `null` is not assertable
    pub fn from_name(name: &str) -> Option<RillType> {
        match name {
            "string" => Some(RillType::String),
            "number" => Some(RillType::Number),
            "bool" => Some(RillType::Bool),
            "closure" => Some(RillType::Closure),
            "list" => Some(RillType::List),
            "dict" => Some(RillType::Dict),
            "tuple" => Some(RillType::Tuple),
            "any" => Some(RillType::Any),
            _ => None,
        }
    }

    /// Source spelling
    pub fn name(&self) -> &'static str {
        match self {
            RillType::String => "string",
            RillType::Number => "number",
            RillType::Bool => "bool",
            RillType::Closure => "closure",
            RillType::List => "list",
            RillType::Dict => "dict",
            RillType::Tuple => "tuple",
            RillType::Null => "null",
            RillType::Any => "any",
        }
    }

    /// True when a value tagged `actual` satisfies this declared type
    pub fn accepts(&self, actual: RillType) -> bool {
        *self == RillType::Any || *self == actual
    }

    /// All names accepted by [`RillType::from_name`]
    pub fn known_names() -> &'static [&'static str] {
        &[
            "string", "number", "bool", "closure", "list", "dict", "tuple", "any",
        ]
    }
}

impl fmt::Display for RillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
