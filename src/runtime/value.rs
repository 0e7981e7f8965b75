use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::rc::Rc;

use super::context::Scope;
use crate::error::{Error, ErrorCode, Result};
use crate::parser::{Block, ClosureDef, ClosureParam};
use crate::tools::HostFunctionDef;
use crate::types::RillType;

/// Ordered string-keyed map used for dicts, annotations and named tuples
pub type RillDict = IndexMap<String, RillValue>;

/// Runtime value representation
#[derive(Clone)]
pub enum RillValue {
    /// Absence of a value (host results only)
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit floating-point number
    Number(f64),
    /// String value
    String(String),
    /// Ordered list (reference-counted)
    List(Rc<Vec<RillValue>>),
    /// String-keyed dict preserving insertion order (reference-counted)
    Dict(Rc<RillDict>),
    /// Argument pack produced by spread
    Tuple(RillTuple),
    /// Script closure or host function
    Callable(Rc<Callable>),
}

/// Argument pack produced by `*`
#[derive(Clone)]
pub enum RillTuple {
    /// Spread of a list: binds parameters by position
    Positional(Rc<Vec<RillValue>>),
    /// Spread of a dict: binds parameters by name
    Named(Rc<RillDict>),
}

impl RillTuple {
    /// Number of packed values
    pub fn len(&self) -> usize {
        match self {
            RillTuple::Positional(items) => items.len(),
            RillTuple::Named(fields) => fields.len(),
        }
    }

    /// True when nothing is packed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Callable values
pub enum Callable {
    /// Closure or block-closure written in Rill
    Script(ScriptCallable),
    /// Function provided by the host
    Application(ApplicationCallable),
}

/// Body of a script callable
#[derive(Clone)]
pub enum CallableBody {
    /// `|params| body`
    Closure(Rc<ClosureDef>),
    /// `{ ... }` in value position; `$` is its only parameter
    Block(Rc<Block>),
}

/// Closure created from source
#[derive(Clone)]
pub struct ScriptCallable {
    /// Parameters and body, shared with the AST
    pub body: CallableBody,
    /// Scope live at creation time; free variables resolve here at call time
    pub defining_scope: Rc<Scope>,
    /// Annotations on top of the stack when the closure was created
    pub annotations: Rc<RillDict>,
    /// Dict the closure was read from; becomes `$` when invoked
    pub bound_dict: Option<Rc<RillDict>>,
}

impl ScriptCallable {
    /// Declared parameters (empty for block-closures)
    pub fn params(&self) -> &[ClosureParam] {
        match &self.body {
            CallableBody::Closure(def) => &def.params,
            CallableBody::Block(_) => &[],
        }
    }

    /// True for block-closures, which bind their argument to `$`
    pub fn is_block(&self) -> bool {
        matches!(self.body, CallableBody::Block(_))
    }

    /// Copy of this closure bound to a dict
    pub fn bind(&self, dict: Rc<RillDict>) -> ScriptCallable {
        ScriptCallable {
            bound_dict: Some(dict),
            ..self.clone()
        }
    }
}

/// Host function wrapped as a value
#[derive(Clone)]
pub struct ApplicationCallable {
    /// Registered name
    pub name: String,
    /// Validated registration
    pub definition: Rc<HostFunctionDef>,
}

impl Callable {
    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        match self {
            Callable::Script(script) => script.params().len(),
            Callable::Application(app) => app.definition.params.len(),
        }
    }

    /// True for callables that run without explicit arguments
    /// (zero-parameter closures and block-closures)
    pub fn is_property(&self) -> bool {
        match self {
            Callable::Script(script) => script.params().is_empty(),
            Callable::Application(_) => false,
        }
    }

    /// Short description used in messages and call frames
    pub fn describe(&self) -> String {
        match self {
            Callable::Script(script) if script.is_block() => "<block>".to_string(),
            Callable::Script(script) => format!("<closure({} params)>", script.params().len()),
            Callable::Application(app) => format!("<function {}>", app.name),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl RillValue {
    /// Creates a string value
    pub fn string(s: impl Into<String>) -> Self {
        RillValue::String(s.into())
    }

    /// Creates a list value
    pub fn list(values: Vec<RillValue>) -> Self {
        RillValue::List(Rc::new(values))
    }

    /// Creates a dict value
    pub fn dict(fields: RillDict) -> Self {
        RillValue::Dict(Rc::new(fields))
    }

    /// Creates a dict from `(key, value)` pairs
    pub fn dict_from<K: Into<String>>(pairs: impl IntoIterator<Item = (K, RillValue)>) -> Self {
        RillValue::dict(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Wraps a callable
    pub fn callable(callable: Callable) -> Self {
        RillValue::Callable(Rc::new(callable))
    }

    /// Dynamic type tag
    pub fn type_of(&self) -> RillType {
        match self {
            RillValue::Null => RillType::Null,
            RillValue::Bool(_) => RillType::Bool,
            RillValue::Number(_) => RillType::Number,
            RillValue::String(_) => RillType::String,
            RillValue::List(_) => RillType::List,
            RillValue::Dict(_) => RillType::Dict,
            RillValue::Tuple(_) => RillType::Tuple,
            RillValue::Callable(_) => RillType::Closure,
        }
    }

    /// Type name as reported by `type` and in error messages
    pub fn type_name(&self) -> &'static str {
        self.type_of().name()
    }

    /// True for null
    pub fn is_null(&self) -> bool {
        matches!(self, RillValue::Null)
    }

    /// True for string, number and bool
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            RillValue::String(_) | RillValue::Number(_) | RillValue::Bool(_)
        )
    }

    /// Truthiness used by `filter`
    pub fn is_truthy(&self) -> bool {
        match self {
            RillValue::Null => false,
            RillValue::Bool(b) => *b,
            RillValue::Number(n) => *n != 0.0 && !n.is_nan(),
            RillValue::String(s) => !s.is_empty(),
            RillValue::List(items) => !items.is_empty(),
            RillValue::Dict(fields) => !fields.is_empty(),
            RillValue::Tuple(tuple) => !tuple.is_empty(),
            RillValue::Callable(_) => true,
        }
    }

    /// Boolean payload; conditions never coerce
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            RillValue::Bool(b) => Ok(*b),
            _ => Err(Error::type_mismatch("bool", self.type_name())),
        }
    }

    /// Numeric payload
    pub fn as_number(&self) -> Result<f64> {
        match self {
            RillValue::Number(n) => Ok(*n),
            _ => Err(Error::type_mismatch("number", self.type_name())),
        }
    }

    /// Numeric payload truncated to an integer index
    pub fn as_index(&self) -> Result<i64> {
        let n = self.as_number()?;
        if n.fract() != 0.0 || !n.is_finite() {
            return Err(Error::runtime(
                ErrorCode::TypeMismatch,
                format!("Expected an integer, got {}", format_number(n)),
            ));
        }
        Ok(n as i64)
    }

    /// String payload
    pub fn as_str(&self) -> Result<&str> {
        match self {
            RillValue::String(s) => Ok(s),
            _ => Err(Error::type_mismatch("string", self.type_name())),
        }
    }

    /// List payload
    pub fn as_list(&self) -> Result<&Rc<Vec<RillValue>>> {
        match self {
            RillValue::List(items) => Ok(items),
            _ => Err(Error::type_mismatch("list", self.type_name())),
        }
    }

    /// Dict payload
    pub fn as_dict(&self) -> Result<&Rc<RillDict>> {
        match self {
            RillValue::Dict(fields) => Ok(fields),
            _ => Err(Error::type_mismatch("dict", self.type_name())),
        }
    }

    /// Callable payload
    pub fn as_callable(&self) -> Result<&Rc<Callable>> {
        match self {
            RillValue::Callable(callable) => Ok(callable),
            _ => Err(Error::type_mismatch("closure", self.type_name())),
        }
    }

    /// Text used by interpolation and `log`: strings are unquoted, everything
    /// else uses its display form
    pub fn to_display_string(&self) -> String {
        match self {
            RillValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// JSON view of the value; callables become their description
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            RillValue::Null => Json::Null,
            RillValue::Bool(b) => Json::Bool(*b),
            RillValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    Json::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(Json::Number)
                        .unwrap_or(Json::Null)
                }
            }
            RillValue::String(s) => Json::String(s.clone()),
            RillValue::List(items) => Json::Array(items.iter().map(RillValue::to_json).collect()),
            RillValue::Tuple(RillTuple::Positional(items)) => {
                Json::Array(items.iter().map(RillValue::to_json).collect())
            }
            RillValue::Dict(fields) | RillValue::Tuple(RillTuple::Named(fields)) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            RillValue::Callable(callable) => Json::String(callable.describe()),
        }
    }

    /// Convert a JSON value into a Rill value
    pub fn from_json(json: &serde_json::Value) -> RillValue {
        use serde_json::Value as Json;
        match json {
            Json::Null => RillValue::Null,
            Json::Bool(b) => RillValue::Bool(*b),
            Json::Number(n) => RillValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => RillValue::String(s.clone()),
            Json::Array(items) => RillValue::list(items.iter().map(RillValue::from_json).collect()),
            Json::Object(fields) => RillValue::dict(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), RillValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Format a number the way Rill prints it: integral values without a
/// fractional part
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{}", n)
    }
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    match serde_json::to_string(s) {
        Ok(quoted) => f.write_str(&quoted),
        Err(_) => write!(f, "\"{}\"", s),
    }
}

impl fmt::Display for RillValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RillValue::Null => write!(f, "null"),
            RillValue::Bool(b) => write!(f, "{}", b),
            RillValue::Number(n) => f.write_str(&format_number(*n)),
            RillValue::String(s) => write_string(f, s),
            RillValue::List(items) | RillValue::Tuple(RillTuple::Positional(items)) => {
                if matches!(self, RillValue::Tuple(_)) {
                    write!(f, "*")?;
                }
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            RillValue::Dict(fields) | RillValue::Tuple(RillTuple::Named(fields)) => {
                if matches!(self, RillValue::Tuple(_)) {
                    write!(f, "*")?;
                }
                if fields.is_empty() {
                    return write!(f, "[:]");
                }
                write!(f, "[")?;
                for (i, (key, val)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, val)?;
                }
                write!(f, "]")
            }
            RillValue::Callable(callable) => f.write_str(&callable.describe()),
        }
    }
}

impl fmt::Debug for RillValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// Deep, type-aware equality; callables compare by identity
impl PartialEq for RillValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RillValue::Null, RillValue::Null) => true,
            (RillValue::Bool(a), RillValue::Bool(b)) => a == b,
            (RillValue::Number(a), RillValue::Number(b)) => a == b,
            (RillValue::String(a), RillValue::String(b)) => a == b,
            (RillValue::List(a), RillValue::List(b)) => a == b,
            (RillValue::Dict(a), RillValue::Dict(b)) => a == b,
            (
                RillValue::Tuple(RillTuple::Positional(a)),
                RillValue::Tuple(RillTuple::Positional(b)),
            ) => a == b,
            (RillValue::Tuple(RillTuple::Named(a)), RillValue::Tuple(RillTuple::Named(b))) => {
                a == b
            }
            (RillValue::Callable(a), RillValue::Callable(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Serialize for RillValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for RillValue {
    fn from(b: bool) -> Self {
        RillValue::Bool(b)
    }
}

impl From<f64> for RillValue {
    fn from(n: f64) -> Self {
        RillValue::Number(n)
    }
}

impl From<i64> for RillValue {
    fn from(n: i64) -> Self {
        RillValue::Number(n as f64)
    }
}

impl From<usize> for RillValue {
    fn from(n: usize) -> Self {
        RillValue::Number(n as f64)
    }
}

impl From<&str> for RillValue {
    fn from(s: &str) -> Self {
        RillValue::String(s.to_string())
    }
}

impl From<String> for RillValue {
    fn from(s: String) -> Self {
        RillValue::String(s)
    }
}

impl From<Vec<RillValue>> for RillValue {
    fn from(items: Vec<RillValue>) -> Self {
        RillValue::list(items)
    }
}
