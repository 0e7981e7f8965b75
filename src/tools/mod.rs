//! Host function system for Rill
//!
//! Hosts extend the language with functions (`name(args)`, `ns::name`) and
//! methods (`.name(args)`). Both are described by a [`HostFunctionDef`]:
//! parameter list, optional return type and the callable itself. Definitions
//! are validated once, when the [`RuntimeContext`] is created, and argument
//! lists are checked against them at every call.

pub mod extension;
pub mod stdlib;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::future::Future;
use std::rc::Rc;

use crate::error::{Error, ErrorCode, Result};
use crate::runtime::{RillValue, RuntimeContext};
use crate::types::RillType;

pub use extension::{prefix_functions, DisposeHook, Extension, PrefixedExtension};

/// A function the host exposes to scripts
///
/// Calls run on the evaluator's task; implementations may await I/O. The
/// context gives access to callbacks and variables of the calling scope.
#[async_trait(?Send)]
pub trait HostFunction {
    /// Invoke the function with validated arguments
    async fn call(&self, args: Vec<RillValue>, ctx: &RuntimeContext) -> Result<RillValue>;
}

struct SyncHostFn<F>(F);

#[async_trait(?Send)]
impl<F> HostFunction for SyncHostFn<F>
where
    F: Fn(&[RillValue], &RuntimeContext) -> Result<RillValue>,
{
    async fn call(&self, args: Vec<RillValue>, ctx: &RuntimeContext) -> Result<RillValue> {
        (self.0)(&args, ctx)
    }
}

struct AsyncHostFn<F>(F);

#[async_trait(?Send)]
impl<F, Fut> HostFunction for AsyncHostFn<F>
where
    F: Fn(Vec<RillValue>, RuntimeContext) -> Fut,
    Fut: Future<Output = Result<RillValue>>,
{
    async fn call(&self, args: Vec<RillValue>, ctx: &RuntimeContext) -> Result<RillValue> {
        (self.0)(args, ctx.clone()).await
    }
}

/// Wrap a synchronous closure as an untyped, variadic host function
pub fn host_fn<F>(f: F) -> HostFunctionDef
where
    F: Fn(&[RillValue], &RuntimeContext) -> Result<RillValue> + 'static,
{
    HostFunctionDef::new(SyncHostFn(f))
}

/// Wrap an async closure as an untyped, variadic host function
pub fn async_host_fn<F, Fut>(f: F) -> HostFunctionDef
where
    F: Fn(Vec<RillValue>, RuntimeContext) -> Fut + 'static,
    Fut: Future<Output = Result<RillValue>> + 'static,
{
    HostFunctionDef::new(AsyncHostFn(f))
}

/// Declared parameter of a host function
#[derive(Debug, Clone)]
pub struct HostParam {
    /// Parameter name
    pub name: String,
    /// Required type; `None` accepts anything
    pub ty: Option<RillType>,
    /// Value used when the argument is omitted
    pub default: Option<RillValue>,
    /// Human-readable description
    pub description: Option<String>,
}

impl HostParam {
    /// Untyped, required parameter
    pub fn new(name: impl Into<String>) -> Self {
        HostParam {
            name: name.into(),
            ty: None,
            default: None,
            description: None,
        }
    }

    /// Typed, required parameter
    pub fn typed(name: impl Into<String>, ty: RillType) -> Self {
        HostParam {
            ty: Some(ty),
            ..HostParam::new(name)
        }
    }

    /// Make the parameter optional
    pub fn with_default(mut self, value: impl Into<RillValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Host function registration
#[derive(Clone)]
pub struct HostFunctionDef {
    /// Declared parameters; empty means untyped and variadic
    pub params: Vec<HostParam>,
    /// The implementation
    pub function: Rc<dyn HostFunction>,
    /// Human-readable description
    pub description: Option<String>,
    /// Declared return type, enforced after each call
    pub return_type: Option<RillType>,
}

impl HostFunctionDef {
    /// Registration for an implementation with no declared parameters
    pub fn new(function: impl HostFunction + 'static) -> Self {
        HostFunctionDef {
            params: Vec::new(),
            function: Rc::new(function),
            description: None,
            return_type: None,
        }
    }

    /// Append a parameter
    pub fn with_param(mut self, param: HostParam) -> Self {
        self.params.push(param);
        self
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare the return type
    pub fn returns(mut self, ty: RillType) -> Self {
        self.return_type = Some(ty);
        self
    }

    /// Check `args` against the declared parameters, filling defaults.
    ///
    /// Functions without declared parameters receive the arguments unchanged.
    pub fn bind_arguments(&self, callee: &str, mut args: Vec<RillValue>) -> Result<Vec<RillValue>> {
        if self.params.is_empty() {
            return Ok(args);
        }
        if args.len() > self.params.len() {
            return Err(Error::invalid_arguments(
                callee,
                format!(
                    "expected at most {} arguments, got {}",
                    self.params.len(),
                    args.len()
                ),
            ));
        }

        for (index, param) in self.params.iter().enumerate() {
            if index >= args.len() {
                match &param.default {
                    Some(default) => args.push(default.clone()),
                    None => {
                        return Err(Error::invalid_arguments(
                            callee,
                            format!("missing argument `{}`", param.name),
                        ))
                    }
                }
            }
            if let Some(ty) = param.ty {
                let actual = args[index].type_of();
                if !ty.accepts(actual) {
                    return Err(Error::invalid_arguments(
                        callee,
                        format!("`{}` expects {}, got {}", param.name, ty, actual),
                    )
                    .with_context("param", param.name.as_str()));
                }
            }
        }
        Ok(args)
    }

    /// Enforce the declared return type
    pub fn check_return(&self, callee: &str, value: &RillValue) -> Result<()> {
        match self.return_type {
            Some(ty) if !ty.accepts(value.type_of()) => Err(Error::type_mismatch(
                ty,
                value.type_name(),
            )
            .with_context("callee", callee)),
            _ => Ok(()),
        }
    }
}

/// Host method registration
///
/// The receiver is passed as the first argument; `params` describe the
/// arguments after it.
#[derive(Clone)]
pub struct HostMethodDef {
    /// Receiver types the method applies to; empty accepts any receiver
    pub receivers: Vec<RillType>,
    /// Parameters (after the receiver) and implementation
    pub function: HostFunctionDef,
}

impl HostMethodDef {
    /// Method applicable to any receiver
    pub fn new(function: HostFunctionDef) -> Self {
        HostMethodDef {
            receivers: Vec::new(),
            function,
        }
    }

    /// Restrict the receiver types
    pub fn on(mut self, receivers: &[RillType]) -> Self {
        self.receivers = receivers.to_vec();
        self
    }

    /// True when the method can be called on `receiver`
    pub fn applies_to(&self, receiver: &RillValue) -> bool {
        self.receivers.is_empty()
            || self
                .receivers
                .iter()
                .any(|ty| ty.accepts(receiver.type_of()))
    }
}

lazy_static! {
    static ref FUNCTION_NAME: Option<Regex> =
        Regex::new(r"^([a-zA-Z0-9_-]+::)*[A-Za-z_][A-Za-z0-9_]*$").ok();
    static ref IDENTIFIER: Option<Regex> = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok();
}

/// True for `name` and `namespace::name`
pub fn is_valid_function_name(name: &str) -> bool {
    FUNCTION_NAME.as_ref().map_or(false, |re| re.is_match(name))
}

/// True for plain identifiers (variables, methods, parameters)
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.as_ref().map_or(false, |re| re.is_match(name))
}

/// Validate a function registration
pub fn validate_function(
    name: &str,
    def: &HostFunctionDef,
    require_descriptions: bool,
) -> Result<()> {
    if !is_valid_function_name(name) {
        return Err(Error::registration(format!(
            "Invalid function name `{}`: expected `name` or `namespace::name`",
            name
        ))
        .with_context("name", name));
    }
    validate_signature(name, def, require_descriptions)
}

/// Validate a method registration
pub fn validate_method(name: &str, def: &HostMethodDef, require_descriptions: bool) -> Result<()> {
    if !is_identifier(name) {
        return Err(
            Error::registration(format!("Invalid method name `{}`", name)).with_context("name", name),
        );
    }
    validate_signature(name, &def.function, require_descriptions)
}

fn validate_signature(name: &str, def: &HostFunctionDef, require_descriptions: bool) -> Result<()> {
    if require_descriptions && def.description.as_deref().map_or(true, str::is_empty) {
        return Err(
            Error::registration(format!("Function `{}` has no description", name))
                .with_context("name", name),
        );
    }

    let mut seen_default = false;
    for param in &def.params {
        if !is_identifier(&param.name) {
            return Err(Error::registration(format!(
                "Function `{}` has invalid parameter name `{}`",
                name, param.name
            )));
        }
        if require_descriptions && param.description.as_deref().map_or(true, str::is_empty) {
            return Err(Error::registration(format!(
                "Parameter `{}` of `{}` has no description",
                param.name, name
            ))
            .with_context("name", name));
        }
        match (&param.default, param.ty) {
            (Some(default), Some(ty)) if !ty.accepts(default.type_of()) => {
                return Err(Error::runtime(
                    ErrorCode::InvalidRegistration,
                    format!(
                        "Default for `{}` of `{}` is {}, declared {}",
                        param.name,
                        name,
                        default.type_name(),
                        ty
                    ),
                )
                .with_context("name", name)
                .with_context("param", param.name.as_str()));
            }
            (Some(_), _) => seen_default = true,
            (None, _) if seen_default => {
                return Err(Error::registration(format!(
                    "Required parameter `{}` of `{}` follows an optional one",
                    param.name, name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
