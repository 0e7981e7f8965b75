//! Namespaced extension packages
//!
//! An extension is a bundle of host functions plus an optional `dispose`
//! hook. [`prefix_functions`] renames every function to `namespace::name`
//! and keeps the hook out of the callable map, so scripts can never call it.

use futures_util::future::LocalBoxFuture;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

use super::HostFunctionDef;
use crate::error::{Error, Result};

lazy_static! {
    static ref NAMESPACE: Option<Regex> = Regex::new(r"^[a-zA-Z0-9_-]+$").ok();
}

/// Cleanup run by the host when it is done with an extension
pub enum DisposeHook {
    /// Synchronous cleanup
    Sync(Box<dyn FnOnce()>),
    /// Asynchronous cleanup
    Async(Box<dyn FnOnce() -> LocalBoxFuture<'static, ()>>),
}

impl DisposeHook {
    /// Run the hook to completion
    pub async fn run(self) {
        match self {
            DisposeHook::Sync(hook) => hook(),
            DisposeHook::Async(hook) => hook().await,
        }
    }
}

impl fmt::Debug for DisposeHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisposeHook::Sync(_) => f.write_str("DisposeHook::Sync"),
            DisposeHook::Async(_) => f.write_str("DisposeHook::Async"),
        }
    }
}

/// Functions provided by an extension, keyed by unprefixed name
#[derive(Default)]
pub struct Extension {
    /// Callable functions
    pub functions: HashMap<String, HostFunctionDef>,
    /// Optional lifecycle hook
    pub dispose: Option<DisposeHook>,
}

impl Extension {
    /// Empty extension
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function
    pub fn with_function(mut self, name: impl Into<String>, def: HostFunctionDef) -> Self {
        self.functions.insert(name.into(), def);
        self
    }

    /// Set the dispose hook
    pub fn with_dispose(mut self, hook: DisposeHook) -> Self {
        self.dispose = Some(hook);
        self
    }
}

/// Extension after namespacing
pub struct PrefixedExtension {
    /// Functions keyed by `namespace::name`
    pub functions: HashMap<String, HostFunctionDef>,
    /// Lifecycle hook, never part of `functions`
    pub dispose: Option<DisposeHook>,
}

/// Prefix every function of `extension` with `namespace::`
pub fn prefix_functions(namespace: &str, extension: Extension) -> Result<PrefixedExtension> {
    let valid = NAMESPACE.as_ref().map_or(false, |re| re.is_match(namespace));
    if !valid {
        return Err(Error::registration(format!(
            "Invalid namespace `{}`: use letters, digits, `_` or `-`",
            namespace
        ))
        .with_context("namespace", namespace));
    }

    let functions = extension
        .functions
        .into_iter()
        .filter(|(name, _)| name != "dispose")
        .map(|(name, def)| (format!("{}::{}", namespace, name), def))
        .collect();

    Ok(PrefixedExtension {
        functions,
        dispose: extension.dispose,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::runtime::RillValue;
    use crate::tools::host_fn;
    use std::cell::Cell;
    use std::rc::Rc;

    fn noop() -> HostFunctionDef {
        host_fn(|_, _| Ok(RillValue::Null))
    }

    #[test]
    fn test_prefixes_names() {
        let ext = Extension::new()
            .with_function("read", noop())
            .with_function("write", noop());
        let prefixed = prefix_functions("fs", ext).unwrap();

        let mut names: Vec<_> = prefixed.functions.keys().cloned().collect();
        names.sort();
        assert_eq!(names, vec!["fs::read", "fs::write"]);
    }

    #[test]
    fn test_rejects_bad_namespaces() {
        for namespace in ["", "a b", "ns::x", "dots.are.bad"] {
            let err = prefix_functions(namespace, Extension::new()).err().unwrap();
            assert_eq!(err.code(), ErrorCode::InvalidRegistration);
        }
        assert!(prefix_functions("s3-prod_2", Extension::new()).is_ok());
    }

    #[test]
    fn test_dispose_is_kept_separate() {
        let disposed = Rc::new(Cell::new(false));
        let flag = disposed.clone();
        let ext = Extension::new()
            .with_function("dispose", noop())
            .with_function("list", noop())
            .with_dispose(DisposeHook::Sync(Box::new(move || flag.set(true))));

        let prefixed = prefix_functions("s3", ext).unwrap();
        assert!(!prefixed.functions.contains_key("s3::dispose"));
        assert_eq!(prefixed.functions.len(), 1);

        let hook = prefixed.dispose.unwrap();
        tokio_test::block_on(hook.run());
        assert!(disposed.get());
    }

    #[test]
    fn test_async_dispose() {
        let disposed = Rc::new(Cell::new(0));
        let counter = disposed.clone();
        let hook = DisposeHook::Async(Box::new(move || {
            Box::pin(async move { counter.set(counter.get() + 1) })
        }));
        tokio_test::block_on(hook.run());
        assert_eq!(disposed.get(), 1);
    }
}
