//! # Rill - an embeddable pipe-oriented scripting language
//!
//! Rill is a small, sandboxed language for host applications that run
//! data-transforming pipelines written by users or generated by LLMs. Scripts
//! can only touch what the host hands them: variables, host functions and
//! methods. Execution is deterministic and observable statement by statement.
//!
//! ## Features
//!
//! - **Pipes** - values flow left to right through `->`, the current value is `$`
//! - **Structural control flow** - `?`/`!` conditionals, `@` loops, `break`/`return`
//! - **Closures** with late-bound defining scopes
//! - **Collections** - `each`, `map`, `fold`, `filter` over lists, strings and dicts
//! - **Dispatch tables** - piping into a dict literal selects an entry by key
//! - **Stable error codes** - `RILL-L*`, `RILL-P*` and `RILL-R*` with locations
//! - **Sandboxing** - loop and call-depth limits, host-call timeouts, cooperative abort
//!
//! ## Quick Start
//!
//! ```rust
//! use rill::{execute, host_fn, parse, RillValue, RuntimeContext, RuntimeOptions};
//!
//! # fn main() -> rill::Result<()> {
//! let greet = host_fn(|args, _| {
//!     Ok(RillValue::from(format!("Hello, {}!", args[0].as_str()?)))
//! });
//! let ctx = RuntimeContext::new(RuntimeOptions::new().with_function("greet", greet))?;
//!
//! let script = parse(r#""World" -> greet"#)?;
//! let result = tokio_test::block_on(execute(&script, &ctx))?;
//!
//! assert_eq!(result.value, RillValue::from("Hello, World!"));
//! # Ok(())
//! # }
//! ```
//!
//! ### Variables and Loops
//!
//! ```rust
//! use rill::{execute, parse, RillValue, RuntimeContext, RuntimeOptions};
//!
//! # fn main() -> rill::Result<()> {
//! let script = parse(
//!     r#"
//! [1, 2, 3, 4] -> $xs
//! $xs -> filter { ($ % 2) == 0 } -> map { $ * 10 } -> $evens
//! $xs -> fold(0) { $@ + $ }
//! "#,
//! )?;
//! let ctx = RuntimeContext::new(RuntimeOptions::new())?;
//! let result = tokio_test::block_on(execute(&script, &ctx))?;
//!
//! assert_eq!(result.value, RillValue::Number(10.0));
//! assert_eq!(
//!     result.variables["evens"],
//!     RillValue::from(vec![RillValue::from(20i64), RillValue::from(40i64)])
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! source → Lexer → Tokens → Parser → Script → Evaluator(RuntimeContext) → ExecutionResult
//! ```
//!
//! - [`tokenize`] - source text to tokens
//! - [`parse`] / [`parse_with_recovery`] - tokens to a [`Script`]
//! - [`execute`] / [`Stepper`] - run a script against a [`RuntimeContext`]
//! - [`RillValue`] - runtime values
//! - [`HostFunctionDef`] / [`HostMethodDef`] - host-provided callables
//!
//! ## Error Handling
//!
//! Every failure carries a stable code and, where known, a source location:
//!
//! ```rust
//! # use rill::{execute, parse, ErrorCode, RuntimeContext, RuntimeOptions};
//! let script = parse("5 / 0").unwrap();
//! let ctx = RuntimeContext::new(RuntimeOptions::new()).unwrap();
//!
//! let err = tokio_test::block_on(execute(&script, &ctx)).unwrap_err();
//! assert_eq!(err.code(), ErrorCode::DivisionByZero);
//! assert_eq!(err.code().as_str(), "RILL-R005");
//! assert_eq!(err.location().map(|loc| loc.column), Some(3));
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events (`debug` per statement and host call,
//! `trace` per pipe step, `warn` for timeouts, aborts and evicted call frames)
//! and never installs a subscriber.

#![warn(missing_docs)]

/// Version of the Rill interpreter
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
mod stack;
pub mod tools;
pub mod types;

// Re-export main types
pub use error::{Error, ErrorCode, Result};
pub use lexer::{tokenize, SourceLocation, SourceSpan, Token, TokenKind};
pub use parser::{parse, parse_with_recovery, ParseOutcome, Script};
pub use runtime::{
    execute, AbortSignal, ExecutionResult, RillValue, RuntimeConfig, RuntimeContext,
    RuntimeOptions, StepResult, Stepper,
};
pub use tools::{
    async_host_fn, host_fn, prefix_functions, DisposeHook, Extension, HostFunction,
    HostFunctionDef, HostMethodDef, HostParam,
};
pub use types::RillType;
