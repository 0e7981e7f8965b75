//! Runtime execution for Rill scripts using tree-walking evaluation

mod context;
mod evaluator;
mod execution;
mod value;

pub use context::{
    AbortSignal, CallFrame, CallStack, Callbacks, CaptureEvent, LogEvent, Observability,
    RuntimeConfig, RuntimeContext, RuntimeOptions, Scope, StepEvent,
};
pub use evaluator::Evaluator;
pub use execution::{execute, ExecutionResult, StepResult, Stepper};
pub use value::{
    format_number, ApplicationCallable, Callable, CallableBody, RillDict, RillTuple, RillValue,
    ScriptCallable,
};
