use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::value::{RillDict, RillValue};
use crate::error::{Error, ErrorCode, Result};
use crate::lexer::{SourceLocation, SourceSpan};
use crate::tools::{self, stdlib, HostFunctionDef, HostMethodDef};
use crate::types::RillType;

/// One lexical scope; variables are local, lookup walks outward
pub struct Scope {
    parent: Option<Rc<Scope>>,
    variables: RefCell<RillDict>,
    variable_types: RefCell<HashMap<String, RillType>>,
}

impl Scope {
    /// Creates a scope with no parent
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope {
            parent: None,
            variables: RefCell::new(RillDict::new()),
            variable_types: RefCell::new(HashMap::new()),
        })
    }

    /// Creates a nested scope
    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            parent: Some(parent.clone()),
            variables: RefCell::new(RillDict::new()),
            variable_types: RefCell::new(HashMap::new()),
        })
    }

    /// Enclosing scope
    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    /// Looks a variable up, innermost scope first
    pub fn get(&self, name: &str) -> Option<RillValue> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.variables.borrow().get(name) {
                return Some(value.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// True when any enclosing scope binds `name`
    pub fn has(&self, name: &str) -> bool {
        self.owner_of(name).is_some()
    }

    /// Locked type of a variable, if any
    pub fn type_of(&self, name: &str) -> Option<RillType> {
        let owner = self.owner_of(name)?;
        let types = owner.variable_types.borrow();
        types.get(name).copied()
    }

    /// Binds `name` in this scope, shadowing outer bindings
    pub fn define(&self, name: &str, value: RillValue) -> Result<()> {
        self.store(name, value)
    }

    /// Updates the nearest existing binding of `name`, or defines it here
    pub fn assign(&self, name: &str, value: RillValue) -> Result<()> {
        match self.owner_of(name) {
            Some(owner) => owner.store(name, value),
            None => self.store(name, value),
        }
    }

    /// Fix the type of a local variable before it is first stored
    pub fn lock_type(&self, name: &str, ty: RillType) {
        if ty != RillType::Any {
            self.variable_types.borrow_mut().insert(name.to_string(), ty);
        }
    }

    /// Snapshot of the variables bound directly in this scope
    pub fn locals(&self) -> RillDict {
        self.variables.borrow().clone()
    }

    /// Names visible from this scope, innermost first, without duplicates
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut scope = Some(self);
        while let Some(current) = scope {
            for name in current.variables.borrow().keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            scope = current.parent.as_deref();
        }
        names
    }

    fn owner_of(&self, name: &str) -> Option<&Scope> {
        let mut scope = self;
        loop {
            if scope.variables.borrow().contains_key(name) {
                return Some(scope);
            }
            scope = scope.parent.as_deref()?;
        }
    }

    fn store(&self, name: &str, value: RillValue) -> Result<()> {
        let actual = value.type_of();
        if actual != RillType::Null {
            let mut types = self.variable_types.borrow_mut();
            match types.get(name) {
                Some(locked) if !locked.accepts(actual) => {
                    return Err(Error::runtime(
                        ErrorCode::TypeMismatch,
                        format!(
                            "Cannot capture {} into ${}: variable is locked to {}",
                            actual, name, locked
                        ),
                    )
                    .with_context("name", name)
                    .with_context("expected", locked.name())
                    .with_context("got", actual.name()));
                }
                Some(_) => {}
                None => {
                    types.insert(name.to_string(), actual);
                }
            }
        }
        self.variables.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("variables", &self.variables.borrow().keys().collect::<Vec<_>>())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Cooperative cancellation flag shared between the host and a running script
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Creates a signal in the not-aborted state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the script stops at its next check
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`AbortSignal::abort`] has been called
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Diagnostic record of one active invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallFrame {
    /// Function name or closure description
    pub name: String,
    /// Call site
    pub location: Option<SourceLocation>,
}

/// Bounded ring of active call frames
#[derive(Debug)]
pub struct CallStack {
    frames: VecDeque<CallFrame>,
    max_depth: usize,
}

impl CallStack {
    /// Creates an empty stack holding at most `max_depth` frames
    pub fn new(max_depth: usize) -> Self {
        CallStack {
            frames: VecDeque::with_capacity(max_depth.min(64)),
            max_depth,
        }
    }

    /// Pushes a frame, dropping the oldest one when full
    pub fn push(&mut self, frame: CallFrame) {
        if self.frames.len() >= self.max_depth {
            if let Some(dropped) = self.frames.pop_front() {
                warn!(
                    frame = %dropped.name,
                    max_depth = self.max_depth,
                    "call stack full, evicting oldest frame"
                );
            }
        }
        self.frames.push_back(frame);
    }

    /// Pops the newest frame; a no-op once evicted frames would be reached
    pub fn pop(&mut self) -> Option<CallFrame> {
        self.frames.pop_back()
    }

    /// Number of recorded frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames from oldest to newest
    pub fn frames(&self) -> Vec<CallFrame> {
        self.frames.iter().cloned().collect()
    }

    /// JSON form stored in error context bags
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.frames()).unwrap_or(serde_json::Value::Null)
    }
}

/// Log record passed to `on_log_event`
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// Logged value
    pub value: RillValue,
    /// Display text of the value
    pub message: String,
    /// Call depth at the time of logging
    pub call_depth: usize,
}

/// Step record passed to the step observers
#[derive(Debug, Clone)]
pub struct StepEvent {
    /// Zero-based statement index
    pub index: usize,
    /// Number of top-level statements
    pub total: usize,
    /// Span of the statement
    pub span: SourceSpan,
    /// Statement result (`on_step_end` only)
    pub value: Option<RillValue>,
}

/// Capture record passed to `on_capture`
#[derive(Debug, Clone, Serialize)]
pub struct CaptureEvent {
    /// Variable name without `$`
    pub name: String,
    /// Captured value
    pub value: RillValue,
}

/// Host callbacks
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Receives every value passed to `log`
    pub on_log: Option<Rc<dyn Fn(&RillValue)>>,
    /// Receives a structured record for every `log` call
    pub on_log_event: Option<Rc<dyn Fn(&LogEvent)>>,
}

/// Execution observers
#[derive(Clone, Default)]
pub struct Observability {
    /// Before each top-level statement
    pub on_step_start: Option<Rc<dyn Fn(&StepEvent)>>,
    /// After each top-level statement
    pub on_step_end: Option<Rc<dyn Fn(&StepEvent)>>,
    /// When execution fails
    pub on_error: Option<Rc<dyn Fn(&Error)>>,
    /// On every variable capture
    pub on_capture: Option<Rc<dyn Fn(&CaptureEvent)>>,
}

/// File/JSON configurable limits and policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Per host call timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Call-stack ring size
    pub max_call_stack_depth: usize,
    /// Nested script and host calls allowed before `RILL-R010`
    pub max_eval_depth: usize,
    /// Loop iteration limit when no `^(limit: N)` annotation is given
    pub max_loop_iterations: usize,
    /// Regex patterns; a statement producing a matching string fails
    pub auto_exceptions: Vec<String>,
    /// Reject host registrations without descriptions
    pub require_descriptions: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            timeout_ms: None,
            max_call_stack_depth: 100,
            max_eval_depth: 1000,
            max_loop_iterations: 10_000_000,
            auto_exceptions: Vec::new(),
            require_descriptions: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::registration(format!("Invalid runtime config: {}", e)))
    }
}

/// Options for [`RuntimeContext::new`]; explicit options override `config`
#[derive(Clone, Default)]
pub struct RuntimeOptions {
    /// Initial variables
    pub variables: RillDict,
    /// Host functions; override built-ins of the same name
    pub functions: HashMap<String, HostFunctionDef>,
    /// Host methods; override built-ins of the same name
    pub methods: HashMap<String, HostMethodDef>,
    /// Log callbacks
    pub callbacks: Callbacks,
    /// Step, error and capture observers
    pub observability: Observability,
    /// Additional auto-exception patterns
    pub auto_exceptions: Vec<String>,
    /// Per host call timeout
    pub timeout: Option<Duration>,
    /// Cancellation flag
    pub signal: Option<AbortSignal>,
    /// Call-stack ring size
    pub max_call_stack_depth: Option<usize>,
    /// Nesting limit for calls, overriding the config
    pub max_eval_depth: Option<usize>,
    /// Reject host registrations without descriptions
    pub require_descriptions: Option<bool>,
    /// Initial `$`
    pub pipe_value: Option<RillValue>,
    /// Base configuration
    pub config: RuntimeConfig,
}

impl RuntimeOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an initial variable
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<RillValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Register a host function
    pub fn with_function(mut self, name: impl Into<String>, def: HostFunctionDef) -> Self {
        self.functions.insert(name.into(), def);
        self
    }

    /// Register several host functions, e.g. a prefixed extension
    pub fn with_functions(
        mut self,
        functions: impl IntoIterator<Item = (String, HostFunctionDef)>,
    ) -> Self {
        self.functions.extend(functions);
        self
    }

    /// Register a host method
    pub fn with_method(mut self, name: impl Into<String>, def: HostMethodDef) -> Self {
        self.methods.insert(name.into(), def);
        self
    }

    /// Receive logged values
    pub fn on_log(mut self, f: impl Fn(&RillValue) + 'static) -> Self {
        self.callbacks.on_log = Some(Rc::new(f));
        self
    }

    /// Receive structured log records
    pub fn on_log_event(mut self, f: impl Fn(&LogEvent) + 'static) -> Self {
        self.callbacks.on_log_event = Some(Rc::new(f));
        self
    }

    /// Observe statement starts
    pub fn on_step_start(mut self, f: impl Fn(&StepEvent) + 'static) -> Self {
        self.observability.on_step_start = Some(Rc::new(f));
        self
    }

    /// Observe statement ends
    pub fn on_step_end(mut self, f: impl Fn(&StepEvent) + 'static) -> Self {
        self.observability.on_step_end = Some(Rc::new(f));
        self
    }

    /// Observe failures
    pub fn on_error(mut self, f: impl Fn(&Error) + 'static) -> Self {
        self.observability.on_error = Some(Rc::new(f));
        self
    }

    /// Observe captures
    pub fn on_capture(mut self, f: impl Fn(&CaptureEvent) + 'static) -> Self {
        self.observability.on_capture = Some(Rc::new(f));
        self
    }

    /// Add an auto-exception pattern
    pub fn with_auto_exception(mut self, pattern: impl Into<String>) -> Self {
        self.auto_exceptions.push(pattern.into());
        self
    }

    /// Set the host call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation flag
    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Set the call-stack ring size
    pub fn with_max_call_stack_depth(mut self, depth: usize) -> Self {
        self.max_call_stack_depth = Some(depth);
        self
    }

    /// Set how deeply script and host calls may nest
    pub fn with_max_eval_depth(mut self, depth: usize) -> Self {
        self.max_eval_depth = Some(depth);
        self
    }

    /// Require descriptions on host registrations
    pub fn require_descriptions(mut self, required: bool) -> Self {
        self.require_descriptions = Some(required);
        self
    }

    /// Bind the initial `$`
    pub fn with_pipe_value(mut self, value: impl Into<RillValue>) -> Self {
        self.pipe_value = Some(value.into());
        self
    }

    /// Replace the base configuration
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }
}

/// Live nested call; releases its depth slot on drop
pub(crate) struct DepthGuard(Rc<SharedState>);

impl Drop for DepthGuard {
    fn drop(&mut self) {
        let depth = self.0.eval_depth.get();
        self.0.eval_depth.set(depth.saturating_sub(1));
    }
}

/// State shared by every scope of one execution
pub(crate) struct SharedState {
    pub(crate) functions: HashMap<String, Rc<HostFunctionDef>>,
    pub(crate) methods: HashMap<String, Rc<HostMethodDef>>,
    pub(crate) callbacks: Callbacks,
    pub(crate) observability: Observability,
    pub(crate) auto_exceptions: Vec<Regex>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) signal: Option<AbortSignal>,
    pub(crate) call_stack: RefCell<CallStack>,
    pub(crate) eval_depth: Cell<usize>,
    pub(crate) max_eval_depth: usize,
    pub(crate) annotation_stack: RefCell<Vec<Rc<RillDict>>>,
    pub(crate) max_loop_iterations: usize,
}

/// Everything evaluation needs: scope chain, shared tables and the current `$`
///
/// Contexts are cheap to clone. Sub-evaluations that rebind `$` get a new
/// context from [`RuntimeContext::with_pipe`], leaving the caller's intact.
#[derive(Clone)]
pub struct RuntimeContext {
    pub(crate) scope: Rc<Scope>,
    pub(crate) shared: Rc<SharedState>,
    pub(crate) pipe_value: Option<RillValue>,
    pub(crate) accumulator: Option<RillValue>,
}

impl RuntimeContext {
    /// Validate `options` and build a root context
    pub fn new(options: RuntimeOptions) -> Result<Self> {
        let config = options.config;
        let require_descriptions = options
            .require_descriptions
            .unwrap_or(config.require_descriptions);
        let max_call_stack_depth = options
            .max_call_stack_depth
            .unwrap_or(config.max_call_stack_depth);
        if max_call_stack_depth == 0 {
            return Err(Error::registration(
                "max_call_stack_depth must be at least 1",
            ));
        }
        let max_eval_depth = options.max_eval_depth.unwrap_or(config.max_eval_depth);
        if max_eval_depth == 0 {
            return Err(Error::registration("max_eval_depth must be at least 1"));
        }

        let mut functions: HashMap<String, Rc<HostFunctionDef>> = stdlib::functions()
            .into_iter()
            .map(|(name, def)| (name, Rc::new(def)))
            .collect();
        for (name, def) in options.functions {
            tools::validate_function(&name, &def, require_descriptions)?;
            functions.insert(name, Rc::new(def));
        }

        let mut methods: HashMap<String, Rc<HostMethodDef>> = stdlib::methods()
            .into_iter()
            .map(|(name, def)| (name, Rc::new(def)))
            .collect();
        for (name, def) in options.methods {
            tools::validate_method(&name, &def, require_descriptions)?;
            methods.insert(name, Rc::new(def));
        }

        let auto_exceptions = config
            .auto_exceptions
            .iter()
            .chain(options.auto_exceptions.iter())
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    Error::registration(format!("Invalid auto-exception pattern: {}", e))
                        .with_context("pattern", pattern.as_str())
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let scope = Scope::root();
        for (name, value) in options.variables {
            if !tools::is_identifier(&name) {
                return Err(Error::registration(format!("Invalid variable name `{}`", name)));
            }
            scope.define(&name, value)?;
        }

        let shared = SharedState {
            functions,
            methods,
            callbacks: options.callbacks,
            observability: options.observability,
            auto_exceptions,
            timeout: options
                .timeout
                .or_else(|| config.timeout_ms.map(Duration::from_millis)),
            signal: options.signal,
            call_stack: RefCell::new(CallStack::new(max_call_stack_depth)),
            eval_depth: Cell::new(0),
            max_eval_depth,
            annotation_stack: RefCell::new(Vec::new()),
            max_loop_iterations: config.max_loop_iterations,
        };

        Ok(RuntimeContext {
            scope,
            shared: Rc::new(shared),
            pipe_value: options.pipe_value,
            accumulator: None,
        })
    }

    /// Same scope, new `$`
    pub fn with_pipe(&self, value: RillValue) -> Self {
        RuntimeContext {
            pipe_value: Some(value),
            ..self.clone()
        }
    }

    /// Same scope and `$`, new `$@`
    pub fn with_accumulator(&self, accumulator: Option<RillValue>) -> Self {
        RuntimeContext {
            accumulator,
            ..self.clone()
        }
    }

    /// Nested scope, same `$`
    pub fn child(&self) -> Self {
        self.in_scope(Scope::child(&self.scope))
    }

    /// Same shared state and `$`, different scope
    pub fn in_scope(&self, scope: Rc<Scope>) -> Self {
        RuntimeContext {
            scope,
            ..self.clone()
        }
    }

    /// Current `$`, if bound
    pub fn pipe_value(&self) -> Option<&RillValue> {
        self.pipe_value.as_ref()
    }

    /// Current scope
    pub fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }

    /// Look a variable up through the scope chain
    pub fn get_variable(&self, name: &str) -> Option<RillValue> {
        self.scope.get(name)
    }

    /// Capture semantics: update the nearest binding or define locally
    pub fn set_variable(&self, name: &str, value: RillValue) -> Result<()> {
        self.scope.assign(name, value)
    }

    /// Variables bound directly in this context's scope
    pub fn variables(&self) -> RillDict {
        self.scope.locals()
    }

    /// True when a function of that name is registered
    pub fn has_function(&self, name: &str) -> bool {
        self.shared.functions.contains_key(name)
    }

    /// Registered function names, sorted
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.shared.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Current call-stack depth
    pub fn call_depth(&self) -> usize {
        self.shared.call_stack.borrow().depth()
    }

    /// Fail with `RILL-R009` once the abort signal is raised
    pub fn check_abort(&self) -> Result<()> {
        match &self.shared.signal {
            Some(signal) if signal.is_aborted() => {
                warn!("execution aborted by host signal");
                Err(Error::runtime(ErrorCode::Aborted, "Execution aborted"))
            }
            _ => Ok(()),
        }
    }

    /// Deliver a value to the log callbacks
    pub fn log(&self, value: &RillValue) {
        let callbacks = &self.shared.callbacks;
        if let Some(on_log) = &callbacks.on_log {
            on_log(value);
        }
        if let Some(on_log_event) = &callbacks.on_log_event {
            on_log_event(&LogEvent {
                value: value.clone(),
                message: value.to_display_string(),
                call_depth: self.call_depth(),
            });
        }
    }

    pub(crate) fn push_frame(&self, name: String, location: Option<SourceLocation>) {
        self.shared
            .call_stack
            .borrow_mut()
            .push(CallFrame { name, location });
    }

    pub(crate) fn pop_frame(&self) {
        self.shared.call_stack.borrow_mut().pop();
    }

    /// Count one more nested call, failing with `RILL-R010` past the limit.
    /// The depth drops again when the guard is dropped.
    pub(crate) fn enter_call(&self, name: &str) -> Result<DepthGuard> {
        let depth = self.shared.eval_depth.get();
        let limit = self.shared.max_eval_depth;
        if depth >= limit {
            warn!(function = name, limit, "call depth limit reached");
            return Err(Error::runtime(
                ErrorCode::RuntimeLimitExceeded,
                format!("Call depth exceeded {} nested calls", limit),
            )
            .with_context("limit", limit as u64)
            .with_context("function", name));
        }
        self.shared.eval_depth.set(depth + 1);
        Ok(DepthGuard(self.shared.clone()))
    }

    /// Record the call stack on an error raised inside a call, once
    pub(crate) fn attach_call_stack(&self, err: Error) -> Error {
        let has_stack = err
            .context()
            .map_or(true, |context| context.contains_key("callStack"));
        if has_stack {
            return err;
        }
        let stack = self.shared.call_stack.borrow().to_json();
        err.with_context("callStack", stack)
    }

    pub(crate) fn current_annotations(&self) -> Rc<RillDict> {
        self.shared
            .annotation_stack
            .borrow()
            .last()
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn push_annotations(&self, annotations: RillDict) {
        self.shared
            .annotation_stack
            .borrow_mut()
            .push(Rc::new(annotations));
    }

    pub(crate) fn pop_annotations(&self) {
        self.shared.annotation_stack.borrow_mut().pop();
    }

    /// Iteration limit from `^(limit: N)`, else the configured default
    pub(crate) fn iteration_limit(&self) -> Result<usize> {
        match self.current_annotations().get("limit") {
            Some(limit) => {
                let n = limit.as_index().map_err(|_| {
                    Error::type_mismatch("number", limit.type_name())
                        .with_context("annotation", "limit")
                })?;
                Ok(n.max(0) as usize)
            }
            None => Ok(self.shared.max_loop_iterations),
        }
    }

    pub(crate) fn notify_capture(&self, name: &str, value: &RillValue) {
        if let Some(on_capture) = &self.shared.observability.on_capture {
            on_capture(&CaptureEvent {
                name: name.to_string(),
                value: value.clone(),
            });
        }
    }

    pub(crate) fn observability(&self) -> &Observability {
        &self.shared.observability
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("scope", &self.scope)
            .field("pipe_value", &self.pipe_value)
            .field("functions", &self.shared.functions.len())
            .finish()
    }
}
