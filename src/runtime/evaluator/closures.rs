//! Closures, host functions and methods

use futures_util::future::LocalBoxFuture;
use std::rc::Rc;
use tracing::{debug, warn};

use super::{Evaluator, Flow, Signal};
use crate::error::{Error, ErrorCode, Result};
use crate::lexer::SourceSpan;
use crate::parser::{Block, ClosureCall, ClosureDef, Expr, HostCall, MethodCall};
use crate::runtime::context::{RuntimeContext, Scope};
use crate::runtime::value::{
    Callable, CallableBody, RillDict, RillTuple, RillValue, ScriptCallable,
};
use crate::stack::on_sufficient_stack;
use crate::tools::{HostFunctionDef, HostParam};

/// Arguments a callable receives when it is handed the piped value
/// implicitly: zero-parameter closures read `$` instead.
pub(crate) fn implicit_args(callable: &Callable, piped: RillValue) -> Vec<RillValue> {
    match callable {
        Callable::Script(script) if !script.is_block() && script.params().is_empty() => Vec::new(),
        _ => vec![piped],
    }
}

impl Evaluator {
    pub(super) fn make_closure(&self, def: &Rc<ClosureDef>, ctx: &RuntimeContext) -> RillValue {
        self.script_callable(CallableBody::Closure(def.clone()), ctx)
    }

    pub(super) fn make_block_closure(&self, block: &Rc<Block>, ctx: &RuntimeContext) -> RillValue {
        self.script_callable(CallableBody::Block(block.clone()), ctx)
    }

    fn script_callable(&self, body: CallableBody, ctx: &RuntimeContext) -> RillValue {
        RillValue::callable(Callable::Script(ScriptCallable {
            body,
            defining_scope: ctx.scope.clone(),
            annotations: ctx.current_annotations(),
            bound_dict: None,
        }))
    }

    /// Run a block's statements in a nested scope
    pub(super) async fn exec_block(&self, block: &Block, ctx: &RuntimeContext) -> Flow<RillValue> {
        let inner = ctx.child();
        self.exec_statements(&block.statements, &inner).await
    }

    /// Invoke any callable value; `return` inside a script closure ends the call
    pub(crate) fn invoke_callable<'a>(
        &'a self,
        callable: Rc<Callable>,
        args: Vec<RillValue>,
        ctx: &'a RuntimeContext,
        span: SourceSpan,
    ) -> LocalBoxFuture<'a, Flow<RillValue>> {
        on_sufficient_stack(async move {
            match &*callable {
                Callable::Application(app) => {
                    let value = self
                        .call_host(&app.name, &app.definition, args, ctx, span)
                        .await?;
                    Ok(value)
                }
                Callable::Script(script) => {
                    self.call_script(script, &callable.describe(), args, ctx, span)
                        .await
                }
            }
        })
    }

    async fn call_script(
        &self,
        script: &ScriptCallable,
        name: &str,
        args: Vec<RillValue>,
        ctx: &RuntimeContext,
        span: SourceSpan,
    ) -> Flow<RillValue> {
        ctx.check_abort()?;

        let scope = Scope::child(&script.defining_scope);
        let pipe = match (&script.body, &script.bound_dict) {
            (CallableBody::Block(_), _) if !args.is_empty() => args.first().cloned(),
            (_, Some(dict)) => Some(RillValue::Dict(dict.clone())),
            _ => ctx.pipe_value.clone(),
        };
        let call_ctx = RuntimeContext {
            pipe_value: pipe,
            accumulator: None,
            ..ctx.in_scope(scope.clone())
        };

        if let CallableBody::Closure(def) = &script.body {
            self.bind_params(def, name, args, &scope, &call_ctx).await?;
        }

        let _depth = ctx.enter_call(name).map_err(|err| err.at(span.start))?;
        ctx.push_frame(name.to_string(), Some(span.start));
        let result = match &script.body {
            CallableBody::Block(block) => self.exec_statements(&block.statements, &call_ctx).await,
            CallableBody::Closure(def) => match &def.body {
                Expr::Block(block) => self.exec_statements(&block.statements, &call_ctx).await,
                body => self.eval_expr(body, &call_ctx).await,
            },
        };
        let result = result.map_err(|signal| match signal {
            Signal::Fault(err) => Signal::Fault(ctx.attach_call_stack(err)),
            other => other,
        });
        ctx.pop_frame();

        match result {
            Err(Signal::Return(value)) => Ok(value),
            other => other,
        }
    }

    /// Bind arguments to declared parameters, evaluating defaults in the
    /// call scope. A lone tuple argument spreads by position or by name.
    async fn bind_params(
        &self,
        def: &ClosureDef,
        name: &str,
        args: Vec<RillValue>,
        scope: &Rc<Scope>,
        call_ctx: &RuntimeContext,
    ) -> Flow<()> {
        let (positional, named) = spread_single_tuple(args);
        let params = &def.params;

        if positional.len() > params.len() {
            return Err(Error::invalid_arguments(
                name,
                format!(
                    "expected at most {} arguments, got {}",
                    params.len(),
                    positional.len()
                ),
            )
            .into());
        }
        if let Some(fields) = &named {
            if let Some(unknown) = fields
                .keys()
                .find(|key| !params.iter().any(|param| &param.name == *key))
            {
                return Err(Error::invalid_arguments(
                    name,
                    format!("unknown parameter `{}`", unknown),
                )
                .into());
            }
        }

        for (index, param) in params.iter().enumerate() {
            let supplied = match &named {
                Some(fields) => fields.get(&param.name).cloned(),
                None => positional.get(index).cloned(),
            };
            let value = match (supplied, &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval_expr(default, call_ctx).await?,
                (None, None) => {
                    return Err(Error::invalid_arguments(
                        name,
                        format!("missing argument `{}`", param.name),
                    )
                    .with_context("param", param.name.as_str())
                    .into())
                }
            };
            if let Some(ty) = param.type_annotation {
                if !ty.accepts(value.type_of()) {
                    return Err(Error::invalid_arguments(
                        name,
                        format!("`{}` expects {}, got {}", param.name, ty, value.type_name()),
                    )
                    .with_context("param", param.name.as_str())
                    .into());
                }
            }
            scope.define(&param.name, value)?;
        }
        Ok(())
    }

    /// Call a host function by definition
    pub(super) async fn call_host(
        &self,
        name: &str,
        def: &Rc<HostFunctionDef>,
        args: Vec<RillValue>,
        ctx: &RuntimeContext,
        span: SourceSpan,
    ) -> Result<RillValue> {
        let args = match spread_single_tuple(args) {
            (positional, None) => positional,
            (_, Some(fields)) => named_host_args(name, &def.params, &fields)?,
        };
        let args = def.bind_arguments(name, args)?;
        self.run_host(name, def, args, ctx, span).await
    }

    /// Invoke a host implementation with bound arguments: abort check, call
    /// frame, timeout and return-type enforcement
    async fn run_host(
        &self,
        name: &str,
        def: &HostFunctionDef,
        args: Vec<RillValue>,
        ctx: &RuntimeContext,
        span: SourceSpan,
    ) -> Result<RillValue> {
        ctx.check_abort()?;
        debug!(function = name, args = args.len(), "calling host function");

        let _depth = ctx.enter_call(name).map_err(|err| err.at(span.start))?;
        ctx.push_frame(name.to_string(), Some(span.start));
        let call = def.function.call(args, ctx);
        let result = match ctx.shared.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    let timeout_ms = limit.as_millis() as u64;
                    warn!(function = name, timeout_ms, "host function timed out");
                    Err(Error::runtime(
                        ErrorCode::Timeout,
                        format!("Function {} timed out after {}ms", name, timeout_ms),
                    )
                    .with_context("function", name)
                    .with_context("timeoutMs", timeout_ms))
                }
            },
            None => call.await,
        };
        let result = result.map_err(|err| ctx.attach_call_stack(err));
        ctx.pop_frame();

        let value = result?;
        def.check_return(name, &value)?;
        Ok(value)
    }

    /// `receiver.name(args)`: a callable dict field wins over host methods
    pub(super) async fn call_method(
        &self,
        name: &str,
        receiver: RillValue,
        args: Vec<RillValue>,
        ctx: &RuntimeContext,
        span: SourceSpan,
    ) -> Flow<RillValue> {
        if let RillValue::Dict(fields) = &receiver {
            if let Some(RillValue::Callable(callable)) = fields.get(name) {
                let callable = match &**callable {
                    Callable::Script(script) => {
                        Rc::new(Callable::Script(script.bind(fields.clone())))
                    }
                    Callable::Application(_) => callable.clone(),
                };
                let dict_ctx = ctx.with_pipe(receiver.clone());
                return self.invoke_callable(callable, args, &dict_ctx, span).await;
            }
        }

        let method = match ctx.shared.methods.get(name) {
            Some(method) => method.clone(),
            None => return Err(undefined_method(name, &receiver, ctx).into()),
        };
        if !method.applies_to(&receiver) {
            let accepted: Vec<&str> = method.receivers.iter().map(|ty| ty.name()).collect();
            return Err(Error::runtime(
                ErrorCode::UndefinedMethod,
                format!("Method .{} is not defined for {}", name, receiver.type_name()),
            )
            .with_context("method", name)
            .with_context("receiver", receiver.type_name())
            .with_context("accepts", accepted.join(", "))
            .into());
        }

        let mut bound = method.function.bind_arguments(name, args)?;
        bound.insert(0, receiver);
        Ok(self.run_host(name, &method.function, bound, ctx, span).await?)
    }

    /// `name` / `name(args)`; the bare form and `name()` receive `$`
    pub(super) async fn eval_host_call(&self, call: &HostCall, ctx: &RuntimeContext) -> Flow<RillValue> {
        let def = match ctx.shared.functions.get(&call.name) {
            Some(def) => def.clone(),
            None => return Err(undefined_function(&call.name, ctx).into()),
        };
        let args = match (&call.args, &ctx.pipe_value) {
            (Some(args), Some(piped)) if args.is_empty() => vec![piped.clone()],
            (Some(args), _) => self.eval_args(args, ctx).await?,
            (None, Some(piped)) => vec![piped.clone()],
            (None, None) => Vec::new(),
        };
        Ok(self.call_host(&call.name, &def, args, ctx, call.span).await?)
    }

    /// `$name(args)`; empty arguments in a pipe pass `$` to closures with parameters
    pub(super) async fn eval_closure_call(
        &self,
        call: &ClosureCall,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let value = ctx
            .scope
            .get(&call.name)
            .ok_or_else(|| Error::undefined_variable(&format!("${}", call.name)))?;
        let callable = value
            .as_callable()
            .map_err(|err| err.with_context("variable", call.name.as_str()))?
            .clone();

        let args = match &ctx.pipe_value {
            Some(piped) if call.args.is_empty() && callable.arity() > 0 => vec![piped.clone()],
            _ => self.eval_args(&call.args, ctx).await?,
        };
        self.invoke_callable(callable, args, ctx, call.span).await
    }

    /// `.name(args)` on `$`
    pub(super) async fn eval_method_call(&self, call: &MethodCall, ctx: &RuntimeContext) -> Flow<RillValue> {
        let receiver = self.require_pipe(ctx)?;
        let args = self.eval_args(&call.args, ctx).await?;
        self.call_method(&call.name, receiver, args, ctx, call.span)
            .await
    }

    /// `$(args)`: invoke the piped callable
    pub(super) async fn eval_pipe_invoke(
        &self,
        args: &[Expr],
        span: SourceSpan,
        ctx: &RuntimeContext,
    ) -> Flow<RillValue> {
        let callable = self.require_pipe(ctx)?.as_callable()?.clone();
        let args = self.eval_args(args, ctx).await?;
        self.invoke_callable(callable, args, ctx, span).await
    }
}

/// Split a lone tuple argument into positional values or named fields
fn spread_single_tuple(args: Vec<RillValue>) -> (Vec<RillValue>, Option<Rc<RillDict>>) {
    let spread = match args.as_slice() {
        [RillValue::Tuple(tuple)] => Some(tuple.clone()),
        _ => None,
    };
    match spread {
        Some(RillTuple::Positional(items)) => (items.as_ref().clone(), None),
        Some(RillTuple::Named(fields)) => (Vec::new(), Some(fields)),
        None => (args, None),
    }
}

/// Order named tuple fields by the host function's declared parameters
fn named_host_args(name: &str, params: &[HostParam], fields: &RillDict) -> Result<Vec<RillValue>> {
    if params.is_empty() {
        return Err(Error::invalid_arguments(
            name,
            "named arguments need declared parameters",
        ));
    }
    if let Some(unknown) = fields
        .keys()
        .find(|key| !params.iter().any(|param| &param.name == *key))
    {
        return Err(Error::invalid_arguments(
            name,
            format!("unknown parameter `{}`", unknown),
        ));
    }

    let mut args = Vec::with_capacity(params.len());
    for param in params {
        match fields.get(&param.name).cloned().or_else(|| param.default.clone()) {
            Some(value) => args.push(value),
            None => {
                return Err(Error::invalid_arguments(
                    name,
                    format!("missing argument `{}`", param.name),
                )
                .with_context("param", param.name.as_str()))
            }
        }
    }
    Ok(args)
}

fn undefined_function(name: &str, ctx: &RuntimeContext) -> Error {
    let err = Error::runtime(
        ErrorCode::UndefinedFunction,
        format!("Undefined function: {}", name),
    )
    .with_context("name", name);
    let names = ctx.function_names();
    let candidates: Vec<&str> = names.iter().map(String::as_str).collect();
    match crate::parser::closest_name(name, &candidates) {
        Some(suggestion) => err.with_context("suggestion", suggestion),
        None => err,
    }
}

fn undefined_method(name: &str, receiver: &RillValue, ctx: &RuntimeContext) -> Error {
    let err = Error::runtime(
        ErrorCode::UndefinedMethod,
        format!("Undefined method: .{}", name),
    )
    .with_context("method", name)
    .with_context("receiver", receiver.type_name());
    let names: Vec<&str> = ctx.shared.methods.keys().map(String::as_str).collect();
    match crate::parser::closest_name(name, &names) {
        Some(suggestion) => err.with_context("suggestion", format!(".{}", suggestion)),
        None => err,
    }
}
