//! A single warm JavaScript isolate, owned by a dedicated OS thread.
//!
//! `v8::OwnedIsolate` is `!Send`, so an isolate cannot migrate between
//! async tasks the way the rest of the server does. Instead each isolate
//! gets its own thread for its whole life: the thread compiles the module
//! once, retains the default export, and then services one `Job` at a
//! time off an mpsc channel until the handle is dropped.

use std::sync::mpsc as std_mpsc;

use tokio::sync::oneshot;

use crate::error::{EngineError, EngineResult};

/// One invocation request sent to an isolate's worker thread.
struct Job {
    /// `None` means the JS function is called with `undefined`.
    payload: Option<String>,
    reply: oneshot::Sender<EngineResult<String>>,
}

/// A handle to a running isolate worker thread.
///
/// Dropping the handle closes the job channel, which ends the thread's
/// receive loop and tears down the isolate.
pub struct Isolate {
    jobs: std_mpsc::Sender<Job>,
    _thread: std::thread::JoinHandle<()>,
}

impl Isolate {
    /// Build a new isolate from module source and block until it is ready
    /// to accept invocations (compiled, instantiated, evaluated, and with
    /// any top-level await settled).
    pub async fn build(source: String) -> EngineResult<Self> {
        let (job_tx, job_rx) = std_mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = oneshot::channel::<EngineResult<()>>();

        let thread = std::thread::Builder::new()
            .name("tinyfaas-isolate".into())
            .spawn(move || isolate_thread_main(source, job_rx, ready_tx))
            .map_err(|e| EngineError::Unavailable(format!("failed to spawn isolate thread: {e}")))?;

        ready_rx
            .await
            .map_err(|_| EngineError::Unavailable("isolate thread died before startup".into()))??;

        Ok(Self {
            jobs: job_tx,
            _thread: thread,
        })
    }

    /// Invoke the module's default export with `payload` (JSON text, or
    /// `None` to call with `undefined`) and return the JSON-serialized
    /// fulfillment value.
    pub async fn invoke(&self, payload: Option<String>) -> EngineResult<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.jobs
            .send(Job {
                payload,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::Unavailable("isolate worker thread has exited".into()))?;

        reply_rx
            .await
            .map_err(|_| EngineError::Unavailable("isolate worker thread dropped the reply".into()))?
    }
}

/// Entry point for an isolate's dedicated thread.
///
/// Builds the isolate, context, and module; signals readiness (or the
/// build failure) over `ready`; then services jobs until `jobs` closes.
fn isolate_thread_main(
    source: String,
    jobs: std_mpsc::Receiver<Job>,
    ready: oneshot::Sender<EngineResult<()>>,
) {
    let params = v8::CreateParams::default();
    let mut isolate = v8::Isolate::new(params);

    let mut runtime = {
        let scope = &mut v8::HandleScope::new(&mut isolate);
        let context = v8::Context::new(scope);
        let scope = &mut v8::ContextScope::new(scope, context);

        install_globals(scope);

        match build_module(scope, &source) {
            Ok(default_export) => {
                let global_context = v8::Global::new(scope, context);
                let global_export = v8::Global::new(scope, default_export);
                Some((global_context, global_export))
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                None
            }
        }
    };

    let (global_context, global_export) = match runtime.take() {
        Some(pair) => pair,
        None => return,
    };

    if ready.send(Ok(())).is_err() {
        return;
    }

    while let Ok(job) = jobs.recv() {
        let result = {
            let scope = &mut v8::HandleScope::new(&mut isolate);
            let context = v8::Local::new(scope, &global_context);
            let scope = &mut v8::ContextScope::new(scope, context);
            let default_export = v8::Local::new(scope, &global_export);
            invoke_once(scope, default_export, job.payload)
        };
        let _ = job.reply.send(result);
    }
}

/// Compile, instantiate, and evaluate `source` as an ES module, drain any
/// top-level-await microtasks, and return the module's default export.
fn build_module<'s>(
    scope: &mut v8::ContextScope<'s, v8::HandleScope>,
    source: &str,
) -> EngineResult<v8::Local<'s, v8::Value>> {
    let mut try_catch = v8::TryCatch::new(scope);

    let resource_name = v8::String::new(&mut try_catch, "function.js")
        .ok_or_else(|| EngineError::Compile("failed to intern resource name".into()))?;
    let source_str = v8::String::new(&mut try_catch, source)
        .ok_or_else(|| EngineError::Compile("source contains invalid data".into()))?;
    let undefined_value = v8::undefined(&mut try_catch);

    let origin = v8::ScriptOrigin::new(
        &mut try_catch,
        resource_name.into(),
        0,
        0,
        false,
        -1,
        undefined_value.into(),
        false,
        false,
        true,
    );

    let compiler_source = v8::script_compiler::Source::new(source_str, Some(&origin));

    let module = match v8::script_compiler::compile_module(&mut try_catch, compiler_source) {
        Some(m) => m,
        None => return Err(compile_error(&mut try_catch, "failed to compile module")),
    };

    let instantiated = module.instantiate_module(&mut try_catch, resolve_module_callback);
    if instantiated != Some(true) {
        return Err(compile_error(
            &mut try_catch,
            "module instantiation failed (imports are not supported)",
        ));
    }

    let eval_result = module.evaluate(&mut try_catch);
    let completion = match eval_result {
        Some(v) => v,
        None => return Err(compile_error(&mut try_catch, "module evaluation failed")),
    };

    if module.get_status() == v8::ModuleStatus::Errored {
        return Err(compile_error(&mut try_catch, "module threw during evaluation"));
    }

    if completion.is_promise() {
        let promise = v8::Local::<v8::Promise>::try_from(completion)
            .map_err(|_| EngineError::Compile("top-level completion was not a promise".into()))?;
        drain_microtasks_until_settled(&mut try_catch, promise);
        match promise.state() {
            v8::PromiseState::Fulfilled => {}
            v8::PromiseState::Rejected => {
                let reason = promise.result(&mut try_catch);
                let message = reason.to_rust_string_lossy(&mut try_catch);
                return Err(EngineError::Compile(format!(
                    "top-level await rejected: {message}"
                )));
            }
            v8::PromiseState::Pending => {
                return Err(EngineError::Compile(
                    "top-level await never settled".into(),
                ))
            }
        }
    }

    let namespace = module.get_module_namespace();
    let namespace_obj = v8::Local::<v8::Object>::try_from(namespace)
        .map_err(|_| EngineError::Contract("module namespace is not an object".into()))?;

    let default_key = v8::String::new(&mut try_catch, "default")
        .ok_or_else(|| EngineError::Contract("failed to intern 'default'".into()))?;
    let default_export = namespace_obj
        .get(&mut try_catch, default_key.into())
        .filter(|v| !v.is_undefined())
        .ok_or_else(|| EngineError::Contract("module has no default export".into()))?;

    if !default_export.is_function() {
        return Err(EngineError::Contract(
            "default export is not callable".into(),
        ));
    }

    Ok(default_export)
}

/// Modules with imports are rejected; this callback is never expected to
/// resolve anything and always reports "not found" to V8.
fn resolve_module_callback<'a>(
    _context: v8::Local<'a, v8::Context>,
    _specifier: v8::Local<'a, v8::String>,
    _import_attributes: v8::Local<'a, v8::FixedArray>,
    _referrer: v8::Local<'a, v8::Module>,
) -> Option<v8::Local<'a, v8::Module>> {
    None
}

fn compile_error(scope: &mut v8::TryCatch<v8::HandleScope>, fallback: &str) -> EngineError {
    if let Some(exception) = scope.exception() {
        let message = exception.to_rust_string_lossy(scope);
        EngineError::Compile(message)
    } else {
        EngineError::Compile(fallback.to_string())
    }
}

/// Pump the microtask queue until `promise` leaves the pending state.
fn drain_microtasks_until_settled(scope: &mut v8::HandleScope, promise: v8::Local<v8::Promise>) {
    while promise.state() == v8::PromiseState::Pending {
        scope.perform_microtask_checkpoint();
    }
}

/// Call the retained default export with `payload`, drain any promise it
/// returns, and serialize the fulfillment value back to JSON text.
fn invoke_once(
    scope: &mut v8::ContextScope<v8::HandleScope>,
    default_export: v8::Local<v8::Value>,
    payload: Option<String>,
) -> EngineResult<String> {
    let mut try_catch = v8::TryCatch::new(scope);

    let function = v8::Local::<v8::Function>::try_from(default_export)
        .map_err(|_| EngineError::Contract("default export is not callable".into()))?;

    let arg = match payload {
        None => v8::undefined(&mut try_catch).into(),
        Some(json) => {
            let json_str = v8::String::new(&mut try_catch, &json)
                .ok_or_else(|| EngineError::Runtime("payload contains invalid data".into()))?;
            v8::json::parse(&mut try_catch, json_str)
                .ok_or_else(|| EngineError::Runtime("payload is not valid JSON".into()))?
        }
    };

    let undefined_receiver = v8::undefined(&mut try_catch);
    let call_result = function.call(&mut try_catch, undefined_receiver.into(), &[arg]);

    let value = match call_result {
        Some(v) => v,
        None => return Err(runtime_error(&mut try_catch, "function call failed")),
    };

    let value = if value.is_promise() {
        let promise = v8::Local::<v8::Promise>::try_from(value)
            .map_err(|_| EngineError::Runtime("expected a promise".into()))?;
        drain_microtasks_until_settled(&mut try_catch, promise);
        match promise.state() {
            v8::PromiseState::Fulfilled => promise.result(&mut try_catch),
            v8::PromiseState::Rejected => {
                let reason = promise.result(&mut try_catch);
                let message = reason.to_rust_string_lossy(&mut try_catch);
                return Err(EngineError::Runtime(message));
            }
            v8::PromiseState::Pending => {
                return Err(EngineError::Runtime("returned promise never settled".into()))
            }
        }
    } else {
        value
    };

    if try_catch.has_caught() {
        return Err(runtime_error(&mut try_catch, "function threw"));
    }

    let serialized = v8::json::stringify(&mut try_catch, value)
        .ok_or_else(|| EngineError::Serialization("result is not JSON-serializable".into()))?;

    Ok(serialized.to_rust_string_lossy(&mut try_catch))
}

fn runtime_error(scope: &mut v8::TryCatch<v8::HandleScope>, fallback: &str) -> EngineError {
    if let Some(exception) = scope.exception() {
        let message = exception.to_rust_string_lossy(scope);
        EngineError::Runtime(message)
    } else {
        EngineError::Runtime(fallback.to_string())
    }
}

/// Install `console.log`/`console.error` on the global object, routing
/// both through the process' structured logger instead of stdout/stderr.
fn install_globals(scope: &mut v8::ContextScope<v8::HandleScope>) {
    let context = scope.get_current_context();
    let global = context.global(scope);

    let console = v8::Object::new(scope);
    set_function(scope, console, "log", console_log);
    set_function(scope, console, "error", console_error);
    set_property(scope, global, "console", console.into());
}

fn set_function(
    scope: &mut v8::ContextScope<v8::HandleScope>,
    target: v8::Local<v8::Object>,
    name: &str,
    callback: impl v8::MapFnTo<v8::FunctionCallback>,
) {
    let key = v8::String::new(scope, name).unwrap();
    let func = v8::Function::new(scope, callback).unwrap();
    target.set(scope, key.into(), func.into());
}

fn set_property(
    scope: &mut v8::ContextScope<v8::HandleScope>,
    target: v8::Local<v8::Object>,
    name: &str,
    value: v8::Local<v8::Value>,
) {
    let key = v8::String::new(scope, name).unwrap();
    target.set(scope, key.into(), value);
}

fn console_log(scope: &mut v8::HandleScope, args: v8::FunctionCallbackArguments, mut rv: v8::ReturnValue) {
    tracing::info!(target: "tinyfaas::console", "{}", format_args(scope, &args));
    rv.set_undefined();
}

fn console_error(scope: &mut v8::HandleScope, args: v8::FunctionCallbackArguments, mut rv: v8::ReturnValue) {
    tracing::error!(target: "tinyfaas::console", "{}", format_args(scope, &args));
    rv.set_undefined();
}

fn format_args(scope: &mut v8::HandleScope, args: &v8::FunctionCallbackArguments) -> String {
    let mut output = String::new();
    for i in 0..args.length() {
        if i > 0 {
            output.push(' ');
        }
        output.push_str(&args.get(i).to_rust_string_lossy(scope));
    }
    output
}
