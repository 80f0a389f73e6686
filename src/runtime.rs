//! Shared plumbing for the two V8 engines.
//!
//! Both engines run without fs, net, env or subprocess access. Only the ops
//! of their own extension exist, and module loading is either absent (host)
//! or restricted to pinned scaffold resources (isolated).

use crate::ops::ConsoleOutput;
use anyhow::{anyhow, Error};
use deno_core::{v8, Extension, JsRuntime, ModuleLoader, RuntimeOptions};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Set when the near-heap-limit callback has terminated execution.
#[derive(Debug, Clone, Default)]
pub struct HeapGuard(Arc<AtomicBool>);

impl HeapGuard {
    /// Returns whether the limit was hit since the last call, and resets it.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Create a runtime with the given extension and optional module loader.
pub fn new_runtime(
    extension: Extension,
    module_loader: Option<Rc<dyn ModuleLoader>>,
    max_heap_size: Option<usize>,
) -> (JsRuntime, HeapGuard) {
    // Configure V8 heap limits if specified
    let create_params =
        max_heap_size.map(|max_bytes| v8::Isolate::create_params().heap_limits(0, max_bytes));

    let mut runtime = JsRuntime::new(RuntimeOptions {
        module_loader,
        extensions: vec![extension],
        create_params,
        ..Default::default()
    });

    let guard = HeapGuard::default();
    if max_heap_size.is_some() {
        let handle = runtime.v8_isolate().thread_safe_handle();
        let hit = guard.0.clone();
        runtime.add_near_heap_limit_callback(move |current, initial| {
            log::warn!(
                "Near heap limit: current={}MB, initial={}MB; terminating execution",
                current / (1024 * 1024),
                initial / (1024 * 1024)
            );
            hit.store(true, Ordering::SeqCst);
            handle.terminate_execution();
            // Headroom so termination can unwind instead of aborting the process
            current * 2
        });
    }

    runtime.op_state().borrow_mut().put(ConsoleOutput::default());

    (runtime, guard)
}

/// Wall-clock limit for one engine operation.
///
/// The timer runs as a tokio task on another worker thread, so callers must
/// be on a multi-threaded runtime for a busy script to be interrupted.
pub struct Watchdog {
    task: Option<tokio::task::JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn arm(runtime: &mut JsRuntime, timeout_ms: Option<u64>) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let task = timeout_ms.map(|ms| {
            let isolate_handle = runtime.v8_isolate().thread_safe_handle();
            let flag = fired.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                flag.store(true, Ordering::SeqCst);
                isolate_handle.terminate_execution();
            })
        });
        Self { task, fired }
    }

    /// Stop the timer. Returns true if it fired, in which case the isolate's
    /// pending termination has been cancelled so it can be reused.
    pub async fn disarm(mut self, runtime: &mut JsRuntime) -> bool {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        let fired = self.fired.load(Ordering::SeqCst);
        if fired {
            runtime.v8_isolate().cancel_terminate_execution();
        }
        fired
    }
}

/// Run a script that evaluates to a string and return it.
pub fn eval_string(runtime: &mut JsRuntime, name: &'static str, code: String) -> Result<String, Error> {
    let global = runtime.execute_script(name, code)?;
    let scope = &mut runtime.handle_scope();
    let local = v8::Local::new(scope, &global);
    if local.is_string() {
        Ok(local.to_rust_string_lossy(scope))
    } else {
        Err(anyhow!("{} did not evaluate to a string", name))
    }
}

/// Human-readable message for an engine error, without the `Uncaught ` prefix.
pub fn js_message(err: &Error) -> String {
    match err.downcast_ref::<deno_core::error::JsError>() {
        Some(js) => js
            .exception_message
            .strip_prefix("Uncaught ")
            .unwrap_or(js.exception_message.as_str())
            .to_string(),
        None => err.to_string(),
    }
}

/// Take the console output captured since the last call and forward it.
pub fn drain_console(runtime: &mut JsRuntime, target: &str) -> ConsoleOutput {
    let output = runtime.op_state().borrow_mut().take::<ConsoleOutput>();
    runtime.op_state().borrow_mut().put(ConsoleOutput::default());
    output.forward(target);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::component_host;

    fn host_runtime() -> JsRuntime {
        new_runtime(component_host::init_ops_and_esm(), None, None).0
    }

    #[test]
    fn test_eval_string() {
        let mut runtime = host_runtime();
        let out = eval_string(&mut runtime, "<test>", "['a', 'b'].join('-')".into()).unwrap();
        assert_eq!(out, "a-b");

        let err = eval_string(&mut runtime, "<test>", "42".into()).unwrap_err();
        assert!(err.to_string().contains("did not evaluate to a string"));
    }

    #[test]
    fn test_js_message_strips_prefix() {
        let mut runtime = host_runtime();
        let err = runtime
            .execute_script("<test>", "throw new TypeError('boom')".to_string())
            .unwrap_err();
        assert_eq!(js_message(&err), "TypeError: boom");
    }

    #[test]
    fn test_console_is_captured() {
        let mut runtime = host_runtime();
        runtime
            .execute_script("<test>", "console.log('hi', {a: 1}); console.error('bad')".to_string())
            .unwrap();
        let output = drain_console(&mut runtime, "test");
        assert_eq!(output.logs, vec![r#"hi {"a":1}"#.to_string()]);
        assert_eq!(output.errors, vec!["bad".to_string()]);
        assert!(drain_console(&mut runtime, "test").is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watchdog_interrupts_busy_loop() {
        let mut runtime = host_runtime();
        let watchdog = Watchdog::arm(&mut runtime, Some(100));
        let result = runtime.execute_script("<test>", "while (true) {}".to_string());
        assert!(result.is_err());
        assert!(watchdog.disarm(&mut runtime).await);

        // The isolate is usable again after the termination was cancelled
        let out = eval_string(&mut runtime, "<test>", "'alive'".into()).unwrap();
        assert_eq!(out, "alive");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watchdog_quiet_when_fast() {
        let mut runtime = host_runtime();
        let watchdog = Watchdog::arm(&mut runtime, Some(5_000));
        eval_string(&mut runtime, "<test>", "'quick'".into()).unwrap();
        assert!(!watchdog.disarm(&mut runtime).await);
    }
}
