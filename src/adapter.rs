//! Render Adapter: drives one render request through the fast path and, on
//! failure, the isolated fallback, and owns what the surface shows.
//!
//! ```text
//! Idle --render--> Attempting --ok--> Rendered
//!                      |
//!                      +--err--> Failed (+ isolated session in background)
//! ```
//!
//! A new `render` call from any state goes back to `Attempting` after the
//! previous view is unmounted and any pending session is aborted.

use crate::artifact::SourceArtifact;
use crate::config::EngineConfig;
use crate::error::{RenderError, SandboxError};
use crate::executor::{ComponentHandle, InProcessExecutor, NativeMount};
use crate::sandbox::{SandboxLauncher, SandboxReport};
use crate::surface::{Surface, View};
use crate::transform::TransformOptions;
use anyhow::Error;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

const LOG_TARGET: &str = "component_sandbox::adapter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    Idle,
    Attempting,
    Rendered,
    Failed,
}

/// Receives exactly one call per render request: `None` on success, the
/// failure message otherwise.
pub trait DiagnosticSink {
    fn diagnostic(&mut self, message: Option<&str>);
}

impl<F> DiagnosticSink for F
where
    F: FnMut(Option<&str>),
{
    fn diagnostic(&mut self, message: Option<&str>) {
        self(message)
    }
}

/// The only value handed back for a render request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderOutcome {
    Rendered { handle: ComponentHandle },
    Failed { diagnostic: String },
}

impl RenderOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderOutcome::Rendered { .. })
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            RenderOutcome::Rendered { .. } => None,
            RenderOutcome::Failed { diagnostic } => Some(diagnostic),
        }
    }
}

/// How the isolated fallback for the current request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackStatus {
    /// The session's document is now on the surface.
    Mounted { session: Uuid, populated: bool },
    /// The session itself could not run; nothing was mounted.
    Unavailable { reason: String },
}

struct PendingFallback {
    request: u64,
    task: JoinHandle<Result<SandboxReport, SandboxError>>,
}

pub struct RenderAdapter<S> {
    executor: InProcessExecutor,
    launcher: SandboxLauncher,
    transform: TransformOptions,
    sink: S,
    surface: Surface,
    state: RenderState,
    request_id: u64,
    live_handle: Option<ComponentHandle>,
    pending: Option<PendingFallback>,
}

impl<S: DiagnosticSink> RenderAdapter<S> {
    pub fn new(config: &EngineConfig, sink: S) -> Result<Self, Error> {
        Ok(Self {
            executor: InProcessExecutor::new(config)?,
            launcher: SandboxLauncher::new(config),
            transform: config.transform.clone(),
            sink,
            surface: Surface::new(),
            state: RenderState::Idle,
            request_id: 0,
            live_handle: None,
            pending: None,
        })
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Id of the most recent render request (0 before the first).
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn executor(&self) -> &InProcessExecutor {
        &self.executor
    }

    /// Whether an isolated session is still outstanding for the current
    /// request.
    pub fn has_pending_fallback(&self) -> bool {
        self.pending.is_some()
    }

    /// Render `raw`, replacing whatever is mounted.
    pub async fn render(&mut self, raw: &str) -> RenderOutcome {
        self.request_id += 1;
        let request = self.request_id;
        self.state = RenderState::Attempting;

        if let Some(stale) = self.pending.take() {
            log::debug!(
                target: LOG_TARGET,
                "Aborting isolated session of request {}",
                stale.request
            );
            // Dropping the session future kills its process
            stale.task.abort();
        }
        self.clear_surface().await;

        let outcome = match self.fast_path(request, raw).await {
            Ok(handle) => {
                self.state = RenderState::Rendered;
                self.live_handle = Some(handle.clone());
                RenderOutcome::Rendered { handle }
            }
            Err(err) => {
                let diagnostic = err.to_string();
                log::warn!(
                    target: LOG_TARGET,
                    "Request {} failed in-process, falling back: {}",
                    request,
                    diagnostic
                );
                self.state = RenderState::Failed;
                self.start_fallback(request, raw);
                RenderOutcome::Failed { diagnostic }
            }
        };

        self.sink.diagnostic(outcome.diagnostic());
        outcome
    }

    /// Wait for the current request's isolated session and mount its
    /// document. Returns `None` when no session is outstanding.
    pub async fn settle(&mut self) -> Option<FallbackStatus> {
        let pending = self.pending.take()?;
        let result = pending.task.await;

        if pending.request != self.request_id {
            log::debug!(
                target: LOG_TARGET,
                "Discarding isolated result of stale request {}",
                pending.request
            );
            return None;
        }

        let status = match result {
            Ok(Ok(report)) => self.mount_report(pending.request, report),
            Ok(Err(err)) => FallbackStatus::Unavailable {
                reason: err.to_string(),
            },
            Err(join) => FallbackStatus::Unavailable {
                reason: format!("Isolated session task failed: {}", join),
            },
        };
        if let FallbackStatus::Unavailable { reason } = &status {
            log::error!(
                target: LOG_TARGET,
                "Isolated fallback for request {} unavailable: {}",
                pending.request,
                reason
            );
        }
        Some(status)
    }

    async fn fast_path(&mut self, request: u64, raw: &str) -> Result<ComponentHandle, RenderError> {
        let artifact = SourceArtifact::prepare(raw, &self.transform)?;
        if artifact.is_ambiguous() {
            log::debug!(
                target: LOG_TARGET,
                "Request {} has several component candidates: {:?}",
                request,
                artifact.candidates()
            );
        }

        let handle = self.executor.evaluate(&artifact).await?;
        let NativeMount { id, nodes } = match self.executor.mount(&handle).await {
            Ok(mount) => mount,
            Err(err) => {
                self.executor.release(&handle).await;
                return Err(err.into());
            }
        };

        if let Err(err) = self.surface.mount(request, View::Native { mount: id, nodes }) {
            self.executor.unmount(id).await;
            self.executor.release(&handle).await;
            return Err(err.into());
        }
        Ok(handle)
    }

    fn start_fallback(&mut self, request: u64, raw: &str) {
        let launcher = self.launcher.clone();
        let raw = raw.to_string();
        let task = tokio::spawn(async move { launcher.run(&raw).await });
        self.pending = Some(PendingFallback { request, task });
    }

    fn mount_report(&mut self, request: u64, report: SandboxReport) -> FallbackStatus {
        let SandboxReport {
            session,
            populated,
            document,
        } = report;
        let view = View::Isolated {
            session,
            populated,
            document,
        };
        match self.surface.mount(request, view) {
            Ok(()) => FallbackStatus::Mounted { session, populated },
            Err(err) => FallbackStatus::Unavailable {
                reason: err.to_string(),
            },
        }
    }

    /// Unmount the current view, running effect cleanups of a native root.
    async fn clear_surface(&mut self) {
        if let Some(previous) = self.surface.unmount() {
            if let View::Native { mount, .. } = previous.view {
                self.executor.unmount(mount).await;
            }
        }
        if let Some(handle) = self.live_handle.take() {
            self.executor.release(&handle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<Option<String>>>>;

    fn adapter() -> (RenderAdapter<impl DiagnosticSink>, Log) {
        let mut config = EngineConfig {
            timeout_ms: Some(1_000),
            ..Default::default()
        };
        // Unit tests never reach a real isolated session
        config.sandbox.program = Some(PathBuf::from("/nonexistent/component-sandbox"));

        let log: Log = Rc::default();
        let sink_log = log.clone();
        let sink = move |message: Option<&str>| sink_log.borrow_mut().push(message.map(String::from));
        (RenderAdapter::new(&config, sink).unwrap(), log)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bare_markup_renders_with_null_diagnostic() {
        let (mut adapter, log) = adapter();
        assert_eq!(adapter.state(), RenderState::Idle);

        let outcome = adapter.render("<div>Hello</div>").await;
        assert!(outcome.is_rendered());
        assert_eq!(adapter.state(), RenderState::Rendered);
        assert_eq!(*log.borrow(), vec![None]);
        assert!(adapter.surface().html().contains("Hello"));
        assert!(adapter.settle().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transform_error_skips_executor() {
        let (mut adapter, log) = adapter();
        let outcome = adapter.render("function App() { return <div><span></div>; }").await;

        assert_eq!(adapter.state(), RenderState::Failed);
        assert_eq!(adapter.executor().evaluations(), 0);
        let diagnostic = outcome.diagnostic().unwrap();
        assert!(diagnostic.starts_with("Transform error: "));
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].as_deref(), Some(diagnostic));
        assert!(adapter.has_pending_fallback());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn same_source_same_outcome() {
        let (mut adapter, _) = adapter();
        let ok = "function Hi() { return <b>hi</b>; }";
        let first = adapter.render(ok).await;
        let second = adapter.render(ok).await;
        assert!(first.is_rendered() && second.is_rendered());

        let bad = "function Boom() { throw new Error('boom'); }";
        let first = adapter.render(bad).await;
        let second = adapter.render(bad).await;
        assert_eq!(first.diagnostic(), second.diagnostic());
        assert!(first.diagnostic().unwrap().contains("boom"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_view_after_many_requests() {
        let (mut adapter, log) = adapter();
        for n in 0..5 {
            adapter
                .render(&format!("function C() {{ return <p>request {}</p>; }}", n))
                .await;
        }
        let mounted = adapter.surface().current().unwrap();
        assert_eq!(mounted.request, 5);
        assert_eq!(adapter.surface().html(), "<p>request 4</p>");
        assert_eq!(adapter.surface().mount_count(), 5);
        assert_eq!(log.borrow().len(), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_clears_previous_view() {
        let (mut adapter, _) = adapter();
        adapter.render("<p>old</p>").await;
        adapter.render("function Broken() { return <p>{missing.value}</p>; }").await;
        assert!(adapter.surface().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn newer_request_supersedes_pending_fallback() {
        let (mut adapter, _) = adapter();
        adapter.render("function A() { return <p>{nope()}</p>; }").await;
        assert!(adapter.has_pending_fallback());

        adapter.render("<p>fresh</p>").await;
        assert!(!adapter.has_pending_fallback());
        assert!(adapter.settle().await.is_none());
        assert_eq!(adapter.surface().html(), "<div><p>fresh</p></div>");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_sandbox_is_reported_not_mounted() {
        let (mut adapter, _) = adapter();
        adapter.render("function A() { return <p>{nope()}</p>; }").await;
        match adapter.settle().await {
            Some(FallbackStatus::Unavailable { reason }) => {
                assert!(reason.contains("Failed to start isolated session"))
            }
            other => panic!("unexpected fallback status: {:?}", other),
        }
        assert!(adapter.surface().is_empty());
        assert_eq!(adapter.state(), RenderState::Failed);
    }
}
