//! In-process, capability-restricted executor.
//!
//! One `JsRuntime` lives for the life of the executor. Evaluated code sees
//! only the capability table and the intrinsic allowlist; definition never
//! invokes the component. Mounting renders it, lets microtask updates
//! settle, then snapshots and sanitizes the tree.

use crate::artifact::SourceArtifact;
use crate::capabilities::ExecutionCapabilities;
use crate::config::EngineConfig;
use crate::error::ExecutionError;
use crate::normalize::SYNTHETIC_COMPONENT;
use crate::ops::component_host;
use crate::runtime::{drain_console, eval_string, js_message, new_runtime, HeapGuard, Watchdog};
use crate::sanitize::sanitize_tree;
use crate::ui::UiNode;
use anyhow::{anyhow, Error};
use deno_core::{JsRuntime, PollEventLoopOptions};
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "component_sandbox::engine";

pub type MountId = u64;

/// How the executor located the component among the evaluated names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedExport {
    Named { name: String },
    /// The wrapper the normalizer generated for bare markup.
    Synthetic,
    /// Nothing usable was found; renders a fixed notice.
    Placeholder,
}

/// Opaque reference to an evaluated component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHandle {
    id: u64,
    export: ResolvedExport,
}

impl ComponentHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn export(&self) -> &ResolvedExport {
        &self.export
    }
}

/// A live root inside the engine and its current tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeMount {
    pub id: MountId,
    pub nodes: Vec<UiNode>,
}

#[derive(Debug, Deserialize)]
struct EngineReply {
    ok: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    handle: Option<u64>,
    #[serde(default)]
    export: Option<ResolvedExport>,
    #[serde(default)]
    mount: Option<MountId>,
    #[serde(default)]
    nodes: Option<Vec<UiNode>>,
    #[serde(default)]
    capabilities: Option<Vec<String>>,
    #[serde(default)]
    intrinsics: Option<Vec<String>>,
}

impl EngineReply {
    fn failure(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| String::from("unknown engine failure"))
    }
}

pub struct InProcessExecutor {
    runtime: JsRuntime,
    heap: HeapGuard,
    timeout_ms: Option<u64>,
    max_render_passes: u32,
    evaluations: u64,
}

impl InProcessExecutor {
    pub fn new(config: &EngineConfig) -> Result<Self, Error> {
        let (mut runtime, heap) =
            new_runtime(component_host::init_ops_and_esm(), None, config.max_heap_size);

        let sealed = eval_string(
            &mut runtime,
            "<component-engine>",
            "globalThis.__component_engine.seal()".to_string(),
        )?;
        let reply: EngineReply = serde_json::from_str(&sealed)?;
        if !reply.ok {
            log::warn!("Host globals could not be removed from the component engine");
        }

        let exposed = eval_string(
            &mut runtime,
            "<component-engine>",
            "globalThis.__component_engine.exposed()".to_string(),
        )?;
        check_exposed(&ExecutionCapabilities::standard(), &serde_json::from_str(&exposed)?)?;
        drain_console(&mut runtime, LOG_TARGET);

        Ok(Self {
            runtime,
            heap,
            timeout_ms: config.timeout_ms,
            max_render_passes: config.max_render_passes,
            evaluations: 0,
        })
    }

    /// Number of `evaluate` calls made so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Define the component without invoking it.
    pub async fn evaluate(&mut self, artifact: &SourceArtifact) -> Result<ComponentHandle, ExecutionError> {
        self.evaluations += 1;

        let code = format!(
            "globalThis.__component_engine.evaluate({}, {}, {})",
            json_literal(artifact.transformed()),
            serde_json::to_string(artifact.candidates()).map_err(engine_error)?,
            json_literal(SYNTHETIC_COMPONENT),
        );
        let reply = self.call(code, false).await?;
        if !reply.ok {
            return Err(ExecutionError::Construction {
                message: reply.failure(),
            });
        }

        let handle = ComponentHandle {
            id: reply
                .handle
                .ok_or_else(|| ExecutionError::Engine("evaluate returned no handle".into()))?,
            export: reply.export.unwrap_or(ResolvedExport::Placeholder),
        };
        log::debug!(target: LOG_TARGET, "Evaluated component {:?}", handle);
        Ok(handle)
    }

    /// Render the component into a new root and snapshot its tree.
    pub async fn mount(&mut self, handle: &ComponentHandle) -> Result<NativeMount, ExecutionError> {
        let code = format!(
            "globalThis.__component_engine.mount({}, {})",
            handle.id, self.max_render_passes
        );
        let reply = self.call(code, true).await?;
        if !reply.ok {
            return Err(ExecutionError::Render {
                message: reply.failure(),
            });
        }
        let id = reply
            .mount
            .ok_or_else(|| ExecutionError::Engine("mount returned no id".into()))?;

        match self.snapshot(id).await {
            Ok(nodes) => Ok(NativeMount { id, nodes }),
            Err(err) => {
                self.unmount(id).await;
                Err(err)
            }
        }
    }

    async fn snapshot(&mut self, id: MountId) -> Result<Vec<UiNode>, ExecutionError> {
        let reply = self
            .call(format!("globalThis.__component_engine.snapshot({})", id), false)
            .await?;
        if !reply.ok {
            return Err(ExecutionError::Render {
                message: reply.failure(),
            });
        }
        let nodes = reply.nodes.unwrap_or_default();
        sanitize_tree(&nodes).map_err(|e| ExecutionError::Rejected(e.to_string()))?;
        Ok(nodes)
    }

    /// Tear a root down, running its effect cleanups. Failures are logged.
    pub async fn unmount(&mut self, id: MountId) {
        match self
            .call(format!("globalThis.__component_engine.unmount({})", id), false)
            .await
        {
            Ok(reply) if reply.ok => {}
            Ok(reply) => log::warn!(target: LOG_TARGET, "Unmount of {} failed: {}", id, reply.failure()),
            Err(err) => log::warn!(target: LOG_TARGET, "Unmount of {} failed: {}", id, err),
        }
    }

    /// Drop the handle from the engine's registry.
    pub async fn release(&mut self, handle: &ComponentHandle) {
        let code = format!("globalThis.__component_engine.release({})", handle.id);
        if let Err(err) = self.call(code, false).await {
            log::warn!(target: LOG_TARGET, "Release of handle {} failed: {}", handle.id, err);
        }
    }

    /// Run one engine entry point under the watchdog and parse its reply.
    async fn call(&mut self, code: String, settle: bool) -> Result<EngineReply, ExecutionError> {
        let watchdog = Watchdog::arm(&mut self.runtime, self.timeout_ms);
        let result = self.run(code, settle).await;
        let timed_out = watchdog.disarm(&mut self.runtime).await;
        let heap_exhausted = self.heap.take();
        if heap_exhausted && !timed_out {
            self.runtime.v8_isolate().cancel_terminate_execution();
        }
        drain_console(&mut self.runtime, LOG_TARGET);

        match result {
            Ok(reply) => Ok(reply),
            Err(_) if timed_out => Err(ExecutionError::TimedOut {
                timeout_ms: self.timeout_ms.unwrap_or_default(),
            }),
            Err(_) if heap_exhausted => Err(ExecutionError::Engine(String::from(
                "component exceeded the engine heap limit",
            ))),
            Err(err) => Err(ExecutionError::Engine(js_message(&err))),
        }
    }

    async fn run(&mut self, code: String, settle: bool) -> Result<EngineReply, Error> {
        let text = eval_string(&mut self.runtime, "<component-engine>", code)?;
        if settle {
            self.runtime
                .run_event_loop(PollEventLoopOptions::default())
                .await?;
        }
        serde_json::from_str(&text).map_err(|e| anyhow!("Malformed engine reply: {}", e))
    }
}

/// The engine must expose exactly the capability table and nothing beyond
/// the intrinsic allowlist.
fn check_exposed(table: &ExecutionCapabilities, reply: &EngineReply) -> Result<(), Error> {
    let capabilities = reply.capabilities.as_deref().unwrap_or_default();
    let intrinsics = reply.intrinsics.as_deref().unwrap_or_default();

    if let Some(extra) = capabilities.iter().find(|name| !table.contains(name)) {
        return Err(anyhow!("Component engine exposes unknown capability '{}'", extra));
    }
    if let Some(missing) = table.entries().iter().find(|c| !capabilities.iter().any(|n| n == c.name)) {
        return Err(anyhow!("Component engine is missing capability '{}'", missing.name));
    }
    let allowed = table.intrinsic_names();
    if let Some(extra) = intrinsics.iter().find(|name| !allowed.contains(name)) {
        return Err(anyhow!("Component engine exposes unknown intrinsic '{}'", extra));
    }

    for capability in table.entries() {
        log::debug!(target: LOG_TARGET, "capability {} ({:?})", capability.name, capability.kind);
    }
    log::debug!(target: LOG_TARGET, "{} intrinsics exposed", intrinsics.len());
    Ok(())
}

fn json_literal(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn engine_error(err: serde_json::Error) -> ExecutionError {
    ExecutionError::Engine(err.to_string())
}
