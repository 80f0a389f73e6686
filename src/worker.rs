//! Child side of an isolated session (`component-sandbox --isolated`).
//!
//! Reads one request frame from stdin, populates the scaffold document in a
//! fresh engine and writes one reply frame to stdout. Failures of the
//! component stay inside the document as an error panel; only failures of
//! the session machinery produce `Status:Error`.

use crate::config::IsolatedSettings;
use crate::fetch::NetworkPolicy;
use crate::loader::PinnedResourceLoader;
use crate::ops::{component_isolate, IsolatedSource};
use crate::protocol::{read_frame, write_frame, Frame};
use crate::runtime::{drain_console, eval_string, js_message, new_runtime, Watchdog};
use crate::sanitize::sanitize_tree;
use crate::scaffold::{build_document, ResourceSet, ENTRY_MODULE};
use crate::transform::TransformOptions;
use crate::ui::UiNode;
use anyhow::{anyhow, Error, Result};
use deno_core::PollEventLoopOptions;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::rc::Rc;
use uuid::Uuid;

const LOG_TARGET: &str = "component_sandbox::isolated";

/// The single request an isolated session receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolatedRequest {
    pub session: Uuid,
    /// Original, untransformed source.
    pub source: String,
    #[serde(default)]
    pub settings: IsolatedSettings,
}

/// What the session produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulatedDocument {
    pub populated: bool,
    pub document: String,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    populated: bool,
    #[serde(default)]
    nodes: Vec<UiNode>,
}

/// Serve one request from `input` to `output`.
pub async fn serve<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<()> {
    let frame = read_frame(input)?.ok_or_else(|| anyhow!("No request received"))?;

    let reply = match serde_json::from_str::<IsolatedRequest>(&frame.body) {
        Ok(request) => match populate_document(&request).await {
            Ok(populated) => Frame::new(populated.document)
                .with_header("Status", "Ok")
                .with_header("Populated", populated.populated),
            Err(e) => {
                log::error!(target: LOG_TARGET, "Session {} failed: {:#}", request.session, e);
                Frame::new(format!("{:#}", e)).with_header("Status", "Error")
            }
        },
        Err(e) => Frame::new(format!("Invalid request: {}", e)).with_header("Status", "Error"),
    };

    write_frame(output, &reply)
}

/// Run the pinned entry module against the request's source and build the
/// populated document.
pub async fn populate_document(request: &IsolatedRequest) -> Result<PopulatedDocument, Error> {
    let settings = &request.settings;
    let resources = ResourceSet::load(settings.resources_dir.as_deref())?;
    let loader = Rc::new(PinnedResourceLoader::new(resources));

    let (mut runtime, heap) = new_runtime(
        component_isolate::init_ops_and_esm(),
        Some(loader),
        settings.max_heap_size,
    );
    {
        let op_state = runtime.op_state();
        let mut state = op_state.borrow_mut();
        state.put(IsolatedSource(request.source.clone()));
        state.put(settings.clone());
        state.put(TransformOptions::default());
        state.put(NetworkPolicy::new(settings.allowed_origins.clone()));
    }

    let sealed = eval_string(&mut runtime, "<scaffold>", "String(globalThis.__scaffold.seal())".into())?;
    if sealed != "true" {
        log::warn!(target: LOG_TARGET, "Host globals could not be removed from the session");
    }

    let watchdog = Watchdog::arm(&mut runtime, Some(settings.render_timeout_ms));
    let evaluated = evaluate_entry(&mut runtime).await;
    let timed_out = watchdog.disarm(&mut runtime).await;
    let heap_exhausted = heap.take();
    drain_console(&mut runtime, LOG_TARGET);

    let snapshot = match evaluated {
        Ok(()) => {
            let json = eval_string(&mut runtime, "<scaffold>", "globalThis.__isolated_document()".into())?;
            serde_json::from_str::<Snapshot>(&json)?
        }
        // The entry never throws on component failures, so this is the
        // engine giving up on the session's script as a whole.
        Err(e) => {
            let detail = if timed_out {
                format!("Execution exceeded {}ms", settings.render_timeout_ms)
            } else if heap_exhausted {
                String::from("Execution exceeded the heap limit")
            } else {
                js_message(&e)
            };
            Snapshot {
                populated: false,
                nodes: error_panel("Component failed to render", &detail),
            }
        }
    };

    let (populated, nodes) = match sanitize_tree(&snapshot.nodes) {
        Ok(()) => (snapshot.populated, snapshot.nodes),
        Err(e) => (false, error_panel("Rendered output rejected", &e.to_string())),
    };

    log::debug!(
        target: LOG_TARGET,
        "Session {} finished (populated: {})",
        request.session,
        populated
    );

    Ok(PopulatedDocument {
        populated,
        document: build_document(&request.session, &nodes),
    })
}

async fn evaluate_entry(runtime: &mut deno_core::JsRuntime) -> Result<()> {
    let specifier = PinnedResourceLoader::specifier(ENTRY_MODULE)?;
    let module_id = runtime.load_main_es_module(&specifier).await?;
    let evaluation = runtime.mod_evaluate(module_id);
    runtime
        .run_event_loop(PollEventLoopOptions::default())
        .await?;
    evaluation.await?;
    Ok(())
}

/// Rust-side equivalent of the entry module's error panel.
fn error_panel(title: &str, detail: &str) -> Vec<UiNode> {
    vec![UiNode::element(
        "div",
        &[("class", "sandbox-error"), ("role", "alert")],
        vec![
            UiNode::element("h3", &[], vec![UiNode::text(title)]),
            UiNode::element("pre", &[], vec![UiNode::text(detail)]),
        ],
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn request(source: &str) -> IsolatedRequest {
        IsolatedRequest {
            session: Uuid::new_v4(),
            source: source.to_string(),
            settings: IsolatedSettings {
                render_timeout_ms: 2_000,
                ..Default::default()
            },
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn populates_component_with_styles() {
        let src = r#"
import React from "react";
export default function Card() {
  return <div className="p-4 bg-blue-500">Isolated</div>;
}
"#;
        let doc = populate_document(&request(src)).await.unwrap();
        assert!(doc.populated);
        assert!(doc.document.contains(r#"<div class="p-4 bg-blue-500">Isolated</div>"#));
        assert!(doc.document.contains(".bg-blue-500 { background-color: #3b82f6; }"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transform_error_shows_panel() {
        let doc = populate_document(&request("function App() { return <div><p></div>; }"))
            .await
            .unwrap();
        assert!(!doc.populated);
        assert!(doc.document.contains(r#"class="sandbox-error""#));
        assert!(doc.document.contains("<h3>Transform error</h3>"));
        assert!(doc.document.contains("Expected corresponding JSX closing tag for &lt;p&gt;"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runtime_error_shows_panel() {
        let src = "function Broken() { const user = undefined; return <p>{user.name}</p>; }";
        let doc = populate_document(&request(src)).await.unwrap();
        assert!(!doc.populated);
        assert!(doc.document.contains("<h3>Component failed to render</h3>"));
        assert!(doc.document.contains("TypeError"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exported_element_is_not_wrapped_as_text() {
        let doc = populate_document(&request("export default <p>hi</p>;")).await.unwrap();
        assert!(doc.populated);
        assert!(doc.document.contains("<p>hi</p>"));
        assert!(!doc.document.contains("const GeneratedComponent"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn privileged_inside_the_session() {
        // Names the in-process engine refuses are ordinary globals here
        let src = "function App() { return <p>{typeof globalThis}</p>; }";
        let doc = populate_document(&request(src)).await.unwrap();
        assert!(doc.populated);
        assert!(doc.document.contains("<p>object</p>"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runaway_script_is_stopped() {
        let mut req = request("while (true) {}\nfunction App() { return <p/>; }");
        req.settings.render_timeout_ms = 200;
        let doc = populate_document(&req).await.unwrap();
        assert!(!doc.populated);
        assert!(doc.document.contains("Execution exceeded 200ms"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serve_speaks_the_frame_protocol() {
        let body = serde_json::to_string(&request("<span>framed</span>")).unwrap();
        let input = format!("Length:{}\n\n{}", body.len(), body);
        let mut output = Vec::new();
        serve(&mut Cursor::new(input.into_bytes()), &mut output).await.unwrap();

        let reply = read_frame(&mut Cursor::new(output)).unwrap().unwrap();
        assert_eq!(reply.header("Status"), Some("Ok"));
        assert_eq!(reply.header("Populated"), Some("true"));
        assert!(reply.body.contains("<span>framed</span>"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serve_reports_bad_requests() {
        let input = "Length:8\n\nnot-json";
        let mut output = Vec::new();
        serve(&mut Cursor::new(input.as_bytes()), &mut output).await.unwrap();
        let reply = read_frame(&mut Cursor::new(output)).unwrap().unwrap();
        assert_eq!(reply.header("Status"), Some("Error"));
    }
}
