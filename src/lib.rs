//! # Component Sandbox
//!
//! Renders untrusted, JSX-flavoured UI component source without letting it
//! reach the host.
//!
//! ## Pipeline
//!
//! 1. **Normalize**: strip module syntax, wrap bare markup in a component
//! 2. **Transform**: rewrite JSX into `React.createElement` calls
//! 3. **Execute in-process**: evaluate inside a V8 engine whose only free
//!    names are the capability table (`createElement`, hooks, ...)
//! 4. **Fall back**: on any failure, re-run the *raw* source in a separate
//!    `--isolated` process with its own pipeline and full privileges inside
//!    that process only
//! 5. **Adapt**: mount exactly one view and report one diagnostic
//!
//! ## Security Guarantees
//!
//! - **No host globals**: in-process code sees capabilities and language
//!   intrinsics, nothing else; other names throw `ReferenceError`
//! - **No filesystem or environment access** in either engine
//! - **Pinned scaffold**: isolated sessions only load resources whose
//!   `sha256` pins match
//! - **Network off by default**: isolated `fetch` is limited to configured
//!   origins
//! - **Bounded**: heap limits, wall-clock watchdogs, render-pass limits and
//!   capped output
//!
//! ## Usage
//!
//! Failed fast paths are retried in a child process launched as
//! `<sandbox.program> --isolated`. An embedding binary either points
//! `sandbox.program` at the bundled `component-sandbox` executable or
//! answers that flag itself with [`serve_isolated`]:
//!
//! ```rust,ignore
//! use component_sandbox::{serve_isolated, EngineConfig, RenderAdapter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     if std::env::args().nth(1).as_deref() == Some("--isolated") {
//!         let stdin = std::io::stdin();
//!         return serve_isolated(&mut stdin.lock(), &mut std::io::stdout()).await;
//!     }
//!
//!     let mut config = EngineConfig::default();
//!     config.sandbox.program = Some(std::env::current_exe()?);
//!     let mut adapter = RenderAdapter::new(&config, |diagnostic: Option<&str>| {
//!         if let Some(message) = diagnostic {
//!             eprintln!("{}", message);
//!         }
//!     })?;
//!
//!     let outcome = adapter.render("<div className=\"p-4\">Hello</div>").await;
//!     if !outcome.is_rendered() {
//!         adapter.settle().await;
//!     }
//!     println!("{}", adapter.surface().html());
//!     Ok(())
//! }
//! ```

mod adapter;
mod artifact;
mod capabilities;
mod config;
mod error;
mod executor;
mod fetch;
mod loader;
mod normalize;
mod ops;
mod protocol;
mod runtime;
mod sandbox;
mod sanitize;
mod scaffold;
mod styling;
mod surface;
mod transform;
mod ui;
mod worker;

pub use adapter::{DiagnosticSink, FallbackStatus, RenderAdapter, RenderOutcome, RenderState};
pub use artifact::SourceArtifact;
pub use capabilities::ExecutionCapabilities;
pub use config::{EngineConfig, IsolatedSettings, SandboxConfig};
pub use error::{
    ExecutionError, RenderError, RenderResult, SandboxError, SurfaceError, TransformError,
};
pub use executor::{ComponentHandle, InProcessExecutor, MountId, NativeMount, ResolvedExport};
pub use fetch::NetworkPolicy;
pub use normalize::{normalize, Normalized, SYNTHETIC_COMPONENT};
pub use ops::ConsoleOutput;
pub use protocol::{read_frame, write_frame, Frame};
pub use sandbox::{SandboxLauncher, SandboxReport};
pub use scaffold::integrity_of;
pub use styling::generate_css_for_nodes;
pub use surface::{Mounted, Surface, View};
pub use transform::{transform, TransformOptions, Transformed};
pub use ui::{render_html, UiNode};
pub use worker::{populate_document, serve as serve_isolated, IsolatedRequest, PopulatedDocument};
