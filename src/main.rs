//! Component Sandbox CLI
//!
//! Single-shot mode:
//!   component-sandbox [--config <file>] <source-file>
//!
//! Server mode (persistent process, reads from stdin):
//!   component-sandbox [--config <file>] --server
//!
//! Protocol (server mode):
//!   Request (stdin):
//!     Length:33
//!
//!     <div className="p-4">Hello</div>
//!
//!   Response (stdout):
//!     Status:Rendered
//!     Length:1234
//!
//!     {"request":1,"outcome":{"kind":"rendered",...},"html":"..."}
//!
//!   A failed fast path answers `Status:Failed`; the report then carries the
//!   diagnostic and, once the isolated session finished, its document.
//!
//! Isolated worker mode (spawned by the engine itself):
//!   component-sandbox --isolated

use anyhow::{anyhow, Result};
use component_sandbox::{
    read_frame, serve_isolated, write_frame, EngineConfig, FallbackStatus, Frame, RenderAdapter,
    RenderOutcome,
};
use serde::Serialize;
use std::io::Write;

fn print_usage() {
    eprintln!("Component Sandbox - Renders untrusted UI component source");
    eprintln!();
    eprintln!("Single-shot mode:");
    eprintln!("  component-sandbox [--config <file>] <source-file>");
    eprintln!();
    eprintln!("Server mode (persistent process):");
    eprintln!("  component-sandbox [--config <file>] --server");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  component-sandbox ./card.jsx");
    eprintln!("  RUST_LOG=debug component-sandbox --config sandbox.json --server");
}

/// What one render request produced, as sent back in server mode.
#[derive(Debug, Serialize)]
struct RenderReport {
    request: u64,
    outcome: RenderOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<FallbackStatus>,
    html: String,
}

fn report_diagnostic(message: Option<&str>) {
    if let Some(message) = message {
        eprintln!("[diagnostic] {}", message);
    }
}

/// Render one file and print the mounted view
async fn run_single_shot(config: &EngineConfig, source_file: &str) -> Result<()> {
    let source = std::fs::read_to_string(source_file)
        .map_err(|e| anyhow!("Failed to read '{}': {}", source_file, e))?;

    let mut adapter = RenderAdapter::new(config, report_diagnostic)?;
    let outcome = adapter.render(&source).await;
    if !outcome.is_rendered() {
        if let Some(FallbackStatus::Unavailable { reason }) = adapter.settle().await {
            return Err(anyhow!("Isolated fallback unavailable: {}", reason));
        }
    }

    println!("{}", adapter.surface().html());
    Ok(())
}

/// Run in server mode (persistent process, reads requests from stdin)
async fn run_server(config: &EngineConfig) -> Result<()> {
    // Create the engine ONCE at startup (V8 cold start happens here)
    let mut adapter = RenderAdapter::new(config, report_diagnostic)?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut reader = stdin.lock();

    log::info!("Server ready, reading from stdin...");

    loop {
        let frame = match read_frame(&mut reader) {
            Ok(Some(frame)) => frame,
            // EOF - stdin closed, exit gracefully
            Ok(None) => break,
            Err(e) => {
                let reply = Frame::new(e.to_string()).with_header("Status", "Error");
                write_frame(&mut stdout, &reply)?;
                stdout.flush()?;
                break;
            }
        };

        let outcome = adapter.render(&frame.body).await;
        let fallback = if outcome.is_rendered() {
            None
        } else {
            adapter.settle().await
        };

        let status = if outcome.is_rendered() { "Rendered" } else { "Failed" };
        let report = RenderReport {
            request: adapter.request_id(),
            outcome,
            fallback,
            html: adapter.surface().html(),
        };
        let body = serde_json::to_string(&report)?;
        write_frame(&mut stdout, &Frame::new(body).with_header("Status", status))?;
        stdout.flush()?;
    }

    log::info!("Server shutting down");
    Ok(())
}

/// Serve exactly one isolated session over stdin/stdout
async fn run_isolated() -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    serve_isolated(&mut stdin.lock(), &mut stdout).await?;
    stdout.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("--isolated") {
        return run_isolated().await;
    }

    let mut config = match args.iter().position(|arg| arg == "--config") {
        Some(index) => {
            let path = args
                .get(index + 1)
                .cloned()
                .ok_or_else(|| anyhow!("--config requires a file argument"))?;
            args.drain(index..=index + 1);
            EngineConfig::from_file(path)?
        }
        None => EngineConfig::default(),
    };
    // This binary answers `--isolated` above, so it can host its own sessions
    if config.sandbox.program.is_none() {
        config.sandbox.program = Some(std::env::current_exe()?);
    }

    match args.first().map(String::as_str) {
        Some("--server") => run_server(&config).await,
        Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(source_file) if !source_file.starts_with("--") => {
            run_single_shot(&config, source_file).await
        }
        _ => {
            print_usage();
            Err(anyhow!("Missing required arguments"))
        }
    }
}
