//! Isolated Sandbox Executor, host side.
//!
//! Every run spawns a fresh `--isolated` process of this executable with an
//! empty environment, sends it one request frame and waits for one reply
//! frame under a wall-clock limit. Nothing survives between sessions.

use crate::config::{EngineConfig, IsolatedSettings};
use crate::error::SandboxError;
use crate::protocol::{read_frame, write_frame, Frame};
use crate::worker::IsolatedRequest;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use uuid::Uuid;

const LOG_TARGET: &str = "component_sandbox::sandbox";

/// Cap on diagnostics captured from a session's stderr.
const MAX_STDERR_BYTES: usize = 256 * 1024;

/// Result of one isolated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxReport {
    pub session: Uuid,
    /// True when the component itself was mounted; false when the document
    /// holds an error panel instead.
    pub populated: bool,
    /// The populated scaffold document.
    pub document: String,
}

/// Launches isolated sessions. Cheap to clone; holds no session state.
#[derive(Debug, Clone)]
pub struct SandboxLauncher {
    program: Option<PathBuf>,
    timeout_ms: u64,
    max_document_bytes: usize,
    settings: IsolatedSettings,
}

impl SandboxLauncher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            program: config.sandbox.program.clone(),
            timeout_ms: config.sandbox.timeout_ms,
            max_document_bytes: config.sandbox.max_document_bytes,
            settings: IsolatedSettings::from(config),
        }
    }

    fn program(&self) -> Result<&PathBuf, SandboxError> {
        self.program.as_ref().ok_or_else(|| SandboxError::Spawn {
            program: String::from("<unset>"),
            reason: String::from(
                "no isolated worker program configured; set sandbox.program to a binary that dispatches `--isolated` to serve_isolated",
            ),
        })
    }

    /// Run `raw` in a new isolated session.
    pub async fn run(&self, raw: &str) -> Result<SandboxReport, SandboxError> {
        let session = Uuid::new_v4();
        let request = IsolatedRequest {
            session,
            source: raw.to_string(),
            settings: self.settings.clone(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| SandboxError::Protocol(format!("Failed to encode request: {}", e)))?;
        let mut frame = Vec::new();
        write_frame(&mut frame, &Frame::new(body))
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;

        log::debug!(target: LOG_TARGET, "Starting isolated session {}", session);

        let timeout = Duration::from_millis(self.timeout_ms);
        let reply = tokio::time::timeout(timeout, self.exchange(&frame))
            .await
            .map_err(|_| SandboxError::Timeout {
                timeout_ms: self.timeout_ms,
            })??;

        let status = reply
            .header("Status")
            .ok_or_else(|| SandboxError::Protocol(String::from("Reply has no Status header")))?;
        match status {
            "Ok" => {
                let populated = reply.header("Populated") == Some("true");
                log::debug!(
                    target: LOG_TARGET,
                    "Session {} returned {} bytes (populated: {})",
                    session,
                    reply.body.len(),
                    populated
                );
                Ok(SandboxReport {
                    session,
                    populated,
                    document: reply.body,
                })
            }
            "Error" => Err(SandboxError::Worker(reply.body)),
            other => Err(SandboxError::Protocol(format!("Unknown status '{}'", other))),
        }
    }

    /// Spawn the child, send `request` and collect its reply. The child is
    /// killed if this future is dropped.
    async fn exchange(&self, request: &[u8]) -> Result<Frame, SandboxError> {
        let program = self.program()?;
        let mut cmd = Command::new(program);
        cmd.arg("--isolated")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Nothing from the host environment except log filtering
        cmd.env_clear();
        if let Ok(filter) = std::env::var("RUST_LOG") {
            cmd.env("RUST_LOG", filter);
        }

        let mut child = cmd.spawn().map_err(|e| SandboxError::Spawn {
            program: program.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Protocol(String::from("Child stdin unavailable")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Protocol(String::from("Child stdout unavailable")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::Protocol(String::from("Child stderr unavailable")))?;

        stdin.write_all(request).await?;
        stdin.shutdown().await?;
        drop(stdin);

        // Headroom for the frame headers on top of the document
        let stdout_limit = self.max_document_bytes + 1024;
        let (stdout, stderr) = tokio::try_join!(
            read_capped(stdout, stdout_limit),
            read_capped(stderr, MAX_STDERR_BYTES),
        )?;
        let status = child.wait().await?;

        let (stdout, stdout_truncated) = stdout;
        let (stderr, _) = stderr;
        for line in String::from_utf8_lossy(&stderr).lines() {
            log::debug!(target: LOG_TARGET, "[isolated] {}", line);
        }

        if stdout_truncated {
            return Err(SandboxError::OutputTooLarge {
                limit: self.max_document_bytes,
            });
        }

        match read_frame(&mut stdout.as_slice()) {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(SandboxError::Worker(format!(
                "Session exited without a reply ({})",
                status
            ))),
            Err(e) => Err(SandboxError::Protocol(e.to_string())),
        }
    }
}

/// Read at most `limit` bytes; the flag reports whether more were available.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: R,
    limit: usize,
) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut buf).await?;
    let truncated = buf.len() > limit;
    buf.truncate(limit);
    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let mut config = EngineConfig::default();
        config.sandbox.program = Some(PathBuf::from("/nonexistent/component-sandbox"));
        let err = SandboxLauncher::new(&config).run("<p>hi</p>").await.unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }

    #[tokio::test]
    async fn unconfigured_program_is_refused() {
        let err = SandboxLauncher::new(&EngineConfig::default())
            .run("<p>hi</p>")
            .await
            .unwrap_err();
        assert!(
            matches!(err, SandboxError::Spawn { ref reason, .. } if reason.contains("no isolated worker program configured"))
        );
    }

    #[tokio::test]
    async fn read_capped_flags_overflow() {
        let (buf, truncated) = read_capped(&b"abcdef"[..], 4).await.unwrap();
        assert_eq!(buf, b"abcd");
        assert!(truncated);

        let (buf, truncated) = read_capped(&b"abc"[..], 4).await.unwrap();
        assert_eq!(buf, b"abc");
        assert!(!truncated);
    }

    #[test]
    fn launcher_forwards_settings() {
        let mut config = EngineConfig::default();
        config.max_render_passes = 7;
        config.sandbox.allowed_origins = vec!["https://api.example.com".into()];
        let launcher = SandboxLauncher::new(&config);
        assert_eq!(launcher.settings.max_render_passes, 7);
        assert_eq!(launcher.settings.allowed_origins, config.sandbox.allowed_origins);
    }
}
