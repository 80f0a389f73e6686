//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working configuration.

use crate::transform::TransformOptions;
use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the whole render pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum V8 heap for the in-process engine in bytes (None = unlimited)
    pub max_heap_size: Option<usize>,
    /// Wall-clock limit for a single evaluate or mount in milliseconds
    pub timeout_ms: Option<u64>,
    /// Maximum synchronous re-render passes before a mount is aborted
    pub max_render_passes: u32,
    pub transform: TransformOptions,
    pub sandbox: SandboxConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_heap_size: Some(64 * 1024 * 1024), // 64MB default
            timeout_ms: Some(5_000),
            max_render_passes: 25,
            transform: TransformOptions::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config '{}': {}", path.display(), e))?;
        serde_json::from_str(&text)
            .map_err(|e| anyhow!("Invalid config '{}': {}", path.display(), e))
    }
}

/// Configuration for isolated sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Executable to launch with `--isolated`. It must answer that flag by
    /// calling `serve_isolated` on its stdin/stdout; the bundled
    /// `component-sandbox` binary does. Sessions fail to start while unset.
    pub program: Option<PathBuf>,
    /// Wall-clock limit for a whole session, spawn to reply
    pub timeout_ms: u64,
    /// Maximum heap of the isolated engine in bytes
    pub max_heap_size: Option<usize>,
    /// Limit on script execution inside the session
    pub render_timeout_ms: u64,
    /// Origins the isolated `fetch` may reach (empty = fetch disabled)
    pub allowed_origins: Vec<String>,
    /// Deployment copy of the pinned scaffold resources (None = embedded)
    pub resources_dir: Option<PathBuf>,
    /// Cap on the populated document returned by a session
    pub max_document_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            program: None,
            timeout_ms: 15_000,
            max_heap_size: Some(64 * 1024 * 1024),
            render_timeout_ms: 10_000,
            allowed_origins: vec![], // fetch disabled by default
            resources_dir: None,
            max_document_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Settings forwarded to the isolated worker with each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolatedSettings {
    pub max_heap_size: Option<usize>,
    pub render_timeout_ms: u64,
    pub allowed_origins: Vec<String>,
    pub resources_dir: Option<PathBuf>,
    pub max_render_passes: u32,
}

impl Default for IsolatedSettings {
    fn default() -> Self {
        IsolatedSettings::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for IsolatedSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_heap_size: config.sandbox.max_heap_size,
            render_timeout_ms: config.sandbox.render_timeout_ms,
            allowed_origins: config.sandbox.allowed_origins.clone(),
            resources_dir: config.sandbox.resources_dir.clone(),
            max_render_passes: config.max_render_passes,
        }
    }
}
