//! Ops and extension definitions for both engines.
//!
//! `component_host` backs the long-lived in-process engine: captured console
//! and the two capability lists. `component_isolate` backs one isolated
//! session: captured console, the session's source and settings, the
//! session-local transformer and the allowlisted fetch.

use crate::capabilities::ExecutionCapabilities;
use crate::config::IsolatedSettings;
use crate::fetch::op_fetch;
use crate::transform::{transform, TransformOptions};
use deno_core::{op2, OpState};
use serde::Serialize;

// ============================================================================
// Console Output Capture
// ============================================================================

/// Captured console output from a runtime
#[derive(Debug, Default, Clone)]
pub struct ConsoleOutput {
    pub logs: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

impl ConsoleOutput {
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty() && self.warns.is_empty() && self.errors.is_empty()
    }

    /// Forward everything to the log facade under `target`.
    pub fn forward(&self, target: &str) {
        for line in &self.logs {
            log::info!(target: target, "[js] {}", line);
        }
        for line in &self.warns {
            log::warn!(target: target, "[js] {}", line);
        }
        for line in &self.errors {
            log::error!(target: target, "[js] {}", line);
        }
    }
}

#[op2(fast)]
pub fn op_console_log(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.logs.push(msg.to_string());
    }
}

#[op2(fast)]
pub fn op_console_warn(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.warns.push(msg.to_string());
    }
}

#[op2(fast)]
pub fn op_console_error(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.errors.push(msg.to_string());
    }
}

// ============================================================================
// Capability Table
// ============================================================================

#[op2]
#[serde]
pub fn op_capability_names() -> Vec<String> {
    ExecutionCapabilities::standard().names()
}

#[op2]
#[serde]
pub fn op_intrinsic_names() -> Vec<String> {
    ExecutionCapabilities::standard().intrinsic_names()
}

// ============================================================================
// Isolated Session
// ============================================================================

/// Raw source handed to an isolated session
#[derive(Debug, Clone, Default)]
pub struct IsolatedSource(pub String);

#[op2]
#[string]
pub fn op_isolated_source(state: &mut OpState) -> String {
    state
        .try_borrow::<IsolatedSource>()
        .map(|source| source.0.clone())
        .unwrap_or_default()
}

#[op2]
#[serde]
pub fn op_isolated_settings(state: &mut OpState) -> IsolatedSettings {
    state
        .try_borrow::<IsolatedSettings>()
        .cloned()
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct TransformReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Transformer reachable from inside the session. Errors come back as data
/// so the entry module can render them.
#[op2]
#[serde]
pub fn op_transform(state: &mut OpState, #[string] source: &str) -> TransformReply {
    let options = state
        .try_borrow::<TransformOptions>()
        .cloned()
        .unwrap_or_default();
    match transform(source, &options) {
        Ok(transformed) => TransformReply {
            code: Some(transformed.code),
            error: None,
        },
        Err(err) => TransformReply {
            code: None,
            error: Some(err.to_string()),
        },
    }
}

// ============================================================================
// Extension Definitions
// ============================================================================

deno_core::extension!(
    component_host,
    ops = [
        op_console_log,
        op_console_warn,
        op_console_error,
        op_capability_names,
        op_intrinsic_names,
    ],
    esm_entry_point = "ext:component_host/host_bootstrap.js",
    esm = [
        "ext:component_host/console.js" = "src/js/console.js",
        "ext:component_host/ui_runtime.js" = "src/js/ui_runtime.js",
        "ext:component_host/host_bootstrap.js" = "src/js/host_bootstrap.js",
    ],
);

deno_core::extension!(
    component_isolate,
    ops = [
        op_console_log,
        op_console_warn,
        op_console_error,
        op_isolated_source,
        op_isolated_settings,
        op_transform,
        op_fetch,
    ],
    esm_entry_point = "ext:component_isolate/isolated_bootstrap.js",
    esm = [
        "ext:component_isolate/console.js" = "src/js/console.js",
        "ext:component_isolate/isolated_bootstrap.js" = "src/js/isolated_bootstrap.js",
    ],
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_output_empty() {
        let mut output = ConsoleOutput::default();
        assert!(output.is_empty());
        output.warns.push("careful".into());
        assert!(!output.is_empty());
    }
}
