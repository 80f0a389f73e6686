//! Error taxonomy for the render pipeline.
//!
//! `NormalizationAmbiguity` has no type here: the normalizer never fails,
//! it only records the ambiguity on its output. `SandboxRenderError` is
//! rendered inside the isolated context and never reaches the host as a
//! Rust error.

use thiserror::Error;

pub type RenderResult<T> = Result<T, RenderError>;

/// Rejection from the syntax transformer. Deterministic, so never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({line}:{column})")]
pub struct TransformError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl TransformError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Failure while defining or first invoking a component in-process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Failed to construct component: {message}")]
    Construction { message: String },

    #[error("Component threw while rendering: {message}")]
    Render { message: String },

    #[error("Component exceeded the {timeout_ms}ms execution limit")]
    TimedOut { timeout_ms: u64 },

    #[error("Rendered output rejected: {0}")]
    Rejected(String),

    #[error("Engine failure: {0}")]
    Engine(String),
}

/// Why the fast path did not produce a mounted component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),
}

/// Failure of the isolated session itself (not of the component inside it).
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Failed to start isolated session '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Isolated session timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Isolated session output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("Isolated session protocol error: {0}")]
    Protocol(String),

    #[error("Isolated session failed: {0}")]
    Worker(String),

    #[error("Isolated session I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Surface already holds the view for request {current}; unmount it first")]
    Occupied { current: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_error_reports_position() {
        let err = TransformError::new("Unterminated JSX contents", 3, 14);
        assert_eq!(err.to_string(), "Unterminated JSX contents (3:14)");
    }

    #[test]
    fn render_error_prefixes_stage() {
        let err: RenderError = TransformError::new("Unexpected token", 1, 1).into();
        assert!(err.to_string().starts_with("Transform error: "));

        let err: RenderError = ExecutionError::Render {
            message: "ReferenceError: window is not defined".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Component threw while rendering: ReferenceError: window is not defined"
        );
    }
}
