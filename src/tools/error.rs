//! Tool error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by tool plumbing
///
/// Tool *execution* failures are reported as `ToolResult` errors so the LLM
/// sees them; these are the structural errors underneath.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("path {path} escapes the working directory {workdir}")]
    SandboxViolation { path: PathBuf, workdir: PathBuf },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
