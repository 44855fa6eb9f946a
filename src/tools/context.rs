//! ToolContext - execution context for tools
//!
//! Each agent gets its own context scoping file operations to its working
//! directory and collecting file-change records. The handoff tool reaches
//! the message bus through the context as well.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::bus::MessageBus;
use crate::domain::{AgentRole, FileChange};

use super::ToolError;

/// Execution context for tools, scoped to a single agent run
#[derive(Clone)]
pub struct ToolContext {
    /// Working directory; file operations are constrained here
    pub workdir: PathBuf,

    /// Task this agent is executing
    pub task_id: String,

    /// Role of the executing agent, carried on handoffs
    pub role: AgentRole,

    /// File changes recorded this run, append-only
    changes: Arc<Mutex<Vec<FileChange>>>,

    /// Bus handle for coordination tools (handoff); absent in plain runs
    bus: Option<Arc<MessageBus>>,

    /// Whether the path sandbox is enforced (default: true)
    pub sandbox_enabled: bool,
}

impl ToolContext {
    pub fn new(workdir: PathBuf, task_id: String, role: AgentRole) -> Self {
        Self {
            workdir,
            task_id,
            role,
            changes: Arc::new(Mutex::new(Vec::new())),
            bus: None,
            sandbox_enabled: true,
        }
    }

    /// Context with a bus handle, enabling coordination tools
    pub fn with_bus(workdir: PathBuf, task_id: String, role: AgentRole, bus: Arc<MessageBus>) -> Self {
        Self {
            bus: Some(bus),
            ..Self::new(workdir, task_id, role)
        }
    }

    /// Context with the sandbox disabled (tests only)
    pub fn new_unsandboxed(workdir: PathBuf, task_id: String, role: AgentRole) -> Self {
        Self {
            sandbox_enabled: false,
            ..Self::new(workdir, task_id, role)
        }
    }

    pub fn bus(&self) -> Option<&Arc<MessageBus>> {
        self.bus.as_ref()
    }

    /// Record a file change; records are never deduplicated
    pub fn record_change(&self, change: FileChange) {
        self.changes.lock().unwrap_or_else(|e| e.into_inner()).push(change);
    }

    /// Drain the recorded changes, in recording order
    pub fn take_changes(&self) -> Vec<FileChange> {
        std::mem::take(&mut *self.changes.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    /// Validate that a path stays within the working directory
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let normalized = self.normalize_path(path);

        if !self.sandbox_enabled {
            return Ok(normalized);
        }

        // Canonicalize existing paths to resolve symlinks; for paths that do
        // not exist yet, canonicalize the nearest existing parent.
        let canonical = if normalized.exists() {
            normalized.canonicalize().unwrap_or_else(|_| normalized.clone())
        } else if let Some(parent) = normalized.parent() {
            if parent.exists() {
                let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
                canonical_parent.join(normalized.file_name().unwrap_or_default())
            } else {
                normalized.clone()
            }
        } else {
            normalized.clone()
        };

        let workdir_canonical = self.workdir.canonicalize().unwrap_or_else(|_| self.workdir.clone());

        if canonical.starts_with(&workdir_canonical) {
            Ok(canonical)
        } else {
            Err(ToolError::SandboxViolation {
                path: path.to_path_buf(),
                workdir: self.workdir.clone(),
            })
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("workdir", &self.workdir)
            .field("task_id", &self.task_id)
            .field("role", &self.role)
            .field("sandbox_enabled", &self.sandbox_enabled)
            .finish()
    }
}
