//! Worktree isolation (optional)
//!
//! When enabled, each agent works in a disposable git worktree on a
//! throwaway branch; completed diffs are merged back into the mainline
//! serially. Off by default and never required by the core semantics.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::{debug, info, warn};

/// Worktree operation errors
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("failed to create worktree: {0}")]
    CreateFailed(String),

    #[error("failed to remove worktree: {0}")]
    RemoveFailed(String),

    #[error("merge conflict for branch {0}")]
    MergeConflict(String),

    #[error("not a git repository: {0}")]
    NotARepo(PathBuf),

    #[error("git command failed: {0}")]
    Git(String),
}

/// Worktree settings
#[derive(Debug, Clone)]
pub struct WorktreeConfig {
    /// Path to the main repository
    pub repo_root: PathBuf,

    /// Base directory for worktrees
    pub base_dir: PathBuf,

    /// Branch prefix for throwaway branches
    pub branch_prefix: String,
}

impl WorktreeConfig {
    pub fn for_repo(repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        Self {
            base_dir: repo_root.join(".cortexos").join("worktrees"),
            repo_root,
            branch_prefix: "cortexos".to_string(),
        }
    }
}

/// A created worktree
#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub task_id: String,
    pub path: PathBuf,
    pub branch: String,
}

/// Creates, merges, and removes per-agent worktrees
pub struct WorktreeManager {
    config: WorktreeConfig,
}

impl WorktreeManager {
    pub fn new(config: WorktreeConfig) -> Self {
        Self { config }
    }

    async fn git(&self, args: &[&str], dir: &std::path::Path) -> Result<String, WorktreeError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|e| WorktreeError::Git(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(WorktreeError::Git(String::from_utf8_lossy(&output.stderr).to_string()))
        }
    }

    /// Whether the configured repo root is usable for isolation
    pub async fn is_available(&self) -> bool {
        self.git(&["rev-parse", "--is-inside-work-tree"], &self.config.repo_root)
            .await
            .map(|out| out.trim() == "true")
            .unwrap_or(false)
    }

    /// Create a worktree on a fresh throwaway branch
    pub async fn create(&self, task_id: &str) -> Result<WorktreeInfo, WorktreeError> {
        if !self.is_available().await {
            return Err(WorktreeError::NotARepo(self.config.repo_root.clone()));
        }

        tokio::fs::create_dir_all(&self.config.base_dir)
            .await
            .map_err(|e| WorktreeError::CreateFailed(e.to_string()))?;

        let path = self.config.base_dir.join(task_id);
        let branch = format!("{}/{}", self.config.branch_prefix, task_id);

        let path_arg = path.display().to_string();
        self.git(
            &["worktree", "add", &path_arg, "-b", &branch, "HEAD"],
            &self.config.repo_root,
        )
        .await
        .map_err(|e| WorktreeError::CreateFailed(e.to_string()))?;

        info!(task_id, ?path, %branch, "worktree created");
        Ok(WorktreeInfo {
            task_id: task_id.to_string(),
            path,
            branch,
        })
    }

    /// Merge a worktree's branch into the current mainline branch
    ///
    /// Merges are serial by contract: the engine calls this one worktree at
    /// a time after the owning agent completes.
    pub async fn merge(&self, info: &WorktreeInfo) -> Result<(), WorktreeError> {
        debug!(task_id = %info.task_id, branch = %info.branch, "merging worktree branch");

        // Commit any working-tree changes the agent left behind
        self.git(&["add", "-A"], &info.path).await?;
        let status = self.git(&["status", "--porcelain"], &info.path).await?;
        if !status.trim().is_empty() {
            self.git(
                &["commit", "-m", &format!("agent changes for {}", info.task_id)],
                &info.path,
            )
            .await?;
        }

        match self
            .git(&["merge", "--no-ff", &info.branch, "-m", &format!("merge {}", info.branch)], &self.config.repo_root)
            .await
        {
            Ok(_) => {
                info!(branch = %info.branch, "worktree branch merged");
                Ok(())
            }
            Err(e) => {
                warn!(branch = %info.branch, error = %e, "merge failed, aborting");
                let _ = self.git(&["merge", "--abort"], &self.config.repo_root).await;
                Err(WorktreeError::MergeConflict(info.branch.clone()))
            }
        }
    }

    /// Remove a worktree and its branch
    pub async fn remove(&self, info: &WorktreeInfo) -> Result<(), WorktreeError> {
        let path_arg = info.path.display().to_string();
        self.git(&["worktree", "remove", "--force", &path_arg], &self.config.repo_root)
            .await
            .map_err(|e| WorktreeError::RemoveFailed(e.to_string()))?;
        let _ = self.git(&["branch", "-D", &info.branch], &self.config.repo_root).await;
        debug!(task_id = %info.task_id, "worktree removed");
        Ok(())
    }
}
