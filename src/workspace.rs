//! Per-task workspace directories.
//!
//! Every task gets its own directory under a fixed base root. The directory is
//! the root of all file and process operations for that task:
//!
//! - `resolve("task-42")` → `{base_root}/task-42` (created on first use)
//! - `resolve("../etc")` → rejected, nothing is created
//!
//! Workspaces are never deleted here; they live as long as the task does.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Invalid task id '{0}': must be non-empty and contain no '/', '\\' or '..'")]
    InvalidTaskId(String),

    #[error("Workspace for task '{task_id}' is unavailable: {source}")]
    WorkspaceUnavailable {
        task_id: String,
        #[source]
        source: std::io::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Task Workspace
// ─────────────────────────────────────────────────────────────────────────────

/// A resolved, existing workspace directory bound to one task id.
///
/// Passed explicitly into every file/process operation instead of being
/// looked up from ambient configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskWorkspace {
    task_id: String,
    root: PathBuf,
}

impl TaskWorkspace {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Canonical absolute path of the workspace directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Check a task id before it is ever joined onto a path.
pub fn validate_task_id(task_id: &str) -> Result<(), WorkspaceError> {
    if task_id.trim().is_empty()
        || task_id.contains("..")
        || task_id.contains('/')
        || task_id.contains('\\')
    {
        return Err(WorkspaceError::InvalidTaskId(task_id.to_string()));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Sandbox
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves task ids to workspace directories under a fixed base root.
#[derive(Debug, Clone)]
pub struct WorkspaceSandbox {
    base_root: PathBuf,
}

impl WorkspaceSandbox {
    pub fn new(base_root: impl Into<PathBuf>) -> Self {
        Self {
            base_root: base_root.into(),
        }
    }

    /// Resolve (and create if needed) the workspace for `task_id`.
    ///
    /// Idempotent: repeated calls return the same path.
    pub fn resolve(&self, task_id: &str) -> Result<TaskWorkspace, WorkspaceError> {
        if let Err(e) = validate_task_id(task_id) {
            warn!("Rejected task id {:?}", task_id);
            return Err(e);
        }

        let unavailable = |source: std::io::Error| {
            error!(
                "Could not prepare workspace for task '{}' under {}: {}",
                task_id,
                self.base_root.display(),
                source
            );
            WorkspaceError::WorkspaceUnavailable {
                task_id: task_id.to_string(),
                source,
            }
        };

        let path = self.base_root.join(task_id);
        std::fs::create_dir_all(&path).map_err(unavailable)?;
        let root = path.canonicalize().map_err(unavailable)?;

        let base = self.base_root.canonicalize().map_err(unavailable)?;
        if !root.starts_with(&base) || root == base {
            // A pre-existing symlink named like the task can point elsewhere.
            warn!(
                "Workspace for task '{}' resolves outside the base root: {}",
                task_id,
                root.display()
            );
            return Err(WorkspaceError::InvalidTaskId(task_id.to_string()));
        }

        debug!("Workspace for task '{}' at {}", task_id, root.display());
        Ok(TaskWorkspace {
            task_id: task_id.to_string(),
            root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_creates_directory_under_base() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = WorkspaceSandbox::new(temp.path());

        let ws = sandbox.resolve("task-1").expect("resolve");
        assert!(ws.root().is_dir());
        assert_eq!(ws.task_id(), "task-1");
        assert!(ws
            .root()
            .starts_with(temp.path().canonicalize().expect("canonical")));
    }

    #[test]
    fn resolve_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = WorkspaceSandbox::new(temp.path());

        let first = sandbox.resolve("same").expect("first");
        std::fs::write(first.root().join("keep.txt"), "x").expect("write");
        let second = sandbox.resolve("same").expect("second");

        assert_eq!(first, second);
        assert!(second.root().join("keep.txt").exists());
    }

    #[test]
    fn rejects_separators_and_parent_refs_without_creating_anything() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = WorkspaceSandbox::new(temp.path());

        for bad in ["", "   ", "..", "a/b", "a\\b", "../escape", "x..y", "/abs"] {
            let err = sandbox.resolve(bad).expect_err(bad);
            assert!(matches!(err, WorkspaceError::InvalidTaskId(_)), "{bad}");
        }

        let entries = std::fs::read_dir(temp.path()).expect("read_dir").count();
        assert_eq!(entries, 0);
        assert!(!temp.path().parent().expect("parent").join("escape").exists());
    }

    #[test]
    fn unavailable_when_base_is_a_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, "x").expect("write");

        let sandbox = WorkspaceSandbox::new(&file);
        let err = sandbox.resolve("task").expect_err("should fail");
        assert!(matches!(err, WorkspaceError::WorkspaceUnavailable { .. }));
    }
}
