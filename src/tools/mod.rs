//! Tool system for the agent.
//!
//! Tools are the "hands and eyes" of the agent: they let it fetch web pages,
//! search, run the deep-research pipeline, and work inside its task workspace.
//!
//! ## Workspace-Confined Design
//!
//! File and shell tools are bound to one [`TaskWorkspace`] when the registry is
//! built for a task:
//! - Relative paths (e.g., `output/report.md`) resolve inside the workspace
//! - Absolute paths and `..` segments are refused outright
//! - Resolved paths are re-checked against the workspace root, so symlinks
//!   and composed inputs cannot step outside it
//!
//! Every tool takes a single input string and returns a single output string.
//! Failures come back as `Error: ...` text; they never escape the tool boundary.

mod file_ops;
mod research;
mod terminal;
mod web;

pub use file_ops::{
    read_file, write_file, FileAccessError, ReadFile, ReadLimits, WriteFile, TEXT_EXTENSIONS,
};
pub use research::DeepResearch;
pub use terminal::{run_command, CommandOutput, ProcessError, ShellLimits, WorkspaceShell};
pub use web::{
    extract_text_from_html, normalize_url, ContentFetcher, FetchError, FetchUrl, PageFetcher,
    WebSearch,
};

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::research::{ResearchOrchestrator, SearchService};
use crate::workspace::TaskWorkspace;

// ============================================================================
// Path Resolution Utilities
// ============================================================================

/// Why a caller-supplied path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRejection {
    /// The path was absolute (or carried a root/drive prefix).
    Absolute,
    /// The path contained a `..` segment.
    ParentReference,
    /// The path resolved outside the workspace root.
    OutsideWorkspace,
}

/// Resolve a relative path inside `workspace`.
///
/// - Absolute paths and `..` segments (with either separator) are rejected
/// - The joined path is normalized and must still start with `workspace`
/// - The deepest existing ancestor is canonicalized and checked as well, so a
///   symlink inside the workspace cannot point out of it
pub fn resolve_path(path_str: &str, workspace: &Path) -> Result<PathBuf, PathRejection> {
    let path = Path::new(path_str);
    if path.is_absolute()
        || path_str.starts_with('/')
        || path_str.starts_with('\\')
        || path.has_root()
        || has_drive_prefix(path_str)
    {
        return Err(PathRejection::Absolute);
    }
    if path_str.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PathRejection::ParentReference);
    }

    let mut normalized = workspace.to_path_buf();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(PathRejection::ParentReference),
            Component::RootDir | Component::Prefix(_) => return Err(PathRejection::Absolute),
        }
    }

    if !normalized.starts_with(workspace) {
        return Err(PathRejection::OutsideWorkspace);
    }

    let canonical_workspace = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());
    let mut existing = normalized.as_path();
    while !existing.exists() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => break,
        }
    }
    if let Ok(canonical) = existing.canonicalize() {
        if !canonical.starts_with(&canonical_workspace) {
            return Err(PathRejection::OutsideWorkspace);
        }
    }

    Ok(normalized)
}

fn has_drive_prefix(path_str: &str) -> bool {
    let bytes = path_str.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

// ============================================================================
// Tool Trait and Registry
// ============================================================================

/// A tool as listed to callers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool input.
    pub parameters: Value,
}

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON schema for the tool's input.
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": self.description()
                }
            },
            "required": ["input"]
        })
    }

    /// Execute the tool with its raw input string.
    async fn execute(&self, input: &str) -> anyhow::Result<String>;
}

/// Shared handles a registry needs to build its tools.
#[derive(Clone)]
pub struct ToolContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub search: Option<Arc<dyn SearchService>>,
    pub research: Option<Arc<ResearchOrchestrator>>,
    pub read_limits: ReadLimits,
    pub shell_limits: ShellLimits,
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry (no built-in tools).
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Tools that need no workspace: web reading, search, deep research.
    pub fn global(ctx: &ToolContext) -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(FetchUrl::new(Arc::clone(&ctx.fetcher))));
        if let Some(search) = &ctx.search {
            registry.register(Arc::new(WebSearch::new(Arc::clone(search))));
        }
        if let Some(research) = &ctx.research {
            registry.register(Arc::new(DeepResearch::new(Arc::clone(research))));
        }

        registry
    }

    /// All tools, with file and shell tools bound to `workspace`.
    ///
    /// Built once per task context.
    pub fn for_task(ctx: &ToolContext, workspace: TaskWorkspace) -> Self {
        let registry_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        tracing::debug!(
            "Creating ToolRegistry {} for task '{}'",
            registry_id,
            workspace.task_id()
        );
        let mut registry = Self::global(ctx);

        registry.register(Arc::new(ReadFile::new(
            workspace.clone(),
            ctx.read_limits.clone(),
        )));
        registry.register(Arc::new(WriteFile::new(workspace.clone())));
        registry.register(Arc::new(WorkspaceShell::new(
            workspace,
            ctx.shell_limits.clone(),
        )));

        tracing::info!(
            "Registry {} complete with {} total tools",
            registry_id,
            registry.tools.len()
        );
        registry
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// List all available tools, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Check if a tool exists by name.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a tool by name.
    ///
    /// Only an unknown tool name is an `Err`; a failing tool yields its
    /// `Error: ...` text as the output.
    pub async fn execute(&self, name: &str, input: &str) -> anyhow::Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;

        tracing::info!("Executing tool '{}'", name);
        match tool.execute(input).await {
            Ok(output) => Ok(output),
            Err(e) => {
                tracing::warn!("Tool '{}' failed: {}", name, e);
                Ok(format!("Error: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_accepts_nested_relative_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().canonicalize().expect("canonical");

        let resolved = resolve_path("./a/b/c.txt", &root).expect("resolve");
        assert_eq!(resolved, root.join("a").join("b").join("c.txt"));
    }

    #[test]
    fn resolve_path_rejects_absolute_and_parent_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().canonicalize().expect("canonical");

        assert_eq!(
            resolve_path("/etc/passwd", &root),
            Err(PathRejection::Absolute)
        );
        assert_eq!(resolve_path("C:\\x", &root), Err(PathRejection::Absolute));
        assert_eq!(
            resolve_path("a/../../b", &root),
            Err(PathRejection::ParentReference)
        );
        assert_eq!(
            resolve_path("..\\b", &root),
            Err(PathRejection::ParentReference)
        );
    }

    #[cfg(unix)]
    #[test]
    fn resolve_path_rejects_symlink_escape() {
        let outside = tempfile::tempdir().expect("outside");
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().canonicalize().expect("canonical");
        std::os::unix::fs::symlink(outside.path(), root.join("link")).expect("symlink");

        assert_eq!(
            resolve_path("link/secret.txt", &root),
            Err(PathRejection::OutsideWorkspace)
        );
    }
}
