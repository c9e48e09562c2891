//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::tools::ToolInfo;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Whether web search is configured
    pub search_enabled: bool,

    /// Whether the deep research tool is configured
    pub research_enabled: bool,
}

/// Tools available to one task.
#[derive(Debug, Clone, Serialize)]
pub struct ToolListResponse {
    pub task_id: String,
    pub tools: Vec<ToolInfo>,
}

/// Request to run a tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteToolRequest {
    /// Raw tool input, passed through unchanged
    pub input: String,
}

/// Tool output. Tool-level failures arrive here as `Error: ...` text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteToolResponse {
    pub tool: String,
    pub output: String,
}

/// Rendered research report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResponse {
    pub report: String,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
