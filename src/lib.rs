//! # researchd
//!
//! Web research and sandboxed task workspaces for an autonomous agent.
//!
//! This library provides:
//! - A multi-phase research pipeline (search, curate, extract, budget, synthesize)
//!   that turns a query into a Markdown report
//! - Per-task workspaces with containment-checked file access and bounded
//!   shell execution
//! - A tool registry exposing both to an agent, and an HTTP API over it
//!
//! ## Architecture
//!
//! ```text
//!   HTTP API ──► ToolRegistry (per task) ──► web_page_reader / web_search
//!                      │                      read_file / write_file / workspace_shell
//!                      ▼
//!           deep_research_synthesizer
//!                      │
//!                      ▼
//!            ResearchOrchestrator ──► SearchService, PageFetcher,
//!                                     curator / summarizer / writer generation
//! ```
//!
//! ## Modules
//! - `research`: the pipeline and its collaborator traits
//! - `tools`: tool trait, registry and the concrete tools
//! - `workspace`: task id validation and per-task directories
//! - `llm`: OpenRouter chat-completions client

pub mod api;
pub mod config;
pub mod llm;
pub mod research;
pub mod tools;
pub mod util;
pub mod workspace;

pub use config::Config;
pub use research::{ResearchError, ResearchOrchestrator, ResearchRequest};
pub use tools::{Tool, ToolRegistry};
pub use workspace::{TaskWorkspace, WorkspaceSandbox};
