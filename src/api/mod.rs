//! HTTP API for researchd.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/tasks/{task_id}/tools` - List the tools available to a task
//! - `POST /api/tasks/{task_id}/tools/{name}` - Run a tool inside the task's workspace
//! - `POST /api/research` - Run the deep research pipeline and return the report

mod routes;
pub mod types;

pub use routes::{build_state, router, serve, AppState};
pub use types::*;
