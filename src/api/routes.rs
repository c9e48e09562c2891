//! HTTP route handlers.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::llm::{LlmClient, OpenRouterClient, RetryPolicy};
use crate::research::{
    LlmGenerationService, ResearchOrchestrator, ResearchRequest, ResearchServices, SearchService,
    TavilySearch,
};
use crate::tools::{ContentFetcher, PageFetcher, ToolContext, ToolRegistry};
use crate::workspace::{WorkspaceError, WorkspaceSandbox};

use super::types::*;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sandbox: WorkspaceSandbox,
    pub tools: ToolContext,
    /// One registry per task id, built on first use
    pub registries: RwLock<HashMap<String, Arc<ToolRegistry>>>,
}

impl AppState {
    pub fn new(config: Config, tools: ToolContext) -> Self {
        let sandbox = WorkspaceSandbox::new(config.workspace_root.clone());
        Self {
            config,
            sandbox,
            tools,
            registries: RwLock::new(HashMap::new()),
        }
    }

    async fn registry_for(&self, task_id: &str) -> Result<Arc<ToolRegistry>, WorkspaceError> {
        if let Some(registry) = self.registries.read().await.get(task_id) {
            return Ok(Arc::clone(registry));
        }

        let workspace = self.sandbox.resolve(task_id)?;
        let mut registries = self.registries.write().await;
        let registry = registries
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(ToolRegistry::for_task(&self.tools, workspace)));
        Ok(Arc::clone(registry))
    }
}

/// Build the collaborators described by `config`.
///
/// Search needs `TAVILY_API_KEY`; deep research additionally needs
/// `OPENROUTER_API_KEY`. Missing keys disable the feature, they are not errors.
pub fn build_state(config: Config) -> anyhow::Result<AppState> {
    let fetcher: Arc<dyn PageFetcher> = Arc::new(ContentFetcher::new(
        config.web_reader.timeout,
        config.web_reader.max_length,
    )?);

    let search: Option<Arc<dyn SearchService>> = match &config.tavily_api_key {
        Some(key) => {
            let tavily = TavilySearch::new(key.clone(), config.web_reader.timeout * 2)?;
            Some(Arc::new(tavily) as Arc<dyn SearchService>)
        }
        None => {
            tracing::warn!("TAVILY_API_KEY not set; web search is unavailable");
            None
        }
    };

    let research = match &config.openrouter_api_key {
        Some(key) => {
            let client: Arc<dyn LlmClient> = Arc::new(OpenRouterClient::new(
                key.clone(),
                config.llm_timeout,
                RetryPolicy::new(config.llm_max_retries),
            )?);
            let role = |model: &str| Arc::new(LlmGenerationService::new(Arc::clone(&client), model));
            let services = ResearchServices {
                search: search.clone(),
                fetcher: Arc::clone(&fetcher),
                curator: role(&config.models.curator),
                summarizer: role(&config.models.summarizer),
                writer: role(&config.models.writer),
            };
            tracing::info!(
                "Deep research enabled (curator={}, summarizer={}, writer={})",
                config.models.curator,
                config.models.summarizer,
                config.models.writer
            );
            Some(Arc::new(ResearchOrchestrator::new(
                services,
                config.research.clone(),
            )))
        }
        None => {
            tracing::warn!("OPENROUTER_API_KEY not set; deep research is disabled");
            None
        }
    };

    let tools = ToolContext {
        fetcher,
        search,
        research,
        read_limits: config.read_limits.clone(),
        shell_limits: config.shell_limits.clone(),
    };

    Ok(AppState::new(config, tools))
}

/// The application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tasks/:task_id/tools", get(list_tools))
        .route("/api/tasks/:task_id/tools/:name", post(execute_tool))
        .route("/api/research", post(run_research))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(build_state(config)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        search_enabled: state.tools.search.is_some(),
        research_enabled: state.tools.research.is_some(),
    })
}

fn workspace_error(e: WorkspaceError) -> ApiError {
    match e {
        WorkspaceError::InvalidTaskId(_) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        WorkspaceError::WorkspaceUnavailable { .. } => {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn list_tools(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<ToolListResponse>, ApiError> {
    let registry = state.registry_for(&task_id).await.map_err(workspace_error)?;
    Ok(Json(ToolListResponse {
        task_id,
        tools: registry.list_tools(),
    }))
}

async fn execute_tool(
    State(state): State<Arc<AppState>>,
    Path((task_id, name)): Path<(String, String)>,
    Json(req): Json<ExecuteToolRequest>,
) -> Result<Json<ExecuteToolResponse>, ApiError> {
    let registry = state.registry_for(&task_id).await.map_err(workspace_error)?;
    if !registry.has_tool(&name) {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Unknown tool: {}", name),
        ));
    }

    let output = registry
        .execute(&name, &req.input)
        .await
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string()))?;

    Ok(Json(ExecuteToolResponse { tool: name, output }))
}

async fn run_research(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let orchestrator = state.tools.research.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Deep research is not configured (OPENROUTER_API_KEY is not set)",
        )
    })?;

    let report = orchestrator
        .run(&req)
        .await
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    Ok(Json(ResearchResponse { report }))
}
