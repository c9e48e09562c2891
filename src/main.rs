//! researchd - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the research and workspace tools.

use researchd::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "researchd=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: workspace_root={}, curator_model={}",
        config.workspace_root.display(),
        config.models.curator
    );

    std::fs::create_dir_all(&config.workspace_root)?;

    api::serve(config).await?;

    Ok(())
}
