use anyhow::Result;
use tracing::info;
use translation_sync::{config::Config, server};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_sync=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        "Starting translation sync server ({} environment)",
        config.environment
    );

    let state = server::AppState::new(config)?;
    info!(
        "Loaded {} project(s) from {}",
        state.registry.projects().count(),
        state.config.projects_file
    );

    server::serve(state).await
}
