pub mod agent;
pub mod api;
pub mod config;
pub mod demo;
pub mod error;
pub mod state;

use agent::{CdpLauncher, DemoAgent};
use demo::JsonSessionStore;
use state::AppState;
use std::sync::Arc;

/// Initialize tracing; `RUST_LOG` overrides the default `info` level
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build the production service graph: Chrome over CDP, configured LLM
/// providers, JSON session files.
pub fn build_state(config: config::AppConfig) -> error::Result<Arc<AppState>> {
    let agent = DemoAgent::from_config(&config.ai, &config.pipeline)?;
    let store = Arc::new(JsonSessionStore::new(config.sessions_dir.clone()));
    tracing::info!("Session records stored in {:?}", config.sessions_dir);

    Ok(Arc::new(AppState::new(
        config,
        Arc::new(CdpLauncher),
        store,
        agent,
    )))
}

/// Serve the API until Ctrl-C, then end every live demo
pub async fn run(config: config::AppConfig) -> error::Result<()> {
    let port = config.server.port;
    let state = build_state(config)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutdown requested");
    };

    let served = api::run_server(Arc::clone(&state), port, shutdown).await;

    // Close every browser even if the server failed
    state.demos.shutdown().await;
    served
}
