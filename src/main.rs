//! Wellflow server
//!
//! Serves the session API over HTTP, backed by SQLite.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wellflow::api::{create_router, AppState};
use wellflow::config::{AppConfig, OracleKind};
use wellflow::db::Database;
use wellflow::llm::LlmConfig;
use wellflow::routing::{DecisionOracle, KeywordOracle, LlmOracle};
use wellflow::runtime::{DatabaseStorage, FlowController, SessionManager};
use wellflow::tasks::{builtin_registry, BUILTIN_TASKS};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wellflow=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    let Some(llm) = LlmConfig::from_env().build()? else {
        tracing::error!("No LLM API keys configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY.");
        return Err("task handlers need a language model".into());
    };

    let registry = builtin_registry(&llm);
    let oracle: Arc<dyn DecisionOracle> = match config.oracle {
        OracleKind::Llm => Arc::new(LlmOracle::new(llm.clone())),
        OracleKind::Keyword => Arc::new(KeywordOracle::from_catalog(BUILTIN_TASKS)?),
    };
    tracing::info!(
        oracle = ?config.oracle,
        tasks = registry.len(),
        fallback = %config.flow.fallback_task,
        stack_capacity = config.flow.stack_capacity.get(),
        "Flow controller configured"
    );

    let controller = FlowController::new(oracle, registry, config.flow.clone())?;
    let sessions = SessionManager::new(controller, DatabaseStorage::new(db));
    let state = AppState::new(sessions);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Wellflow server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
