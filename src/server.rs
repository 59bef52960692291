/// Server setup and initialization
///
/// Wires together all components: definition repository, module cache,
/// execution engine, session manager, sweeper and HTTP routes.

use crate::{
    api::workflows::{create_workflow_routes, AppState},
    config::Config,
    database::ConnectionManager,
    definition::{storage::SqliteDefinitionRepository, ModuleCache},
    runtime::engine::{EngineLimits, ExecutionEngine},
    session::{InMemorySessionStore, SessionManager, SessionStore, SessionSweeper},
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Create the main Axum application with all routes
///
/// The sweeper and in-flight runs stop when `shutdown` is cancelled.
pub async fn create_app(config: Config, shutdown: CancellationToken) -> Result<Router> {
    // Ensure the definitions directory exists
    if let Some(parent) = Path::new(&config.definitions.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            tracing::info!("📁 Ensuring definitions directory exists: {}", parent.display());
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Failed to create definitions directory: {}", e))?;
        }
    }

    tracing::info!("📋 Opening definition repository: {}", config.definitions.database_path);
    let options = SqliteConnectOptions::new()
        .filename(&config.definitions.database_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    let repository = SqliteDefinitionRepository::new(pool);
    repository
        .init_schema()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize definition schema: {}", e))?;

    let connections = ConnectionManager::new(
        config.databases.connections.clone(),
        config.databases.max_connections,
        config.databases.acquire_timeout(),
    );
    tracing::info!("🗄️ Configured database connections: {:?}", connections.connection_names());

    tracing::info!("🚀 Initializing execution engine");
    let engine = Arc::new(
        ExecutionEngine::new(Arc::new(ModuleCache::new()), Arc::new(connections), Arc::new(repository))
            .with_limits(EngineLimits {
                max_call_depth: config.engine.max_call_depth,
                max_iterations: config.engine.max_iterations,
            }),
    );

    tracing::info!("📥 Loading applications into module cache");
    engine
        .load_applications(config.definitions.activate_on_start)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load applications: {}", e))?;

    tracing::info!("👥 Initializing session manager");
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let manager = Arc::new(
        SessionManager::new(Arc::clone(&engine), Arc::clone(&store)).with_shutdown(shutdown.clone()),
    );

    SessionSweeper::new(store, config.session.sweep_interval(), config.session.max_age()).spawn(shutdown);

    let app_state = AppState { manager, engine };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes().with_state(app_state));

    tracing::info!("✅ Application initialized successfully");

    Ok(app)
}

/// Start the HTTP server with the given configuration
///
/// Runs until Ctrl-C, then stops the sweeper and drains connections.
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Stepway server...");

    let shutdown = CancellationToken::new();
    let app = create_app(config.clone(), shutdown.clone()).await?;

    // Bind to the configured address
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("⏹️ Shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
