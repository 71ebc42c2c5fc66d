/// Server setup and initialization
///
/// Wires together all components: storage, registry, execution store, handler
/// registry, coordinator and HTTP routes.

use crate::{
    api::{create_router, AppState},
    blocks::{HandlerRegistry, Services},
    config::{Config, StoreBackend},
    runtime::{
        BroadcastNotifier, ExecutionEngine, ExecutionStore, MemoryExecutionStore,
        SqliteExecutionStore,
    },
    workflow::{storage::WorkflowStorage, WorkflowRegistry},
};
use anyhow::Result;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;

    let db_path = config.database_path();
    tracing::info!("🗄️ Opening database: {}", db_path.display());
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    tracing::info!("📋 Initializing workflow storage");
    let workflow_storage = WorkflowStorage::new(pool.clone()).await?;

    tracing::info!("📊 Initializing workflow registry");
    let registry = Arc::new(WorkflowRegistry::new(workflow_storage));
    registry
        .init_from_storage()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load workflows from storage: {}", e))?;

    let store: Arc<dyn ExecutionStore> = match config.database.execution_store {
        StoreBackend::Sqlite => {
            tracing::info!("💾 Using SQLite execution store");
            Arc::new(SqliteExecutionStore::new(pool).await?)
        }
        StoreBackend::Memory => {
            tracing::warn!("⚠️ Using in-memory execution store, run state is lost on restart");
            Arc::new(MemoryExecutionStore::new())
        }
    };

    let handlers = Arc::new(HandlerRegistry::with_builtin(Services::from_config(&config.services)));
    tracing::info!("🧩 Registered block types: {}", handlers.block_types().join(", "));

    tracing::info!("🚀 Initializing execution engine");
    let engine = Arc::new(ExecutionEngine::new(
        handlers,
        store,
        registry.clone(),
        Arc::new(BroadcastNotifier::default()),
        config.engine.clone(),
    ));

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = create_router(AppState { registry, engine });

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting blockflow server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
