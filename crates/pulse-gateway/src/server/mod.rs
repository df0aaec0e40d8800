//! Gateway server setup
//!
//! One listener serves the socket upgrade and the read-only HTTP surface.

mod handler;
mod state;

pub use handler::{socket_handler, ConnectParams};
pub use state::GatewayState;

use crate::connection::ConnectionManager;
use axum::{routing::get, Router};
use pulse_api::AppState;
use pulse_cache::{KvStore, MemoryStore, RedisPool, RedisPoolConfig};
use pulse_common::{AppConfig, AppError};
use pulse_core::{ChatRepository, IdentityResolver, InMemoryDirectory, MembershipDirectory};
use pulse_db::PgDirectory;
use pulse_service::ServiceContextBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new().route("/socket", get(socket_handler))
}

/// Build the complete application: socket route, HTTP surface and middleware
pub fn create_app(state: GatewayState) -> Router {
    let api_state = AppState::from_shared(state.service_context_arc(), state.config().clone());
    let cors = state.config().cors.clone();

    let router = create_router()
        .with_state(state)
        .merge(pulse_api::create_router().with_state(api_state));
    pulse_api::apply_middleware(router, &cors)
}

/// Backing store: Redis when configured, process memory otherwise
fn create_store(config: &AppConfig) -> Result<Arc<dyn KvStore>, AppError> {
    match &config.redis {
        Some(redis) => {
            tracing::info!("Connecting to Redis...");
            let pool = RedisPool::new(RedisPoolConfig::from(redis))
                .map_err(|e| AppError::Cache(e.to_string()))?;
            tracing::info!("Redis pool created");
            Ok(Arc::new(pool))
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory store (single instance only)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Identity, membership and chat collaborators
async fn create_collaborators(
    config: &AppConfig,
) -> Result<
    (
        Arc<dyn IdentityResolver>,
        Arc<dyn MembershipDirectory>,
        Arc<dyn ChatRepository>,
    ),
    AppError,
> {
    match &config.database {
        Some(database) => {
            tracing::info!("Connecting to PostgreSQL...");
            let pool = pulse_db::create_pool(&pulse_db::DatabaseConfig::from(database))
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            tracing::info!("PostgreSQL connection established");

            let directory = Arc::new(PgDirectory::new(pool));
            Ok((directory.clone(), directory.clone(), directory))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory directory");
            let directory = Arc::new(InMemoryDirectory::new());
            Ok((directory.clone(), directory.clone(), directory))
        }
    }
}

/// Initialize all dependencies and create `GatewayState`
pub async fn create_gateway_state(config: AppConfig) -> Result<GatewayState, AppError> {
    let store = create_store(&config)?;
    let (identity, directory, chats) = create_collaborators(&config).await?;

    let connection_manager = ConnectionManager::new_shared();

    let service_context = ServiceContextBuilder::new()
        .store(store)
        .transport(connection_manager.clone())
        .identity(identity)
        .directory(directory)
        .chats(chats)
        .presence_config(config.presence.clone())
        .mailbox_config(config.mailbox.clone())
        .call_config(config.calls.clone())
        .build()
        .map_err(|e| AppError::Config(e.to_string()))?;

    // Coalesced status changes go out on a timer
    service_context.batcher().clone().spawn_flush(
        service_context.transport().clone(),
        config.presence.status_batch_interval(),
    );

    Ok(GatewayState::new(
        service_context,
        connection_manager,
        config,
    ))
}

/// Run the gateway server
pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), AppError> {
    tracing::info!("Starting Gateway server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Gateway listening on ws://{}/socket", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Config(format!("Server error: {e}")))?;

    Ok(())
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr: SocketAddr = config
        .server
        .address()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid listen address: {e}")))?;

    let state = create_gateway_state(config).await?;
    let app = create_app(state);

    run_server(app, addr).await
}
