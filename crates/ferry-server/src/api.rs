use std::sync::Arc;

use axum::{http::Method, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use ferry_shared::identity::IdentityProvider;
use ferry_store::Database;

use crate::negotiation::LinkNegotiation;
use crate::registry::ConnectionRegistry;
use crate::socket;
use crate::transfer::TransferRelay;

#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub negotiation: Arc<LinkNegotiation>,
    pub relay: Arc<TransferRelay>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    /// Wire the signaling subsystems around one shared store handle.
    pub fn new(db: Database, identity: Option<Arc<dyn IdentityProvider>>) -> Self {
        let db = Arc::new(Mutex::new(db));
        let registry = ConnectionRegistry::new();
        let negotiation = Arc::new(LinkNegotiation::new(registry.clone(), db.clone()));
        let relay = Arc::new(TransferRelay::new(registry.clone(), db));

        Self {
            registry,
            negotiation,
            relay,
            identity,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(socket::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting signaling server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
