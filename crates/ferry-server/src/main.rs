use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ferry_server::api::{self, AppState};
use ferry_server::auth::JwtVerifier;
use ferry_server::config::ServerConfig;
use ferry_shared::identity::IdentityProvider;
use ferry_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ferry_server=debug")),
        )
        .init();

    info!("Starting Ferry signaling server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        addr = %config.http_addr,
        db_path = ?config.db_path,
        authenticated = config.jwt_secret.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    let identity: Option<Arc<dyn IdentityProvider>> = config
        .jwt_secret
        .as_deref()
        .map(|secret| Arc::new(JwtVerifier::new(secret)) as Arc<dyn IdentityProvider>);

    let state = AppState::new(db, identity);

    // -----------------------------------------------------------------------
    // 4. Run the server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
