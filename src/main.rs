use std::sync::Arc;

use tracing::{error, info};

use roomhy_chat::config::Config;
use roomhy_chat::store::Store;
use roomhy_chat::{http, ChatCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // Not fatal, the environment may already be set
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("RoomHy chat starting...");

    info!("Initializing store at {}", config.db_path.display());
    let store = Store::new(&config.db_path).await?;
    store.init().await?;
    if !store.ping().await {
        anyhow::bail!("Store at {} is not reachable", config.db_path.display());
    }

    let bind_addr = config.bind_addr;
    let coordinator = Arc::new(ChatCoordinator::with_store(store, config));
    let app = http::router(coordinator);

    info!("Listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                error!("Server stopped with error: {}", e);
            }
        }
    }

    Ok(())
}
