use std::sync::Arc;

use tracing::{info, warn};

use shopglow::api::{self, AppState};
use shopglow::assistant::{Completion, OpenAiClient, Responder};
use shopglow::config::{Config, StoreKind};
use shopglow::store::{MemoryStore, SqliteStore, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // Not fatal; the environment may already be set
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!(?config, "Shop&Glow starting...");

    let store: Arc<dyn Storage> = match config.store {
        StoreKind::Memory => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
        StoreKind::Sqlite => {
            info!("Initializing store at {}", config.database_path.display());
            let store = SqliteStore::new(&config.database_path).await?;
            store.init().await?;
            Arc::new(store)
        }
    };

    let completion = OpenAiClient::from_config(&config.assistant)
        .map(|client| Arc::new(client) as Arc<dyn Completion>);
    let responder = Responder::new(completion);
    if !responder.is_online() {
        warn!("OPENAI_API_KEY not set, chat will use offline replies");
    }

    let app = api::router(AppState::new(store, responder));

    let addr = config.socket_addr();
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                info!("Server stopped with error: {}", e);
            }
        }
    }

    Ok(())
}
