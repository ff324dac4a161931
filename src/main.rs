//! Application entrypoint and state wiring.

use std::process;
use std::sync::atomic::Ordering;

use provenance_ledger::routes::{self, AppState};
use provenance_ledger::{JsonFileStore, Ledger, LedgerConfig, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("provenance_ledger=info")),
        )
        .init();

    info!("provenance-ledger v{}", env!("CARGO_PKG_VERSION"));

    // 1) ledger
    let ledger_config = LedgerConfig::from_env();
    let store = JsonFileStore::new(&ledger_config.storage_path);
    let ledger = match Ledger::open(&ledger_config, store) {
        Ok(ledger) => ledger,
        Err(e) => {
            error!("Failed to open ledger: {e}");
            process::exit(1);
        }
    };
    info!(
        "Ledger ready: {} block(s), difficulty {}",
        ledger.len(),
        ledger.difficulty()
    );

    // 2) shared state + router
    let state = AppState::new(ledger);
    let stop = state.stop.clone();
    let app = routes::router(state);

    // 3) serve
    let server_config = ServerConfig::from_env();
    let bind_addr = server_config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {bind_addr}: {e}");
            process::exit(1);
        }
    };
    info!("Listening on http://{bind_addr}");

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received, shutting down");
        stop.store(true, Ordering::Relaxed);
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("Server error: {e}");
        process::exit(1);
    }
}
