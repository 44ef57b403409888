mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use apiary_sync::{SyncConfig, SyncSession};

use crate::store::RecordStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apiary=info".into()),
        )
        .init();

    // Config
    let ws_url =
        std::env::var("APIARY_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:8765/ws".into());
    let url = Url::parse(&ws_url)?;
    anyhow::ensure!(
        matches!(url.scheme(), "ws" | "wss"),
        "APIARY_WS_URL must be a ws:// or wss:// endpoint, got {ws_url}"
    );

    let mut config = SyncConfig::new(ws_url.clone());
    if let Ok(secs) = std::env::var("APIARY_HEARTBEAT_SECS") {
        config.heartbeat_interval = Duration::from_secs(secs.parse()?);
    }
    if let Ok(n) = std::env::var("APIARY_MAX_RECONNECTS") {
        config.max_reconnect_attempts = n.parse()?;
    }

    let store = Arc::new(RecordStore::default());
    let (session, handle) = SyncSession::new(config, store.clone());

    info!("apiary dashboard syncing from {ws_url}");
    let session_task = tokio::spawn(session.run());

    // The sync core keeps running through outages on its own; we only
    // surface terminal failure and stop on ctrl-c.
    let mut state_rx = handle.watch();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                handle.shutdown();
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow().clone();
                if state.exhausted {
                    warn!(
                        "sync gave up after {} attempts -- restart or set APIARY_MAX_RECONNECTS higher",
                        state.reconnect_attempts
                    );
                }
            }
        }
    }

    session_task.await??;
    info!(records = store.len(), "final record count");
    Ok(())
}
