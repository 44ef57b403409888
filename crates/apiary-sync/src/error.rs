use thiserror::Error;

/// Errors surfaced by the sync core.
///
/// Transport errors route into the reconnection policy; protocol errors
/// are logged and the affected batch or transfer discarded. Nothing here
/// is a hard crash.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed collector message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("automatic reconnection attempts exhausted after {attempts}")]
    ReconnectExhausted { attempts: u32 },
}
