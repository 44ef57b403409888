/// Apiary sync core: reliable live synchronization of honeypot login
/// attempts over a single WebSocket.
///
/// Provides:
/// - One owned transport channel per session with typed send/receive
/// - Chunked bulk-load protocol with per-batch acks and missing-batch recovery
/// - Heartbeat-based detection of silent connection death
/// - Bounded exponential-backoff reconnection with a manual override
/// - A single orchestrating session loop that re-wires everything on
///   channel replacement
///
/// Rendering, filtering and export live outside this crate and consume it
/// only through [`SyncObserver`] and the published [`SessionState`].

pub mod batch;
pub mod chunkset;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod reconnect;
pub mod session;
pub mod status;
pub mod transport;

// Re-export key types for convenience.
pub use batch::{BatchOutcome, BatchTransfer, CompleteOutcome, TransferPhase};
pub use chunkset::BatchSet;
pub use config::SyncConfig;
pub use error::SyncError;
pub use heartbeat::{HeartbeatMonitor, Liveness};
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use session::{SessionCommand, SessionHandle, SessionState, SyncSession};
pub use status::{NullObserver, SyncObserver, TracingObserver};
pub use transport::{Channel, ChannelEvent};
