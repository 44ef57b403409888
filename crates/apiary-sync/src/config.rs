use std::time::Duration;

/// Tunable timings and bounds for one sync session.
///
/// Defaults match the collector's production behavior; tests shrink them
/// to milliseconds.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:8765/ws`.
    pub url: String,

    /// Interval between outgoing heartbeat probes.
    pub heartbeat_interval: Duration,
    /// How long a single probe may stay unanswered before it counts as missed.
    pub heartbeat_deadline: Duration,
    /// Silence past this marks the connection unstable (status only).
    pub unstable_after: Duration,
    /// Silence past this is treated as connection death.
    pub dead_after: Duration,
    /// Idle time past which an external wake trigger issues a `ping`.
    pub idle_probe_after: Duration,
    /// How long a `ping` may stay unanswered before forcing closure.
    pub ping_deadline: Duration,

    /// No new batch within this window counts as a stalled transfer.
    pub stall_timeout: Duration,
    /// Missing batches must arrive within this after a recovery request.
    pub recovery_timeout: Duration,
    /// No `batch_start` within this after requesting the bulk load
    /// triggers one request retry, then reconnection.
    pub batch_start_timeout: Duration,

    /// Backoff baseline for the first genuine reconnection attempt.
    pub reconnect_base_delay: Duration,
    /// Multiplier applied per further attempt.
    pub reconnect_growth: f64,
    /// Backoff ceiling.
    pub reconnect_max_delay: Duration,
    /// Automatic attempts allowed per outage before terminal failure.
    pub max_reconnect_attempts: u32,
}

impl SyncConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765/ws".into(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_deadline: Duration::from_secs(10),
            unstable_after: Duration::from_secs(40),
            dead_after: Duration::from_secs(120),
            idle_probe_after: Duration::from_secs(10),
            ping_deadline: Duration::from_secs(2),
            stall_timeout: Duration::from_secs(10),
            recovery_timeout: Duration::from_secs(15),
            batch_start_timeout: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_growth: 1.5,
            reconnect_max_delay: Duration::from_millis(30_000),
            max_reconnect_attempts: 10,
        }
    }
}
