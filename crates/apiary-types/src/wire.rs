use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Messages sent FROM the collector TO the dashboard over WebSocket.
///
/// Envelope is `{"type": ..., "data": {...}}`, one message per frame.
/// No-field messages still carry an empty `data` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Announces a bulk history load split into numbered batches.
    BatchStart { total_batches: u32 },

    /// One numbered slice of the bulk history. Indices are 1-based and
    /// may arrive out of order.
    BatchData {
        batch_number: u32,
        attempts: Vec<Record>,
    },

    /// Collector believes it has sent every batch.
    BatchComplete {},

    /// Collector aborted the bulk load.
    BatchError {
        error: String,
        #[serde(default)]
        message: Option<String>,
    },

    /// Answer to a `heartbeat` probe.
    HeartbeatResponse {},

    /// Unsolicited collector-side heartbeat.
    ServerHeartbeat { uptime: f64 },

    /// Answer to a lightweight `ping` probe.
    Pong {},

    /// A live login attempt captured after the bulk load.
    LoginAttempt { attempt: Record },

    /// Dashboard-only passthrough types the sync core does not interpret.
    #[serde(other)]
    Unknown,
}

/// Messages sent FROM the dashboard TO the collector over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the collector to start a bulk history load.
    RequestDataBatches {},

    /// Acknowledge one durably accepted batch index.
    BatchAck { batch_number: u32 },

    /// Ask for retransmission of exactly the named batch indices.
    RequestMissingBatches { batch_numbers: Vec<u32> },

    /// Liveness probe; timestamp is unix millis.
    Heartbeat { timestamp: i64 },

    /// Lightweight liveness probe issued on external wake triggers.
    Ping { timestamp: i64 },
}
