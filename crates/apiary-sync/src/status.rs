/// Collaborator-facing reporting sink.
///
/// The dashboard UI (charts, map, tables) and the loading overlay consume
/// the sync core only through this trait: a record callback and a
/// progress/status feed. Implementations can render, forward to a
/// frontend, or discard.

use apiary_types::Record;

pub trait SyncObserver: Send + Sync {
    /// A bulk load finished; `records` is the complete current set.
    fn records_ready(&self, records: &[Record]);

    /// One live record arrived after the bulk load.
    fn record_added(&self, record: &Record);

    /// Bulk-load progress, `fraction` in `0..=1`.
    fn progress(&self, fraction: f64, label: &str);

    /// Connection status text for the user; `is_error` marks degraded or
    /// failed states.
    fn status(&self, text: &str, is_error: bool);
}

/// Observer that reports through the `tracing` crate.
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn records_ready(&self, records: &[Record]) {
        tracing::info!(count = records.len(), "record set ready");
    }

    fn record_added(&self, record: &Record) {
        tracing::debug!(client_ip = %record.client_ip, protocol = ?record.protocol, "live record");
    }

    fn progress(&self, fraction: f64, label: &str) {
        tracing::debug!(pct = (fraction * 100.0) as u32, "{}", label);
    }

    fn status(&self, text: &str, is_error: bool) {
        if is_error {
            tracing::warn!("{}", text);
        } else {
            tracing::info!("{}", text);
        }
    }
}

/// No-op observer that discards everything.
pub struct NullObserver;

impl SyncObserver for NullObserver {
    fn records_ready(&self, _records: &[Record]) {}
    fn record_added(&self, _record: &Record) {}
    fn progress(&self, _fraction: f64, _label: &str) {}
    fn status(&self, _text: &str, _is_error: bool) {}
}
