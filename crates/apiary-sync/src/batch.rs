/// Bulk-load transfer controller.
///
/// Drives the chunked history download announced by the collector:
/// accumulates batches in any order, tracks completeness through a
/// [`BatchSet`], and computes the exact missing set when the transfer
/// stalls. The controller is pure state; the session owns the timers and
/// the channel and feeds events in.

use apiary_types::Record;

use crate::chunkset::BatchSet;

/// Transfer lifecycle. `Stalled` and `Recovering` are entered from timer
/// events in the session; `Failed` only from `abandon`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    Announced,
    Receiving,
    Stalled,
    Recovering,
    Complete,
    Failed,
}

/// Result of feeding one `batch_data` message in.
#[derive(Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Newly received batch; ack it and re-arm the stall timer.
    Accepted {
        received: u32,
        total: u32,
        all_received: bool,
    },
    /// Index already seen; ack again (the index is durably accepted) but
    /// do not double-count its records.
    Duplicate,
    /// Index outside `1..=total`; log and ignore.
    OutOfRange,
    /// No transfer is active; log and ignore.
    NoTransfer,
}

/// Result of an end-of-transfer check.
#[derive(Debug, PartialEq)]
pub enum CompleteOutcome {
    /// Every batch arrived; hands the accumulated records over.
    Finalized(Vec<Record>),
    /// Counts mismatch; behave exactly as if a stall had fired with this
    /// missing set instead of finalizing partial data.
    Mismatch(Vec<u32>),
    NoTransfer,
}

/// One ephemeral bulk-load session. At most one is active at a time;
/// announcing a new one discards any prior partial state.
#[derive(Debug)]
pub struct BatchTransfer {
    phase: TransferPhase,
    set: Option<BatchSet>,
    records: Vec<Record>,
}

impl BatchTransfer {
    pub fn new() -> Self {
        Self {
            phase: TransferPhase::Idle,
            set: None,
            records: Vec::new(),
        }
    }

    #[inline]
    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    /// No transfer in progress, or all batches already received.
    pub fn is_settled(&self) -> bool {
        match &self.set {
            None => true,
            Some(set) => set.is_complete(),
        }
    }

    /// `batch_start`: reset accumulation and record the expected count.
    /// The caller arms the stall timer.
    pub fn on_start(&mut self, total_batches: u32) {
        if self.set.is_some() {
            tracing::warn!(
                "new bulk load announced while one was active, discarding partial transfer"
            );
        }
        self.set = Some(BatchSet::new(total_batches));
        self.records.clear();
        self.phase = TransferPhase::Announced;
    }

    /// `batch_data`: append records and mark the index received.
    pub fn on_batch(&mut self, batch_number: u32, attempts: Vec<Record>) -> BatchOutcome {
        let Some(set) = self.set.as_mut() else {
            return BatchOutcome::NoTransfer;
        };
        if batch_number == 0 || batch_number > set.total() {
            return BatchOutcome::OutOfRange;
        }
        if !set.mark(batch_number) {
            return BatchOutcome::Duplicate;
        }
        self.records.extend(attempts);
        let (received, total) = (set.received(), set.total());
        let all_received = set.is_complete();
        // A retransmitted batch must not downgrade an in-flight recovery:
        // the caller keys end-of-recovery handling on the phase.
        self.phase = if all_received {
            TransferPhase::Complete
        } else if matches!(
            self.phase,
            TransferPhase::Stalled | TransferPhase::Recovering
        ) {
            self.phase
        } else {
            TransferPhase::Receiving
        };
        BatchOutcome::Accepted {
            received,
            total,
            all_received,
        }
    }

    /// Stall timer fired with batches still pending. Returns the exact
    /// missing set to request; the caller sends it and, on success, calls
    /// [`mark_recovering`](Self::mark_recovering).
    pub fn on_stall(&mut self) -> Option<Vec<u32>> {
        let set = self.set.as_ref()?;
        if set.is_complete() {
            return None;
        }
        self.phase = TransferPhase::Stalled;
        Some(set.missing())
    }

    /// A recovery request went out; missing batches are now awaited under
    /// the recovery deadline.
    pub fn mark_recovering(&mut self) {
        self.phase = TransferPhase::Recovering;
    }

    /// `batch_complete` (or the final missing batch during recovery).
    pub fn on_complete(&mut self) -> CompleteOutcome {
        let Some(set) = self.set.as_ref() else {
            return CompleteOutcome::NoTransfer;
        };
        if set.is_complete() {
            self.set = None;
            self.phase = TransferPhase::Idle;
            CompleteOutcome::Finalized(std::mem::take(&mut self.records))
        } else {
            self.phase = TransferPhase::Stalled;
            CompleteOutcome::Mismatch(set.missing())
        }
    }

    /// Abandon the transfer (collector error, recovery timeout, channel
    /// replacement). Partial data is dropped, never surfaced.
    pub fn abandon(&mut self) {
        self.set = None;
        self.records.clear();
        self.phase = TransferPhase::Failed;
    }

    /// Fractional progress and a human-readable label.
    pub fn progress(&self) -> Option<(f64, String)> {
        let set = self.set.as_ref()?;
        let fraction = if set.total() == 0 {
            1.0
        } else {
            f64::from(set.received()) / f64::from(set.total())
        };
        Some((
            fraction,
            format!("Loaded {}/{} batches", set.received(), set.total()),
        ))
    }
}

impl Default for BatchTransfer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    use apiary_types::Protocol;

    fn records(n: usize) -> Vec<Record> {
        let ts = NaiveDateTime::parse_from_str("2025-03-01 08:12:45", "%Y-%m-%d %H:%M:%S").unwrap();
        (0..n)
            .map(|i| Record {
                timestamp: ts,
                client_ip: format!("203.0.113.{i}"),
                protocol: Protocol::Ssh,
                username: None,
                password: None,
                latitude: None,
                longitude: None,
                city: None,
                region: None,
                country: None,
            })
            .collect()
    }

    #[test]
    fn test_stall_requests_exactly_the_missing_set() {
        // batch_start{3}, batches 1 and 3 arrive, then silence.
        let mut transfer = BatchTransfer::new();
        transfer.on_start(3);
        assert!(matches!(
            transfer.on_batch(1, records(4)),
            BatchOutcome::Accepted { received: 1, .. }
        ));
        assert!(matches!(
            transfer.on_batch(3, records(4)),
            BatchOutcome::Accepted { received: 2, .. }
        ));
        assert_eq!(transfer.on_stall(), Some(vec![2]));
        assert_eq!(transfer.phase(), TransferPhase::Stalled);
        transfer.mark_recovering();

        // Requesting again without new arrivals yields the same set.
        assert_eq!(transfer.on_stall(), Some(vec![2]));
    }

    #[test]
    fn test_recovery_survives_multiple_retransmitted_batches() {
        // batch_start{4}, batches 1 and 2 arrive, then silence; both missing
        // batches are retransmitted. The first retransmission must not drop
        // the recovering phase, and the last one completes the transfer.
        let mut transfer = BatchTransfer::new();
        transfer.on_start(4);
        transfer.on_batch(1, records(2));
        transfer.on_batch(2, records(2));
        assert_eq!(transfer.on_stall(), Some(vec![3, 4]));
        transfer.mark_recovering();

        assert!(matches!(
            transfer.on_batch(3, records(2)),
            BatchOutcome::Accepted {
                all_received: false,
                ..
            }
        ));
        assert_eq!(transfer.phase(), TransferPhase::Recovering);

        assert!(matches!(
            transfer.on_batch(4, records(2)),
            BatchOutcome::Accepted {
                all_received: true,
                ..
            }
        ));
        assert_eq!(transfer.phase(), TransferPhase::Complete);
        match transfer.on_complete() {
            CompleteOutcome::Finalized(recs) => assert_eq!(recs.len(), 8),
            other => panic!("expected finalized, got {other:?}"),
        }
    }

    #[test]
    fn test_finalized_outcomes_compare_with_geo_fields() {
        let mut with_geo = records(1);
        with_geo[0].latitude = Some(48.8566);
        with_geo[0].longitude = Some(2.3522);
        let mut transfer = BatchTransfer::new();
        transfer.on_start(1);
        transfer.on_batch(1, with_geo.clone());
        assert_eq!(transfer.on_complete(), CompleteOutcome::Finalized(with_geo));
    }

    #[test]
    fn test_duplicates_never_double_count() {
        let mut transfer = BatchTransfer::new();
        transfer.on_start(2);
        transfer.on_batch(1, records(5));
        assert_eq!(transfer.on_batch(1, records(5)), BatchOutcome::Duplicate);
        transfer.on_batch(2, records(5));
        match transfer.on_complete() {
            CompleteOutcome::Finalized(recs) => assert_eq!(recs.len(), 10),
            other => panic!("expected finalized, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_order_arrival_accepted() {
        let mut transfer = BatchTransfer::new();
        transfer.on_start(3);
        for n in [3, 1, 2] {
            assert!(matches!(
                transfer.on_batch(n, records(2)),
                BatchOutcome::Accepted { .. }
            ));
        }
        assert_eq!(transfer.phase(), TransferPhase::Complete);
        assert!(transfer.is_settled());
    }

    #[test]
    fn test_complete_with_pending_batches_behaves_as_stall() {
        let mut transfer = BatchTransfer::new();
        transfer.on_start(4);
        transfer.on_batch(1, records(1));
        transfer.on_batch(4, records(1));
        match transfer.on_complete() {
            CompleteOutcome::Mismatch(missing) => assert_eq!(missing, vec![2, 3]),
            other => panic!("expected mismatch, got {other:?}"),
        }
        assert_eq!(transfer.phase(), TransferPhase::Stalled);
    }

    #[test]
    fn test_new_start_discards_partial_transfer() {
        let mut transfer = BatchTransfer::new();
        transfer.on_start(3);
        transfer.on_batch(1, records(9));
        transfer.on_start(2);
        transfer.on_batch(1, records(1));
        transfer.on_batch(2, records(1));
        match transfer.on_complete() {
            CompleteOutcome::Finalized(recs) => assert_eq!(recs.len(), 2),
            other => panic!("expected finalized, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_and_inactive_batches_ignored() {
        let mut transfer = BatchTransfer::new();
        assert_eq!(transfer.on_batch(1, records(1)), BatchOutcome::NoTransfer);
        transfer.on_start(2);
        assert_eq!(transfer.on_batch(0, records(1)), BatchOutcome::OutOfRange);
        assert_eq!(transfer.on_batch(3, records(1)), BatchOutcome::OutOfRange);
        assert!(transfer.on_stall().is_some());
    }

    #[test]
    fn test_empty_bulk_load_finalizes_empty() {
        let mut transfer = BatchTransfer::new();
        transfer.on_start(0);
        assert!(transfer.is_settled());
        match transfer.on_complete() {
            CompleteOutcome::Finalized(recs) => assert!(recs.is_empty()),
            other => panic!("expected finalized, got {other:?}"),
        }
    }

    #[test]
    fn test_abandon_drops_partial_data() {
        let mut transfer = BatchTransfer::new();
        transfer.on_start(3);
        transfer.on_batch(1, records(7));
        transfer.abandon();
        assert_eq!(transfer.phase(), TransferPhase::Failed);
        assert!(transfer.is_settled());
        assert_eq!(transfer.on_complete(), CompleteOutcome::NoTransfer);
    }
}
