use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{info, warn};

use apiary_sync::SyncObserver;
use apiary_types::{Protocol, Record};

/// In-memory record store behind the sync core's observer interface.
///
/// Holds the synchronized record set for the rendering layers (charts,
/// map, tables) to query. Replaced wholesale on every completed bulk
/// load, appended to by live attempts.
#[derive(Default)]
pub struct RecordStore {
    records: RwLock<Vec<Record>>,
}

impl RecordStore {
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attempt counts per protocol, for the summary widgets.
    pub fn counts_by_protocol(&self) -> HashMap<Protocol, usize> {
        let mut counts = HashMap::new();
        if let Ok(records) = self.records.read() {
            for rec in records.iter() {
                *counts.entry(rec.protocol).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn snapshot(&self) -> Vec<Record> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }
}

impl SyncObserver for RecordStore {
    fn records_ready(&self, records: &[Record]) {
        if let Ok(mut store) = self.records.write() {
            *store = records.to_vec();
        }
        let counts = self.counts_by_protocol();
        info!(total = records.len(), ?counts, "attack history synchronized");
    }

    fn record_added(&self, record: &Record) {
        info!(
            client_ip = %record.client_ip,
            protocol = ?record.protocol,
            username = record.username.as_deref().unwrap_or("-"),
            "live attack"
        );
        if let Ok(mut store) = self.records.write() {
            store.push(record.clone());
        }
    }

    fn progress(&self, fraction: f64, label: &str) {
        info!(pct = (fraction * 100.0) as u32, "{}", label);
    }

    fn status(&self, text: &str, is_error: bool) {
        if is_error {
            warn!("{}", text);
        } else {
            info!("{}", text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn record(protocol: Protocol) -> Record {
        Record {
            timestamp: NaiveDateTime::parse_from_str("2025-03-01 08:12:45", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
            client_ip: "203.0.113.1".into(),
            protocol,
            username: None,
            password: None,
            latitude: None,
            longitude: None,
            city: None,
            region: None,
            country: None,
        }
    }

    #[test]
    fn test_ready_replaces_and_live_appends() {
        let store = RecordStore::default();
        store.records_ready(&[record(Protocol::Ssh), record(Protocol::Telnet)]);
        assert_eq!(store.len(), 2);

        store.record_added(&record(Protocol::Ssh));
        assert_eq!(store.len(), 3);
        assert_eq!(store.counts_by_protocol()[&Protocol::Ssh], 2);

        // A fresh bulk load (e.g. after reconnect) replaces everything.
        store.records_ready(&[record(Protocol::Http)]);
        assert_eq!(store.len(), 1);
    }
}
