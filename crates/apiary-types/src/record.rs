use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Service the honeypot was impersonating when the attempt was captured.
///
/// The set is closed on the collector side; `Unknown` absorbs any tag a
/// newer collector may emit so a single odd record never rejects a whole
/// batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ssh,
    Telnet,
    Ftp,
    Http,
    Smtp,
    #[serde(other)]
    Unknown,
}

/// One captured login attempt.
///
/// Timestamps are naive and implicitly UTC (second precision). Records are
/// immutable once received; ordering is insertion order from the transport,
/// not guaranteed chronological.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: NaiveDateTime,
    pub client_ip: String,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}
