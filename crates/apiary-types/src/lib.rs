/// Shared types for the apiary honeypot dashboard.
///
/// `record` holds the login-attempt data model, `wire` the WebSocket
/// message envelopes exchanged with the collector.

pub mod record;
pub mod wire;

pub use record::{Protocol, Record};
pub use wire::{ClientMessage, ServerMessage};
