/// Single abstraction over the bidirectional collector stream.
///
/// Wraps one `tokio-tungstenite` socket and exposes typed send/receive.
/// The session is the only owner; after a terminal event it drops the
/// handle so no further sends are attempted against a dead channel.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use apiary_types::{ClientMessage, ServerMessage};

use crate::error::SyncError;

/// One event pulled from the channel. `Closed` and `Failed` are terminal;
/// everything else counts as a liveness signal.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A parsed collector message.
    Message(ServerMessage),
    /// A structurally invalid frame; logged and discarded, not fatal.
    Malformed(String),
    /// Frame-level traffic (ws ping/pong) with no protocol meaning.
    Activity,
    /// The collector closed the stream.
    Closed,
    /// The transport errored; the socket is unusable.
    Failed(tokio_tungstenite::tungstenite::Error),
}

pub struct Channel {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Channel {
    /// Establish the stream. Connection failures surface as `Err` and are
    /// routed into the reconnection policy by the caller.
    pub async fn open(url: &str) -> Result<Self, SyncError> {
        let (ws, _response) = connect_async(url).await?;
        debug!(url, "channel open");
        Ok(Self { ws })
    }

    /// Serialize and send one typed message. Returns whether the send
    /// succeeded; it never blocks beyond the socket write itself.
    pub async fn send(&mut self, msg: &ClientMessage) -> bool {
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(e) => {
                warn!("unserializable client message: {e}");
                return false;
            }
        };
        match self.ws.send(Message::Text(text.into())).await {
            Ok(()) => true,
            Err(e) => {
                warn!("send on dead channel: {e}");
                false
            }
        }
    }

    /// Pull the next event. Exactly one terminal event (`Closed` or
    /// `Failed`) is yielded per channel; afterwards the caller drops it.
    pub async fn next_event(&mut self) -> ChannelEvent {
        match self.ws.next().await {
            None => ChannelEvent::Closed,
            Some(Err(e)) => ChannelEvent::Failed(e),
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(msg) => ChannelEvent::Message(msg),
                Err(e) => {
                    ChannelEvent::Malformed(format!("{e} -- raw: {}", clip(&text, 200)))
                }
            },
            Some(Ok(Message::Close(_))) => ChannelEvent::Closed,
            // Ping/pong/binary frames: liveness only.
            Some(Ok(_)) => ChannelEvent::Activity,
        }
    }

    /// Best-effort close handshake.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Truncate a raw frame for log output without splitting a multi-byte
/// character.
fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_respects_char_boundaries() {
        // 'é' is two bytes; placed so the cut index lands inside it.
        let frame = format!("{}é{}", "x".repeat(199), "y".repeat(9));
        let clipped = clip(&frame, 200);
        assert_eq!(clipped.len(), 199);
        assert!(clipped.chars().all(|c| c == 'x'));

        assert_eq!(clip("short", 200), "short");
        assert_eq!(clip(&"é".repeat(100), 199), "é".repeat(99));
    }
}
