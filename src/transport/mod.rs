//! Transport boundary.
//!
//! The session core does not know how messages reach the remote side; it
//! depends only on [`MessageTransport`] for sending and on a stream of
//! [`TransportEvent`]s for receiving. Connection lifecycle signals travel
//! through the same stream as protocol messages, so the session observes
//! everything in one arrival order.
//!
//! Reconnection policy is deliberately not part of this boundary: a
//! disconnect always ends the session, and a reconnected channel carries a
//! brand-new session.

pub mod channel;
pub mod websocket;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::protocol::{ClientEvent, ServerEvent};

pub use channel::{ChannelPeer, ChannelTransport};
pub use websocket::WebSocketTransport;

/// Inbound events delivered by a transport, in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection is established
    Connected,
    /// The connection is gone; any session on it is over
    Disconnected {
        /// Reason supplied by the transport
        reason: String,
    },
    /// A protocol message from the remote side
    Event(ServerEvent),
}

/// Outbound half of a bidirectional named-message channel.
///
/// Implementations must be safe to share across tasks; the session core
/// holds one behind an `Arc`.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver one message to the remote side.
    async fn send(&self, event: ClientEvent) -> TransportResult<()>;
}
