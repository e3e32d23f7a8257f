//! In-memory loopback transport.
//!
//! Pairs a [`ChannelTransport`] (the client half handed to the session) with
//! a [`ChannelPeer`] (the remote half held by tests or an embedded server
//! stub). Everything sent by the session shows up on the peer's receiver;
//! everything the peer injects shows up on the session's inbound stream.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};
use crate::protocol::ClientEvent;
use crate::transport::{MessageTransport, TransportEvent};

/// Default channel capacity for loopback pairs.
const CHANNEL_CAPACITY: usize = 64;

/// Client half of the loopback pair.
pub struct ChannelTransport {
    outbound: mpsc::Sender<ClientEvent>,
}

/// Remote half of the loopback pair.
pub struct ChannelPeer {
    /// Messages the session sent, in order
    pub sent: mpsc::Receiver<ClientEvent>,
    /// Injects transport events into the session's inbound stream
    pub inject: mpsc::Sender<TransportEvent>,
}

impl ChannelTransport {
    /// Build a connected pair: the transport, the inbound event stream for
    /// the session, and the peer handle.
    pub fn pair() -> (Self, mpsc::Receiver<TransportEvent>, ChannelPeer) {
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        (
            Self {
                outbound: outbound_tx,
            },
            inbound_rx,
            ChannelPeer {
                sent: outbound_rx,
                inject: inbound_tx,
            },
        )
    }
}

#[async_trait]
impl MessageTransport for ChannelTransport {
    async fn send(&self, event: ClientEvent) -> TransportResult<()> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerEvent;

    #[tokio::test]
    async fn test_loopback_round_trip() {
        let (transport, mut inbound, mut peer) = ChannelTransport::pair();

        transport
            .send(ClientEvent::Stop)
            .await
            .expect("Should send");
        match peer.sent.recv().await.expect("Should receive") {
            ClientEvent::Stop => {}
            other => panic!("Expected Stop, got {other:?}"),
        }

        peer.inject
            .send(TransportEvent::Event(ServerEvent::TextUpdate {
                text: "hi".to_string(),
            }))
            .await
            .expect("Should inject");
        match inbound.recv().await.expect("Should receive") {
            TransportEvent::Event(ServerEvent::TextUpdate { text }) => assert_eq!(text, "hi"),
            other => panic!("Expected TextUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped() {
        let (transport, _inbound, peer) = ChannelTransport::pair();
        drop(peer);

        let err = transport.send(ClientEvent::Stop).await.unwrap_err();
        match err {
            TransportError::Closed => {}
            other => panic!("Expected Closed, got {other:?}"),
        }
    }
}
