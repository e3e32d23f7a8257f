//! WebSocket transport glue.
//!
//! Carries the wire vocabulary as JSON text frames over a tokio-tungstenite
//! client connection. The socket is split into sink and stream halves; a
//! single connection task multiplexes outbound sends with inbound reads and
//! answers pings inline. Close frames and socket errors surface as a single
//! [`TransportEvent::Disconnected`] on the inbound stream.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{info, warn};
use url::Url;

use crate::error::{TransportError, TransportResult};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::transport::{MessageTransport, TransportEvent};

/// Channel capacity for the connection task.
const WS_CHANNEL_CAPACITY: usize = 256;

/// WebSocket-backed [`MessageTransport`].
///
/// Events are serialized in [`send`](MessageTransport::send), so an
/// unencodable event surfaces to the caller instead of being lost inside the
/// connection task.
pub struct WebSocketTransport {
    outbound: mpsc::Sender<Message>,
}

impl WebSocketTransport {
    /// Connect to the given `wss://` endpoint and spawn the connection task.
    ///
    /// Returns the transport handle and the inbound event stream for the
    /// session. If a bearer token is supplied it is sent as an
    /// `Authorization` header during the handshake.
    pub async fn connect(
        url: &str,
        bearer_token: Option<&str>,
    ) -> TransportResult<(Self, mpsc::Receiver<TransportEvent>)> {
        let parsed =
            Url::parse(url).map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| TransportError::ConnectionFailed("URL has no host".to_string()))?
            .to_string();

        let mut builder = http::Request::builder()
            .uri(url)
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host);
        if let Some(token) = bearer_token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = builder
            .body(())
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!(%url, "WebSocket transport connected");

        let (mut ws_sink, mut ws_reader) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(WS_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(WS_CHANNEL_CAPACITY);

        // The channel was just created; capacity cannot be exhausted yet.
        let _ = inbound_tx.try_send(TransportEvent::Connected);

        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    maybe_out = outbound_rx.recv() => {
                        let Some(msg) = maybe_out else {
                            break "closed by client".to_string();
                        };
                        if let Err(e) = ws_sink.send(msg).await {
                            break format!("send failed: {e}");
                        }
                    }

                    maybe_msg = ws_reader.next() => {
                        match maybe_msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerEvent>(&text) {
                                    Ok(event) => {
                                        if inbound_tx.send(TransportEvent::Event(event)).await.is_err() {
                                            break "receiver dropped".to_string();
                                        }
                                    }
                                    Err(e) => {
                                        warn!("Failed to parse server event: {e} - {text}");
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    break format!("pong failed: {e}");
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                break frame
                                    .map(|f| f.reason.to_string())
                                    .unwrap_or_else(|| "closed by server".to_string());
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => break format!("websocket error: {e}"),
                            None => break "connection closed".to_string(),
                        }
                    }
                }
            };

            let _ = inbound_tx
                .send(TransportEvent::Disconnected { reason })
                .await;
            info!("WebSocket transport task ended");
        });

        Ok((
            Self {
                outbound: outbound_tx,
            },
            inbound_rx,
        ))
    }
}

#[async_trait]
impl MessageTransport for WebSocketTransport {
    async fn send(&self, event: ClientEvent) -> TransportResult<()> {
        let json = serde_json::to_string(&event)?;
        self.outbound
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }
}
