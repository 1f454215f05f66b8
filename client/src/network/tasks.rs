/// Async tasks for sending and receiving on the prediction channel
///
/// The sender task owns the write half and drains an outbound queue; the
/// receiver task owns the read half, answers pings through that same queue
/// and forwards decoded events.

use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::network::connection::{WsReader, WsWriter};
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::messages::ServerEvent;
use crate::network::protocol::{EnginePacket, SocketPacketKind};

/// Why a connected session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called locally
    ClientDisconnect,
    /// The server sent a DISCONNECT packet
    ServerDisconnect,
    /// The WebSocket was closed
    TransportClose,
    /// The WebSocket failed
    TransportError,
    /// Nothing was received within the liveness window
    PingTimeout,
    /// A frame could not be decoded
    ParseError,
}

impl DisconnectReason {
    /// Socket.IO reason string
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ClientDisconnect => "io client disconnect",
            DisconnectReason::ServerDisconnect => "io server disconnect",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError => "transport error",
            DisconnectReason::PingTimeout => "ping timeout",
            DisconnectReason::ParseError => "parse error",
        }
    }

    /// Whether automatic reconnection applies after this disconnect
    ///
    /// An explicit disconnect from either side is final.
    pub fn should_reconnect(&self) -> bool {
        !matches!(
            self,
            DisconnectReason::ClientDisconnect | DisconnectReason::ServerDisconnect
        )
    }

    /// Reason for a receiver that stopped with an error
    pub fn from_error(err: &NetworkError) -> Self {
        match err {
            NetworkError::ProtocolError(_) | NetworkError::SerializationError(_) => {
                DisconnectReason::ParseError
            }
            _ => DisconnectReason::TransportError,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sender task that writes queued packets to the WebSocket
///
/// Runs until the queue is closed or a DISCONNECT packet has been written,
/// then closes the write half.
///
/// # Example
/// ```no_run
/// use tokio::sync::mpsc;
/// use paddy_client::config::ClientConfig;
/// use paddy_client::network::SocketConnection;
/// use paddy_client::network::tasks::sender_task;
///
/// #[tokio::main]
/// async fn main() {
///     let conn = SocketConnection::connect(&ClientConfig::default(), None)
///         .await
///         .unwrap();
///     let (writer, _reader, _handshake, _peer_id) = conn.split();
///
///     let (outbound_tx, outbound_rx) = mpsc::channel(64);
///
///     tokio::spawn(async move {
///         sender_task(writer, outbound_rx).await
///     });
///     # drop(outbound_tx);
/// }
/// ```
pub async fn sender_task(
    mut ws_writer: WsWriter,
    mut outbound_rx: mpsc::Receiver<EnginePacket>,
) -> NetworkResult<()> {
    info!("Sender task started");

    let mut packet_count = 0u64;

    while let Some(packet) = outbound_rx.recv().await {
        packet_count += 1;

        let is_disconnect = matches!(
            &packet,
            EnginePacket::Message(p) if p.kind == SocketPacketKind::Disconnect
        );

        let frame = packet.encode();
        debug!(
            "Sending packet #{} (size: {} bytes)",
            packet_count,
            frame.len()
        );

        ws_writer
            .send(Message::Text(frame.into()))
            .await
            .map_err(NetworkError::WebSocketError)?;

        if is_disconnect {
            debug!("Disconnect packet sent");
            break;
        }
    }

    info!("Sender task completed: {} packets sent", packet_count);

    if let Err(e) = ws_writer.close().await {
        warn!("Failed to close WebSocket writer: {}", e);
    }

    Ok(())
}

/// Receiver task that reads packets and forwards events
///
/// Pings are answered by queueing a pong on `outbound_tx`. Events are
/// forwarded on `event_tx`. Returns the reason the session ended, or an
/// error if the WebSocket failed or a frame could not be decoded.
pub async fn receiver_task(
    mut ws_reader: WsReader,
    outbound_tx: mpsc::Sender<EnginePacket>,
    event_tx: mpsc::Sender<ServerEvent>,
    liveness_window: Duration,
) -> NetworkResult<DisconnectReason> {
    info!("Receiver task started");

    let mut event_count = 0u64;

    let reason = loop {
        let next = match tokio::time::timeout(liveness_window, ws_reader.next()).await {
            Ok(next) => next,
            Err(_) => {
                warn!(
                    "No packet within {}ms, connection considered dead",
                    liveness_window.as_millis()
                );
                break DisconnectReason::PingTimeout;
            }
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                let packet = EnginePacket::decode(&text).inspect_err(|e| {
                    error!("Failed to decode packet: {}", e);
                })?;

                match packet {
                    EnginePacket::Ping(payload) => {
                        debug!("Received ping, queueing pong");
                        if outbound_tx.send(EnginePacket::Pong(payload)).await.is_err() {
                            break DisconnectReason::ClientDisconnect;
                        }
                    }
                    EnginePacket::Close => {
                        info!("Server closed the engine session");
                        break DisconnectReason::TransportClose;
                    }
                    EnginePacket::Message(packet) => match packet.kind {
                        SocketPacketKind::Event => {
                            let name = packet.event_name().unwrap_or_default();
                            match ServerEvent::from_event(name, packet.event_args()) {
                                Ok(event) => {
                                    event_count += 1;
                                    debug!("Received event #{}: {}", event_count, name);
                                    if event_tx.send(event).await.is_err() {
                                        warn!("Event receiver dropped");
                                        break DisconnectReason::ClientDisconnect;
                                    }
                                }
                                Err(e) => warn!("Dropping malformed '{}' event: {}", name, e),
                            }
                        }
                        SocketPacketKind::Disconnect => {
                            info!("Server disconnected the socket");
                            break DisconnectReason::ServerDisconnect;
                        }
                        SocketPacketKind::ConnectError => {
                            warn!("Received connect error after connect: {:?}", packet.data);
                        }
                        other => debug!("Ignoring socket packet: {:?}", other),
                    },
                    other => debug!("Ignoring engine packet: {:?}", other),
                }
            }
            Some(Ok(Message::Close(frame))) => {
                info!("Received close frame: {:?}", frame);
                break DisconnectReason::TransportClose;
            }
            Some(Ok(Message::Binary(data))) => {
                warn!("Received unexpected binary message: {} bytes", data.len());
            }
            Some(Ok(_)) => {
                // WebSocket-level ping/pong is answered by tungstenite
            }
            Some(Err(e)) => {
                error!("WebSocket error: {}", e);
                return Err(NetworkError::WebSocketError(e));
            }
            None => {
                info!("WebSocket stream ended");
                break DisconnectReason::TransportClose;
            }
        }
    };

    info!(
        "Receiver task completed: {} events received ({})",
        event_count, reason
    );

    Ok(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_reason_strings() {
        assert_eq!(
            DisconnectReason::ClientDisconnect.to_string(),
            "io client disconnect"
        );
        assert_eq!(
            DisconnectReason::ServerDisconnect.as_str(),
            "io server disconnect"
        );
        assert_eq!(DisconnectReason::PingTimeout.as_str(), "ping timeout");
    }

    #[test]
    fn test_disconnect_reason_reconnect_policy() {
        assert!(!DisconnectReason::ClientDisconnect.should_reconnect());
        assert!(!DisconnectReason::ServerDisconnect.should_reconnect());
        assert!(DisconnectReason::TransportClose.should_reconnect());
        assert!(DisconnectReason::TransportError.should_reconnect());
        assert!(DisconnectReason::PingTimeout.should_reconnect());
        assert!(DisconnectReason::ParseError.should_reconnect());
    }

    #[test]
    fn test_disconnect_reason_from_error() {
        assert_eq!(
            DisconnectReason::from_error(&NetworkError::ProtocolError("x".to_string())),
            DisconnectReason::ParseError
        );
        assert_eq!(
            DisconnectReason::from_error(&NetworkError::ConnectionClosed),
            DisconnectReason::TransportError
        );
    }
}
