/// Socket.IO connection to the prediction service
///
/// This module opens the WebSocket, performs the Engine.IO / Socket.IO
/// handshake and presents the bearer token as `auth.token`.

use std::time::Duration;

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::messages::{ConnectAck, ConnectAuth};
use crate::network::protocol::{EnginePacket, Handshake, SocketPacket, SocketPacketKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the WebSocket stream
pub type WsWriter = SplitSink<WsStream, Message>;

/// Read half of the WebSocket stream
pub type WsReader = SplitStream<WsStream>;

/// Established Socket.IO connection
///
/// # Example
/// ```no_run
/// use paddy_client::config::ClientConfig;
/// use paddy_client::network::SocketConnection;
///
/// #[tokio::main]
/// async fn main() {
///     let config = ClientConfig::default();
///     let mut conn = SocketConnection::connect(&config, Some("token"))
///         .await
///         .unwrap();
///
///     println!("peer identity: {}", conn.peer_id());
///     conn.close().await.unwrap();
/// }
/// ```
#[derive(Debug)]
pub struct SocketConnection {
    /// WebSocket stream
    ws_stream: WsStream,

    /// Engine.IO handshake data
    handshake: Handshake,

    /// Identity assigned by the server to this socket
    peer_id: String,

    /// Whether the connection is open
    is_open: bool,
}

impl SocketConnection {
    /// Connect to the prediction service
    ///
    /// The whole handshake (WebSocket upgrade, Engine.IO open, Socket.IO
    /// connect) must finish within `config.timeout_ms`.
    ///
    /// # Errors
    /// - `NetworkError::Timeout` if the handshake does not finish in time
    /// - `NetworkError::ConnectionFailed` if the socket cannot be opened
    /// - `NetworkError::ConnectRejected` if the server refuses the connect packet
    /// - `NetworkError::ProtocolError` on an unexpected packet
    pub async fn connect(config: &ClientConfig, token: Option<&str>) -> NetworkResult<Self> {
        let url = config
            .build_socket_url()
            .map_err(|e| NetworkError::InvalidConfig(e.to_string()))?;
        debug!(url = %url, "Connecting to prediction channel");

        let timeout = Duration::from_millis(config.timeout_ms);

        tokio::time::timeout(timeout, Self::establish(&url, token))
            .await
            .map_err(|_| NetworkError::Timeout(config.timeout_ms))?
    }

    async fn establish(url: &str, token: Option<&str>) -> NetworkResult<Self> {
        let (mut ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        debug!(status = %response.status(), "WebSocket upgraded");

        let handshake = match next_packet(&mut ws_stream).await? {
            EnginePacket::Open(handshake) => handshake,
            other => {
                return Err(NetworkError::ProtocolError(format!(
                    "expected open packet, got {:?}",
                    other
                )));
            }
        };

        debug!(
            engine_sid = %handshake.sid,
            ping_interval = handshake.ping_interval,
            ping_timeout = handshake.ping_timeout,
            "Engine.IO session opened"
        );

        let auth = serde_json::to_value(ConnectAuth { token })?;
        let connect = EnginePacket::Message(SocketPacket::connect(auth));
        ws_stream.send(Message::Text(connect.encode().into())).await?;

        loop {
            match next_packet(&mut ws_stream).await? {
                EnginePacket::Message(packet) if packet.kind == SocketPacketKind::Connect => {
                    let ack: ConnectAck =
                        serde_json::from_value(packet.data.unwrap_or(Value::Null))?;

                    info!(peer_id = %ack.sid, "Connected to prediction channel");

                    return Ok(Self {
                        ws_stream,
                        handshake,
                        peer_id: ack.sid,
                        is_open: true,
                    });
                }
                EnginePacket::Message(packet) if packet.kind == SocketPacketKind::ConnectError => {
                    let message = connect_error_message(packet.data);
                    warn!(message = %message, "Server rejected connection");
                    return Err(NetworkError::ConnectRejected(message));
                }
                EnginePacket::Ping(payload) => {
                    ws_stream
                        .send(Message::Text(EnginePacket::Pong(payload).encode().into()))
                        .await?;
                }
                EnginePacket::Close => return Err(NetworkError::ConnectionClosed),
                other => debug!("Ignoring packet during handshake: {:?}", other),
            }
        }
    }

    /// Identity assigned by the server
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Engine.IO handshake data
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Check if the connection is open
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Leave the namespace and close the WebSocket
    pub async fn close(&mut self) -> NetworkResult<()> {
        if !self.is_open {
            return Ok(());
        }

        info!("Closing prediction channel");

        let disconnect = EnginePacket::Message(SocketPacket::disconnect());
        self.ws_stream
            .send(Message::Text(disconnect.encode().into()))
            .await?;
        self.ws_stream.close(None).await?;

        self.is_open = false;
        Ok(())
    }

    /// Split the connection into separate read and write halves
    ///
    /// Returns the halves together with the handshake data and the peer
    /// identity, which the caller keeps after the connection is consumed.
    pub fn split(self) -> (WsWriter, WsReader, Handshake, String) {
        let (writer, reader) = self.ws_stream.split();
        (writer, reader, self.handshake, self.peer_id)
    }
}

/// Read the next Engine.IO packet, skipping WebSocket control frames
async fn next_packet(ws_stream: &mut WsStream) -> NetworkResult<EnginePacket> {
    loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!("Received frame during handshake: {}", text);
                return EnginePacket::decode(&text);
            }
            Some(Ok(Message::Close(frame))) => {
                debug!("Received close frame during handshake: {:?}", frame);
                return Err(NetworkError::ConnectionClosed);
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(NetworkError::WebSocketError(e)),
            None => return Err(NetworkError::ConnectionClosed),
        }
    }
}

/// Connect errors carry `{"message": ...}`; older servers send a bare string
fn connect_error_message(data: Option<Value>) -> String {
    match data {
        Some(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("connect error")
            .to_string(),
        Some(Value::String(message)) => message,
        Some(other) => other.to_string(),
        None => "connect error".to_string(),
    }
}
