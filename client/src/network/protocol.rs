//! Engine.IO v4 / Socket.IO v5 text packet codec
//!
//! The prediction service speaks Socket.IO over a plain WebSocket. Every
//! WebSocket text frame carries one Engine.IO packet; Engine.IO `message`
//! packets in turn carry one Socket.IO packet.
//!
//! ```text
//! engine:  <type>[<payload>]
//! socket:  <type>[<namespace>,][<ack id>][<json>]
//!
//! 0{"sid":"...","pingInterval":25000,...}   open
//! 2 / 3                                     ping / pong
//! 40{"token":"..."}                         connect (client -> server)
//! 40{"sid":"..."}                           connect ack (server -> client)
//! 42["prediction_result",{...}]             event
//! ```
//!
//! Binary attachments are not used by the service and are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::network::error::{NetworkError, NetworkResult};

/// Namespace used when a packet does not name one
pub const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO protocol revision spoken by this client
pub const ENGINE_IO_VERSION: u8 = 4;

/// Handshake data sent by the server in the Engine.IO `open` packet
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id (transport level, not the peer identity)
    pub sid: String,

    /// Transports the connection may be upgraded to
    #[serde(default)]
    pub upgrades: Vec<String>,

    /// Interval between server pings in milliseconds
    pub ping_interval: u64,

    /// Grace period for a ping in milliseconds
    pub ping_timeout: u64,

    /// Maximum payload size accepted by the server
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// Longest silence tolerated before the connection is considered dead
    pub fn liveness_window_ms(&self) -> u64 {
        self.ping_interval + self.ping_timeout
    }
}

/// One Engine.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Socket.IO event on the default namespace
    pub fn event(name: &str, payload: Value) -> Self {
        EnginePacket::Message(SocketPacket::event(name, payload))
    }

    /// Encode into the text frame representation
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                let body = serde_json::json!({
                    "sid": handshake.sid,
                    "upgrades": handshake.upgrades,
                    "pingInterval": handshake.ping_interval,
                    "pingTimeout": handshake.ping_timeout,
                    "maxPayload": handshake.max_payload,
                });
                format!("0{}", body)
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(payload) => format!("2{}", payload),
            EnginePacket::Pong(payload) => format!("3{}", payload),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }

    /// Decode a text frame
    ///
    /// # Errors
    /// Returns `NetworkError::ProtocolError` for an empty frame or an unknown
    /// packet type, and `NetworkError::SerializationError` for a malformed
    /// JSON payload.
    pub fn decode(frame: &str) -> NetworkResult<Self> {
        let kind = frame
            .chars()
            .next()
            .ok_or_else(|| NetworkError::ProtocolError("empty engine packet".to_string()))?;
        let payload = &frame[kind.len_utf8()..];

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(payload)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(payload.to_string())),
            '3' => Ok(EnginePacket::Pong(payload.to_string())),
            '4' => Ok(EnginePacket::Message(SocketPacket::decode(payload)?)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(NetworkError::ProtocolError(format!(
                "unknown engine packet type '{}'",
                other
            ))),
        }
    }
}

/// Socket.IO packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect = 0,
    Disconnect = 1,
    Event = 2,
    Ack = 3,
    ConnectError = 4,
    BinaryEvent = 5,
    BinaryAck = 6,
}

impl SocketPacketKind {
    fn from_char(c: char) -> NetworkResult<Self> {
        match c {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => Ok(Self::Event),
            '3' => Ok(Self::Ack),
            '4' => Ok(Self::ConnectError),
            '5' => Ok(Self::BinaryEvent),
            '6' => Ok(Self::BinaryAck),
            other => Err(NetworkError::ProtocolError(format!(
                "unknown socket packet type '{}'",
                other
            ))),
        }
    }

    fn as_char(self) -> char {
        char::from(b'0' + self as u8)
    }
}

/// One Socket.IO packet
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    fn new(kind: SocketPacketKind, data: Option<Value>) -> Self {
        Self {
            kind,
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            data,
        }
    }

    /// CONNECT packet carrying the auth payload
    pub fn connect(auth: Value) -> Self {
        Self::new(SocketPacketKind::Connect, Some(auth))
    }

    /// DISCONNECT packet
    pub fn disconnect() -> Self {
        Self::new(SocketPacketKind::Disconnect, None)
    }

    /// EVENT packet `[name, payload]`
    pub fn event(name: &str, payload: Value) -> Self {
        Self::new(
            SocketPacketKind::Event,
            Some(Value::Array(vec![Value::String(name.to_string()), payload])),
        )
    }

    /// Event name, if this is an EVENT packet
    pub fn event_name(&self) -> Option<&str> {
        if self.kind != SocketPacketKind::Event {
            return None;
        }
        self.data
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|args| args.first())
            .and_then(Value::as_str)
    }

    /// Event arguments following the name
    pub fn event_args(&self) -> &[Value] {
        match self.data.as_ref().and_then(Value::as_array) {
            Some(args) if self.kind == SocketPacketKind::Event && !args.is_empty() => &args[1..],
            _ => &[],
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.as_char());

        if self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }

        if let Some(id) = self.ack_id {
            out.push_str(&id.to_string());
        }

        if let Some(ref data) = self.data {
            out.push_str(&data.to_string());
        }

        out
    }

    pub fn decode(input: &str) -> NetworkResult<Self> {
        let first = input
            .chars()
            .next()
            .ok_or_else(|| NetworkError::ProtocolError("empty socket packet".to_string()))?;
        let kind = SocketPacketKind::from_char(first)?;

        if matches!(
            kind,
            SocketPacketKind::BinaryEvent | SocketPacketKind::BinaryAck
        ) {
            return Err(NetworkError::ProtocolError(
                "binary packets are not supported".to_string(),
            ));
        }

        let mut rest = &input[first.len_utf8()..];

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let ns = &rest[..idx];
                    rest = &rest[idx + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest;
                    rest = "";
                    ns.to_string()
                }
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| NetworkError::ProtocolError(format!("invalid ack id: {}", e)))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest)?)
        };

        let packet = Self {
            kind,
            namespace,
            ack_id,
            data,
        };

        if kind == SocketPacketKind::Event && packet.event_name().is_none() {
            return Err(NetworkError::ProtocolError(
                "event packet without a name".to_string(),
            ));
        }

        Ok(packet)
    }
}
