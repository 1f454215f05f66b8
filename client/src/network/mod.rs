//! Network communication with the prediction service
//!
//! Two transports: a Socket.IO channel over WebSocket for streaming and
//! pushed results, and plain HTTP for request/response calls.

/// Socket.IO connection management
pub mod connection;

/// Network error types
pub mod error;

/// HTTP request/response transport
pub mod http;

/// Payload type definitions
pub mod messages;

/// Engine.IO / Socket.IO packet codec
pub mod protocol;

/// Async tasks for concurrent send/receive operations
pub mod tasks;

// Re-export commonly used types
pub use connection::{SocketConnection, WsReader, WsWriter};
pub use error::{NetworkError, NetworkResult};
pub use http::PredictionApi;
pub use messages::{
    ClientEvent, JoinRoom, PredictDisease, PredictionAccepted, PredictionFailure,
    PredictionRecord, PredictionResult, PredictionSuccess, ServerEvent,
};
pub use protocol::{EnginePacket, Handshake, SocketPacket, SocketPacketKind};
pub use tasks::DisconnectReason;
