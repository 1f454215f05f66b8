//! Network error types for the Socket.IO channel and the HTTP transport
//!
//! This module defines error types used throughout the network layer.

use thiserror::Error;

/// Network-related errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Failed to connect to server
    #[error("Failed to connect to server: {0}")]
    ConnectionFailed(String),

    /// The server refused the Socket.IO connect packet
    #[error("Connection rejected by server: {0}")]
    ConnectRejected(String),

    /// Engine.IO / Socket.IO protocol error
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Connection timeout
    #[error("Connection timeout after {0}ms")]
    Timeout(u64),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to serialize or deserialize a payload
    #[error("Failed to serialize message: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP request could not be sent or its body could not be read
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// HTTP request returned a non-success status
    #[error("HTTP request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Outbound queue of the channel is full
    #[error("Outbound queue full")]
    QueueFull,

    /// Connection closed unexpectedly
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

impl NetworkError {
    /// HTTP status code, if this error came from a non-success response
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Status { status, .. } => Some(*status),
            NetworkError::RequestError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = NetworkError::Status {
            status: 500,
            body: "boom".to_string(),
        };

        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_non_http_error_has_no_status() {
        assert_eq!(NetworkError::Timeout(10000).status(), None);
        assert_eq!(NetworkError::ConnectionClosed.status(), None);
    }
}
