use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::NetworkError;

/// Errors returned by [`PredictionClient`](super::PredictionClient)
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection setup never completed
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Every allowed connection attempt failed
    #[error("Failed to connect to prediction channel after {attempts} attempts")]
    ConnectionExhausted { attempts: u32 },

    /// Operation attempted while the channel is disconnected
    #[error("Prediction channel not connected")]
    NotConnected,

    /// No bearer token was found in the token store
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The image could not be read
    #[error("Failed to read image {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP or channel transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] NetworkError),

    /// `init` called while a connection supervisor is already running
    #[error("Client already initialized")]
    AlreadyInitialized,
}

/// Client result type
pub type ClientResult<T> = Result<T, ClientError>;

/// Stable error codes for callers that branch on the failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InitializationFailed,
    ConnectionExhausted,
    NotConnected,
    NotAuthenticated,
    ImageReadFailed,
    TransportFailed,
    AlreadyInitialized,
}

impl ClientError {
    /// Error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Initialization(_) => ErrorCode::InitializationFailed,
            ClientError::ConnectionExhausted { .. } => ErrorCode::ConnectionExhausted,
            ClientError::NotConnected => ErrorCode::NotConnected,
            ClientError::NotAuthenticated => ErrorCode::NotAuthenticated,
            ClientError::Io { .. } => ErrorCode::ImageReadFailed,
            ClientError::Transport(_) => ErrorCode::TransportFailed,
            ClientError::AlreadyInitialized => ErrorCode::AlreadyInitialized,
        }
    }

    /// Whether calling the same operation again may succeed
    ///
    /// Nothing is retried automatically; this only informs the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Initialization(_)
            | ClientError::ConnectionExhausted { .. }
            | ClientError::NotConnected => true,
            ClientError::Transport(e) => !matches!(e.status(), Some(400..=499)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ClientError::NotConnected.code(), ErrorCode::NotConnected);
        assert_eq!(
            ClientError::ConnectionExhausted { attempts: 5 }.code(),
            ErrorCode::ConnectionExhausted
        );
        assert_eq!(
            ClientError::Transport(NetworkError::ConnectionClosed).code(),
            ErrorCode::TransportFailed
        );
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::NotAuthenticated).unwrap();
        assert_eq!(json, "\"NOT_AUTHENTICATED\"");
    }

    #[test]
    fn test_io_error_display_names_path() {
        let err = ClientError::Io {
            path: PathBuf::from("/tmp/leaf.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };

        assert!(err.to_string().contains("/tmp/leaf.jpg"));
        assert_eq!(err.code(), ErrorCode::ImageReadFailed);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::ConnectionExhausted { attempts: 5 }.is_retryable());
        assert!(!ClientError::NotAuthenticated.is_retryable());
        assert!(
            !ClientError::Transport(NetworkError::Status {
                status: 401,
                body: String::new(),
            })
            .is_retryable()
        );
        assert!(
            ClientError::Transport(NetworkError::Status {
                status: 503,
                body: String::new(),
            })
            .is_retryable()
        );
    }
}
