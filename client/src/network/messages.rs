//! Payload types exchanged with the prediction service
//!
//! Streaming channel events:
//!
//! - `predict_disease` (client -> server): [`PredictDisease`]
//! - `join` (client -> server): [`JoinRoom`]
//! - `prediction_result` (server -> client): [`PredictionResult`]
//!
//! The request/response endpoint answers with a [`PredictionResult`] as well,
//! and the history endpoint with a list of [`PredictionRecord`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::network::error::NetworkResult;

/// Outbound event names
pub const PREDICT_DISEASE_EVENT: &str = "predict_disease";
pub const JOIN_EVENT: &str = "join";

/// Inbound event name
pub const PREDICTION_RESULT_EVENT: &str = "prediction_result";

// ============================================================================
// Client -> Server
// ============================================================================

/// Image streamed for prediction over the channel
///
/// # Example
/// ```
/// use paddy_client::network::messages::PredictDisease;
///
/// let msg = PredictDisease::new("aGVsbG8=".to_string(), "1718000000000".to_string());
/// let json = serde_json::to_string(&msg).unwrap();
/// assert!(json.contains("\"predictionId\":\"1718000000000\""));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PredictDisease {
    /// Base64-encoded image bytes
    pub image: String,

    /// Client-generated correlation identifier
    #[serde(rename = "predictionId")]
    pub prediction_id: String,
}

impl PredictDisease {
    pub fn new(image: String, prediction_id: String) -> Self {
        Self {
            image,
            prediction_id,
        }
    }
}

/// Ask the server to add this socket to the room named after its peer identity
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JoinRoom {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Events the client emits on the channel
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    PredictDisease(PredictDisease),
    Join(JoinRoom),
}

impl ClientEvent {
    /// Event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::PredictDisease(_) => PREDICT_DISEASE_EVENT,
            ClientEvent::Join(_) => JOIN_EVENT,
        }
    }

    /// JSON payload of the event
    pub fn payload(&self) -> NetworkResult<Value> {
        let value = match self {
            ClientEvent::PredictDisease(msg) => serde_json::to_value(msg)?,
            ClientEvent::Join(msg) => serde_json::to_value(msg)?,
        };
        Ok(value)
    }
}

/// Auth payload of the Socket.IO connect packet
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConnectAuth<'a> {
    pub token: Option<&'a str>,
}

// ============================================================================
// Server -> Client
// ============================================================================

/// Body of the Socket.IO connect acknowledgement
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectAck {
    /// Peer identity assigned by the server
    pub sid: String,
}

/// Body of a Socket.IO connect error
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectErrorBody {
    #[serde(default)]
    pub message: String,
}

/// Successful prediction
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PredictionSuccess {
    /// Predicted disease label
    pub prediction: String,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Server-side identifier of the stored prediction
    pub prediction_id: i64,

    pub status: String,

    /// Peer identity the result was routed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Treatment advice (English)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cure: Option<String>,

    /// Treatment advice (Sinhala)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cure_si: Option<String>,

    /// Treatment advice (Tamil)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cure_ta: Option<String>,
}

/// Failed prediction
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PredictionFailure {
    pub error: String,
    pub status: String,
}

/// Request accepted; the result will be pushed over the channel
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PredictionAccepted {
    pub message: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Result of a prediction
///
/// Variants are distinguished by their fields, the same way the server
/// sends them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PredictionResult {
    Success(PredictionSuccess),
    Failure(PredictionFailure),
    Accepted(PredictionAccepted),
}

impl PredictionResult {
    /// Check if this is a successful prediction
    pub fn is_success(&self) -> bool {
        matches!(self, PredictionResult::Success(_))
    }

    /// Check if this is a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, PredictionResult::Failure(_))
    }

    /// Get the predicted label if this is a success
    pub fn label(&self) -> Option<&str> {
        match self {
            PredictionResult::Success(s) => Some(&s.prediction),
            _ => None,
        }
    }

    /// Get the error message if this is a failure
    pub fn error_message(&self) -> Option<&str> {
        match self {
            PredictionResult::Failure(f) => Some(&f.error),
            _ => None,
        }
    }

    pub fn status(&self) -> &str {
        match self {
            PredictionResult::Success(s) => &s.status,
            PredictionResult::Failure(f) => &f.status,
            PredictionResult::Accepted(a) => &a.status,
        }
    }
}

/// Events received on the channel
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    PredictionResult(PredictionResult),

    /// Any event this client does not interpret
    Other { name: String, args: Vec<Value> },
}

impl ServerEvent {
    /// Interpret a decoded event
    ///
    /// # Errors
    /// Returns `NetworkError::SerializationError` when a known event carries a
    /// payload of the wrong shape.
    pub fn from_event(name: &str, args: &[Value]) -> NetworkResult<Self> {
        match name {
            PREDICTION_RESULT_EVENT => {
                let payload = args.first().cloned().unwrap_or(Value::Null);
                Ok(ServerEvent::PredictionResult(serde_json::from_value(payload)?))
            }
            other => Ok(ServerEvent::Other {
                name: other.to_string(),
                args: args.to_vec(),
            }),
        }
    }
}

// ============================================================================
// History
// ============================================================================

/// One stored prediction, as listed by the history endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub id: i64,
    pub image_path: String,
    pub predicted_class: String,
    pub confidence: f64,
    /// ISO-8601 timestamp
    pub created_at: String,
}
