//! Client for the paddy disease prediction service
//!
//! - [`client`]: [`PredictionClient`], channel lifecycle and both prediction paths
//! - [`config`]: endpoints and reconnection policy
//! - [`network`]: Socket.IO channel and HTTP transport
//! - [`storage`]: token store and image source seams
//! - [`utils`]: logging setup

/// Prediction client and channel state
pub mod client;

/// Client configuration
pub mod config;

/// Network communication
pub mod network;

/// Token and image storage
pub mod storage;

/// Utility modules
pub mod utils;

pub use client::{
    ChannelEvent, ChannelState, ClientError, ClientResult, Credentials, ErrorCode,
    PredictionClient,
};
pub use config::{ClientConfig, ConfigManager};
pub use network::{PredictionRecord, PredictionResult};
