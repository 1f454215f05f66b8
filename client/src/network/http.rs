//! Request/response transport
//!
//! One multipart POST per prediction and one GET for the history. No
//! retries: a non-success status is returned to the caller as
//! [`NetworkError::Status`].

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::messages::{PredictionRecord, PredictionResult};

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

/// Multipart field carrying the channel's peer identity
pub const SESSION_FIELD: &str = "session_id";

const IMAGE_FILE_NAME: &str = "image.jpg";
const IMAGE_MIME: &str = "image/jpeg";

/// HTTP client for the prediction API
#[derive(Debug, Clone)]
pub struct PredictionApi {
    http: reqwest::Client,
    predict_url: String,
    history_url: String,
}

impl PredictionApi {
    /// Create a client for the endpoints in `config`
    pub fn new(config: &ClientConfig) -> NetworkResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            http,
            predict_url: config.predict_url(),
            history_url: config.history_url(),
        })
    }

    /// Upload an image for prediction
    ///
    /// # Arguments
    /// * `token` - bearer token
    /// * `peer_id` - identity of the streaming channel, sent as `session_id`
    /// * `image` - raw image bytes
    pub async fn predict(
        &self,
        token: &str,
        peer_id: &str,
        image: Vec<u8>,
    ) -> NetworkResult<PredictionResult> {
        let size = image.len();
        let part = Part::bytes(image)
            .file_name(IMAGE_FILE_NAME)
            .mime_str(IMAGE_MIME)?;

        let form = Form::new()
            .part(IMAGE_FIELD, part)
            .text(SESSION_FIELD, peer_id.to_string());

        debug!(url = %self.predict_url, size, peer_id, "Sending prediction request");

        let response = self
            .http
            .post(&self.predict_url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Prediction request failed");
            return Err(NetworkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result = response.json::<PredictionResult>().await?;
        info!(status = %result.status(), "Prediction response received");
        Ok(result)
    }

    /// List the stored predictions of the authenticated user
    pub async fn history(&self, token: &str) -> NetworkResult<Vec<PredictionRecord>> {
        debug!(url = %self.history_url, "Fetching prediction history");

        let response = self
            .http
            .get(&self.history_url)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}
