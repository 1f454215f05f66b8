//! Prediction client
//!
//! [`PredictionClient`] owns one logical connection to the prediction
//! service and exposes two ways of asking for a prediction:
//!
//! - [`stream_predict`](PredictionClient::stream_predict) sends the image over
//!   the channel and returns at once; the result arrives later as a pushed
//!   `prediction_result` event and goes to the registered result handler.
//! - [`request_predict`](PredictionClient::request_predict) uploads the image
//!   over HTTP and returns the response body.
//!
//! # Lifecycle
//!
//! ```text
//! new() -> init() -> stream_predict() / request_predict() ... -> disconnect()
//! ```
//!
//! `init` loads the bearer token once, then waits until the channel is
//! connected or the retry budget is spent. Dropping the client stops the
//! connection supervisor as well.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use paddy_client::client::PredictionClient;
//! use paddy_client::config::ClientConfig;
//! use paddy_client::storage::JsonFileTokenStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(JsonFileTokenStore::new("storage.json"));
//!     let mut client = PredictionClient::new(ClientConfig::default(), store)
//!         .unwrap()
//!         .with_result_handler(|result| println!("pushed: {:?}", result));
//!
//!     client.init().await.unwrap();
//!     client.stream_predict("leaf.jpg").await.unwrap();
//!
//!     let result = client.request_predict("leaf.jpg").await.unwrap();
//!     println!("{:?}", result);
//!
//!     client.disconnect().await;
//! }
//! ```

mod error;
mod handler;
mod state;
mod supervisor;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::network::messages::{ClientEvent, PredictDisease};
use crate::network::protocol::EnginePacket;
use crate::network::{NetworkError, PredictionApi, PredictionRecord, PredictionResult};
use crate::storage::{FsImageSource, ImageSource, TokenStore, ACCESS_TOKEN_KEY};

pub use error::{ClientError, ClientResult, ErrorCode};
pub use handler::{log_result, logging_handler, ResultHandler};
pub use state::{ChannelEvent, ChannelState, Transition};

use state::ChannelStateManager;
use supervisor::Supervisor;

/// Bearer token
///
/// `Debug` output never contains the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// Correlation identifier for a streamed prediction
///
/// Current UNIX time in milliseconds; two calls within the same
/// millisecond get the same identifier.
pub fn new_prediction_id() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

struct SupervisorHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Client of the prediction service
pub struct PredictionClient {
    config: ClientConfig,
    token_store: Arc<dyn TokenStore>,
    image_source: Arc<dyn ImageSource>,
    api: PredictionApi,
    credentials: OnceLock<Option<Credentials>>,
    manager: Arc<ChannelStateManager>,
    supervisor: Option<SupervisorHandle>,
}

impl PredictionClient {
    /// Create a disconnected client
    ///
    /// # Errors
    /// Returns `ClientError::Transport` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, token_store: Arc<dyn TokenStore>) -> ClientResult<Self> {
        let api = PredictionApi::new(&config)?;
        let manager = Arc::new(ChannelStateManager::new(
            config.max_reconnect_attempts,
            logging_handler(),
        ));

        Ok(Self {
            config,
            token_store,
            image_source: Arc::new(FsImageSource),
            api,
            credentials: OnceLock::new(),
            manager,
            supervisor: None,
        })
    }

    /// Read images from `source` instead of the local filesystem
    pub fn with_image_source(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.image_source = source;
        self
    }

    /// Receive every pushed `prediction_result` in `handler`
    ///
    /// Replaces the default handler, which only logs.
    pub fn with_result_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&PredictionResult) + Send + Sync + 'static,
    {
        self.set_result_handler(handler);
        self
    }

    /// Replace the result handler, also while the channel is connected
    pub fn set_result_handler<F>(&self, handler: F)
    where
        F: Fn(&PredictionResult) + Send + Sync + 'static,
    {
        self.manager.set_result_handler(Arc::new(handler));
    }

    /// Load credentials and connect the channel
    ///
    /// Resolves once the channel is connected. After a failure the client is
    /// disconnected and `init` may be called again, starting a fresh retry
    /// budget.
    ///
    /// # Errors
    /// - `ClientError::AlreadyInitialized` if the channel supervisor is running
    /// - `ClientError::Initialization` if the token store or the configuration
    ///   is unusable, or the single attempt failed with reconnection disabled
    /// - `ClientError::ConnectionExhausted` after `max_reconnect_attempts`
    ///   failed attempts
    pub async fn init(&mut self) -> ClientResult<()> {
        if self
            .supervisor
            .as_ref()
            .is_some_and(|handle| !handle.join.is_finished())
        {
            warn!("init called while the channel supervisor is running");
            return Err(ClientError::AlreadyInitialized);
        }
        self.stop_supervisor().await;

        info!("Initializing prediction client");

        let token = self
            .load_credentials()
            .await?
            .map(|credentials| credentials.token().to_string());

        self.config
            .validate()
            .map_err(|e| ClientError::Initialization(e.to_string()))?;

        self.manager.restart().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (setup_tx, setup_rx) = oneshot::channel();

        let supervisor = Supervisor::new(self.config.clone(), token, Arc::clone(&self.manager));
        let join = tokio::spawn(supervisor.run(shutdown_rx, setup_tx));
        self.supervisor = Some(SupervisorHandle { shutdown_tx, join });

        match setup_rx.await {
            Ok(Ok(())) => {
                info!("Prediction client ready");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Failed to initialize prediction client: {}", e);
                self.stop_supervisor().await;
                Err(e)
            }
            Err(_) => {
                self.stop_supervisor().await;
                Err(ClientError::Initialization(
                    "connection supervisor stopped before setup completed".to_string(),
                ))
            }
        }
    }

    async fn load_credentials(&self) -> ClientResult<Option<&Credentials>> {
        if let Some(credentials) = self.credentials.get() {
            return Ok(credentials.as_ref());
        }

        // token stores do blocking file I/O
        let store = Arc::clone(&self.token_store);
        let token = tokio::task::spawn_blocking(move || store.get(ACCESS_TOKEN_KEY))
            .await
            .map_err(|e| ClientError::Initialization(format!("token store task failed: {}", e)))?
            .map_err(|e| ClientError::Initialization(format!("failed to read token store: {}", e)))?
            .filter(|token| !token.is_empty());

        if token.is_none() {
            info!("No access token stored, continuing unauthenticated");
        }

        Ok(self
            .credentials
            .get_or_init(|| token.map(Credentials::new))
            .as_ref())
    }

    /// Send an image over the channel for prediction
    ///
    /// Returns the correlation identifier once the message is queued for
    /// the transport, without waiting for queue space. The result is pushed
    /// later to the result handler.
    ///
    /// # Errors
    /// - `ClientError::NotConnected` if the channel is down; the image is not read
    /// - `ClientError::Io` if the image cannot be read
    /// - `ClientError::Transport` if the outbound queue is full
    pub async fn stream_predict(&self, image_path: impl AsRef<Path>) -> ClientResult<String> {
        let path = image_path.as_ref();

        let outbound = match self.manager.outbound() {
            Some(outbound) if self.manager.current().is_connected() => outbound,
            _ => return Err(ClientError::NotConnected),
        };

        let image = self
            .image_source
            .read_base64(path)
            .await
            .map_err(|source| ClientError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let prediction_id = new_prediction_id();
        let event = ClientEvent::PredictDisease(PredictDisease::new(image, prediction_id.clone()));
        let packet = EnginePacket::event(event.name(), event.payload()?);

        outbound.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!(prediction_id = %prediction_id, "Outbound queue full, image not sent");
                ClientError::Transport(NetworkError::QueueFull)
            }
            TrySendError::Closed(_) => ClientError::NotConnected,
        })?;

        info!(prediction_id = %prediction_id, "Image sent for prediction");
        Ok(prediction_id)
    }

    /// Upload an image over HTTP and return the response
    ///
    /// The channel's peer identity travels as `session_id`, so the channel
    /// must be connected even though the upload does not use it.
    ///
    /// # Errors
    /// - `ClientError::NotAuthenticated` without a token; nothing is sent
    /// - `ClientError::NotConnected` if the channel is down
    /// - `ClientError::Io` if the image cannot be read
    /// - `ClientError::Transport` on a network failure or non-success status
    pub async fn request_predict(
        &self,
        image_path: impl AsRef<Path>,
    ) -> ClientResult<PredictionResult> {
        let path = image_path.as_ref();

        let credentials = self.credentials().ok_or(ClientError::NotAuthenticated)?;

        let state = self.manager.current();
        let peer_id = match state.peer_id() {
            Some(peer_id) if state.is_connected() => peer_id.to_string(),
            _ => return Err(ClientError::NotConnected),
        };

        let image = self
            .image_source
            .read(path)
            .await
            .map_err(|source| ClientError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let result = self.api.predict(credentials.token(), &peer_id, image).await?;
        Ok(result)
    }

    /// List the stored predictions of the authenticated user
    ///
    /// # Errors
    /// - `ClientError::NotAuthenticated` without a token
    /// - `ClientError::Transport` on a network failure or non-success status
    pub async fn prediction_history(&self) -> ClientResult<Vec<PredictionRecord>> {
        let credentials = self.credentials().ok_or(ClientError::NotAuthenticated)?;
        Ok(self.api.history(credentials.token()).await?)
    }

    /// Close the channel
    ///
    /// No-op when already disconnected.
    pub async fn disconnect(&mut self) {
        if self.supervisor.is_none() {
            debug!("disconnect called while already disconnected");
            return;
        }

        info!("Disconnecting prediction client");
        self.stop_supervisor().await;
    }

    async fn stop_supervisor(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.shutdown_tx.send(true);
            if let Err(e) = handle.join.await {
                error!("Connection supervisor panicked: {}", e);
            }
        }
        self.manager.reset().await;
    }

    /// Credentials loaded by `init`, if any
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.get().and_then(Option::as_ref)
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials().is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.manager.current().is_connected()
    }

    /// Identity assigned by the server while connected
    pub fn peer_id(&self) -> Option<String> {
        self.manager.current().peer_id().map(str::to_string)
    }

    pub fn retry_count(&self) -> u32 {
        self.manager.current().retry_count()
    }

    /// Snapshot of the channel state
    pub fn state(&self) -> ChannelState {
        (*self.manager.current()).clone()
    }

    /// Receive a snapshot after every state change
    pub async fn subscribe(&self) -> mpsc::Receiver<ChannelState> {
        self.manager.subscribe().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl fmt::Debug for PredictionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionClient")
            .field("config", &self.config)
            .field("credentials", &self.credentials())
            .field("state", &self.manager.current())
            .field("running", &self.supervisor.is_some())
            .finish()
    }
}
