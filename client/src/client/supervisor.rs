//! Connection supervisor
//!
//! Background task owning the channel. It connects, retries with a fixed
//! delay, runs the sender and receiver tasks of a live session, reconnects
//! after a lost connection and reports the outcome of the initial setup
//! through a oneshot channel. It stops when the shutdown watch changes or
//! its sender is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::error::ClientError;
use super::state::{ChannelEvent, ChannelStateManager, Transition};
use crate::config::ClientConfig;
use crate::network::messages::{ClientEvent, JoinRoom, ServerEvent};
use crate::network::protocol::{EnginePacket, SocketPacket};
use crate::network::tasks::{receiver_task, sender_task};
use crate::network::{DisconnectReason, SocketConnection};

const OUTBOUND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 64;

/// Outcome of the initial connection setup
pub(crate) type SetupResult = Result<(), ClientError>;

pub(crate) struct Supervisor {
    config: ClientConfig,
    token: Option<String>,
    manager: Arc<ChannelStateManager>,
}

impl Supervisor {
    pub(crate) fn new(
        config: ClientConfig,
        token: Option<String>,
        manager: Arc<ChannelStateManager>,
    ) -> Self {
        Self {
            config,
            token,
            manager,
        }
    }

    pub(crate) async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        setup_tx: oneshot::Sender<SetupResult>,
    ) {
        info!(
            reconnection = self.config.reconnection,
            max_attempts = self.config.max_reconnect_attempts,
            "Connection supervisor started"
        );

        let mut setup_tx = Some(setup_tx);
        let delay = Duration::from_millis(self.config.reconnect_delay_ms);

        loop {
            let attempt = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                attempt = SocketConnection::connect(&self.config, self.token.as_deref()) => attempt,
            };

            match attempt {
                Ok(connection) => {
                    let peer_id = connection.peer_id().to_string();
                    self.manager
                        .dispatch(ChannelEvent::Connected { peer_id })
                        .await;
                    resolve(&mut setup_tx, Ok(()));

                    let reason = self.serve(connection, &mut shutdown_rx).await;
                    self.manager
                        .dispatch(ChannelEvent::Disconnected { reason })
                        .await;

                    if !reason.should_reconnect() || !self.config.reconnection {
                        break;
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    let transition = self
                        .manager
                        .dispatch(ChannelEvent::ConnectError {
                            message: message.clone(),
                        })
                        .await;

                    if !self.config.reconnection {
                        resolve(&mut setup_tx, Err(ClientError::Initialization(message)));
                        break;
                    }

                    if let Transition::Exhausted { attempts } = transition {
                        error!(attempts, "Giving up on prediction channel");
                        resolve(
                            &mut setup_tx,
                            Err(ClientError::ConnectionExhausted { attempts }),
                        );
                        break;
                    }
                }
            }

            debug!("Reconnecting in {}ms", delay.as_millis());
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.manager.set_outbound(None);
        info!("Connection supervisor stopped");
    }

    /// Run one connected session until it ends
    async fn serve(
        &self,
        connection: SocketConnection,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> DisconnectReason {
        let (writer, reader, handshake, peer_id) = connection.split();

        let (outbound_tx, outbound_rx) = mpsc::channel::<EnginePacket>(OUTBOUND_CAPACITY);
        let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(EVENT_CAPACITY);

        let sender_handle = tokio::spawn(sender_task(writer, outbound_rx));
        let liveness = Duration::from_millis(handshake.liveness_window_ms());
        let mut receiver_handle = tokio::spawn(receiver_task(
            reader,
            outbound_tx.clone(),
            event_tx,
            liveness,
        ));

        if self.config.join_room {
            let join = ClientEvent::Join(JoinRoom {
                session_id: peer_id.clone(),
            });
            match join.payload() {
                Ok(payload) => {
                    if outbound_tx
                        .send(EnginePacket::event(join.name(), payload))
                        .await
                        .is_ok()
                    {
                        debug!(room = %peer_id, "Join requested");
                    }
                }
                Err(e) => warn!("Failed to encode join event: {}", e),
            }
        }

        self.manager.set_outbound(Some(outbound_tx.clone()));

        let reason = loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("Shutdown requested, leaving channel");
                    self.manager.set_outbound(None);
                    let _ = outbound_tx
                        .send(EnginePacket::Message(SocketPacket::disconnect()))
                        .await;
                    break DisconnectReason::ClientDisconnect;
                }
                event = event_rx.recv() => match event {
                    Some(ServerEvent::PredictionResult(result)) => {
                        self.manager
                            .dispatch(ChannelEvent::PredictionResult(result))
                            .await;
                    }
                    Some(ServerEvent::Other { name, .. }) => {
                        debug!("Ignoring event '{}'", name);
                    }
                    None => {
                        break match (&mut receiver_handle).await {
                            Ok(Ok(reason)) => reason,
                            Ok(Err(e)) => {
                                self.manager
                                    .dispatch(ChannelEvent::Error {
                                        message: e.to_string(),
                                    })
                                    .await;
                                DisconnectReason::from_error(&e)
                            }
                            Err(e) => {
                                error!("Receiver task panicked: {}", e);
                                DisconnectReason::TransportError
                            }
                        };
                    }
                },
            }
        };

        // Closing the queue lets the sender flush and close the socket
        self.manager.set_outbound(None);
        drop(outbound_tx);
        receiver_handle.abort();

        let sender_abort = sender_handle.abort_handle();
        let grace = Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(grace, sender_handle).await {
            Ok(Ok(Ok(()))) => debug!("Sender task completed successfully"),
            Ok(Ok(Err(e))) => warn!("Sender task completed with error: {}", e),
            Ok(Err(e)) => error!("Sender task panicked: {}", e),
            Err(_) => {
                warn!("Sender task did not finish in time");
                sender_abort.abort();
            }
        }

        reason
    }
}

fn resolve(setup_tx: &mut Option<oneshot::Sender<SetupResult>>, result: SetupResult) {
    if let Some(tx) = setup_tx.take() {
        // the caller may have abandoned init
        let _ = tx.send(result);
    }
}
