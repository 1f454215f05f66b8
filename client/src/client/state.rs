//! Channel state machine
//!
//! Two states, connected and disconnected. Every event from the connection
//! supervisor goes through [`ChannelState::apply`], the single place where
//! the connected flag, the peer identity and the retry counter change.
//!
//! ```text
//! Connected      -> connected, retry counter reset
//! ConnectError   -> disconnected, retry counter + 1 (exhausted at max)
//! Disconnected   -> disconnected, peer identity cleared
//! Error          -> disconnected, peer identity cleared
//! PredictionResult -> unchanged (handed to the result handler)
//! ```

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use super::handler::ResultHandler;
use crate::network::protocol::EnginePacket;
use crate::network::{DisconnectReason, PredictionResult};

/// Event observed on the channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Handshake completed; the server assigned `peer_id`
    Connected { peer_id: String },

    /// A connection attempt failed
    ConnectError { message: String },

    /// A connected session ended
    Disconnected { reason: DisconnectReason },

    /// Protocol or transport error
    Error { message: String },

    /// Result pushed by the server
    PredictionResult(PredictionResult),
}

/// Outcome of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connected,
    Retrying { attempt: u32 },
    Exhausted { attempts: u32 },
    Disconnected,
    Unchanged,
}

/// Snapshot of the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelState {
    connected: bool,
    peer_id: Option<String>,
    retry_count: u32,
    max_attempts: u32,
}

impl ChannelState {
    /// Disconnected state allowing `max_attempts` failed attempts
    pub fn new(max_attempts: u32) -> Self {
        Self {
            connected: false,
            peer_id: None,
            retry_count: 0,
            max_attempts,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Identity assigned by the server, while connected
    pub fn peer_id(&self) -> Option<&str> {
        self.peer_id.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Apply an event and report the resulting transition
    pub fn apply(&mut self, event: &ChannelEvent) -> Transition {
        match event {
            ChannelEvent::Connected { peer_id } => {
                self.connected = true;
                self.peer_id = Some(peer_id.clone());
                self.retry_count = 0;
                Transition::Connected
            }
            ChannelEvent::ConnectError { .. } => {
                self.connected = false;
                self.peer_id = None;
                self.retry_count = self.retry_count.saturating_add(1);
                if self.retry_count >= self.max_attempts {
                    Transition::Exhausted {
                        attempts: self.retry_count,
                    }
                } else {
                    Transition::Retrying {
                        attempt: self.retry_count,
                    }
                }
            }
            ChannelEvent::Disconnected { .. } => {
                self.connected = false;
                self.peer_id = None;
                Transition::Disconnected
            }
            ChannelEvent::Error { .. } => {
                self.connected = false;
                self.peer_id = None;
                Transition::Disconnected
            }
            ChannelEvent::PredictionResult(_) => Transition::Unchanged,
        }
    }
}

/// Shared view of the channel
///
/// Written only by the connection supervisor (and by `disconnect` once the
/// supervisor has stopped); read lock-free by the client operations.
pub(crate) struct ChannelStateManager {
    /// Current state
    state: ArcSwap<ChannelState>,

    /// Queue of the sender task while a session is live
    outbound: ArcSwapOption<mpsc::Sender<EnginePacket>>,

    /// Observer of pushed results, replaceable while the channel runs
    on_result: ArcSwap<ResultHandler>,

    /// State change listeners
    listeners: Mutex<Vec<mpsc::Sender<ChannelState>>>,
}

impl ChannelStateManager {
    pub(crate) fn new(max_attempts: u32, on_result: ResultHandler) -> Self {
        Self {
            state: ArcSwap::new(Arc::new(ChannelState::new(max_attempts))),
            outbound: ArcSwapOption::empty(),
            on_result: ArcSwap::from_pointee(on_result),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn current(&self) -> Arc<ChannelState> {
        self.state.load_full()
    }

    pub(crate) fn outbound(&self) -> Option<Arc<mpsc::Sender<EnginePacket>>> {
        self.outbound.load_full()
    }

    pub(crate) fn set_result_handler(&self, handler: ResultHandler) {
        self.on_result.store(Arc::new(handler));
    }

    pub(crate) fn set_outbound(&self, sender: Option<mpsc::Sender<EnginePacket>>) {
        self.outbound.store(sender.map(Arc::new));
    }

    /// Apply an event, log it, and notify observers
    pub(crate) async fn dispatch(&self, event: ChannelEvent) -> Transition {
        let mut next = (*self.current()).clone();
        let transition = next.apply(&event);

        match &event {
            ChannelEvent::Connected { peer_id } => {
                info!(peer_id = %peer_id, "Channel connected");
            }
            ChannelEvent::ConnectError { message } => {
                error!(
                    attempt = next.retry_count(),
                    max_attempts = next.max_attempts(),
                    "Channel connection error: {}",
                    message
                );
            }
            ChannelEvent::Disconnected { reason } => {
                info!(reason = %reason, "Channel disconnected");
            }
            ChannelEvent::Error { message } => {
                error!("Channel error: {}", message);
            }
            ChannelEvent::PredictionResult(result) => {
                let handler = self.on_result.load_full();
                (**handler)(result);
            }
        }

        if transition != Transition::Unchanged {
            self.state.store(Arc::new(next.clone()));
            self.notify_listeners(next).await;
        }

        transition
    }

    /// Return to the disconnected state without an event
    pub(crate) async fn reset(&self) {
        let current = self.current();
        let mut next = (*current).clone();
        next.connected = false;
        next.peer_id = None;

        self.set_outbound(None);
        if next != *current {
            self.state.store(Arc::new(next.clone()));
            self.notify_listeners(next).await;
        }
    }

    /// Start over with a fresh retry budget
    pub(crate) async fn restart(&self) {
        let next = ChannelState::new(self.current().max_attempts());

        self.set_outbound(None);
        self.state.store(Arc::new(next.clone()));
        self.notify_listeners(next).await;
    }

    pub(crate) async fn subscribe(&self) -> mpsc::Receiver<ChannelState> {
        let (tx, rx) = mpsc::channel(32);
        let mut listeners = self.listeners.lock().await;
        listeners.push(tx);
        rx
    }

    async fn notify_listeners(&self, state: ChannelState) {
        let mut listeners = self.listeners.lock().await;
        listeners.retain(|tx| !tx.is_closed());
        for listener in listeners.iter() {
            // never block the supervisor on a listener
            if listener.try_send(state.clone()).is_err() {
                warn!("State listener is full, dropping update");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::network::PredictionFailure;

    fn connect_error() -> ChannelEvent {
        ChannelEvent::ConnectError {
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn test_initial_state() {
        let state = ChannelState::new(5);

        assert!(!state.is_connected());
        assert_eq!(state.peer_id(), None);
        assert_eq!(state.retry_count(), 0);
        assert_eq!(state.max_attempts(), 5);
    }

    #[test]
    fn test_connected_resets_retry_counter() {
        let mut state = ChannelState::new(5);
        state.apply(&connect_error());
        state.apply(&connect_error());
        assert_eq!(state.retry_count(), 2);

        let transition = state.apply(&ChannelEvent::Connected {
            peer_id: "peer-1".to_string(),
        });

        assert_eq!(transition, Transition::Connected);
        assert!(state.is_connected());
        assert_eq!(state.peer_id(), Some("peer-1"));
        assert_eq!(state.retry_count(), 0);
    }

    #[test]
    fn test_connect_errors_exhaust_at_max() {
        let mut state = ChannelState::new(3);

        assert_eq!(
            state.apply(&connect_error()),
            Transition::Retrying { attempt: 1 }
        );
        assert_eq!(
            state.apply(&connect_error()),
            Transition::Retrying { attempt: 2 }
        );
        assert_eq!(
            state.apply(&connect_error()),
            Transition::Exhausted { attempts: 3 }
        );
        assert!(!state.is_connected());
    }

    #[test]
    fn test_disconnect_does_not_touch_retry_counter() {
        let mut state = ChannelState::new(5);
        state.apply(&ChannelEvent::Connected {
            peer_id: "peer-1".to_string(),
        });

        let transition = state.apply(&ChannelEvent::Disconnected {
            reason: DisconnectReason::TransportClose,
        });

        assert_eq!(transition, Transition::Disconnected);
        assert!(!state.is_connected());
        assert_eq!(state.peer_id(), None);
        assert_eq!(state.retry_count(), 0);
    }

    #[test]
    fn test_error_marks_disconnected() {
        let mut state = ChannelState::new(5);
        state.apply(&ChannelEvent::Connected {
            peer_id: "peer-1".to_string(),
        });

        state.apply(&ChannelEvent::Error {
            message: "parse error".to_string(),
        });

        assert!(!state.is_connected());
        assert_eq!(state.peer_id(), None);
    }

    #[test]
    fn test_prediction_result_leaves_state_unchanged() {
        let mut state = ChannelState::new(5);
        let before = state.clone();

        let transition = state.apply(&ChannelEvent::PredictionResult(
            PredictionResult::Failure(PredictionFailure {
                error: "boom".to_string(),
                status: "failed".to_string(),
            }),
        ));

        assert_eq!(transition, Transition::Unchanged);
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_manager_dispatch_calls_result_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let manager = ChannelStateManager::new(
            5,
            Arc::new(move |_: &PredictionResult| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let result = PredictionResult::Failure(PredictionFailure {
            error: "boom".to_string(),
            status: "failed".to_string(),
        });
        manager
            .dispatch(ChannelEvent::PredictionResult(result))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_manager_swaps_result_handler() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&first);
        let manager = ChannelStateManager::new(
            5,
            Arc::new(move |_: &PredictionResult| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        manager
            .dispatch(ChannelEvent::Connected {
                peer_id: "peer-1".to_string(),
            })
            .await;

        let counter = Arc::clone(&second);
        manager.set_result_handler(Arc::new(move |_: &PredictionResult| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        manager
            .dispatch(ChannelEvent::PredictionResult(PredictionResult::Failure(
                PredictionFailure {
                    error: "boom".to_string(),
                    status: "failed".to_string(),
                },
            )))
            .await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert!(manager.current().is_connected());
    }

    #[tokio::test]
    async fn test_manager_notifies_listeners() {
        let manager = ChannelStateManager::new(5, Arc::new(|_: &PredictionResult| {}));
        let mut rx = manager.subscribe().await;

        manager
            .dispatch(ChannelEvent::Connected {
                peer_id: "peer-1".to_string(),
            })
            .await;

        let state = rx.recv().await.unwrap();
        assert!(state.is_connected());
        assert_eq!(state.peer_id(), Some("peer-1"));

        manager.reset().await;
        let state = rx.recv().await.unwrap();
        assert!(!state.is_connected());
        assert!(!manager.current().is_connected());
    }
}
