//! In-process stand-ins for the prediction service
//!
//! `MockSocketServer` speaks just enough Engine.IO/Socket.IO over a real
//! WebSocket to accept or reject the connect packet, record every frame it
//! receives and push frames on demand. `MockHttpServer` serves the two HTTP
//! endpoints with axum and records what it was sent.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use paddy_client::config::ClientConfig;
use paddy_client::storage::ImageSource;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub const ACCESS_TOKEN: &str = "test-token";

/// How the socket server answers the connect packet
#[derive(Debug, Clone)]
pub enum Behavior {
    Accept { sid: String },
    Reject { message: String },
}

pub struct MockSocketServer {
    pub url: String,
    pub connections: Arc<AtomicUsize>,
    pub auth: Arc<Mutex<Vec<Value>>>,
    pub frames: Arc<Mutex<Vec<String>>>,
    behavior: Arc<Mutex<Behavior>>,
    push_tx: mpsc::UnboundedSender<String>,
}

impl MockSocketServer {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let connections = Arc::new(AtomicUsize::new(0));
        let auth = Arc::new(Mutex::new(Vec::new()));
        let frames = Arc::new(Mutex::new(Vec::new()));
        let behavior = Arc::new(Mutex::new(behavior));
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();

        let server = MockSocketServer {
            url,
            connections: Arc::clone(&connections),
            auth: Arc::clone(&auth),
            frames: Arc::clone(&frames),
            behavior: Arc::clone(&behavior),
            push_tx,
        };

        tokio::spawn(async move {
            // one connection at a time, the client never holds two
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let index = connections.fetch_add(1, Ordering::SeqCst) + 1;

                let open = json!({
                    "sid": format!("eio-{}", index),
                    "upgrades": [],
                    "pingInterval": 25000,
                    "pingTimeout": 20000,
                    "maxPayload": 1000000,
                });
                if ws.send(Message::Text(format!("0{}", open).into())).await.is_err() {
                    continue;
                }

                let connect = match ws.next().await {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    _ => continue,
                };
                let body = connect.strip_prefix("40").unwrap_or_default();
                auth.lock()
                    .unwrap()
                    .push(serde_json::from_str(body).unwrap_or(Value::Null));

                let current = behavior.lock().unwrap().clone();
                match current {
                    Behavior::Reject { message } => {
                        let frame = format!("44{}", json!({ "message": message }));
                        let _ = ws.send(Message::Text(frame.into())).await;
                        let _ = ws.close(None).await;
                        continue;
                    }
                    Behavior::Accept { sid } => {
                        let frame = format!("40{}", json!({ "sid": sid }));
                        if ws.send(Message::Text(frame.into())).await.is_err() {
                            continue;
                        }
                    }
                }

                loop {
                    tokio::select! {
                        incoming = ws.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let text = text.to_string();
                                let leaving = text == "41";
                                frames.lock().unwrap().push(text);
                                if leaving {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                            Some(Ok(_)) => {}
                        },
                        Some(frame) = push_rx.recv() => {
                            if ws.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        server
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Send a raw frame to the connected client
    pub fn push(&self, frame: impl Into<String>) {
        self.push_tx.send(frame.into()).unwrap();
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    /// Decoded `42[...]` event frames received from the client
    pub fn events(&self) -> Vec<(String, Value)> {
        self.frames()
            .iter()
            .filter_map(|frame| frame.strip_prefix("42"))
            .filter_map(|body| serde_json::from_str::<Vec<Value>>(body).ok())
            .filter_map(|args| {
                let name = args.first()?.as_str()?.to_string();
                Some((name, args.get(1).cloned().unwrap_or(Value::Null)))
            })
            .collect()
    }
}

/// Canned HTTP reply
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

/// One recorded upload
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub authorization: Option<String>,
    pub fields: HashMap<String, Vec<u8>>,
    pub file_name: Option<String>,
}

#[derive(Clone)]
struct HttpState {
    predict_reply: Arc<Mutex<Reply>>,
    history_reply: Arc<Mutex<Reply>>,
    uploads: Arc<Mutex<Vec<Upload>>>,
    hits: Arc<AtomicUsize>,
}

pub struct MockHttpServer {
    pub url: String,
    state: HttpState,
}

impl MockHttpServer {
    pub async fn start(predict_reply: Reply) -> Self {
        let state = HttpState {
            predict_reply: Arc::new(Mutex::new(predict_reply)),
            history_reply: Arc::new(Mutex::new(Reply::ok(json!([])))),
            uploads: Arc::new(Mutex::new(Vec::new())),
            hits: Arc::new(AtomicUsize::new(0)),
        };

        let app = Router::new()
            .route("/api/predictions/predict", post(predict_handler))
            .route("/api/predictions/predictions", get(history_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url, state }
    }

    pub fn set_history(&self, reply: Reply) {
        *self.state.history_reply.lock().unwrap() = reply;
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.uploads.lock().unwrap().clone()
    }
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn respond(reply: Reply) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(reply.status).unwrap();
    (status, Json(reply.body))
}

async fn predict_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let mut upload = Upload {
        authorization: authorization(&headers),
        ..Upload::default()
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(file_name) = field.file_name() {
            upload.file_name = Some(file_name.to_string());
        }
        let data = field.bytes().await.unwrap_or_default();
        upload.fields.insert(name, data.to_vec());
    }

    state.uploads.lock().unwrap().push(upload);

    let reply = state.predict_reply.lock().unwrap().clone();
    respond(reply)
}

async fn history_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.hits.fetch_add(1, Ordering::SeqCst);

    if authorization(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "missing token" })));
    }

    let reply = state.history_reply.lock().unwrap().clone();
    respond(reply)
}

/// Image source that counts reads
#[derive(Default)]
pub struct CountingImageSource {
    pub reads: AtomicUsize,
}

impl CountingImageSource {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ImageSource for CountingImageSource {
    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, std::io::Result<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Box::pin(tokio::fs::read(path))
    }
}

/// Configuration pointing at the mock servers, with short delays
pub fn test_config(socket_url: &str, api_url: &str) -> ClientConfig {
    ClientConfig::new(api_url)
        .with_socket_url(socket_url)
        .with_reconnect_delay(10)
        .with_timeout(2000)
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Temporary image file with known bytes
pub fn image_file(bytes: &[u8]) -> tempfile::NamedTempFile {
    use std::io::Write;

    let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}
