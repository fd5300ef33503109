//! In-process chat server for integration tests.
//!
//! Serves the routes the client uses under `/msg` on `127.0.0.1:0`:
//!
//! - `POST /msg/login`
//! - `GET  /msg/protected/channels`
//! - `GET  /msg/protected/channel/{id}/messages/{offset}`
//! - `POST /msg/protected/channel/{id}/message` (stores and broadcasts)
//! - `GET  /msg/protected/channel/{id}/ws` (expects the auth frame first)

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use tardichat_proto::channel::Channel;
use tardichat_proto::message::{ChannelId, Message, MessageContent, MessageId, Timestamp};

pub const USERNAME: &str = "ann";
pub const PASSWORD: &str = "secret";
pub const TOKEN: &str = "test-token";

#[derive(Default)]
pub struct ServerState {
    channels: Mutex<Vec<Channel>>,
    history: Mutex<HashMap<ChannelId, Vec<Message>>>,
    subscribers: Mutex<Vec<(ChannelId, mpsc::UnboundedSender<String>)>>,
    auth_frames: Mutex<Vec<Value>>,
    accepted: AtomicUsize,
    next_id: AtomicI64,
    clock: AtomicI64,
}

pub struct TestServer {
    pub url: String,
    pub state: Arc<ServerState>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl TestServer {
    /// Start a server that knows `channels`, each with an empty history.
    pub async fn start(channels: &[u64]) -> Self {
        let state = Arc::new(ServerState {
            next_id: AtomicI64::new(1_000),
            clock: AtomicI64::new(10_000),
            ..Default::default()
        });
        for &id in channels {
            let id = ChannelId::new(id);
            state.channels.lock().push(Channel {
                id,
                name: format!("channel-{id}"),
                description: String::new(),
                is_private: false,
                image_url: None,
            });
            state.history.lock().insert(id, Vec::new());
        }

        let app = Router::new()
            .route("/msg/login", post(login))
            .route("/msg/protected/channels", get(list_channels))
            .route(
                "/msg/protected/channel/{id}/messages/{offset}",
                get(history),
            )
            .route("/msg/protected/channel/{id}/message", post(persist))
            .route("/msg/protected/channel/{id}/ws", get(socket))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/msg"),
            state,
            handle,
        }
    }

    /// Put a message into a channel's stored history.
    pub fn seed(&self, message: Message) {
        self.state
            .history
            .lock()
            .entry(message.channel_id)
            .or_default()
            .push(message);
    }

    /// Push a `new_message` frame to every socket of `channel`.
    pub fn broadcast(&self, message: &Message) {
        self.state.broadcast(message);
    }

    /// Close every socket subscribed to `channel`.
    pub fn kick(&self, channel: u64) {
        let channel = ChannelId::new(channel);
        self.state.subscribers.lock().retain(|(ch, _)| *ch != channel);
    }

    /// Number of authenticated sockets on `channel`.
    pub fn subscribers(&self, channel: u64) -> usize {
        let channel = ChannelId::new(channel);
        self.state
            .subscribers
            .lock()
            .iter()
            .filter(|(ch, tx)| *ch == channel && !tx.is_closed())
            .count()
    }

    /// Wait until `channel` has exactly `n` live sockets.
    pub async fn wait_for_subscribers(&self, channel: u64, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.subscribers(channel) != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("channel {channel} never reached {n} subscribers"));
    }

    /// Number of WebSocket upgrades accepted so far.
    pub fn accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Every auth frame received, in order.
    pub fn auth_frames(&self) -> Vec<Value> {
        self.state.auth_frames.lock().clone()
    }

    /// Stored history of `channel`.
    pub fn stored(&self, channel: u64) -> Vec<Message> {
        self.state
            .history
            .lock()
            .get(&ChannelId::new(channel))
            .cloned()
            .unwrap_or_default()
    }
}

impl ServerState {
    fn broadcast(&self, message: &Message) {
        let frame = json!({"type": "new_message", "data": message}).to_string();
        for (channel, tx) in self.subscribers.lock().iter() {
            if *channel == message.channel_id {
                let _ = tx.send(frame.clone());
            }
        }
    }
}

pub fn text_message(id: i64, channel: u64, timestamp: i64, text: &str) -> Message {
    Message {
        id: MessageId::Number(id),
        channel_id: ChannelId::new(channel),
        timestamp: Timestamp::from_millis(timestamp),
        content: MessageContent::text(text),
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["username"] == USERNAME && body["password"] == PASSWORD {
        Json(json!({ "token": TOKEN })).into_response()
    } else {
        error(StatusCode::UNAUTHORIZED, "Invalid credentials")
    }
}

async fn list_channels(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    Json(state.channels.lock().clone()).into_response()
}

async fn history(
    State(state): State<Arc<ServerState>>,
    Path((id, _offset)): Path<(u64, u32)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    match state.history.lock().get(&ChannelId::new(id)) {
        Some(messages) => Json(messages.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "Channel not found"),
    }
}

async fn persist(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let channel = ChannelId::new(id);
    if !state.history.lock().contains_key(&channel) {
        return error(StatusCode::NOT_FOUND, "Channel not found");
    }
    let Ok(content) = serde_json::from_value::<MessageContent>(body["content"].clone()) else {
        return error(StatusCode::BAD_REQUEST, "Invalid message");
    };

    let message = Message {
        id: MessageId::Number(state.next_id.fetch_add(1, Ordering::SeqCst)),
        channel_id: channel,
        timestamp: Timestamp::from_millis(state.clock.fetch_add(1, Ordering::SeqCst)),
        content,
    };
    state
        .history
        .lock()
        .entry(channel)
        .or_default()
        .push(message.clone());
    state.broadcast(&message);
    (StatusCode::CREATED, Json(message)).into_response()
}

async fn socket(
    ws: WebSocketUpgrade,
    Path(id): Path<u64>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    state.accepted.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| serve_socket(socket, ChannelId::new(id), state))
}

async fn serve_socket(mut socket: WebSocket, channel: ChannelId, state: Arc<ServerState>) {
    // The first frame must be the auth frame.
    let auth = match socket.recv().await {
        Some(Ok(WsMessage::Text(text))) => serde_json::from_str::<Value>(text.as_str()).ok(),
        _ => None,
    };
    let Some(auth) = auth else {
        return;
    };
    state.auth_frames.lock().push(auth.clone());
    if auth["type"] != "auth" || auth["token"] != TOKEN {
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.subscribers.lock().push((channel, tx));

    loop {
        tokio::select! {
            push = rx.recv() => match push {
                Some(frame) => {
                    if socket.send(WsMessage::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    // Kicked.
                    let _ = socket.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
