// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Channel session against a real HTTP + WebSocket server.
//!
//! Drives `SessionController<HttpApi, WsConnector>` against the in-process
//! server from `common`: history load, live merge, send echo, reconnection
//! after a server-side close, and teardown.

mod common;

use std::time::Duration;

use tokio::sync::watch;

use common::{TOKEN, TestServer, text_message};
use tardichat::api::{Endpoints, HttpApi};
use tardichat::auth::TokenStore;
use tardichat::session::{
    CONNECTION_ERROR_MESSAGE, SessionConfig, SessionController, SessionError, SessionPhase,
    SessionState,
};
use tardichat::transport::ws::WsConnector;
use tardichat_proto::message::{ChannelId, MessageId};

const RETRY: Duration = Duration::from_millis(200);

type Controller = SessionController<HttpApi, WsConnector>;

fn controller(server: &TestServer, token: Option<&str>) -> Controller {
    let endpoints = Endpoints::new(&server.url).unwrap();
    let tokens = token.map_or_else(TokenStore::new, TokenStore::with_token);
    let api = HttpApi::new(endpoints.clone(), tokens.clone(), Duration::from_secs(5)).unwrap();
    let connector = WsConnector::new(endpoints).with_connect_timeout(Duration::from_secs(5));
    SessionController::new(
        api,
        connector,
        tokens,
        SessionConfig {
            reconnect_delay: RETRY,
        },
    )
}

async fn wait_until(
    rx: &mut watch::Receiver<SessionState>,
    what: &str,
    pred: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .unwrap_or_else(|_| panic!("timeout waiting for {what}"))
        .expect("controller dropped")
        .clone()
}

fn ids(state: &SessionState) -> Vec<MessageId> {
    state.messages.iter().map(|m| m.id.clone()).collect()
}

#[tokio::test]
async fn history_then_live_message_is_merged_in_order() {
    let server = TestServer::start(&[7]).await;
    server.seed(text_message(1, 7, 200, "first"));

    let ctl = controller(&server, Some(TOKEN));
    let mut rx = ctl.subscribe();

    ctl.activate(ChannelId::new(7)).await.unwrap();
    assert_eq!(ids(&ctl.state()), vec![MessageId::Number(1)]);

    wait_until(&mut rx, "connected", SessionState::is_connected).await;
    server.wait_for_subscribers(7, 1).await;

    server.broadcast(&text_message(2, 7, 100, "earlier"));
    let state = wait_until(&mut rx, "live message", |s| s.messages.len() == 2).await;
    assert_eq!(
        ids(&state),
        vec![MessageId::Number(2), MessageId::Number(1)]
    );

    let auth = server.auth_frames();
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0], serde_json::json!({"type": "auth", "token": TOKEN}));
}

#[tokio::test]
async fn sent_message_comes_back_through_live_connection() {
    let server = TestServer::start(&[3]).await;
    let ctl = controller(&server, Some(TOKEN));
    let mut rx = ctl.subscribe();

    ctl.activate(ChannelId::new(3)).await.unwrap();
    wait_until(&mut rx, "connected", SessionState::is_connected).await;
    server.wait_for_subscribers(3, 1).await;

    ctl.send_text("hello there").await.unwrap();

    let state = wait_until(&mut rx, "echo", |s| !s.messages.is_empty()).await;
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].content.as_text(), Some("hello there"));
    assert_eq!(server.stored(3).len(), 1);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn unknown_channel_fails_without_connecting() {
    let server = TestServer::start(&[1]).await;
    let ctl = controller(&server, Some(TOKEN));

    let result = ctl.activate(ChannelId::new(99)).await;
    assert!(matches!(result, Err(SessionError::FetchFailed(_))));

    let state = ctl.state();
    assert_eq!(state.phase, SessionPhase::Error);
    assert_eq!(state.error.as_deref(), Some("Channel not found"));
    assert!(state.messages.is_empty());

    tokio::time::sleep(RETRY * 2).await;
    assert_eq!(server.accepted(), 0);
}

#[tokio::test]
async fn missing_token_is_rejected_by_history_route() {
    let server = TestServer::start(&[1]).await;
    let ctl = controller(&server, None);

    assert!(ctl.activate(ChannelId::new(1)).await.is_err());
    assert_eq!(ctl.state().error.as_deref(), Some("Unauthorized"));
}

#[tokio::test]
async fn reconnects_after_server_closes_socket() {
    let server = TestServer::start(&[5]).await;
    let ctl = controller(&server, Some(TOKEN));
    let mut rx = ctl.subscribe();

    ctl.activate(ChannelId::new(5)).await.unwrap();
    wait_until(&mut rx, "connected", SessionState::is_connected).await;
    server.wait_for_subscribers(5, 1).await;

    server.kick(5);
    let state = wait_until(&mut rx, "disconnect", |s| {
        !s.is_connected() && s.error.is_some()
    })
    .await;
    assert_eq!(state.phase, SessionPhase::Active);
    assert_eq!(state.error.as_deref(), Some(CONNECTION_ERROR_MESSAGE));

    wait_until(&mut rx, "reconnected", SessionState::is_connected).await;
    server.wait_for_subscribers(5, 1).await;
    assert_eq!(server.accepted(), 2);
    assert!(
        server
            .auth_frames()
            .iter()
            .all(|f| f["token"] == TOKEN)
    );

    // Live delivery works on the new socket.
    server.broadcast(&text_message(9, 5, 1, "after reconnect"));
    wait_until(&mut rx, "message after reconnect", |s| s.messages.len() == 1).await;
}

#[tokio::test]
async fn teardown_stops_reconnection() {
    let server = TestServer::start(&[5]).await;
    let ctl = controller(&server, Some(TOKEN));
    let mut rx = ctl.subscribe();

    ctl.activate(ChannelId::new(5)).await.unwrap();
    wait_until(&mut rx, "connected", SessionState::is_connected).await;
    server.wait_for_subscribers(5, 1).await;

    server.kick(5);
    wait_until(&mut rx, "disconnect", |s| !s.is_connected()).await;
    ctl.teardown();

    tokio::time::sleep(RETRY * 4).await;
    assert_eq!(server.accepted(), 1);
    assert_eq!(ctl.state(), SessionState::default());
}

#[tokio::test]
async fn switching_channels_moves_the_socket() {
    let server = TestServer::start(&[1, 2]).await;
    server.seed(text_message(10, 1, 1, "in one"));
    server.seed(text_message(20, 2, 1, "in two"));

    let ctl = controller(&server, Some(TOKEN));
    let mut rx = ctl.subscribe();

    ctl.activate(ChannelId::new(1)).await.unwrap();
    wait_until(&mut rx, "connected to 1", SessionState::is_connected).await;
    server.wait_for_subscribers(1, 1).await;

    ctl.activate(ChannelId::new(2)).await.unwrap();
    assert_eq!(ids(&ctl.state()), vec![MessageId::Number(20)]);
    wait_until(&mut rx, "connected to 2", SessionState::is_connected).await;
    server.wait_for_subscribers(2, 1).await;
    server.wait_for_subscribers(1, 0).await;

    // A late broadcast on the old channel never reaches the new log.
    server.broadcast(&text_message(11, 1, 2, "stale"));
    server.broadcast(&text_message(21, 2, 2, "fresh"));
    let state = wait_until(&mut rx, "fresh message", |s| s.messages.len() == 2).await;
    assert_eq!(
        ids(&state),
        vec![MessageId::Number(20), MessageId::Number(21)]
    );
}
