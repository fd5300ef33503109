//! Connection supervisor for one session epoch.
//!
//! Runs as a spawned task owned by the session: opens the channel
//! connection, feeds its events into the shared state, and when the
//! connection closes waits for the reconnection delay and opens a new one.
//! The task holds only a weak reference to the controller state and stops
//! the moment its epoch is no longer current; the session aborts it on
//! teardown, which also cancels a pending retry sleep.

use std::sync::{Arc, Weak};

use tardichat_proto::message::ChannelId;

use super::{CONNECTION_ERROR_MESSAGE, Inner, Shared};
use crate::reconnect::ReconnectPolicy;
use crate::transport::ConnectionState;
use crate::transport::Connector;
use crate::transport::connection::{Connection, ConnectionEvent};

/// Apply `f` to the shared state if the controller is alive and `epoch` is
/// current.
fn update<A, C>(shared: &Weak<Shared<A, C>>, epoch: u64, f: impl FnOnce(&mut Inner)) -> bool {
    shared
        .upgrade()
        .is_some_and(|shared| shared.update(epoch, f))
}

/// Open a connection, or record why it could not be started.
fn open<A, C: Connector>(
    shared: &Weak<Shared<A, C>>,
    channel: ChannelId,
) -> Option<Result<Connection, String>> {
    let shared: Arc<Shared<A, C>> = shared.upgrade()?;
    let token = shared.tokens.get();
    Some(Connection::open(&shared.connector, channel, token).map_err(|e| e.to_string()))
}

pub(super) async fn run<A, C: Connector>(
    shared: Weak<Shared<A, C>>,
    epoch: u64,
    channel: ChannelId,
) {
    let Some(delay) = shared.upgrade().map(|s| s.config.reconnect_delay) else {
        return;
    };
    let mut policy = ReconnectPolicy::new(delay);

    loop {
        if !update(&shared, epoch, |inner| {
            inner.connection = ConnectionState::Connecting;
        }) {
            return;
        }

        match open(&shared, channel) {
            None => return,
            Some(Ok(mut conn)) => {
                while let Some(event) = conn.next_event().await {
                    let current = match event {
                        ConnectionEvent::Authenticating => update(&shared, epoch, |inner| {
                            inner.connection = ConnectionState::Authenticating;
                        }),
                        ConnectionEvent::Connected => {
                            policy.reset();
                            update(&shared, epoch, |inner| {
                                inner.connection = ConnectionState::Connected;
                                inner.error = None;
                            })
                        }
                        ConnectionEvent::NewMessage(message) if message.channel_id != channel => {
                            tracing::warn!(
                                channel = %channel,
                                message_channel = %message.channel_id,
                                id = %message.id,
                                "live message for another channel, discarding"
                            );
                            true
                        }
                        ConnectionEvent::NewMessage(message) => update(&shared, epoch, |inner| {
                            if let Some(session) = inner.session.as_mut() {
                                session.log.insert(message);
                            }
                        }),
                        // A failed socket is not live even before its close arrives.
                        ConnectionEvent::Error(_) => update(&shared, epoch, |inner| {
                            inner.connection = ConnectionState::Disconnected;
                            inner.error = Some(CONNECTION_ERROR_MESSAGE.to_string());
                        }),
                        ConnectionEvent::Closed(_) => break,
                    };
                    if !current {
                        conn.close();
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(channel = %channel, err = %e, "could not open channel connection");
            }
        }

        let wait = policy.next_delay();
        if !update(&shared, epoch, |inner| {
            inner.connection = ConnectionState::ClosedPendingRetry;
            inner.error = Some(CONNECTION_ERROR_MESSAGE.to_string());
        }) {
            return;
        }
        tracing::info!(
            channel = %channel,
            attempt = policy.attempts(),
            delay_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "connection closed, retrying after delay"
        );
        tokio::time::sleep(wait).await;
    }
}
