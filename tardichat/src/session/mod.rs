//! Channel session controller.
//!
//! The [`SessionController`] owns the single active channel session of the
//! client: it loads the channel's history into a [`MessageLog`], opens the
//! channel's live connection, merges live messages into the log and keeps
//! the connection alive with a [`ReconnectPolicy`](crate::reconnect::ReconnectPolicy).
//! Front-ends read a [`SessionState`] snapshot through a `watch` channel.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --activate--> Loading --history ok--> Active --teardown--> Idle
//!                       |                      |
//!                       +--history err--> Error --activate--> Loading
//! ```
//!
//! Every `activate` starts a new session epoch. The previous session (its
//! connection task and pending retry timer included) is torn down before
//! the history request goes out, and every later mutation checks that its
//! epoch is still current. A history response or a live event belonging to
//! a superseded session is discarded.

mod driver;
pub mod log;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tardichat_proto::message::{ChannelId, Message, MessageContent, ValidationError};

use crate::api::{ApiError, ChatApi};
use crate::auth::TokenStore;
use crate::reconnect::DEFAULT_RECONNECT_DELAY;
use crate::transport::{ConnectionState, Connector};

pub use log::MessageLog;

/// Error string surfaced when history cannot be loaded.
pub const FETCH_FAILED_MESSAGE: &str = "failed to fetch messages";

/// Error string surfaced when a message cannot be persisted.
pub const SEND_FAILED_MESSAGE: &str = "failed to send message";

/// Error string surfaced when the live connection fails or drops.
pub const CONNECTION_ERROR_MESSAGE: &str = "real-time connection error";

/// Errors returned by [`SessionController`] operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// History could not be loaded; the session is in [`SessionPhase::Error`].
    #[error("failed to fetch messages: {0}")]
    FetchFailed(#[source] ApiError),

    /// The message could not be persisted; the log is unchanged.
    #[error("failed to send message: {0}")]
    SendFailed(#[source] ApiError),

    /// `send` was called with no active channel. No request was made.
    #[error("no active channel")]
    NoActiveChannel,

    /// The content was rejected before any request was made.
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] ValidationError),

    /// Another `activate` or a `teardown` happened while this activation's
    /// history request was in flight; its result was discarded.
    #[error("activation of channel {0} was superseded")]
    Superseded(ChannelId),
}

/// Phase of the controller's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No channel selected.
    #[default]
    Idle,
    /// History for the selected channel is being fetched.
    Loading,
    /// History loaded; the live connection is managed in the background.
    Active,
    /// History could not be loaded.
    Error,
}

/// Snapshot of everything a front-end renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// State machine phase.
    pub phase: SessionPhase,
    /// The selected channel (`None` when idle).
    pub channel: Option<ChannelId>,
    /// The channel's messages, ascending by timestamp. Shared with the log
    /// and with other snapshots until the log next changes.
    pub messages: Arc<Vec<Message>>,
    /// Whether a history fetch or a send is in flight.
    pub loading: bool,
    /// The last error to display, if any.
    pub error: Option<String>,
    /// Live connection state.
    pub connection: ConnectionState,
}

impl SessionState {
    /// Whether the live connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }
}

/// Tunables for [`SessionController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay before reopening a closed connection.
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// One channel session: the channel, its log and its connection task.
#[derive(Debug)]
struct Session {
    epoch: u64,
    channel: ChannelId,
    log: MessageLog,
    /// Sends started in this session and not yet answered.
    sends_in_flight: usize,
    driver: Option<JoinHandle<()>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        // Stops the connection and any pending retry sleep.
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Mutable controller state, guarded by one lock.
#[derive(Debug, Default)]
struct Inner {
    last_epoch: u64,
    session: Option<Session>,
    phase: SessionPhase,
    fetching: bool,
    error: Option<String>,
    connection: ConnectionState,
}

impl Inner {
    fn is_current(&self, epoch: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.epoch == epoch)
    }

    fn finish_send(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.sends_in_flight = session.sends_in_flight.saturating_sub(1);
        }
    }

    fn snapshot(&self) -> SessionState {
        SessionState {
            phase: self.phase,
            channel: self.session.as_ref().map(|s| s.channel),
            messages: self
                .session
                .as_ref()
                .map(|s| s.log.snapshot())
                .unwrap_or_default(),
            loading: self.fetching
                || self.session.as_ref().is_some_and(|s| s.sends_in_flight > 0),
            error: self.error.clone(),
            connection: self.connection,
        }
    }
}

/// State shared between controller handles and the connection task.
struct Shared<A, C> {
    api: A,
    connector: C,
    tokens: TokenStore,
    config: SessionConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
}

impl<A, C> Shared<A, C> {
    /// Publish the current state to observers. Called with the lock held so
    /// snapshots are observed in mutation order.
    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.snapshot());
    }

    /// Apply `f` if session `epoch` is still current, then publish.
    /// Returns `false` when the session has been superseded.
    fn update(&self, epoch: u64, f: impl FnOnce(&mut Inner)) -> bool {
        let mut inner = self.inner.lock();
        if !inner.is_current(epoch) {
            return false;
        }
        f(&mut inner);
        self.publish(&inner);
        true
    }
}

/// Coordinates history loading, the live connection and the message log of
/// the active channel.
///
/// Cheap to clone; all clones drive the same session.
pub struct SessionController<A, C> {
    shared: Arc<Shared<A, C>>,
}

impl<A, C> Clone for SessionController<A, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A, C> SessionController<A, C>
where
    A: ChatApi + 'static,
    C: Connector + 'static,
{
    /// Creates an idle controller.
    pub fn new(api: A, connector: C, tokens: TokenStore, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self {
            shared: Arc::new(Shared {
                api,
                connector,
                tokens,
                config,
                inner: Mutex::new(Inner::default()),
                state_tx,
            }),
        }
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().snapshot()
    }

    /// Make `channel` the active channel.
    ///
    /// Tears down the current session, fetches the channel's history, seeds
    /// the log and starts the live connection.
    ///
    /// # Errors
    ///
    /// - [`SessionError::FetchFailed`] if history cannot be loaded; the
    ///   phase becomes [`SessionPhase::Error`] and no connection is opened.
    /// - [`SessionError::Superseded`] if another `activate` or a `teardown`
    ///   ran before the history arrived; nothing is changed.
    pub async fn activate(&self, channel: ChannelId) -> Result<(), SessionError> {
        let epoch = {
            let mut inner = self.shared.inner.lock();
            if let Some(previous) = inner.session.take() {
                tracing::info!(from = %previous.channel, to = %channel, "switching channel");
            }
            inner.last_epoch += 1;
            let epoch = inner.last_epoch;
            inner.session = Some(Session {
                epoch,
                channel,
                log: MessageLog::new(),
                sends_in_flight: 0,
                driver: None,
            });
            inner.phase = SessionPhase::Loading;
            inner.fetching = true;
            inner.error = None;
            inner.connection = ConnectionState::Disconnected;
            self.shared.publish(&inner);
            epoch
        };

        let result = self.shared.api.fetch_history(channel, 0).await;

        let mut inner = self.shared.inner.lock();
        if !inner.is_current(epoch) {
            tracing::debug!(channel = %channel, "discarding history of superseded activation");
            return Err(SessionError::Superseded(channel));
        }

        match result {
            Ok(messages) => {
                let driver = tokio::spawn(driver::run(Arc::downgrade(&self.shared), epoch, channel));
                if let Some(session) = inner.session.as_mut() {
                    session.log.seed(messages);
                    session.driver = Some(driver);
                    tracing::info!(channel = %channel, count = session.log.len(), "channel history loaded");
                }
                inner.phase = SessionPhase::Active;
                inner.fetching = false;
                self.shared.publish(&inner);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(channel = %channel, err = %e, "failed to fetch channel history");
                inner.phase = SessionPhase::Error;
                inner.fetching = false;
                inner.error = Some(
                    e.server_message()
                        .unwrap_or(FETCH_FAILED_MESSAGE)
                        .to_string(),
                );
                self.shared.publish(&inner);
                Err(SessionError::FetchFailed(e))
            }
        }
    }

    /// Persist a message to the active channel.
    ///
    /// The message is not added to the log here; it arrives back through
    /// the live connection.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NoActiveChannel`] unless the phase is
    ///   [`SessionPhase::Active`]. No request is made.
    /// - [`SessionError::InvalidMessage`] for blank or oversized text. No
    ///   request is made.
    /// - [`SessionError::SendFailed`] if the server call fails; `error` is
    ///   set and the log is unchanged.
    pub async fn send(&self, content: MessageContent) -> Result<(), SessionError> {
        let (epoch, channel) = {
            let mut inner = self.shared.inner.lock();
            if inner.phase != SessionPhase::Active {
                return Err(SessionError::NoActiveChannel);
            }
            content.validate()?;
            let Some(session) = inner.session.as_mut() else {
                return Err(SessionError::NoActiveChannel);
            };
            session.sends_in_flight += 1;
            let target = (session.epoch, session.channel);
            inner.error = None;
            self.shared.publish(&inner);
            target
        };

        let result = self.shared.api.persist_message(channel, &content).await;

        match result {
            Ok(()) => {
                self.shared.update(epoch, Inner::finish_send);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(channel = %channel, err = %e, "failed to send message");
                let message = e
                    .server_message()
                    .unwrap_or(SEND_FAILED_MESSAGE)
                    .to_string();
                self.shared.update(epoch, |inner| {
                    inner.finish_send();
                    inner.error = Some(message);
                });
                Err(SessionError::SendFailed(e))
            }
        }
    }

    /// Convenience wrapper for sending text.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        self.send(MessageContent::text(text)).await
    }

    /// Close the connection, cancel any pending retry and clear the log.
    pub fn teardown(&self) {
        let mut inner = self.shared.inner.lock();
        if let Some(session) = inner.session.take() {
            tracing::info!(channel = %session.channel, "session torn down");
        }
        inner.phase = SessionPhase::Idle;
        inner.fetching = false;
        inner.error = None;
        inner.connection = ConnectionState::Disconnected;
        self.shared.publish(&inner);
    }
}
