//! Live connection layer for `TardiChat`.
//!
//! A [`Connector`] opens a raw [`Link`] to a channel's event endpoint. The
//! link reports everything that happens to it through one ordered stream of
//! [`LinkEvent`]s, so consumers never see concurrent callbacks for the same
//! socket. [`connection::Connection`] layers the channel protocol (auth
//! handshake, frame decoding) on top of a link.
//!
//! Concrete connectors:
//! - [`ws::WsConnector`] — WebSocket connector over `tokio-tungstenite`
//! - [`loopback::LoopbackConnector`] — in-process connector for tests

pub mod connection;
pub mod loopback;
pub mod ws;

use std::fmt;

use tokio::sync::mpsc;

use tardichat_proto::message::ChannelId;

/// Lifecycle of a channel session's live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and none scheduled.
    #[default]
    Disconnected,
    /// Link requested, waiting for the open event.
    Connecting,
    /// Link open, auth frame being sent.
    Authenticating,
    /// Auth frame sent; live events are flowing.
    Connected,
    /// Link closed, a reconnection attempt is scheduled.
    ClosedPendingRetry,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Connected => write!(f, "connected"),
            Self::ClosedPendingRetry => write!(f, "closed, retry pending"),
        }
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The endpoint URL could not be built.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// An outbound frame could not be encoded.
    #[error("frame encoding failed: {0}")]
    Encode(#[from] tardichat_proto::frame::FrameError),
}

/// One event reported by a link, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The handshake completed; the link can carry frames.
    Open,
    /// A text frame arrived.
    Text(String),
    /// A transport-level error occurred. A [`LinkEvent::Close`] follows.
    Error(String),
    /// The link closed, with the close code when the peer sent one.
    /// Always the last event.
    Close(Option<u16>),
}

/// Commands from a [`Link`] handle to the task driving the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Send a text frame.
    Text(String),
    /// Close the link.
    Close,
}

/// Handle to one raw bidirectional link.
///
/// Dropping the handle closes the link.
#[derive(Debug)]
pub struct Link {
    events: mpsc::Receiver<LinkEvent>,
    commands: mpsc::Sender<LinkCommand>,
}

impl Link {
    /// Wrap the two channel halves connecting to a socket task.
    #[must_use]
    pub const fn new(events: mpsc::Receiver<LinkEvent>, commands: mpsc::Sender<LinkCommand>) -> Self {
        Self { events, commands }
    }

    /// Wait for the next event. `None` once the socket task has gone away.
    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }

    /// Queue a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the socket task has
    /// exited.
    pub async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.commands
            .send(LinkCommand::Text(text))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Ask the socket task to close the link. Idempotent.
    pub fn close(&self) {
        let _ = self.commands.try_send(LinkCommand::Close);
    }
}

/// Opens links to channel event endpoints.
///
/// `open` returns as soon as the attempt is started; completion (or failure)
/// of the handshake is reported through the link's event stream.
pub trait Connector: Send + Sync {
    /// Start opening a link for `channel`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the attempt cannot even be started
    /// (e.g. the endpoint URL is invalid).
    fn open(&self, channel: ChannelId) -> Result<Link, TransportError>;
}
