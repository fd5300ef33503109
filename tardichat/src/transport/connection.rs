//! Channel connection state machine.
//!
//! Wraps a raw [`Link`] with the channel protocol:
//!
//! ```text
//! Connecting --Open--> Authenticating --auth frame sent--> Connected
//!     |                      |                                 |
//!     +--------- Close ------+------------- Close -------------+--> Disconnected
//! ```
//!
//! The auth frame `{"type":"auth","token":...}` is always the first frame
//! written. The server does not acknowledge it, so the connection counts as
//! `Connected` as soon as the frame is handed to the socket. Both steps are
//! reported: [`ConnectionEvent::Authenticating`] when the link opens, then
//! [`ConnectionEvent::Connected`] once the frame is written.

use tardichat_proto::frame::{self, ClientFrame, ServerFrame};
use tardichat_proto::message::{ChannelId, Message};

use super::{ConnectionState, Connector, Link, LinkEvent, TransportError};

/// Typed events produced by a [`Connection`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Socket open; the auth frame goes out on the next call.
    Authenticating,
    /// Auth frame sent.
    Connected,
    /// A `new_message` frame arrived.
    NewMessage(Message),
    /// Transport-level error. Always followed by [`ConnectionEvent::Closed`].
    Error(String),
    /// The connection is gone. Last event.
    Closed(Option<u16>),
}

/// A live connection to one channel's event stream.
#[derive(Debug)]
pub struct Connection {
    channel: ChannelId,
    link: Link,
    token: Option<String>,
    state: ConnectionState,
}

impl Connection {
    /// Start opening a connection for `channel`, authenticating with `token`
    /// once the socket opens.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the connector cannot start the attempt.
    pub fn open<C: Connector + ?Sized>(
        connector: &C,
        channel: ChannelId,
        token: Option<String>,
    ) -> Result<Self, TransportError> {
        let link = connector.open(channel)?;
        Ok(Self {
            channel,
            link,
            token,
            state: ConnectionState::Connecting,
        })
    }

    /// Channel this connection belongs to.
    #[must_use]
    pub const fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Wait for the next typed event.
    ///
    /// Malformed frames are logged and skipped; unknown frame types are
    /// skipped silently. Returns `None` after [`ConnectionEvent::Closed`].
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            match self.state {
                ConnectionState::Disconnected => return None,
                ConnectionState::Authenticating => {
                    if let Err(e) = self.authenticate().await {
                        tracing::warn!(channel = %self.channel, err = %e, "failed to send auth frame");
                        self.link.close();
                        // Keep reading: the close event follows.
                        self.state = ConnectionState::Connecting;
                        return Some(ConnectionEvent::Error(e.to_string()));
                    }
                    self.state = ConnectionState::Connected;
                    tracing::info!(channel = %self.channel, "channel connection established");
                    return Some(ConnectionEvent::Connected);
                }
                _ => {}
            }

            let Some(event) = self.link.next_event().await else {
                // Socket task vanished without a close event.
                self.state = ConnectionState::Disconnected;
                return Some(ConnectionEvent::Closed(None));
            };

            match event {
                LinkEvent::Open => {
                    self.state = ConnectionState::Authenticating;
                    return Some(ConnectionEvent::Authenticating);
                }
                LinkEvent::Text(raw) => match frame::decode_server(&raw) {
                    Ok(ServerFrame::NewMessage { data }) => {
                        return Some(ConnectionEvent::NewMessage(data));
                    }
                    Ok(ServerFrame::Unknown) => {
                        tracing::debug!(channel = %self.channel, "ignoring unrecognized frame type");
                    }
                    Err(e) => {
                        tracing::warn!(channel = %self.channel, err = %e, "malformed frame, skipping");
                    }
                },
                LinkEvent::Error(reason) => {
                    tracing::warn!(channel = %self.channel, reason = %reason, "channel connection error");
                    return Some(ConnectionEvent::Error(reason));
                }
                LinkEvent::Close(code) => {
                    self.state = ConnectionState::Disconnected;
                    tracing::info!(channel = %self.channel, ?code, "channel connection closed");
                    return Some(ConnectionEvent::Closed(code));
                }
            }
        }
    }

    /// Send a client frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Encode`] if the frame cannot be encoded, or
    /// [`TransportError::ConnectionClosed`] if the link is gone.
    pub async fn send(&self, frame: &ClientFrame) -> Result<(), TransportError> {
        let text = frame::encode_client(frame)?;
        self.link.send_text(text).await
    }

    /// Close the connection.
    pub fn close(self) {
        self.link.close();
    }

    async fn authenticate(&self) -> Result<(), TransportError> {
        if self.token.is_none() {
            tracing::warn!(channel = %self.channel, "no credential held, authenticating with null token");
        }
        self.send(&ClientFrame::Auth {
            token: self.token.clone(),
        })
        .await
    }
}
