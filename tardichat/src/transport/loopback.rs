//! Loopback connector for testing.
//!
//! [`LoopbackConnector::new`] returns the connector together with a receiver
//! of [`RemoteLink`]s: every `open` hands the server side of the new link to
//! the test, which then plays the server (emitting `Open`, pushing frames,
//! injecting errors or closing) and reads what the client sent.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

use tardichat_proto::message::ChannelId;

use super::{Connector, Link, LinkCommand, LinkEvent, TransportError};

/// In-process [`Connector`] backed by `tokio::sync::mpsc` channels.
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    remotes: mpsc::UnboundedSender<RemoteLink>,
    opened: Arc<AtomicUsize>,
    buffer: usize,
}

impl LoopbackConnector {
    /// Create a connector and the receiver that yields the server side of
    /// each link it opens. `buffer` is the capacity of each direction.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::UnboundedReceiver<RemoteLink>) {
        let (remotes, rx) = mpsc::unbounded_channel();
        let connector = Self {
            remotes,
            opened: Arc::new(AtomicUsize::new(0)),
            buffer: buffer.max(1),
        };
        (connector, rx)
    }

    /// Number of links opened so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Connector for LoopbackConnector {
    fn open(&self, channel: ChannelId) -> Result<Link, TransportError> {
        let (events_tx, events_rx) = mpsc::channel(self.buffer);
        let (commands_tx, commands_rx) = mpsc::channel(self.buffer);
        self.opened.fetch_add(1, Ordering::SeqCst);

        let remote = RemoteLink {
            channel,
            events: events_tx,
            commands: commands_rx,
        };
        // Nobody watching the remote ends just means the link never opens.
        let _ = self.remotes.send(remote);

        Ok(Link::new(events_rx, commands_tx))
    }
}

/// Server side of a loopback link.
#[derive(Debug)]
pub struct RemoteLink {
    channel: ChannelId,
    events: mpsc::Sender<LinkEvent>,
    commands: mpsc::Receiver<LinkCommand>,
}

impl RemoteLink {
    /// The channel the client opened this link for.
    #[must_use]
    pub const fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Deliver an event to the client. Returns `false` if the client side
    /// has been dropped.
    pub async fn emit(&self, event: LinkEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Complete the handshake.
    pub async fn open(&self) -> bool {
        self.emit(LinkEvent::Open).await
    }

    /// Push a text frame.
    pub async fn push_text(&self, text: impl Into<String>) -> bool {
        self.emit(LinkEvent::Text(text.into())).await
    }

    /// Report a transport error followed by a close, as a failing socket would.
    pub async fn fail(&self, reason: impl Into<String>) -> bool {
        self.emit(LinkEvent::Error(reason.into())).await && self.emit(LinkEvent::Close(None)).await
    }

    /// Close the link from the server side.
    pub async fn close(&self, code: Option<u16>) -> bool {
        self.emit(LinkEvent::Close(code)).await
    }

    /// Next text frame the client sent. `None` when the client closed or
    /// dropped the link.
    pub async fn next_sent(&mut self) -> Option<String> {
        match self.commands.recv().await {
            Some(LinkCommand::Text(text)) => Some(text),
            Some(LinkCommand::Close) | None => None,
        }
    }

    /// Whether the client has dropped its side of the link.
    #[must_use]
    pub fn is_client_gone(&self) -> bool {
        self.events.is_closed()
    }
}
