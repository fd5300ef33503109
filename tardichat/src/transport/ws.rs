//! WebSocket connector over `tokio-tungstenite`.
//!
//! Each [`WsConnector::open`] spawns one socket task that performs the
//! handshake, then pumps frames between the socket and the [`Link`] handle.
//! The task reports exactly one [`LinkEvent::Close`] as its last event,
//! whether the socket failed to connect, errored, or was closed by either
//! side.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use tardichat_proto::message::ChannelId;

use super::{Connector, Link, LinkCommand, LinkEvent, TransportError};
use crate::api::Endpoints;

/// Default timeout for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of each link's event and command channels.
pub const DEFAULT_LINK_BUFFER: usize = 256;

/// Opens `wss://<host>/.../protected/channel/{id}/ws` links.
#[derive(Debug, Clone)]
pub struct WsConnector {
    endpoints: Endpoints,
    connect_timeout: Duration,
    buffer: usize,
}

impl WsConnector {
    /// Creates a connector for the given server endpoints.
    #[must_use]
    pub const fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            buffer: DEFAULT_LINK_BUFFER,
        }
    }

    /// Overrides the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the per-link channel capacity.
    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

impl Connector for WsConnector {
    fn open(&self, channel: ChannelId) -> Result<Link, TransportError> {
        let url = self
            .endpoints
            .channel_socket(channel)
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let (events_tx, events_rx) = mpsc::channel(self.buffer);
        let (commands_tx, commands_rx) = mpsc::channel(self.buffer);

        tracing::debug!(channel = %channel, url = %url, "opening channel socket");
        tokio::spawn(socket_task(url, self.connect_timeout, events_tx, commands_rx));

        Ok(Link::new(events_rx, commands_tx))
    }
}

/// Drives one socket from handshake to close.
async fn socket_task(
    url: Url,
    connect_timeout: Duration,
    events: mpsc::Sender<LinkEvent>,
    mut commands: mpsc::Receiver<LinkCommand>,
) {
    let connect = tokio::time::timeout(connect_timeout, connect_async(url.as_str()));
    let ws_stream = tokio::select! {
        result = connect => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                tracing::warn!(url = %url, err = %e, "channel socket connect failed");
                let _ = events.send(LinkEvent::Error(e.to_string())).await;
                let _ = events.send(LinkEvent::Close(None)).await;
                return;
            }
            Err(_) => {
                tracing::warn!(url = %url, "channel socket connect timed out");
                let _ = events.send(LinkEvent::Error("connect timed out".to_string())).await;
                let _ = events.send(LinkEvent::Close(None)).await;
                return;
            }
        },
        // Handle dropped or closed before the handshake finished.
        command = wait_for_close(&mut commands) => {
            tracing::debug!(url = %url, ?command, "socket closed before open");
            let _ = events.send(LinkEvent::Close(None)).await;
            return;
        }
    };

    if events.send(LinkEvent::Open).await.is_err() {
        return;
    }

    let (mut ws_sender, mut ws_reader) = ws_stream.split();

    let close_code = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Text(text)) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!(err = %e, "channel socket send failed");
                        let _ = events.send(LinkEvent::Error(e.to_string())).await;
                        break None;
                    }
                }
                Some(LinkCommand::Close) | None => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    let _ = ws_sender.close().await;
                    break None;
                }
            },
            frame = ws_reader.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if events.send(LinkEvent::Text(text.as_str().to_owned())).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        if events.send(LinkEvent::Text(text)).await.is_err() {
                            break None;
                        }
                    }
                    Err(_) => tracing::warn!(len = data.len(), "non-UTF-8 binary frame, skipping"),
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "channel socket closed by server");
                    break frame.map(|f| u16::from(f.code));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::warn!(err = %e, "channel socket read error");
                    let _ = events.send(LinkEvent::Error(e.to_string())).await;
                    break None;
                }
                None => break None,
            },
        }
    };

    let _ = events.send(LinkEvent::Close(close_code)).await;
    tracing::debug!(url = %url, "channel socket task exiting");
}

/// Resolves once the handle asks to close or is dropped; text queued before
/// open is discarded, since the server ignores unauthenticated frames anyway.
async fn wait_for_close(commands: &mut mpsc::Receiver<LinkCommand>) -> Option<LinkCommand> {
    loop {
        match commands.recv().await {
            Some(LinkCommand::Text(_)) => {}
            other => return other,
        }
    }
}
