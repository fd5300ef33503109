//! HTTP side of the chat service.
//!
//! The session core only needs two calls, captured by the [`ChatApi`] trait:
//! load a page of channel history and persist a new message. [`HttpApi`]
//! implements them over `reqwest`; tests substitute in-memory fakes.

pub mod http;

pub use http::HttpApi;

use tardichat_proto::message::{ChannelId, Message, MessageContent};
use url::Url;

/// Errors returned by the HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}{}", message_suffix(.message))]
    Status {
        /// HTTP status code.
        status: u16,
        /// The `message` field of the JSON error body, when present.
        message: Option<String>,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// The configured server URL cannot be used.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// Login succeeded at the HTTP level but no credential was returned.
    #[error("invalid credentials")]
    InvalidCredentials,
}

fn message_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl ApiError {
    /// The human-readable message the server attached to the failure, if any.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// The HTTP calls the channel session depends on.
///
/// Both calls are authenticated with the current bearer token.
pub trait ChatApi: Send + Sync {
    /// Fetch one batch of a channel's history.
    ///
    /// `batch_offset` selects the page; `0` is the most recent batch. The
    /// returned messages are in server order; callers sort them.
    fn fetch_history(
        &self,
        channel: ChannelId,
        batch_offset: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, ApiError>> + Send;

    /// Persist a message to a channel.
    ///
    /// Success means the server accepted it; the message itself comes back
    /// through the channel's live event stream.
    fn persist_message(
        &self,
        channel: ChannelId,
        content: &MessageContent,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;
}

/// Builds every URL the client talks to from the configured server root.
///
/// With the default root `https://edu.tardigrade.land/msg`:
/// - history: `https://edu.tardigrade.land/msg/protected/channel/7/messages/0`
/// - socket: `wss://edu.tardigrade.land/msg/protected/channel/7/ws`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    root: String,
}

impl Endpoints {
    /// Validates `server_url` and creates the endpoint set.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the URL does not parse or is not
    /// `http`/`https`.
    pub fn new(server_url: &str) -> Result<Self, ApiError> {
        let url = Url::parse(server_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "unsupported scheme {:?} (expected http or https)",
                url.scheme()
            )));
        }
        Ok(Self {
            root: url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Server root without trailing slash.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Url::parse(&format!("{}/{path}", self.root)).map_err(|e| ApiError::InvalidUrl(e.to_string()))
    }

    /// `POST` target for logging in.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the joined URL is invalid.
    pub fn login(&self) -> Result<Url, ApiError> {
        self.url("login")
    }

    /// `GET` target for the channel list.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the joined URL is invalid.
    pub fn channels(&self) -> Result<Url, ApiError> {
        self.url("protected/channels")
    }

    /// `GET` target for one batch of channel history.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the joined URL is invalid.
    pub fn history(&self, channel: ChannelId, batch_offset: u32) -> Result<Url, ApiError> {
        self.url(&format!("protected/channel/{channel}/messages/{batch_offset}"))
    }

    /// `POST` target for persisting a message.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the joined URL is invalid.
    pub fn post_message(&self, channel: ChannelId) -> Result<Url, ApiError> {
        self.url(&format!("protected/channel/{channel}/message"))
    }

    /// WebSocket URL for a channel's live event stream.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the joined URL is invalid.
    pub fn channel_socket(&self, channel: ChannelId) -> Result<Url, ApiError> {
        let mut url = self.url(&format!("protected/channel/{channel}/ws"))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ApiError::InvalidUrl(format!("cannot switch {url} to {scheme}")))?;
        Ok(url)
    }
}
