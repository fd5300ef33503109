//! `reqwest`-backed implementation of [`ChatApi`].
//!
//! Every protected request carries `Authorization: Bearer <token>` taken
//! from the shared [`TokenStore`] at send time, so a login performed after
//! the client was built is picked up immediately.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use tardichat_proto::channel::Channel;
use tardichat_proto::message::{ChannelId, Message, MessageContent, NewMessage};

use super::{ApiError, ChatApi, Endpoints};
use crate::auth::TokenStore;

/// Error body shape used by the server (`{"message": "..."}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Login response (`{"token": "..."}`).
#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// HTTP client for the chat service.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    endpoints: Endpoints,
    tokens: TokenStore,
}

impl HttpApi {
    /// Build a client for `endpoints` with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Request`] if the underlying HTTP client cannot be
    /// constructed (e.g. TLS backend initialisation failure).
    pub fn new(
        endpoints: Endpoints,
        tokens: TokenStore,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoints,
            tokens,
        })
    }

    /// The endpoint set this client targets.
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The credential store consulted on every request.
    #[must_use]
    pub const fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Log in and store the returned token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidCredentials`] when the server rejects the
    /// credentials or omits the token, or another [`ApiError`] on transport
    /// failure.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let body = serde_json::json!({ "username": username, "password": password });
        let resp = self
            .client
            .post(self.endpoints.login()?)
            .json(&body)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            tracing::warn!(status = %resp.status(), username, "login rejected");
            return Err(ApiError::InvalidCredentials);
        }

        let login: LoginResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let token = login.token.ok_or(ApiError::InvalidCredentials)?;
        self.tokens.set(token.clone());
        tracing::info!(username, "logged in");
        Ok(token)
    }

    /// List the channels visible to the current user.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, non-success status, or
    /// an unexpected body.
    pub async fn list_channels(&self) -> Result<Vec<Channel>, ApiError> {
        let resp = self
            .authorized(self.client.get(self.endpoints.channels()?))
            .send()
            .await?;
        let resp = check(resp).await?;
        resp.json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Attach the bearer token, if one is held.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl ChatApi for HttpApi {
    async fn fetch_history(
        &self,
        channel: ChannelId,
        batch_offset: u32,
    ) -> Result<Vec<Message>, ApiError> {
        let resp = self
            .authorized(self.client.get(self.endpoints.history(channel, batch_offset)?))
            .send()
            .await
            .inspect_err(|e| tracing::warn!(channel = %channel, err = %e, "no response from server"))?;
        let resp = check(resp).await?;
        let messages: Vec<Message> = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        tracing::debug!(
            channel = %channel,
            batch_offset,
            count = messages.len(),
            "fetched history batch"
        );
        Ok(messages)
    }

    async fn persist_message(
        &self,
        channel: ChannelId,
        content: &MessageContent,
    ) -> Result<(), ApiError> {
        let body = NewMessage {
            content: content.clone(),
        };
        let resp = self
            .authorized(self.client.post(self.endpoints.post_message(channel)?))
            .json(&body)
            .send()
            .await
            .inspect_err(|e| tracing::warn!(channel = %channel, err = %e, "no response from server"))?;
        check(resp).await?;
        tracing::debug!(channel = %channel, "message persisted");
        Ok(())
    }
}

/// Turn a non-success response into [`ApiError::Status`], logging by class.
async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error));

    match status {
        StatusCode::UNAUTHORIZED => tracing::warn!("request rejected: not authenticated"),
        StatusCode::FORBIDDEN => tracing::warn!("request rejected: not authorized"),
        _ => tracing::warn!(status = %status, body = %text, "server error"),
    }

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}
