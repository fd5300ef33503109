//! Process-wide credential state.
//!
//! Token acquisition is opaque to the rest of the client: whoever logs in
//! stores the bearer token here, and the HTTP client and the WebSocket auth
//! frame read it back. Nothing is persisted beyond the process.

use std::sync::Arc;

use parking_lot::RwLock;

/// Shared holder for the current bearer token.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `token`.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    /// Returns the current token, if any.
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Replaces the current token.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Forgets the current token.
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}
