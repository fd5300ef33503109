//! Ordered, deduplicated message log for the active channel.
//!
//! # Invariants
//!
//! - Messages are ascending by [`Timestamp`]; equal timestamps keep arrival
//!   order.
//! - No two messages share a [`MessageId`]. The history response and the
//!   live echo of a just-sent message can both carry the same message; the
//!   first copy wins.
//!
//! The sequence sits behind an [`Arc`] so state snapshots can share it.
//! A mutation copies it only while a snapshot still holds the old one.

use std::collections::HashSet;
use std::sync::Arc;

use tardichat_proto::message::{Message, MessageId, Timestamp};

/// The message history of one channel session.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Arc<Vec<Message>>,
    ids: HashSet<MessageId>,
}

impl MessageLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole log with a history batch.
    pub fn seed(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.ids.clear();
        let mut seeded = Vec::new();
        for message in messages {
            if self.ids.insert(message.id.clone()) {
                seeded.push(message);
            } else {
                tracing::debug!(id = %message.id, "duplicate message in history batch");
            }
        }
        // Stable: ties keep the order the server sent them in.
        seeded.sort_by_key(|m| m.timestamp);
        self.messages = Arc::new(seeded);
    }

    /// Insert one live message at its sorted position.
    ///
    /// Returns `false` (and leaves the log untouched) if a message with the
    /// same id is already present.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            tracing::debug!(id = %message.id, "duplicate live message ignored");
            return false;
        }
        let at = self.upper_bound(message.timestamp);
        Arc::make_mut(&mut self.messages).insert(at, message);
        true
    }

    /// Index after the last message with a timestamp `<= ts`.
    fn upper_bound(&self, ts: Timestamp) -> usize {
        self.messages.partition_point(|m| m.timestamp <= ts)
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages = Arc::default();
        self.ids.clear();
    }

    /// The full ordered sequence.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Shared handle to the current sequence. Later mutations leave it
    /// untouched.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Message>> {
        Arc::clone(&self.messages)
    }

    /// Whether a message with this id is present.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
