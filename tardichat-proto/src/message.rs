//! Message data model shared by the HTTP API and the live event stream.
//!
//! The same JSON shape arrives from two places: the history endpoint
//! (`GET /channel/{id}/messages/{offset}`) returns an array of [`Message`],
//! and the WebSocket pushes one at a time inside a `new_message` frame.

use serde::{Deserialize, Serialize};

/// Maximum accepted text payload for an outgoing message, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Numeric channel identifier used in every channel-scoped route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Creates a channel identifier from its numeric value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Server-assigned message identifier.
///
/// The server is free to use numbers or strings; the value is kept in the
/// shape it arrived in so it re-serializes identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// Numeric identifier.
    Number(i64),
    /// String identifier.
    Text(String),
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Message timestamp. The only sort key of a channel's message log.
///
/// By convention milliseconds since the UNIX epoch, but ordering never
/// depends on the unit. The server may send any JSON number (integer,
/// fraction or exponent form), so the value is kept as `f64` and ordered
/// with [`f64::total_cmp`]. Integral values serialize back as integers.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis as f64)
    }

    /// Creates a timestamp from a raw numeric value.
    ///
    /// Returns `None` for NaN or infinities, which JSON cannot carry.
    #[must_use]
    pub const fn from_f64(value: f64) -> Option<Self> {
        if value.is_finite() { Some(Self(value)) } else { None }
    }

    /// Whole milliseconds, truncated toward zero and saturating at the
    /// `i64` bounds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_millis(self) -> i64 {
        self.0 as i64
    }

    /// The raw value.
    #[must_use]
    pub const fn as_f64(self) -> f64 {
        self.0
    }

    /// The value as an `i64` if it is integral and in range.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn as_integer(self) -> Option<i64> {
        // `i64::MAX as f64` is 2^63, one past the largest i64.
        let in_range = self.0 >= i64::MIN as f64 && self.0 < i64::MAX as f64;
        (in_range && self.0.fract() == 0.0).then_some(self.0 as i64)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for Timestamp {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Consistent with `total_cmp` equality.
        self.0.to_bits().hash(state);
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_integer() {
            Some(millis) => write!(f, "{millis}ms"),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_integer() {
            Some(millis) => serializer.serialize_i64(millis),
            None => serializer.serialize_f64(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // f64 accepts integer, fraction and exponent forms alike.
        let value = f64::deserialize(deserializer)?;
        Self::from_f64(value)
            .ok_or_else(|| serde::de::Error::custom("timestamp must be a finite number"))
    }
}

/// Content of a message, tagged on the wire as `{"type": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawContent", into = "RawContent")]
pub enum MessageContent {
    /// `{"type": "Text", "value": "<string>"}`.
    Text(String),
    /// Any content kind this client does not interpret, kept verbatim.
    Other {
        /// The wire `type` tag.
        kind: String,
        /// The wire `value`, `null` when absent.
        value: serde_json::Value,
    },
}

/// Wire shape of [`MessageContent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: serde_json::Value,
}

const TEXT_KIND: &str = "Text";

impl From<RawContent> for MessageContent {
    fn from(raw: RawContent) -> Self {
        match raw.value {
            serde_json::Value::String(text) if raw.kind == TEXT_KIND => Self::Text(text),
            value => Self::Other {
                kind: raw.kind,
                value,
            },
        }
    }
}

impl From<MessageContent> for RawContent {
    fn from(content: MessageContent) -> Self {
        match content {
            MessageContent::Text(text) => Self {
                kind: TEXT_KIND.to_string(),
                value: serde_json::Value::String(text),
            },
            MessageContent::Other { kind, value } => Self { kind, value },
        }
    }
}

/// Error returned when outgoing content fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Text content is empty or whitespace only.
    #[error("message content is empty")]
    Empty,
    /// Text content exceeds [`MAX_MESSAGE_SIZE`].
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the content in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

impl MessageContent {
    /// Convenience constructor for text content.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns the text if this is text content.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Other { .. } => None,
        }
    }

    /// Validates content before it is sent.
    ///
    /// Only text is checked; other kinds are passed through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] for blank text, or
    /// [`ValidationError::TooLarge`] when the text exceeds `MAX_MESSAGE_SIZE`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let Self::Text(text) = self else {
            return Ok(());
        };
        if text.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(ValidationError::TooLarge {
                size: text.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for MessageContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Other { kind, .. } => write!(f, "[{kind}]"),
        }
    }
}

/// A message as delivered by the server. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned identity.
    pub id: MessageId,
    /// Channel the message belongs to.
    #[serde(rename = "channelId")]
    pub channel_id: ChannelId,
    /// Sort key.
    pub timestamp: Timestamp,
    /// Message body.
    pub content: MessageContent,
}

/// Body of `POST /channel/{id}/message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Content to persist.
    pub content: MessageContent,
}
