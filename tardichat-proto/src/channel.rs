//! Channel listing model.
//!
//! Only [`Channel::id`] matters to the message-synchronization core; the
//! remaining fields exist so front-ends can render a channel list.

use serde::{Deserialize, Serialize};

use crate::message::ChannelId;

/// A channel as returned by `GET /protected/channels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Channel identity.
    pub id: ChannelId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Whether the channel is private.
    #[serde(default)]
    pub is_private: bool,
    /// Optional channel picture.
    #[serde(default)]
    pub image_url: Option<String>,
}
