//! Chat message — the value carried inside an [`Envelope`](crate::wire::Envelope).

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One text message between two instances.
///
/// Immutable once built. The receiving side replaces `recipient_address`
/// with its own address, since the sender cannot know which of the
/// receiver's addresses is canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(alias = "senderIpAddress")]
    pub sender_address: Ipv4Addr,

    #[serde(alias = "recipientIpAddress")]
    pub recipient_address: Ipv4Addr,

    pub content: String,

    /// ISO-8601 UTC on the wire.
    #[serde(alias = "timestamp")]
    pub timestamp_utc: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message stamped with the current time.
    pub fn new(sender: Ipv4Addr, recipient: Ipv4Addr, content: impl Into<String>) -> Self {
        Self {
            sender_address: sender,
            recipient_address: recipient,
            content: content.into(),
            timestamp_utc: Utc::now(),
        }
    }

    /// Copy of this message addressed to `recipient`.
    pub fn with_recipient(self, recipient: Ipv4Addr) -> Self {
        Self {
            recipient_address: recipient,
            ..self
        }
    }
}
