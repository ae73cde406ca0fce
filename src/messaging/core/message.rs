//! Message model for talk rooms.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messaging::core::ids::{ConversationKey, MessageId, UserId};

/// A single directed message. Immutable once stored.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Store-allocated identifier.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Recipient.
    pub receiver_id: UserId,
    /// Text payload.
    pub body: String,
    /// Store-assigned creation time.
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Conversation this message belongs to.
    #[must_use]
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(self.sender_id, self.receiver_id)
    }

    /// Whether sender and receiver are the same user.
    #[must_use]
    pub fn is_self_message(&self) -> bool {
        self.sender_id == self.receiver_id
    }

    /// History order: timestamp, then insertion order.
    #[must_use]
    pub fn history_cmp(&self, other: &Self) -> Ordering {
        self.sent_at
            .cmp(&other.sent_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}
