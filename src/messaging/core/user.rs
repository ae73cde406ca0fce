//! User records as seen by the messaging core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messaging::core::ids::UserId;

/// A user participating in conversations.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Immutable identifier.
    pub id: UserId,
    /// Unique display name.
    pub username: String,
    /// Unique email address.
    pub email: String,
    /// Sign-up time.
    pub joined_at: DateTime<Utc>,
}

impl User {
    /// Build a new user with a fresh id.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            email: email.into(),
            joined_at,
        }
    }

    /// Case-insensitive substring match on the display name.
    ///
    /// `folded_keyword` must already be lower-cased.
    #[must_use]
    pub fn name_contains(&self, folded_keyword: &str) -> bool {
        folded_keyword.is_empty() || self.username.to_lowercase().contains(folded_keyword)
    }
}
