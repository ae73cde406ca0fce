// File: src/messaging/core/ids.rs

//! Identifier types for the messaging core.
//!
//! Strongly-typed ID newtypes plus the unordered [`ConversationKey`] used to
//! group messages of one user pair.
//!
//! `UserId` is a random UUID (v4) so ids exposed in URLs leak nothing about
//! sign-up order. `MessageId` is allocated by the store and strictly increases
//! with insertion order, which is what tie-breaks messages sharing a timestamp.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declare a UUID newtype with a consistent API.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Create a new random identifier.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_uuid_id!(
    /// User account identifier.
    UserId
);

/// Store-allocated message identifier.
///
/// Strictly increasing in insertion order within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Raw integer value as stored.
    #[inline]
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unordered pair of users identifying a conversation.
///
/// The pair is normalised so that `low() <= high()`; `new(a, b)` and
/// `new(b, a)` are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    low: UserId,
    high: UserId,
}

impl ConversationKey {
    /// Build the key for the pair `{a, b}`.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Smaller member of the pair.
    #[must_use]
    pub const fn low(&self) -> UserId {
        self.low
    }

    /// Larger member of the pair.
    #[must_use]
    pub const fn high(&self) -> UserId {
        self.high
    }

    /// Whether both members are the same user.
    #[must_use]
    pub fn is_self(&self) -> bool {
        self.low == self.high
    }

    /// The member that is not `user`, if `user` belongs to the pair.
    #[must_use]
    pub fn counterpart_of(&self, user: UserId) -> Option<UserId> {
        if user == self.low {
            Some(self.high)
        } else if user == self.high {
            Some(self.low)
        } else {
            None
        }
    }

    /// Storage form of both members.
    ///
    /// Lower-case hyphenated UUID text sorts like the UUID bytes, so the
    /// ordering matches the in-memory one.
    #[must_use]
    pub fn to_storage(&self) -> (String, String) {
        (self.low.to_string(), self.high.to_string())
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}
