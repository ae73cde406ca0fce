//! Error types for the messaging subsystem.

use thiserror::Error;

use crate::messaging::core::ids::UserId;

/// Messaging subsystem error type.
///
/// Every variant except the storage ones is a caller-input error: nothing is
/// retried internally and no operation reports partial success.
#[derive(Debug, Error)]
pub enum TalkError {
    /// Sender or receiver of a message does not resolve to a known user.
    #[error("unknown participant: {user_id}")]
    InvalidParticipant {
        /// Offending user id.
        user_id: UserId,
    },
    /// Viewer of a friends ranking does not resolve to a known user.
    #[error("unknown viewer: {user_id}")]
    InvalidViewer {
        /// Offending user id.
        user_id: UserId,
    },
    /// Page size must be strictly positive.
    #[error("invalid page size: {page_size}")]
    InvalidPageSize {
        /// Offending page size.
        page_size: u32,
    },
    /// A user-facing field failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        /// Field name as shown to the caller.
        field: &'static str,
        /// Human readable reason.
        reason: String,
    },
    /// A user update referenced an unknown user.
    #[error("unknown user: {user_id}")]
    UnknownUser {
        /// Offending user id.
        user_id: UserId,
    },
    /// Username already taken by another user.
    #[error("username already taken: {username}")]
    DuplicateUsername {
        /// Requested username.
        username: String,
    },
    /// Email already registered by another user.
    #[error("email already registered: {email}")]
    DuplicateEmail {
        /// Requested email.
        email: String,
    },
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A stored row could not be decoded.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
    /// `SQLite` storage error (sync).
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("storage unavailable: {0}")]
    AsyncStorageUnavailable(#[from] tokio_rusqlite::Error),
}

impl TalkError {
    /// Build an [`TalkError::InvalidInput`] error.
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the error comes from the storage layer rather than caller input.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::AsyncStorageUnavailable(_) | Self::CorruptRecord(_)
        )
    }
}

/// Convenience result alias for messaging operations.
pub type TalkResult<T> = Result<T, TalkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let user_id = UserId::new();
        let err = TalkError::InvalidParticipant { user_id };
        assert_eq!(err.to_string(), format!("unknown participant: {user_id}"));

        let err = TalkError::InvalidPageSize { page_size: 0 };
        assert_eq!(err.to_string(), "invalid page size: 0");

        let err = TalkError::invalid_input("body", "must not be empty");
        assert_eq!(err.to_string(), "invalid body: must not be empty");
    }

    #[test]
    fn test_storage_classification() {
        let err = TalkError::from(rusqlite::Error::InvalidQuery);
        assert!(err.is_storage());
        assert!(!TalkError::InvalidPageSize { page_size: 0 }.is_storage());
    }
}
