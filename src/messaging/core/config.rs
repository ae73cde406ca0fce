//! Configuration for the messaging subsystem.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::messaging::core::errors::{TalkError, TalkResult};

/// Top-level configuration for the talk room backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TalkConfig {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Friends list settings.
    pub friends: FriendsConfig,
    /// Talk room settings.
    pub talk_room: TalkRoomConfig,
}

impl TalkConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> TalkResult<()> {
        if self.friends.page_size == 0 {
            return Err(TalkError::InvalidConfig(
                "friends.page_size must be > 0".to_string(),
            ));
        }

        if self.talk_room.max_body_chars == 0 {
            return Err(TalkError::InvalidConfig(
                "talk_room.max_body_chars must be > 0".to_string(),
            ));
        }

        if self.talk_room.history_limit == Some(0) {
            return Err(TalkError::InvalidConfig(
                "talk_room.history_limit must be > 0 when set".to_string(),
            ));
        }

        if self.storage.sqlite_path.as_os_str().is_empty() {
            return Err(TalkError::InvalidConfig(
                "storage.sqlite_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path; `:memory:` opens a private in-memory database.
    pub sqlite_path: PathBuf,
    /// How long a write waits on a lock held by another connection.
    pub busy_timeout_ms: u64,
}

impl StorageConfig {
    /// Path value selecting an in-memory database.
    pub const IN_MEMORY: &'static str = ":memory:";

    /// In-memory storage, mostly for tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: PathBuf::from(Self::IN_MEMORY),
            ..Self::default()
        }
    }

    /// Whether this config selects an in-memory database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.sqlite_path.as_os_str() == Self::IN_MEMORY
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("talk_room.sqlite"),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Friends list settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FriendsConfig {
    /// Counterparts per page.
    pub page_size: u32,
}

impl Default for FriendsConfig {
    fn default() -> Self {
        Self { page_size: 7 }
    }
}

/// Talk room settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TalkRoomConfig {
    /// Maximum message body size in characters.
    pub max_body_chars: usize,
    /// Default number of messages returned when the caller sets no limit.
    /// `None` returns the whole history.
    pub history_limit: Option<usize>,
}

impl Default for TalkRoomConfig {
    fn default() -> Self {
        Self {
            max_body_chars: 1_000,
            history_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TalkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.friends.page_size, 7);
        assert!(!config.storage.is_in_memory());
        assert!(StorageConfig::in_memory().is_in_memory());
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = TalkConfig::default();
        config.friends.page_size = 0;
        assert!(matches!(
            config.validate(),
            Err(TalkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_history_limit_rejected() {
        let mut config = TalkConfig::default();
        config.talk_room.history_limit = Some(0);
        assert!(config.validate().is_err());
    }
}
