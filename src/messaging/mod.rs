//! Messaging subsystem for the talk room backend.
//!
//! Organized into:
//! - `core`: Configuration, errors, IDs, clock, users, messages and input validation
//! - `storage`: `SQLite` connection setup, user directory and conversation store
//! - `index`: Friends ranking derived from the conversation store
//! - `display`: Relative-time labels for last-message timestamps
//! - `service`: Facade validating input before calling the stores

pub mod core;
pub mod display;
pub mod index;
pub mod service;
pub mod storage;

pub use core::{
    Clock, ConversationKey, FriendsConfig, ManualClock, Message, MessageId, StorageConfig,
    SystemClock, TalkConfig, TalkError, TalkResult, TalkRoomConfig, User, UserId,
};
pub use display::Elapsed;
pub use index::{ConversationIndex, FriendsPage, RankedFriend, StoreConversationIndex};
pub use service::{TalkRoom, TalkService};
pub use storage::{
    ConversationQuery, ConversationStore, ConversationSummary, SqliteConversationStore,
    SqliteUserDirectory, UserDirectory, open_database,
};
