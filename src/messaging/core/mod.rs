//! Core messaging types and identifiers.

pub mod clock;
pub mod config;
pub mod errors;
pub mod ids;
pub mod message;
pub mod user;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FriendsConfig, StorageConfig, TalkConfig, TalkRoomConfig};
pub use errors::{TalkError, TalkResult};
pub use ids::{ConversationKey, MessageId, UserId};
pub use message::Message;
pub use user::User;
