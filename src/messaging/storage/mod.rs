//! Persistent storage for users and conversations.

pub mod conversation_store;
pub mod database;
pub mod user_directory;

pub use conversation_store::{
    ConversationQuery, ConversationStore, ConversationSummary, SqliteConversationStore,
    StoreFuture,
};
pub use database::open_database;
pub use user_directory::{SqliteUserDirectory, UserDirectory};
