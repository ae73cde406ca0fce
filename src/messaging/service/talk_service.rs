//! Talk service orchestration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::messaging::core::clock::{Clock, SystemClock};
use crate::messaging::core::config::TalkConfig;
use crate::messaging::core::errors::{TalkError, TalkResult};
use crate::messaging::core::ids::UserId;
use crate::messaging::core::message::Message;
use crate::messaging::core::user::User;
use crate::messaging::core::validation::{
    InputValidator, validate_keyword, validate_message_body,
};
use crate::messaging::index::{ConversationIndex, FriendsPage, StoreConversationIndex};
use crate::messaging::storage::conversation_store::{
    ConversationQuery, ConversationStore, SqliteConversationStore,
};
use crate::messaging::storage::database::open_database;
use crate::messaging::storage::user_directory::{SqliteUserDirectory, UserDirectory};

/// History of one pair as seen by the viewer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TalkRoom {
    /// The other member of the conversation.
    pub friend: User,
    /// Messages in ascending `(sent_at, id)` order.
    pub messages: Vec<Message>,
}

/// Backend dependencies for the talk service.
pub struct TalkBackends {
    /// User directory implementation.
    pub users: Arc<dyn UserDirectory>,
    /// Conversation store implementation.
    pub conversations: Arc<dyn ConversationStore>,
    /// Friends ranking implementation.
    pub index: Arc<dyn ConversationIndex>,
    /// Clock used for sign-up times and elapsed labels.
    pub clock: Arc<dyn Clock>,
}

impl TalkBackends {
    /// Build default `SQLite` backends from config, sharing one connection.
    ///
    /// # Errors
    /// Returns an error if any backend cannot be initialized.
    pub async fn sqlite(config: &TalkConfig, clock: Arc<dyn Clock>) -> TalkResult<Self> {
        let conn = open_database(&config.storage).await?;
        let users: Arc<dyn UserDirectory> =
            Arc::new(SqliteUserDirectory::new(Arc::clone(&conn)).await?);
        let conversations: Arc<dyn ConversationStore> = Arc::new(
            SqliteConversationStore::new(conn, Arc::clone(&users), Arc::clone(&clock)).await?,
        );
        let index: Arc<dyn ConversationIndex> = Arc::new(StoreConversationIndex::new(
            Arc::clone(&users),
            Arc::clone(&conversations),
        ));

        Ok(Self {
            users,
            conversations,
            index,
            clock,
        })
    }
}

/// Entry point used by the HTTP layer.
///
/// Every operation takes the acting user's id explicitly and validates raw
/// input before touching storage.
pub struct TalkService {
    config: TalkConfig,
    validator: InputValidator,
    users: Arc<dyn UserDirectory>,
    conversations: Arc<dyn ConversationStore>,
    index: Arc<dyn ConversationIndex>,
    clock: Arc<dyn Clock>,
}

impl TalkService {
    /// Create a new talk service.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: TalkConfig, backends: TalkBackends) -> TalkResult<Self> {
        config.validate()?;
        let validator =
            InputValidator::new().map_err(|err| TalkError::InvalidConfig(err.to_string()))?;

        Ok(Self {
            config,
            validator,
            users: backends.users,
            conversations: backends.conversations,
            index: backends.index,
            clock: backends.clock,
        })
    }

    /// Create a new service using `SQLite` backends and the wall clock.
    ///
    /// # Errors
    /// Returns an error if backends cannot be initialized.
    pub async fn from_config(config: TalkConfig) -> TalkResult<Self> {
        let backends = TalkBackends::sqlite(&config, Arc::new(SystemClock)).await?;
        Self::new(config, backends)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &TalkConfig {
        &self.config
    }

    /// Current instant according to the service clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a new user.
    ///
    /// # Errors
    /// Returns `InvalidInput` for malformed fields, `DuplicateUsername` /
    /// `DuplicateEmail` on collisions, or a storage error.
    pub async fn sign_up(&self, username: &str, email: &str) -> TalkResult<User> {
        let username = self.validator.username(username)?;
        let email = self.validator.email(email)?;
        let user = self
            .users
            .create_user(User::new(username, email, self.clock.now()))
            .await?;
        info!(user_id = %user.id, "Signed up user");
        Ok(user)
    }

    /// Look up a user.
    ///
    /// # Errors
    /// Returns `UnknownUser` if the id does not resolve, or a storage error.
    pub async fn user(&self, user_id: UserId) -> TalkResult<User> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or(TalkError::UnknownUser { user_id })
    }

    /// Change a user's display name.
    ///
    /// # Errors
    /// Returns `InvalidInput`, `UnknownUser`, `DuplicateUsername`, or a storage error.
    pub async fn change_username(&self, user_id: UserId, username: &str) -> TalkResult<User> {
        let username = self.validator.username(username)?;
        self.users.change_username(user_id, &username).await
    }

    /// Change a user's email.
    ///
    /// # Errors
    /// Returns `InvalidInput`, `UnknownUser`, `DuplicateEmail`, or a storage error.
    pub async fn change_email(&self, user_id: UserId, email: &str) -> TalkResult<User> {
        let email = self.validator.email(email)?;
        self.users.change_email(user_id, &email).await
    }

    /// Send `body` from `sender_id` to `receiver_id`.
    ///
    /// # Errors
    /// Returns `InvalidInput` for a blank or oversized body,
    /// `InvalidParticipant` for unknown users, or a storage error.
    pub async fn send_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        body: &str,
    ) -> TalkResult<Message> {
        validate_message_body(body, self.config.talk_room.max_body_chars)?;
        self.conversations
            .append_message(sender_id, receiver_id, body)
            .await
    }

    /// Load the talk room between `viewer` and `friend`.
    ///
    /// Without an explicit limit the configured history limit applies.
    ///
    /// # Errors
    /// Returns `InvalidParticipant` if either user is unknown, or a storage error.
    pub async fn talk_room(
        &self,
        viewer: UserId,
        friend_id: UserId,
        mut query: ConversationQuery,
    ) -> TalkResult<TalkRoom> {
        if !self.users.user_exists(viewer).await? {
            return Err(TalkError::InvalidParticipant { user_id: viewer });
        }
        let friend = self
            .users
            .get_user(friend_id)
            .await?
            .ok_or(TalkError::InvalidParticipant { user_id: friend_id })?;

        if query.limit.is_none() {
            query.limit = self.config.talk_room.history_limit;
        }
        let messages = self
            .conversations
            .get_conversation(viewer, friend_id, query)
            .await?;

        Ok(TalkRoom { friend, messages })
    }

    /// Latest message between `viewer` and `friend`, if any.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn last_message(&self, viewer: UserId, friend: UserId) -> TalkResult<Option<Message>> {
        self.conversations.last_message_between(viewer, friend).await
    }

    /// One page of the viewer's friends, most recent conversation first.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an oversized keyword, `InvalidViewer` if the
    /// viewer is unknown, or a storage error.
    pub async fn friends(
        &self,
        viewer: UserId,
        keyword: Option<&str>,
        page: u32,
    ) -> TalkResult<FriendsPage> {
        let keyword = validate_keyword(keyword)?;
        self.index
            .rank_friends(
                viewer,
                keyword.as_deref(),
                page,
                self.config.friends.page_size,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::messaging::core::clock::ManualClock;
    use crate::messaging::core::config::StorageConfig;

    async fn service_with(config: TalkConfig) -> (TalkService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap(),
        ));
        let backends = TalkBackends::sqlite(&config, clock.clone()).await.unwrap();
        (TalkService::new(config, backends).unwrap(), clock)
    }

    async fn service() -> (TalkService, Arc<ManualClock>) {
        let config = TalkConfig {
            storage: StorageConfig::in_memory(),
            ..TalkConfig::default()
        };
        service_with(config).await
    }

    #[tokio::test]
    async fn test_sign_up_validates_and_normalises() {
        let (svc, _) = service().await;
        let user = svc.sign_up(" taro ", "Taro@Example.COM").await.unwrap();
        assert_eq!(user.username, "taro");
        assert_eq!(user.email, "Taro@example.com");
        assert_eq!(svc.user(user.id).await.unwrap(), user);

        assert!(matches!(
            svc.sign_up("bad name", "x@example.com").await,
            Err(TalkError::InvalidInput { field: "username", .. })
        ));
        assert!(matches!(
            svc.sign_up("taro", "other@example.com").await,
            Err(TalkError::DuplicateUsername { .. })
        ));
    }

    #[tokio::test]
    async fn test_change_profile_fields() {
        let (svc, _) = service().await;
        let user = svc.sign_up("hanako", "hanako@example.com").await.unwrap();

        let renamed = svc.change_username(user.id, "hana").await.unwrap();
        assert_eq!(renamed.username, "hana");
        let moved = svc.change_email(user.id, "hana@example.com").await.unwrap();
        assert_eq!(moved.email, "hana@example.com");

        assert!(matches!(
            svc.change_email(user.id, "nope").await,
            Err(TalkError::InvalidInput { field: "email", .. })
        ));
        assert!(matches!(
            svc.change_username(UserId::new(), "ghost").await,
            Err(TalkError::UnknownUser { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_and_read_talk_room() {
        let (svc, clock) = service().await;
        let a = svc.sign_up("a", "a@example.com").await.unwrap();
        let b = svc.sign_up("b", "b@example.com").await.unwrap();

        svc.send_message(a.id, b.id, "hello").await.unwrap();
        clock.advance_millis(1_000);
        let reply = svc.send_message(b.id, a.id, "hi!").await.unwrap();

        let room = svc
            .talk_room(a.id, b.id, ConversationQuery::all())
            .await
            .unwrap();
        assert_eq!(room.friend, b);
        assert_eq!(room.messages.len(), 2);
        assert_eq!(room.messages.last(), Some(&reply));
        assert_eq!(svc.last_message(b.id, a.id).await.unwrap(), Some(reply));

        assert!(matches!(
            svc.send_message(a.id, b.id, "   ").await,
            Err(TalkError::InvalidInput { field: "body", .. })
        ));
        let ghost = UserId::new();
        assert!(matches!(
            svc.send_message(ghost, a.id, "hi").await,
            Err(TalkError::InvalidParticipant { user_id }) if user_id == ghost
        ));
        assert!(matches!(
            svc.talk_room(a.id, ghost, ConversationQuery::all()).await,
            Err(TalkError::InvalidParticipant { user_id }) if user_id == ghost
        ));
    }

    #[tokio::test]
    async fn test_history_limit_default_applies() {
        let mut config = TalkConfig {
            storage: StorageConfig::in_memory(),
            ..TalkConfig::default()
        };
        config.talk_room.history_limit = Some(2);
        let (svc, _) = service_with(config).await;
        let a = svc.sign_up("a", "a@example.com").await.unwrap();
        let b = svc.sign_up("b", "b@example.com").await.unwrap();
        for body in ["1", "2", "3"] {
            svc.send_message(a.id, b.id, body).await.unwrap();
        }

        let room = svc
            .talk_room(a.id, b.id, ConversationQuery::all())
            .await
            .unwrap();
        let bodies: Vec<_> = room.messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["2", "3"]);

        let room = svc
            .talk_room(a.id, b.id, ConversationQuery::all().with_limit(10))
            .await
            .unwrap();
        assert_eq!(room.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_friends_uses_configured_page_size() {
        let mut config = TalkConfig {
            storage: StorageConfig::in_memory(),
            ..TalkConfig::default()
        };
        config.friends.page_size = 2;
        let (svc, clock) = service_with(config).await;
        let me = svc.sign_up("me", "me@example.com").await.unwrap();
        let mut others = Vec::new();
        for name in ["ann", "ben", "cat"] {
            others.push(
                svc.sign_up(name, &format!("{name}@example.com"))
                    .await
                    .unwrap(),
            );
        }
        svc.send_message(others[1].id, me.id, "first").await.unwrap();
        clock.advance_millis(1_000);
        svc.send_message(me.id, others[2].id, "second").await.unwrap();

        let page = svc.friends(me.id, Some("  "), 1).await.unwrap();
        let names: Vec<_> = page.friends.iter().map(|f| f.user.username.as_str()).collect();
        assert_eq!(names, vec!["cat", "ben"]);
        assert_eq!(page.total, 3);

        let page = svc.friends(me.id, None, 2).await.unwrap();
        assert_eq!(page.friends.len(), 1);
        assert_eq!(page.friends[0].user.username, "ann");

        assert!(matches!(
            svc.friends(UserId::new(), None, 1).await,
            Err(TalkError::InvalidViewer { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = TalkConfig {
            storage: StorageConfig::in_memory(),
            ..TalkConfig::default()
        };
        let backends = TalkBackends::sqlite(&config, Arc::new(SystemClock))
            .await
            .unwrap();
        config.talk_room.max_body_chars = 0;
        assert!(matches!(
            TalkService::new(config, backends),
            Err(TalkError::InvalidConfig(_))
        ));
    }
}
