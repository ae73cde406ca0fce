//! Append-only message storage grouped by user pair.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, TransactionBehavior};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::messaging::core::clock::Clock;
use crate::messaging::core::errors::{TalkError, TalkResult};
use crate::messaging::core::ids::{ConversationKey, MessageId, UserId};
use crate::messaging::core::message::Message;
use crate::messaging::storage::database::decode_timestamp;
use crate::messaging::storage::user_directory::UserDirectory;

/// Boxed future type for conversation store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// History window for [`ConversationStore::get_conversation`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConversationQuery {
    /// Keep only the most recent `limit` messages of the window.
    pub limit: Option<usize>,
    /// Keep only messages sent strictly before this instant.
    pub before: Option<DateTime<Utc>>,
}

impl ConversationQuery {
    /// Whole history.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            limit: None,
            before: None,
        }
    }

    /// Cap the number of messages returned.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Only messages sent strictly before `before`.
    #[must_use]
    pub fn with_before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }
}

/// Latest message of one of a viewer's conversations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConversationSummary {
    /// The other member of the pair.
    pub counterpart_id: UserId,
    /// Most recent message of the pair.
    pub last_message_id: MessageId,
    /// When that message was sent.
    pub last_message_at: DateTime<Utc>,
}

/// Conversation store trait.
pub trait ConversationStore: Send + Sync {
    /// Persist a new message with a store-assigned id and timestamp.
    ///
    /// # Errors
    /// Returns `InvalidParticipant` if either user is unknown, or a storage error.
    fn append_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        body: &str,
    ) -> StoreFuture<'_, TalkResult<Message>>;

    /// Messages of the pair `{a, b}` in ascending `(sent_at, id)` order.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_conversation(
        &self,
        a: UserId,
        b: UserId,
        query: ConversationQuery,
    ) -> StoreFuture<'_, TalkResult<Vec<Message>>>;

    /// Most recent message of the pair `{a, b}`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn last_message_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> StoreFuture<'_, TalkResult<Option<Message>>>;

    /// Latest message of every conversation `viewer` takes part in.
    ///
    /// Self-conversations are not included.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn conversation_summaries(
        &self,
        viewer: UserId,
    ) -> StoreFuture<'_, TalkResult<Vec<ConversationSummary>>>;
}

/// Raw message row before id/timestamp decoding.
struct MessageRow {
    id: i64,
    sender_id: String,
    receiver_id: String,
    body: String,
    sent_at: i64,
}

impl MessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            receiver_id: row.get(2)?,
            body: row.get(3)?,
            sent_at: row.get(4)?,
        })
    }

    fn into_message(self) -> TalkResult<Message> {
        Ok(Message {
            id: MessageId(self.id),
            sender_id: parse_user_id(&self.sender_id)?,
            receiver_id: parse_user_id(&self.receiver_id)?,
            body: self.body,
            sent_at: decode_timestamp(self.sent_at)?,
        })
    }
}

/// Smallest stored millisecond not earlier than `before`, so `sent_at < bound`
/// keeps exactly the messages strictly before the instant.
fn exclusive_bound_millis(before: DateTime<Utc>) -> i64 {
    let partial = before.timestamp_subsec_nanos() % 1_000_000 != 0;
    before.timestamp_millis().saturating_add(i64::from(partial))
}

fn parse_user_id(raw: &str) -> TalkResult<UserId> {
    raw.parse()
        .map_err(|err| TalkError::CorruptRecord(format!("invalid user id {raw:?}: {err}")))
}

/// `SQLite` implementation of the conversation store.
///
/// Besides the `messages` table, keeps a `conversations` side-table holding
/// the latest message of every pair, updated in the same transaction as each
/// insert.
pub struct SqliteConversationStore {
    conn: Arc<Connection>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    messages_table: String,
    conversations_table: String,
}

impl SqliteConversationStore {
    /// Table name for messages.
    pub const MESSAGES_TABLE: &'static str = "messages";
    /// Table name for the per-pair latest-message side-table.
    pub const CONVERSATIONS_TABLE: &'static str = "conversations";

    /// Initialize the store and create its tables if they don't exist.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(
        conn: Arc<Connection>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> TalkResult<Self> {
        let messages_table = Self::MESSAGES_TABLE.to_string();
        let conversations_table = Self::CONVERSATIONS_TABLE.to_string();
        let messages = messages_table.clone();
        let conversations = conversations_table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {messages} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    sender_id TEXT NOT NULL,
                    receiver_id TEXT NOT NULL,
                    pair_low TEXT NOT NULL,
                    pair_high TEXT NOT NULL,
                    body TEXT NOT NULL,
                    sent_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{messages}_pair_sent
                    ON {messages} (pair_low, pair_high, sent_at, id);
                CREATE INDEX IF NOT EXISTS idx_{messages}_sent
                    ON {messages} (sent_at DESC);
                CREATE TABLE IF NOT EXISTS {conversations} (
                    pair_low TEXT NOT NULL,
                    pair_high TEXT NOT NULL,
                    last_message_id INTEGER NOT NULL,
                    last_sent_at INTEGER NOT NULL,
                    PRIMARY KEY (pair_low, pair_high)
                );
                CREATE INDEX IF NOT EXISTS idx_{conversations}_high
                    ON {conversations} (pair_high);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            users,
            clock,
            messages_table,
            conversations_table,
        })
    }

    async fn ensure_participant(&self, user_id: UserId) -> TalkResult<()> {
        if self.users.user_exists(user_id).await? {
            Ok(())
        } else {
            Err(TalkError::InvalidParticipant { user_id })
        }
    }
}

impl ConversationStore for SqliteConversationStore {
    fn append_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        body: &str,
    ) -> StoreFuture<'_, TalkResult<Message>> {
        let body = body.to_string();
        Box::pin(async move {
            self.ensure_participant(sender_id).await?;
            if receiver_id != sender_id {
                self.ensure_participant(receiver_id).await?;
            }

            let messages = self.messages_table.clone();
            let conversations = self.conversations_table.clone();
            let (pair_low, pair_high) = ConversationKey::new(sender_id, receiver_id).to_storage();
            let sender = sender_id.to_string();
            let receiver = receiver_id.to_string();
            let stored_body = body.clone();
            let now_ms = self.clock.now().timestamp_millis();

            let (id, sent_at_ms) = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    let latest: Option<i64> = tx.query_row(
                        &format!("SELECT MAX(sent_at) FROM {messages}"),
                        [],
                        |row| row.get(0),
                    )?;
                    let sent_at = latest.map_or(now_ms, |latest| latest.max(now_ms));

                    tx.execute(
                        &format!(
                            "INSERT INTO {messages}
                            (sender_id, receiver_id, pair_low, pair_high, body, sent_at)
                            VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                        ),
                        rusqlite::params![sender, receiver, pair_low, pair_high, stored_body, sent_at],
                    )?;
                    let id = tx.last_insert_rowid();

                    tx.execute(
                        &format!(
                            "INSERT INTO {conversations}
                            (pair_low, pair_high, last_message_id, last_sent_at)
                            VALUES (?1, ?2, ?3, ?4)
                            ON CONFLICT (pair_low, pair_high) DO UPDATE SET
                                last_message_id = excluded.last_message_id,
                                last_sent_at = excluded.last_sent_at"
                        ),
                        rusqlite::params![pair_low, pair_high, id, sent_at],
                    )?;

                    tx.commit()?;
                    Ok((id, sent_at))
                })
                .await?;

            let message = Message {
                id: MessageId(id),
                sender_id,
                receiver_id,
                body,
                sent_at: decode_timestamp(sent_at_ms)?,
            };
            debug!(
                message_id = %message.id,
                sender = %sender_id,
                receiver = %receiver_id,
                "Appended message"
            );
            Ok(message)
        })
    }

    fn get_conversation(
        &self,
        a: UserId,
        b: UserId,
        query: ConversationQuery,
    ) -> StoreFuture<'_, TalkResult<Vec<Message>>> {
        Box::pin(async move {
            let table = self.messages_table.clone();
            let (pair_low, pair_high) = ConversationKey::new(a, b).to_storage();
            let before = query.before.map(exclusive_bound_millis);
            // SQLite treats a negative LIMIT as "no limit".
            let limit = match query.limit {
                Some(limit) => i64::try_from(limit)
                    .map_err(|_| TalkError::invalid_input("limit", "exceeds i64"))?,
                None => -1,
            };

            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, sender_id, receiver_id, body, sent_at
                         FROM {table}
                         WHERE pair_low = ?1 AND pair_high = ?2
                           AND (?3 IS NULL OR sent_at < ?3)
                         ORDER BY sent_at DESC, id DESC
                         LIMIT ?4"
                    ))?;
                    let rows = stmt
                        .query_map(
                            rusqlite::params![pair_low, pair_high, before, limit],
                            MessageRow::from_row,
                        )?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            let mut messages = rows
                .into_iter()
                .map(MessageRow::into_message)
                .collect::<TalkResult<Vec<_>>>()?;
            messages.reverse();
            Ok(messages)
        })
    }

    fn last_message_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> StoreFuture<'_, TalkResult<Option<Message>>> {
        Box::pin(async move {
            let table = self.messages_table.clone();
            let (pair_low, pair_high) = ConversationKey::new(a, b).to_storage();

            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!(
                                "SELECT id, sender_id, receiver_id, body, sent_at
                                 FROM {table}
                                 WHERE pair_low = ?1 AND pair_high = ?2
                                 ORDER BY sent_at DESC, id DESC
                                 LIMIT 1"
                            ),
                            rusqlite::params![pair_low, pair_high],
                            MessageRow::from_row,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            row.map(MessageRow::into_message).transpose()
        })
    }

    fn conversation_summaries(
        &self,
        viewer: UserId,
    ) -> StoreFuture<'_, TalkResult<Vec<ConversationSummary>>> {
        Box::pin(async move {
            let table = self.conversations_table.clone();
            let viewer_str = viewer.to_string();

            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT pair_low, pair_high, last_message_id, last_sent_at
                         FROM {table}
                         WHERE (pair_low = ?1 OR pair_high = ?1) AND pair_low <> pair_high"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![viewer_str], |row| {
                            let low: String = row.get(0)?;
                            let high: String = row.get(1)?;
                            let last_message_id: i64 = row.get(2)?;
                            let last_sent_at: i64 = row.get(3)?;
                            Ok((low, high, last_message_id, last_sent_at))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            let mut summaries = Vec::with_capacity(rows.len());
            for (low, high, last_message_id, last_sent_at) in rows {
                let key = ConversationKey::new(parse_user_id(&low)?, parse_user_id(&high)?);
                let counterpart_id = key.counterpart_of(viewer).ok_or_else(|| {
                    TalkError::CorruptRecord(format!("conversation {key} does not involve {viewer}"))
                })?;
                summaries.push(ConversationSummary {
                    counterpart_id,
                    last_message_id: MessageId(last_message_id),
                    last_message_at: decode_timestamp(last_sent_at)?,
                });
            }

            Ok(summaries)
        })
    }
}
