//! User directory: identities the conversation store and index refer to.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::info;

use crate::messaging::core::errors::{TalkError, TalkResult};
use crate::messaging::core::ids::UserId;
use crate::messaging::core::user::User;
use crate::messaging::storage::database::decode_timestamp;

/// Boxed future type for user directory operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// User directory trait.
pub trait UserDirectory: Send + Sync {
    /// Insert a new user.
    ///
    /// # Errors
    /// Returns `DuplicateUsername`/`DuplicateEmail` on uniqueness violations,
    /// or a storage error.
    fn create_user(&self, user: User) -> StoreFuture<'_, TalkResult<User>>;

    /// Get a user by ID.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_user(&self, user_id: UserId) -> StoreFuture<'_, TalkResult<Option<User>>>;

    /// Check if a user exists.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn user_exists(&self, user_id: UserId) -> StoreFuture<'_, TalkResult<bool>>;

    /// All users ordered by id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_users(&self) -> StoreFuture<'_, TalkResult<Vec<User>>>;

    /// Replace a user's display name.
    ///
    /// # Errors
    /// Returns `UnknownUser`, `DuplicateUsername`, or a storage error.
    fn change_username(&self, user_id: UserId, username: &str)
    -> StoreFuture<'_, TalkResult<User>>;

    /// Replace a user's email.
    ///
    /// # Errors
    /// Returns `UnknownUser`, `DuplicateEmail`, or a storage error.
    fn change_email(&self, user_id: UserId, email: &str) -> StoreFuture<'_, TalkResult<User>>;
}

/// Which unique column a write collided on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum UniqueField {
    Username,
    Email,
}

fn unique_violation(err: &rusqlite::Error) -> Option<UniqueField> {
    match err {
        rusqlite::Error::SqliteFailure(failure, Some(message))
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            if message.contains(".username") {
                Some(UniqueField::Username)
            } else if message.contains(".email") {
                Some(UniqueField::Email)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Raw user row before timestamp/id decoding.
struct UserRow {
    id: String,
    username: String,
    email: String,
    joined_at: i64,
}

impl UserRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            joined_at: row.get(3)?,
        })
    }

    fn into_user(self) -> TalkResult<User> {
        let id = self
            .id
            .parse::<UserId>()
            .map_err(|err| TalkError::CorruptRecord(format!("invalid user id: {err}")))?;
        Ok(User {
            id,
            username: self.username,
            email: self.email,
            joined_at: decode_timestamp(self.joined_at)?,
        })
    }
}

/// Outcome of a single-column user update.
enum UpdateOutcome {
    Updated(UserRow),
    Missing,
    Duplicate(UniqueField),
}

/// `SQLite` implementation of the user directory.
pub struct SqliteUserDirectory {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteUserDirectory {
    /// Table name for users.
    pub const DEFAULT_TABLE: &'static str = "users";

    /// Initialize the directory and create the table if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Arc<Connection>) -> TalkResult<Self> {
        let table = Self::DEFAULT_TABLE.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id TEXT PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    joined_at INTEGER NOT NULL
                )"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }

    fn update_column(
        &self,
        user_id: UserId,
        column: &'static str,
        value: String,
    ) -> StoreFuture<'_, TalkResult<User>> {
        Box::pin(async move {
            let table = self.table.clone();
            let id_str = user_id.to_string();
            let requested = value.clone();

            let outcome = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let changed = match tx.execute(
                        &format!("UPDATE {table} SET {column} = ?1 WHERE id = ?2"),
                        rusqlite::params![value, id_str],
                    ) {
                        Ok(changed) => changed,
                        Err(err) => {
                            return match unique_violation(&err) {
                                Some(field) => Ok(UpdateOutcome::Duplicate(field)),
                                None => Err(err.into()),
                            };
                        }
                    };
                    if changed == 0 {
                        return Ok(UpdateOutcome::Missing);
                    }
                    let row = tx.query_row(
                        &format!("SELECT id, username, email, joined_at FROM {table} WHERE id = ?1"),
                        rusqlite::params![id_str],
                        UserRow::from_row,
                    )?;
                    tx.commit()?;
                    Ok(UpdateOutcome::Updated(row))
                })
                .await?;

            match outcome {
                UpdateOutcome::Updated(row) => {
                    info!(user_id = %user_id, column, "Updated user");
                    row.into_user()
                }
                UpdateOutcome::Missing => Err(TalkError::UnknownUser { user_id }),
                UpdateOutcome::Duplicate(UniqueField::Username) => {
                    Err(TalkError::DuplicateUsername { username: requested })
                }
                UpdateOutcome::Duplicate(UniqueField::Email) => {
                    Err(TalkError::DuplicateEmail { email: requested })
                }
            }
        })
    }
}

impl UserDirectory for SqliteUserDirectory {
    fn create_user(&self, user: User) -> StoreFuture<'_, TalkResult<User>> {
        Box::pin(async move {
            let table = self.table.clone();
            let id_str = user.id.to_string();
            let username = user.username.clone();
            let email = user.email.clone();
            let joined_at = user.joined_at.timestamp_millis();

            let collision = self
                .conn
                .call(move |conn| {
                    match conn.execute(
                        &format!(
                            "INSERT INTO {table} (id, username, email, joined_at)
                             VALUES (?1, ?2, ?3, ?4)"
                        ),
                        rusqlite::params![id_str, username, email, joined_at],
                    ) {
                        Ok(_) => Ok(None),
                        Err(err) => match unique_violation(&err) {
                            Some(field) => Ok(Some(field)),
                            None => Err(err.into()),
                        },
                    }
                })
                .await?;

            match collision {
                None => {
                    info!(user_id = %user.id, username = %user.username, "Created user");
                    Ok(user)
                }
                Some(UniqueField::Username) => Err(TalkError::DuplicateUsername {
                    username: user.username,
                }),
                Some(UniqueField::Email) => Err(TalkError::DuplicateEmail { email: user.email }),
            }
        })
    }

    fn get_user(&self, user_id: UserId) -> StoreFuture<'_, TalkResult<Option<User>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let id_str = user_id.to_string();

            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!(
                                "SELECT id, username, email, joined_at FROM {table} WHERE id = ?1"
                            ),
                            rusqlite::params![id_str],
                            UserRow::from_row,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            row.map(UserRow::into_user).transpose()
        })
    }

    fn user_exists(&self, user_id: UserId) -> StoreFuture<'_, TalkResult<bool>> {
        Box::pin(async move {
            let table = self.table.clone();
            let id_str = user_id.to_string();

            let exists = self
                .conn
                .call(move |conn| {
                    let count: i64 = conn.query_row(
                        &format!("SELECT COUNT(*) FROM {table} WHERE id = ?1"),
                        rusqlite::params![id_str],
                        |row| row.get(0),
                    )?;
                    Ok(count > 0)
                })
                .await?;

            Ok(exists)
        })
    }

    fn list_users(&self) -> StoreFuture<'_, TalkResult<Vec<User>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, username, email, joined_at FROM {table} ORDER BY id"
                    ))?;
                    let rows = stmt
                        .query_map([], UserRow::from_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter().map(UserRow::into_user).collect()
        })
    }

    fn change_username(
        &self,
        user_id: UserId,
        username: &str,
    ) -> StoreFuture<'_, TalkResult<User>> {
        self.update_column(user_id, "username", username.to_string())
    }

    fn change_email(&self, user_id: UserId, email: &str) -> StoreFuture<'_, TalkResult<User>> {
        self.update_column(user_id, "email", email.to_string())
    }
}
