//! Friends ranking derived from the user directory and conversation store.
//!
//! The index owns no data and performs no writes: every call re-reads the
//! user list and the viewer's conversation summaries, then filters, sorts and
//! slices in memory. Cost per call is O(users + viewer conversations) reads
//! plus an O(n log n) sort over the matching users. An incrementally
//! maintained per-viewer ranking would remove the sort if user counts grow.

pub mod ranking;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::messaging::core::errors::{TalkError, TalkResult};
use crate::messaging::core::ids::UserId;
use crate::messaging::storage::conversation_store::ConversationStore;
use crate::messaging::storage::user_directory::UserDirectory;

pub use ranking::{RankedFriend, filter_by_keyword, paginate, rank_friends};

/// Boxed future type for index operations.
pub type IndexFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One page of a viewer's ranked friends list.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FriendsPage {
    /// Ranked counterparts on this page.
    pub friends: Vec<RankedFriend>,
    /// 1-indexed page number.
    pub page: u32,
    /// Requested page size.
    pub page_size: u32,
    /// Number of counterparts matching the keyword across all pages.
    pub total: usize,
}

impl FriendsPage {
    /// Whether a later page has results.
    #[must_use]
    pub fn has_next(&self) -> bool {
        let shown_through = (self.page as usize).saturating_mul(self.page_size as usize);
        shown_through < self.total
    }
}

/// Ranking of a viewer's counterparts by conversation recency.
pub trait ConversationIndex: Send + Sync {
    /// Rank all users except `viewer`, most recent conversation first.
    ///
    /// # Errors
    /// Returns `InvalidViewer` if `viewer` is unknown, `InvalidPageSize` if
    /// `page_size` is zero, or a storage error.
    fn rank_friends(
        &self,
        viewer: UserId,
        keyword: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> IndexFuture<'_, TalkResult<FriendsPage>>;
}

/// Index computed on every call from the stores it reads.
pub struct StoreConversationIndex {
    users: Arc<dyn UserDirectory>,
    conversations: Arc<dyn ConversationStore>,
}

impl StoreConversationIndex {
    /// Create an index over `users` and `conversations`.
    #[must_use]
    pub fn new(users: Arc<dyn UserDirectory>, conversations: Arc<dyn ConversationStore>) -> Self {
        Self {
            users,
            conversations,
        }
    }
}

impl ConversationIndex for StoreConversationIndex {
    fn rank_friends(
        &self,
        viewer: UserId,
        keyword: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> IndexFuture<'_, TalkResult<FriendsPage>> {
        let keyword = keyword.map(str::to_string);
        Box::pin(async move {
            if page_size == 0 {
                return Err(TalkError::InvalidPageSize { page_size });
            }
            if !self.users.user_exists(viewer).await? {
                return Err(TalkError::InvalidViewer { user_id: viewer });
            }

            let latest: HashMap<UserId, _> = self
                .conversations
                .conversation_summaries(viewer)
                .await?
                .into_iter()
                .map(|summary| (summary.counterpart_id, summary))
                .collect();

            let candidates = self
                .users
                .list_users()
                .await?
                .into_iter()
                .filter(|user| user.id != viewer)
                .map(|user| {
                    let summary = latest.get(&user.id);
                    RankedFriend {
                        last_message_at: summary.map(|s| s.last_message_at),
                        last_message_id: summary.map(|s| s.last_message_id),
                        user,
                    }
                })
                .collect::<Vec<_>>();

            let ranked = rank_friends(filter_by_keyword(candidates, keyword.as_deref()));
            let total = ranked.len();
            let friends = paginate(ranked, page, page_size);

            debug!(
                viewer = %viewer,
                page,
                page_size,
                total,
                returned = friends.len(),
                "Ranked friends"
            );

            Ok(FriendsPage {
                friends,
                page,
                page_size,
                total,
            })
        })
    }
}
