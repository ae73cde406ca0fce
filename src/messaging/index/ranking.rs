//! Ordering and paging of counterparts by conversation recency.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::messaging::core::ids::MessageId;
use crate::messaging::core::user::User;

/// A counterpart with the time of the latest message exchanged with the viewer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RankedFriend {
    /// The counterpart.
    pub user: User,
    /// Time of the latest message in either direction, if any.
    pub last_message_at: Option<DateTime<Utc>>,
    /// Id of that message.
    pub last_message_id: Option<MessageId>,
}

impl RankedFriend {
    /// Ranking order: most recent conversation first, users without one last.
    ///
    /// Same-timestamp conversations fall back to the later message id, then
    /// everything falls back to user id so pages never overlap.
    #[must_use]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        let recency = match (self.last_message_at, other.last_message_at) {
            (Some(a), Some(b)) => b
                .cmp(&a)
                .then_with(|| other.last_message_id.cmp(&self.last_message_id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        recency.then_with(|| self.user.id.cmp(&other.user.id))
    }
}

/// Keep counterparts whose username contains `keyword`, ignoring case and
/// surrounding whitespace. A blank keyword keeps everyone.
#[must_use]
pub fn filter_by_keyword(candidates: Vec<RankedFriend>, keyword: Option<&str>) -> Vec<RankedFriend> {
    match keyword.map(|keyword| keyword.trim().to_lowercase()) {
        Some(folded) if !folded.is_empty() => candidates
            .into_iter()
            .filter(|candidate| candidate.user.name_contains(&folded))
            .collect(),
        _ => candidates,
    }
}

/// Sort candidates into ranking order.
#[must_use]
pub fn rank_friends(mut candidates: Vec<RankedFriend>) -> Vec<RankedFriend> {
    candidates.sort_by(RankedFriend::rank_cmp);
    candidates
}

/// Slice `[(page-1)*page_size, page*page_size)`; page 0 or past the end is empty.
#[must_use]
pub fn paginate(ranked: Vec<RankedFriend>, page: u32, page_size: u32) -> Vec<RankedFriend> {
    let Some(index) = page.checked_sub(1) else {
        return Vec::new();
    };
    let page_size = page_size as usize;
    let Some(start) = (index as usize).checked_mul(page_size) else {
        return Vec::new();
    };
    ranked.into_iter().skip(start).take(page_size).collect()
}
