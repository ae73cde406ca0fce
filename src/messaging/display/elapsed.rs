//! Relative-time labels ("5 minutes ago") for last-message timestamps.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

/// Coarse time elapsed since an instant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Elapsed {
    /// Under one hour.
    Minutes(i64),
    /// Under one day.
    Hours(i64),
    /// Under one week.
    Days(i64),
    /// One week or more.
    MoreThanAWeek,
}

impl Elapsed {
    /// Bucket the time between `then` and `now`. Future instants count as zero.
    #[must_use]
    pub fn between(then: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let delta = now.signed_duration_since(then).max(Duration::zero());

        if delta < Duration::hours(1) {
            Self::Minutes(delta.num_minutes())
        } else if delta < Duration::days(1) {
            Self::Hours(delta.num_hours())
        } else if delta < Duration::weeks(1) {
            Self::Days(delta.num_days())
        } else {
            Self::MoreThanAWeek
        }
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Minutes(n) => f.write_str(&plural(n, "minute")),
            Self::Hours(n) => f.write_str(&plural(n, "hour")),
            Self::Days(n) => f.write_str(&plural(n, "day")),
            Self::MoreThanAWeek => f.write_str("more than 1 week"),
        }
    }
}

impl Serialize for Elapsed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
