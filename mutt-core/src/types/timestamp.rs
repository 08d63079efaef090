//! Unix-millisecond timestamps.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Milliseconds since the Unix epoch.
///
/// Every piece of time-bearing shared state (lease deadlines, breaker
/// open timers, delayed-visibility scores) is stored as one of these, so
/// all replicas compare against the same clock representation no matter
/// which of them wrote the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The epoch itself; used as a placeholder where "never" sorts first.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw millisecond count.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Raw millisecond count.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// This instant advanced by `duration`, saturating on overflow.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as i64))
    }

    /// Whether this instant lies strictly before `other`.
    #[must_use]
    pub const fn is_before(&self, other: Self) -> bool {
        self.0 < other.0
    }

    /// The time remaining from this instant to `other`, zero when `other`
    /// is not later.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn until(&self, other: Self) -> Duration {
        let gap = other.0 - self.0;
        if gap <= 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(gap as u64)
        }
    }

    /// Chrono view of this instant, for operator-facing formatting.
    #[must_use]
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .unwrap_or_default()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
