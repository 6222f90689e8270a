//! Unix timestamp in whole seconds
//!
//! Session expiry is stored and compared in seconds since the epoch. Wrapping
//! the value keeps millisecond timestamps (e.g. `timestamp_millis()`) from being
//! passed where seconds are expected.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Seconds since 1970-01-01T00:00:00Z
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UnixSeconds(i64);

impl UnixSeconds {
    /// Wrap a raw seconds value
    pub const fn new(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Raw seconds value
    pub const fn as_secs(self) -> i64 {
        self.0
    }

    /// Whether this instant lies strictly after `other`
    pub fn is_after(self, other: UnixSeconds) -> bool {
        self.0 > other.0
    }

    /// Seconds remaining until `self`, measured from `now` (zero when past)
    pub fn seconds_until(self, now: UnixSeconds) -> i64 {
        (self.0 - now.0).max(0)
    }

    /// Convert to a UTC datetime, if representable
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }
}

impl From<DateTime<Utc>> for UnixSeconds {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp())
    }
}

impl Add<Duration> for UnixSeconds {
    type Output = UnixSeconds;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs.num_seconds())
    }
}

impl fmt::Display for UnixSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
