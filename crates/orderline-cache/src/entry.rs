//! Cache entries and time-to-live

use chrono::{DateTime, Utc};
use orderline_core::Order;
use std::time::Duration;

/// Lifetime of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Never expires
    Never,
    /// Expires this long after insertion; a zero duration never expires
    After(Duration),
}

impl Ttl {
    pub fn from_secs(secs: u64) -> Self {
        Ttl::After(Duration::from_secs(secs))
    }

    /// Absolute expiry for an entry inserted at `now`
    ///
    /// Durations too large to represent are treated as `Never`.
    pub fn expires_at(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Ttl::Never => None,
            Ttl::After(d) if d.is_zero() => None,
            Ttl::After(d) => chrono::Duration::from_std(d)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta)),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        Ttl::After(d)
    }
}

/// A cached order and its expiry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub order: Order,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// The single expiry predicate used by reads and by the reaper
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now >= at,
            None => false,
        }
    }
}
