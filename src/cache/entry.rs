//! Stored cache entries.

use std::time::Duration;

use tokio::time::Instant;

/// A value together with the instant it was stored. Replaced wholesale on
/// reload, never mutated in place.
#[derive(Clone, Debug)]
pub(super) struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    pub(super) const fn new(value: V, created_at: Instant) -> Self {
        Self { value, created_at }
    }

    pub(super) const fn value(&self) -> &V {
        &self.value
    }

    /// An entry is fresh strictly before `created_at + ttl`.
    pub(super) fn is_fresh(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_none_or(|limit| now.saturating_duration_since(self.created_at) < limit)
    }
}
