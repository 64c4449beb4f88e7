//! Single-flight, TTL-bounded keyed cache.
//!
//! [`KeyedCache`] memoizes expensive lookups such as authentication tokens or
//! key-pair lookups keyed by region and name. Concurrent misses for the same
//! key share one loader invocation; the result (value or error) is handed to
//! every waiter. Only successful loads are stored, and entries older than the
//! configured TTL are never returned.
//!
//! The key map sits behind a short-lived lock that is never held across an
//! await, so a slow load for one key does not block other keys.

mod entry;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use entry::CacheEntry;

type SharedLoad<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

enum Slot<V, E> {
    Ready(CacheEntry<V>),
    Loading {
        generation: u64,
        load: SharedLoad<V, E>,
    },
}

struct Slots<K, V, E> {
    entries: HashMap<K, Slot<V, E>>,
    next_generation: u64,
}

impl<K, V, E> Slots<K, V, E> {
    fn next_generation(&mut self) -> u64 {
        self.next_generation = self.next_generation.wrapping_add(1);
        self.next_generation
    }
}

enum Lookup<V, E> {
    Hit(V),
    Join(SharedLoad<V, E>),
    Miss,
}

/// Removes a cache entry by key.
///
/// Lets controllers invalidate caches they do not own without knowing the
/// cached value type.
pub trait Invalidate<K>: Send + Sync {
    /// Removes the entry for `key` if present.
    fn invalidate(&self, key: &K);
}

/// TTL-bounded memoizing cache with single-flight loads.
///
/// `E` is the loader error type; it is cloned to every waiter of a failed
/// load, as is `V` for successful loads.
pub struct KeyedCache<K, V, E> {
    ttl: Option<Duration>,
    slots: Arc<Mutex<Slots<K, V, E>>>,
}

impl<K, V, E> KeyedCache<K, V, E>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a cache whose entries expire `ttl` after they were stored.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(Some(ttl))
    }

    /// Creates a cache whose entries live until they are invalidated.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            slots: Arc::new(Mutex::new(Slots {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Returns the configured TTL, or `None` for an unbounded cache.
    #[must_use]
    pub const fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns the cached value for `key`, loading it when absent or expired.
    ///
    /// `loader` runs at most once per key among all concurrent callers; the
    /// others await the same result. `loader` is invoked while the key map is
    /// locked, so it must only construct the future and defer the real work
    /// to when the future is polled.
    ///
    /// # Errors
    ///
    /// Returns the loader's error to every caller that joined the failed
    /// attempt. Nothing is cached, so a later call retries.
    pub async fn get<F, Fut>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let load = {
            let mut slots = self.slots.lock();
            match self.lookup(&slots, &key) {
                Lookup::Hit(value) => return Ok(value),
                Lookup::Join(load) => load,
                Lookup::Miss => {
                    let generation = slots.next_generation();
                    trace!(generation, "starting cache load");
                    let load = Self::settling(
                        Arc::downgrade(&self.slots),
                        key.clone(),
                        generation,
                        loader(key.clone()),
                    );
                    slots.entries.insert(
                        key,
                        Slot::Loading {
                            generation,
                            load: load.clone(),
                        },
                    );
                    load
                }
            }
        };
        load.await
    }

    /// Installs `value` as a fresh entry for `key`.
    ///
    /// A `put` replaces any in-flight load for the key: the load still
    /// completes for its waiters but its result is not stored.
    pub fn put(&self, key: K, value: V) {
        self.slots
            .lock()
            .entries
            .insert(key, Slot::Ready(CacheEntry::new(value, Instant::now())));
    }

    /// Removes the entry for `key`. Idempotent.
    ///
    /// An in-flight load for the key is detached: its waiters still receive
    /// the result, but it is not stored.
    pub fn invalidate(&self, key: &K) {
        self.slots.lock().entries.remove(key);
    }

    /// Removes the stored entry for `key` only if `predicate` accepts its
    /// value. In-flight loads are left alone. Returns `true` when an entry
    /// was removed.
    pub fn invalidate_if<P>(&self, key: &K, predicate: P) -> bool
    where
        P: FnOnce(&V) -> bool,
    {
        let mut slots = self.slots.lock();
        let matches = match slots.entries.get(key) {
            Some(Slot::Ready(entry)) => predicate(entry.value()),
            Some(Slot::Loading { .. }) | None => false,
        };
        if matches {
            slots.entries.remove(key);
        }
        matches
    }

    /// Removes every entry.
    pub fn invalidate_all(&self) {
        self.slots.lock().entries.clear();
    }

    /// Returns the cached value for `key` when present and fresh, without
    /// loading.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock();
        match slots.entries.get(key) {
            Some(Slot::Ready(entry)) if entry.is_fresh(self.ttl, Instant::now()) => {
                Some(entry.value().clone())
            }
            _ => None,
        }
    }

    /// Number of stored entries, including expired ones not yet reloaded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .entries
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Returns `true` when no entry is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, slots: &Slots<K, V, E>, key: &K) -> Lookup<V, E> {
        match slots.entries.get(key) {
            Some(Slot::Ready(entry)) if entry.is_fresh(self.ttl, Instant::now()) => {
                Lookup::Hit(entry.value().clone())
            }
            Some(Slot::Loading { load, .. }) => Lookup::Join(load.clone()),
            Some(Slot::Ready(_)) | None => Lookup::Miss,
        }
    }

    /// Wraps a loader future so that its result is installed before any
    /// waiter can observe it.
    fn settling<Fut>(
        owner: Weak<Mutex<Slots<K, V, E>>>,
        key: K,
        generation: u64,
        load: Fut,
    ) -> SharedLoad<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        async move {
            let result = load.await;
            if let Some(slots) = owner.upgrade() {
                Self::settle(&slots, key, generation, &result);
            }
            result
        }
        .boxed()
        .shared()
    }

    fn settle(owner: &Mutex<Slots<K, V, E>>, key: K, generation: u64, result: &Result<V, E>) {
        let mut slots = owner.lock();
        let owns_slot = matches!(
            slots.entries.get(&key),
            Some(Slot::Loading { generation: current, .. }) if *current == generation
        );
        if !owns_slot {
            trace!(generation, "cache load superseded; result not stored");
            return;
        }
        match result {
            Ok(value) => {
                slots.entries.insert(
                    key,
                    Slot::Ready(CacheEntry::new(value.clone(), Instant::now())),
                );
            }
            Err(_) => {
                trace!(generation, "cache load failed; slot cleared");
                slots.entries.remove(&key);
            }
        }
    }
}

impl<K, V, E> Invalidate<K> for KeyedCache<K, V, E>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn invalidate(&self, key: &K) {
        Self::invalidate(self, key);
    }
}

impl<K, V, E> fmt::Debug for KeyedCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        f.debug_struct("KeyedCache")
            .field("ttl", &self.ttl)
            .field("slots", &slots.entries.len())
            .finish()
    }
}
