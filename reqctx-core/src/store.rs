use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::handle::RequestHandle;
use crate::value::Value;

/// Both indexes, always mutated together under the same lock
struct Tables<H, K, V> {
    /// handle -> (key -> value)
    slots: HashMap<H, HashMap<K, V>>,
    /// handle -> creation time (unix seconds)
    created: HashMap<H, i64>,
}

impl<H, K, V> Tables<H, K, V> {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
            created: HashMap::new(),
        }
    }
}

/// Internal shared state for the store
struct StoreInner<H, K, V> {
    tables: RwLock<Tables<H, K, V>>,
    clock: Arc<dyn Clock>,
}

/// Thread-safe side table of per-request key/value data
///
/// Each request handle gets a *slot*: a small map created lazily on the first
/// [`set`](Store::set) and destroyed by [`clear`](Store::clear) or
/// [`purge`](Store::purge). A slot's creation time is recorded once and is
/// what the age-based purge looks at.
///
/// One `RwLock` guards the slot table and the creation-time table together,
/// so a handle is present in both or in neither. The lock is global: calls
/// for unrelated requests serialize against each other. Reads take it in
/// shared mode.
///
/// Clones share the same underlying data. Create one store per process and
/// hand clones to whatever needs it.
///
/// # Handle identity
///
/// `H` must compare by identity: two handles are equal only if they name the
/// same in-flight request, and no two concurrent requests may share a
/// handle value. [`RequestHandle`] guarantees this. A value-compared type
/// (a path string, a user id) would merge the slots of unrelated requests
/// that happen to be equal; only use one if the caller makes it unique per
/// request, e.g. a connection/stream id pair.
///
/// # Example
///
/// ```rust
/// use reqctx_core::{RequestHandle, Store, Value};
///
/// let store = Store::new();
/// let req = RequestHandle::new();
///
/// store.set(&req, "user", Value::new("alice".to_string()));
/// let user = store.get(&req, &"user");
/// assert_eq!(user.downcast_ref::<String>().map(String::as_str), Some("alice"));
///
/// // request finished
/// store.clear(&req);
/// assert!(store.get_all(&req).is_none());
/// ```
pub struct Store<H = RequestHandle, K = &'static str, V = Value> {
    inner: Arc<StoreInner<H, K, V>>,
}

impl<H, K, V> Clone for Store<H, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Store {
    /// Creates a store keyed by [`RequestHandle`] with `&'static str` keys and
    /// [`Value`] values, stamped by the wall clock
    pub fn new() -> Self {
        Self::default()
    }
}

impl<H, K, V> Default for Store<H, K, V>
where
    H: Eq + Hash + Clone,
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl<H, K, V> Store<H, K, V>
where
    H: Eq + Hash + Clone,
    K: Eq + Hash,
    V: Clone,
{
    /// Creates an empty store that reads creation times from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tables: RwLock::new(Tables::new()),
                clock,
            }),
        }
    }

    /// Stores `value` under `key` in the handle's slot, overwriting any
    /// previous value.
    ///
    /// The first call for a handle creates its slot and records the current
    /// time as the slot's creation time. Later calls leave that time alone.
    pub fn set(&self, handle: &H, key: K, value: V) {
        let mut tables = self.inner.tables.write();
        let Tables { slots, created } = &mut *tables;

        if let Some(slot) = slots.get_mut(handle) {
            slot.insert(key, value);
            return;
        }

        created.insert(handle.clone(), self.inner.clock.now_unix());
        slots.insert(handle.clone(), HashMap::from([(key, value)]));
    }

    /// Returns the value under `key`, or `V::default()` when the handle has no
    /// slot or the key is unset.
    ///
    /// This cannot tell "missing" apart from "stored the default value"; use
    /// [`get_ok`](Store::get_ok) when that matters.
    pub fn get(&self, handle: &H, key: &K) -> V
    where
        V: Default,
    {
        self.get_ok(handle, key).unwrap_or_default()
    }

    /// Returns the value under `key`, or `None` when the handle has no slot or
    /// the key is unset.
    pub fn get_ok(&self, handle: &H, key: &K) -> Option<V> {
        let tables = self.inner.tables.read();
        tables.slots.get(handle)?.get(key).cloned()
    }

    /// Returns a copy of the handle's whole slot, or `None` if it has none.
    ///
    /// The copy is detached from the store: later writes to the slot do not
    /// show up in it, and changing it does not touch the store.
    pub fn get_all(&self, handle: &H) -> Option<HashMap<K, V>>
    where
        K: Clone,
    {
        let tables = self.inner.tables.read();
        tables.slots.get(handle).cloned()
    }

    /// Removes `key` from the handle's slot.
    ///
    /// No-op if the handle has no slot or the key is not set. The slot itself
    /// survives even when this empties it.
    pub fn delete(&self, handle: &H, key: &K) {
        let mut tables = self.inner.tables.write();
        if let Some(slot) = tables.slots.get_mut(handle) {
            slot.remove(key);
        }
    }

    /// Drops the handle's slot and creation time. No-op if it has none.
    ///
    /// Call exactly once per request, after everything that reads the slot
    /// has finished. [`Store::guard`] and [`Store::scope`] do this for you.
    pub fn clear(&self, handle: &H) {
        let mut tables = self.inner.tables.write();
        tables.slots.remove(handle);
        tables.created.remove(handle);
    }

    /// Garbage-collects slots and returns how many were removed.
    ///
    /// - `max_age_secs <= 0` drops every slot in the store.
    /// - Otherwise drops every slot created strictly before
    ///   `now - max_age_secs`. Age counts from slot creation, not last use.
    ///
    /// Meant to be run periodically (see [`Sweeper`](crate::Sweeper)) to
    /// reclaim slots whose requests never called `clear`.
    pub fn purge(&self, max_age_secs: i64) -> usize {
        let mut tables = self.inner.tables.write();

        let removed = if max_age_secs <= 0 {
            let count = tables.slots.len();
            *tables = Tables::new();
            count
        } else {
            let cutoff = self.inner.clock.now_unix().saturating_sub(max_age_secs);
            let Tables { slots, created } = &mut *tables;
            let before = created.len();
            created.retain(|handle, created_at| {
                if *created_at < cutoff {
                    slots.remove(handle);
                    false
                } else {
                    true
                }
            });
            before - created.len()
        };
        drop(tables);

        if removed > 0 {
            tracing::debug!(removed, max_age_secs, "purged request slots");
        }
        removed
    }

    /// Returns `true` if the handle currently has a slot
    #[must_use]
    pub fn contains(&self, handle: &H) -> bool {
        self.inner.tables.read().slots.contains_key(handle)
    }

    /// Returns when the handle's slot was created (unix seconds)
    pub fn created_at(&self, handle: &H) -> Option<i64> {
        self.inner.tables.read().created.get(handle).copied()
    }

    /// Returns the number of live slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.tables.read().slots.len()
    }

    /// Returns `true` if no handle has a slot
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.tables.read().slots.is_empty()
    }

    /// Checks that both indexes hold exactly the same handles
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let tables = self.inner.tables.read();
        assert_eq!(tables.slots.len(), tables.created.len());
        for handle in tables.slots.keys() {
            assert!(tables.created.contains_key(handle));
        }
    }
}
