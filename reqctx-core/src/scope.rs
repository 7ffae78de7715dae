//! Tie a slot's lifetime to a request's lifetime.
//!
//! A request handler should never have to remember to call
//! [`Store::clear`] itself: wrap the handling in [`Store::scope`] or
//! [`Store::scope_async`], or hold a [`ClearGuard`] for the duration of the
//! request. The slot is cleared on every way out: normal return, early
//! `?` return, panic unwind, and (for futures) being dropped mid-flight.

use std::future::Future;
use std::hash::Hash;

use crate::store::Store;

/// Clears one handle's slot when dropped
///
/// Owns a clone of the store, so it can be moved into spawned tasks.
#[must_use = "the slot is cleared as soon as the guard is dropped"]
pub struct ClearGuard<H, K, V>
where
    H: Eq + Hash + Clone,
    K: Eq + Hash,
    V: Clone,
{
    store: Store<H, K, V>,
    handle: Option<H>,
}

impl<H, K, V> ClearGuard<H, K, V>
where
    H: Eq + Hash + Clone,
    K: Eq + Hash,
    V: Clone,
{
    /// The handle this guard will clear
    pub fn handle(&self) -> &H {
        // Only `disarm` takes the handle, and it consumes the guard.
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("guard used after disarm"),
        }
    }

    /// The store this guard clears from
    pub fn store(&self) -> &Store<H, K, V> {
        &self.store
    }

    /// Gives the handle back without clearing its slot
    pub fn disarm(mut self) -> H {
        match self.handle.take() {
            Some(handle) => handle,
            None => unreachable!("guard disarmed twice"),
        }
    }
}

impl<H, K, V> Drop for ClearGuard<H, K, V>
where
    H: Eq + Hash + Clone,
    K: Eq + Hash,
    V: Clone,
{
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.store.clear(&handle);
        }
    }
}

impl<H, K, V> Store<H, K, V>
where
    H: Eq + Hash + Clone,
    K: Eq + Hash,
    V: Clone,
{
    /// Returns a guard that clears `handle`'s slot when dropped
    ///
    /// ```rust
    /// use reqctx_core::{RequestHandle, Store, Value};
    ///
    /// let store = Store::new();
    /// let req = RequestHandle::new();
    /// {
    ///     let guard = store.guard(req);
    ///     store.set(guard.handle(), "user", Value::new("alice".to_string()));
    ///     assert!(store.contains(&req));
    /// }
    /// assert!(!store.contains(&req));
    /// ```
    pub fn guard(&self, handle: H) -> ClearGuard<H, K, V> {
        ClearGuard {
            store: self.clone(),
            handle: Some(handle),
        }
    }

    /// Runs `f` for the request, then clears its slot
    ///
    /// The slot is cleared even if `f` panics; the panic keeps unwinding.
    pub fn scope<R>(&self, handle: H, f: impl FnOnce(&H) -> R) -> R {
        let guard = self.guard(handle);
        f(guard.handle())
    }

    /// Awaits `fut` for the request, then clears its slot
    ///
    /// The slot is also cleared if the returned future is dropped before it
    /// completes (timeouts, aborted tasks, client disconnects).
    pub async fn scope_async<F>(&self, handle: H, fut: F) -> F::Output
    where
        F: Future,
    {
        let _guard = self.guard(handle);
        fut.await
    }
}
