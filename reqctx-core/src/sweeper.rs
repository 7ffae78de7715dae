use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::SweepConfig;
use crate::store::Store;

/// Reasons a sweeper cannot be started
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SweepError {
    /// Tokio's interval timer panics on a zero period
    #[error("sweep interval must be greater than zero")]
    ZeroInterval,

    /// `Sweeper::spawn` was called off a Tokio runtime
    #[error(
        "sweeper requires a Tokio runtime; spawn it from within #[tokio::main] or #[tokio::test]"
    )]
    NoRuntime,
}

/// Background task that periodically purges old slots from a [`Store`]
///
/// This is the backstop for requests that never reached `clear` (a handler
/// that bailed out early, a task that was aborted outside a guard, ...).
/// The task stops when [`shutdown`](Sweeper::shutdown) is called or the
/// `Sweeper` is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use reqctx_core::{Store, SweepConfig, Sweeper};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let store = Store::new();
///     let config = SweepConfig::default()
///         .with_interval(Duration::from_secs(30))
///         .with_max_age(Duration::from_secs(600));
///
///     let sweeper = Sweeper::spawn(store.clone(), config).unwrap();
///     // ... serve requests ...
///     sweeper.shutdown();
/// }
/// ```
pub struct Sweeper {
    /// Sender to signal shutdown to the sweep task
    shutdown_tx: watch::Sender<bool>,
    purged: Arc<AtomicU64>,
}

impl Sweeper {
    /// Starts sweeping `store` on the current Tokio runtime
    ///
    /// The first purge happens one full interval after spawning.
    pub fn spawn<H, K, V>(store: Store<H, K, V>, config: SweepConfig) -> Result<Self, SweepError>
    where
        H: Eq + Hash + Clone + Send + Sync + 'static,
        K: Eq + Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if config.interval.is_zero() {
            return Err(SweepError::ZeroInterval);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SweepError::NoRuntime)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let purged = Arc::new(AtomicU64::new(0));

        tracing::info!(
            interval_ms = config.interval.as_millis() as u64,
            max_age_secs = config.max_age_secs,
            "request slot sweeper started"
        );
        runtime.spawn(Self::sweep_task(
            store,
            config.interval,
            config.max_age_secs,
            Arc::clone(&purged),
            shutdown_rx,
        ));

        Ok(Self { shutdown_tx, purged })
    }

    async fn sweep_task<H, K, V>(
        store: Store<H, K, V>,
        interval: Duration,
        max_age_secs: i64,
        purged: Arc<AtomicU64>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) where
        H: Eq + Hash + Clone,
        K: Eq + Hash,
        V: Clone,
    {
        let mut ticker = tokio::time::interval(interval);
        // Skip the first immediate tick - we want to wait for the interval first
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = store.purge(max_age_secs);
                    purged.fetch_add(removed as u64, Ordering::Relaxed);
                    tracing::trace!(removed, live = store.len(), "sweep tick");
                }
                changed = shutdown_rx.changed() => {
                    // Err means the Sweeper was dropped
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            purged_total = purged.load(Ordering::Relaxed),
            "request slot sweeper stopped"
        );
    }

    /// Total number of slots this sweeper has purged so far
    pub fn purged_total(&self) -> u64 {
        self.purged.load(Ordering::Relaxed)
    }

    /// Stops the background task
    ///
    /// Also happens automatically when the sweeper is dropped.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::handle::RequestHandle;
    use crate::value::Value;

    const T0: i64 = 1_700_000_000;

    fn create_test_store() -> (Store, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        (Store::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let (store, _) = create_test_store();
        let result = Sweeper::spawn(store, SweepConfig::default());
        assert_eq!(result.err(), Some(SweepError::NoRuntime));
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let (store, _) = create_test_store();
        let config = SweepConfig::default().with_interval(Duration::ZERO);
        let result = Sweeper::spawn(store, config);
        assert_eq!(result.err(), Some(SweepError::ZeroInterval));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SweepError::ZeroInterval.to_string(),
            "sweep interval must be greater than zero"
        );
        assert!(SweepError::NoRuntime.to_string().contains("Tokio runtime"));
    }

    #[tokio::test]
    async fn test_background_sweep_removes_old_slots() {
        let (store, clock) = create_test_store();
        let config = SweepConfig::default()
            .with_interval(Duration::from_millis(50))
            .with_max_age_secs(60);
        let sweeper = Sweeper::spawn(store.clone(), config).unwrap();

        let leaked = RequestHandle::new();
        store.set(&leaked, "k", Value::new(1i32));
        clock.advance(120);
        let fresh = RequestHandle::new();
        store.set(&fresh, "k", Value::new(2i32));

        // Wait for background sweep to run (interval + some buffer)
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!store.contains(&leaked));
        assert!(store.contains(&fresh));
        assert_eq!(sweeper.purged_total(), 1);
    }

    #[tokio::test]
    async fn test_full_reset_sweeper() {
        let (store, _) = create_test_store();
        let config = SweepConfig::default()
            .with_interval(Duration::from_millis(50))
            .with_max_age_secs(0);
        let _sweeper = Sweeper::spawn(store.clone(), config).unwrap();

        for _ in 0..5 {
            store.set(&RequestHandle::new(), "k", Value::nil());
        }
        assert_eq!(store.len(), 5);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweeping() {
        let (store, _) = create_test_store();
        let config = SweepConfig::default()
            .with_interval(Duration::from_millis(10))
            .with_max_age_secs(0);
        let sweeper = Sweeper::spawn(store.clone(), config).unwrap();

        sweeper.shutdown();
        // Give some time for shutdown to process
        tokio::time::sleep(Duration::from_millis(50)).await;

        let req = RequestHandle::new();
        store.set(&req, "k", Value::nil());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.contains(&req));
    }

    #[tokio::test]
    async fn test_subsecond_max_age_keeps_in_flight_slots() {
        let (store, clock) = create_test_store();
        let config = SweepConfig::default()
            .with_interval(Duration::from_millis(20))
            .with_max_age(Duration::from_millis(500));
        let sweeper = Sweeper::spawn(store.clone(), config).unwrap();

        let in_flight = RequestHandle::new();
        store.set(&in_flight, "k", Value::new(1i32));

        // Several ticks with the clock frozen: the slot is younger than the limit
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.contains(&in_flight));
        assert_eq!(sweeper.purged_total(), 0);

        // Old enough once the whole-second limit has passed
        clock.advance(2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!store.contains(&in_flight));
        assert_eq!(sweeper.purged_total(), 1);
    }

    #[tokio::test]
    async fn test_drop_stops_sweeping() {
        let (store, _) = create_test_store();
        let config = SweepConfig::default()
            .with_interval(Duration::from_millis(10))
            .with_max_age_secs(0);
        drop(Sweeper::spawn(store.clone(), config).unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let req = RequestHandle::new();
        store.set(&req, "k", Value::nil());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.contains(&req));
    }

    #[tokio::test]
    async fn test_multiple_sweepers_independent() {
        let (store1, _) = create_test_store();
        let (store2, _) = create_test_store();

        let _fast = Sweeper::spawn(
            store1.clone(),
            SweepConfig::default()
                .with_interval(Duration::from_millis(50))
                .with_max_age_secs(0),
        )
        .unwrap();
        let _slow = Sweeper::spawn(
            store2.clone(),
            SweepConfig::default()
                .with_interval(Duration::from_secs(60))
                .with_max_age_secs(0),
        )
        .unwrap();

        store1.set(&RequestHandle::new(), "k", Value::nil());
        store2.set(&RequestHandle::new(), "k", Value::nil());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store1.len(), 0);
        assert_eq!(store2.len(), 1);
    }
}
