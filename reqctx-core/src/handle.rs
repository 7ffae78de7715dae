use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one in-flight request.
///
/// Handles are minted by whoever owns the request lifecycle (usually the
/// transport layer) via [`RequestHandle::new`]. Every call yields a fresh
/// identity; copies of a handle refer to the same request. The store only
/// indexes by handles and never creates them.
///
/// A handle is just an id, so keeping one in the store does not keep the
/// request itself alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(u64);

impl RequestHandle {
    /// Allocates a new, never-before-seen request identity
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id, mostly useful for log fields
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_new_handles_are_distinct() {
        let h1 = RequestHandle::new();
        let h2 = RequestHandle::new();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_copy_keeps_identity() {
        let h1 = RequestHandle::new();
        let h2 = h1;
        assert_eq!(h1, h2);
        assert_eq!(h1.id(), h2.id());
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let threads: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (0..500).map(|_| RequestHandle::new()).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for t in threads {
            for handle in t.join().expect("Thread panicked") {
                assert!(seen.insert(handle), "duplicate handle {}", handle);
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_display() {
        let handle = RequestHandle::new();
        assert_eq!(handle.to_string(), format!("req#{}", handle.id()));
    }
}
