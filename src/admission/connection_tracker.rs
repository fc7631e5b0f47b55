//! Concurrent stream cap per identity.
//!
//! A single mutex guards the whole map: every operation is a couple of
//! integer updates, and the cap has to be checked and bumped atomically.
//! Counts are process-local. A multi-process deployment gets a cap per
//! process, which is acceptable for coarse self-protection.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::MAX_CONNECTIONS_PER_USER;

/// Counts open streams per identity.
#[derive(Debug)]
pub struct ConnectionTracker {
    max_per_identity: usize,
    connections: Mutex<HashMap<u64, usize>>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new(MAX_CONNECTIONS_PER_USER)
    }
}

impl ConnectionTracker {
    pub fn new(max_per_identity: usize) -> Self {
        Self {
            max_per_identity,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_per_identity(&self) -> usize {
        self.max_per_identity
    }

    /// Take a slot for `identity_id`. Returns `false` when the cap is reached.
    pub fn acquire(&self, identity_id: u64) -> bool {
        let mut connections = self.connections.lock();
        let count = connections.entry(identity_id).or_insert(0);
        if *count >= self.max_per_identity {
            if *count == 0 {
                connections.remove(&identity_id);
            }
            return false;
        }
        *count += 1;
        true
    }

    /// Give a slot back. The entry disappears when its count reaches zero.
    pub fn release(&self, identity_id: u64) {
        let mut connections = self.connections.lock();
        match connections.get_mut(&identity_id) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                connections.remove(&identity_id);
            }
            None => log::warn!("Release without acquire for identity {}", identity_id),
        }
    }

    /// Open streams for `identity_id`; 0 when untracked.
    pub fn count_for(&self, identity_id: u64) -> usize {
        self.connections
            .lock()
            .get(&identity_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of identities with at least one open stream.
    pub fn tracked_identities(&self) -> usize {
        self.connections.lock().len()
    }

    /// Forget every slot. Test isolation only.
    pub fn reset(&self) {
        self.connections.lock().clear();
    }

    /// Take a slot that is released when the returned guard drops.
    pub fn try_acquire(self: &Arc<Self>, identity_id: u64) -> Option<ConnectionSlot> {
        if self.acquire(identity_id) {
            Some(ConnectionSlot {
                tracker: Arc::clone(self),
                identity_id,
                released: false,
            })
        } else {
            None
        }
    }
}

/// An acquired slot. Released exactly once: explicitly or on drop.
#[derive(Debug)]
pub struct ConnectionSlot {
    tracker: Arc<ConnectionTracker>,
    identity_id: u64,
    released: bool,
}

impl ConnectionSlot {
    pub fn identity_id(&self) -> u64 {
        self.identity_id
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.release(self.identity_id);
        }
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_is_enforced() {
        let tracker = ConnectionTracker::default();
        assert!(tracker.acquire(1));
        assert!(tracker.acquire(1));
        assert!(tracker.acquire(1));
        assert!(!tracker.acquire(1));
        assert_eq!(tracker.count_for(1), 3);

        tracker.release(1);
        assert!(tracker.acquire(1));
    }

    #[test]
    fn test_final_release_removes_entry() {
        let tracker = ConnectionTracker::default();
        tracker.acquire(2);
        tracker.acquire(2);
        tracker.release(2);
        tracker.release(2);
        assert_eq!(tracker.count_for(2), 0);
        assert_eq!(tracker.tracked_identities(), 0);

        // Extra release is harmless.
        tracker.release(2);
        assert_eq!(tracker.count_for(2), 0);
    }

    #[test]
    fn test_identities_are_independent() {
        let tracker = ConnectionTracker::new(1);
        assert!(tracker.acquire(1));
        assert!(tracker.acquire(2));
        assert!(!tracker.acquire(1));
        assert_eq!(tracker.tracked_identities(), 2);
        tracker.reset();
        assert_eq!(tracker.tracked_identities(), 0);
    }

    #[test]
    fn test_zero_cap_leaves_no_entry() {
        let tracker = ConnectionTracker::new(0);
        assert!(!tracker.acquire(1));
        assert_eq!(tracker.tracked_identities(), 0);
    }

    #[test]
    fn test_slot_releases_on_drop_once() {
        let tracker = Arc::new(ConnectionTracker::default());
        let a = tracker.try_acquire(5).unwrap();
        let b = tracker.try_acquire(5).unwrap();
        assert_eq!(tracker.count_for(5), 2);

        a.release();
        assert_eq!(tracker.count_for(5), 1);
        drop(b);
        assert_eq!(tracker.count_for(5), 0);
    }

    #[test]
    fn test_try_acquire_respects_cap() {
        let tracker = Arc::new(ConnectionTracker::new(2));
        let _a = tracker.try_acquire(9).unwrap();
        let _b = tracker.try_acquire(9).unwrap();
        assert!(tracker.try_acquire(9).is_none());
        assert_eq!(tracker.count_for(9), 2);
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_cap() {
        let tracker = Arc::new(ConnectionTracker::default());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.acquire(42))
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 3);
        assert_eq!(tracker.count_for(42), 3);
    }
}
