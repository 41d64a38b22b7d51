//! Single-flight coalescing of concurrent chunk builds.
//!
//! ```text
//! resolve(k) ─┐
//!             │                            leader
//! resolve(k) ─┼──► InFlightRegistry ─────► read / build / persist
//!             │        │                        │
//! resolve(k) ─┘        ▼                        ▼
//!               followers await ◄──── broadcast result
//! ```
//!
//! The first caller for a key becomes the leader and receives a
//! [`LeaderGuard`]. Later callers subscribe to the leader's broadcast. The
//! guard removes the registry entry when it completes *or is dropped*, so a
//! cancelled leader never strands its followers: their channel closes and
//! they retry.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

/// Counters for coalescing effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Registrations seen.
    pub total_requests: u64,
    /// Registrations that joined an in-flight build.
    pub coalesced_requests: u64,
    /// Registrations that started a build.
    pub new_requests: u64,
}

impl CoalescerStats {
    /// Returns the coalescing ratio (0.0 to 1.0).
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

/// Tracks builds in progress by key.
pub struct InFlightRegistry<K, V> {
    in_flight: Mutex<HashMap<K, broadcast::Sender<V>>>,
    total: AtomicU64,
    coalesced: AtomicU64,
    new: AtomicU64,
}

/// Outcome of [`InFlightRegistry::register`].
pub enum Flight<'a, K: Eq + Hash + Copy + Debug, V: Clone> {
    /// No build was in progress; the caller must build and complete.
    Leader(LeaderGuard<'a, K, V>),
    /// A build is in progress; wait on the receiver.
    Follower(broadcast::Receiver<V>),
}

impl<K: Eq + Hash + Copy + Debug, V: Clone> InFlightRegistry<K, V> {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            total: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            new: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, broadcast::Sender<V>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the build for `key`, or start one.
    pub fn register(&self, key: K) -> Flight<'_, K, V> {
        self.total.fetch_add(1, Ordering::Relaxed);
        let mut in_flight = self.lock();

        if let Some(tx) = in_flight.get(&key) {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(key = ?key, "Coalescing request onto in-flight build");
            return Flight::Follower(tx.subscribe());
        }

        // One message is ever sent per channel.
        let (tx, _rx) = broadcast::channel(1);
        in_flight.insert(key, tx.clone());
        self.new.fetch_add(1, Ordering::Relaxed);
        Flight::Leader(LeaderGuard {
            registry: self,
            key,
            sender: Some(tx),
        })
    }

    /// Number of builds currently in progress.
    pub fn in_flight_count(&self) -> usize {
        self.lock().len()
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            total_requests: self.total.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced.load(Ordering::Relaxed),
            new_requests: self.new.load(Ordering::Relaxed),
        }
    }

    /// Remove `key` only if it still maps to `sender`'s channel.
    fn release(&self, key: K, sender: &broadcast::Sender<V>) {
        let mut in_flight = self.lock();
        if in_flight
            .get(&key)
            .is_some_and(|current| current.same_channel(sender))
        {
            in_flight.remove(&key);
        }
    }
}

impl<K: Eq + Hash + Copy + Debug, V: Clone> Default for InFlightRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by the caller that performs a build.
pub struct LeaderGuard<'a, K: Eq + Hash + Copy + Debug, V: Clone> {
    registry: &'a InFlightRegistry<K, V>,
    key: K,
    sender: Option<broadcast::Sender<V>>,
}

impl<K: Eq + Hash + Copy + Debug, V: Clone> LeaderGuard<'_, K, V> {
    /// Publish the result to all followers. Returns how many were waiting.
    pub fn complete(mut self, value: V) -> usize {
        let Some(sender) = self.sender.take() else {
            return 0;
        };
        self.registry.release(self.key, &sender);
        let waiters = sender.receiver_count();
        // No receivers is fine: nobody joined.
        let _ = sender.send(value);
        if waiters > 0 {
            debug!(key = ?self.key, waiters, "Broadcast result to coalesced waiters");
        }
        waiters
    }
}

impl<K: Eq + Hash + Copy + Debug, V: Clone> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            debug!(key = ?self.key, "Leader abandoned in-flight build");
            self.registry.release(self.key, &sender);
        }
    }
}

/// Wait for a leader's result. `None` means the leader was dropped without
/// completing and the caller should register again.
pub async fn wait_for<V: Clone>(mut receiver: broadcast::Receiver<V>) -> Option<V> {
    receiver.recv().await.ok()
}
