//! Per-hash usage counters protecting content from deletion.
//!
//! A counter above zero means readers or writers are active and the bytes must
//! stay. Zero (or no entry) means untracked. [`DELETING_SENTINEL`] marks a
//! deletion in progress; new users are turned away until it is released.
//!
//! Every mutation of an entry happens under the owning DashMap shard lock, so
//! the lazily created entries can be removed again without racing a concurrent
//! increment on a stale counter.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::value_objects::ContentHash;

/// Counter value while a deleter owns the hash
pub const DELETING_SENTINEL: i64 = i64::MIN / 2;

#[derive(Debug, Default)]
pub struct UsageTracker {
    counters: DashMap<ContentHash, AtomicI64>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one user of `hash`.
    ///
    /// Returns `false` (and leaves the counter untouched) when a deletion of
    /// the hash is in progress.
    pub fn increment(&self, hash: &ContentHash) -> bool {
        let counter = self
            .counters
            .entry(hash.clone())
            .or_insert_with(|| AtomicI64::new(0));
        let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if value < 0 {
            counter.fetch_sub(1, Ordering::SeqCst);
            debug!(hash = %hash, "Usage rejected, deletion in progress");
            return false;
        }
        true
    }

    /// Release one user of `hash`; the entry disappears when it reaches zero.
    pub fn decrement(&self, hash: &ContentHash) {
        match self.counters.entry(hash.clone()) {
            Entry::Occupied(entry) => {
                let remaining = entry.get().fetch_sub(1, Ordering::SeqCst) - 1;
                if remaining == 0 {
                    entry.remove();
                } else if remaining < 0 && remaining > DELETING_SENTINEL / 2 {
                    warn!(hash = %hash, remaining, "Unbalanced usage decrement");
                    entry.remove();
                }
            }
            Entry::Vacant(_) => {
                warn!(hash = %hash, "Usage decrement for untracked hash");
            }
        }
    }

    /// Acquire an RAII guard for `hash`, `None` if it is being deleted.
    pub fn protect(self: &Arc<Self>, hash: &ContentHash) -> Option<UsageGuard> {
        if self.increment(hash) {
            Some(UsageGuard {
                tracker: Arc::clone(self),
                hash: hash.clone(),
            })
        } else {
            None
        }
    }

    /// Like [`protect`](Self::protect), retrying while a deletion finishes.
    pub async fn protect_with_retry(
        self: &Arc<Self>,
        hash: &ContentHash,
        attempts: u32,
        delay: Duration,
    ) -> Option<UsageGuard> {
        for attempt in 0..attempts.max(1) {
            if let Some(guard) = self.protect(hash) {
                return Some(guard);
            }
            debug!(hash = %hash, attempt, "Waiting for deletion to finish");
            tokio::time::sleep(delay).await;
        }
        None
    }

    /// Claim exclusive deletion rights: CAS 0 -> sentinel.
    ///
    /// Fails when any reader or writer is registered, or another deleter
    /// already holds the claim.
    pub fn try_claim_deletion(&self, hash: &ContentHash) -> bool {
        let counter = self
            .counters
            .entry(hash.clone())
            .or_insert_with(|| AtomicI64::new(0));
        counter
            .compare_exchange(0, DELETING_SENTINEL, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Return a claimed hash to the untracked state
    pub fn release_deletion(&self, hash: &ContentHash) {
        let removed = self
            .counters
            .remove_if(hash, |_, counter| counter.load(Ordering::SeqCst) < 0);
        if removed.is_none() {
            warn!(hash = %hash, "Released a deletion claim that was not held");
        }
    }

    /// Current counter value, 0 when untracked
    pub fn usage(&self, hash: &ContentHash) -> i64 {
        self.counters
            .get(hash)
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// True when readers/writers are active or a deletion is running
    pub fn is_in_use(&self, hash: &ContentHash) -> bool {
        self.usage(hash) != 0
    }

    /// Number of hashes with a live entry
    pub fn tracked(&self) -> usize {
        self.counters.len()
    }
}

/// Holds one usage count until dropped
pub struct UsageGuard {
    tracker: Arc<UsageTracker>,
    hash: ContentHash,
}

impl UsageGuard {
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }
}

impl std::fmt::Debug for UsageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageGuard").field("hash", &self.hash).finish()
    }
}

impl Drop for UsageGuard {
    fn drop(&mut self) {
        self.tracker.decrement(&self.hash);
    }
}
