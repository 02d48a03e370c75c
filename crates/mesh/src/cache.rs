//! Seen-message cache for flood deduplication.
//!
//! Each node remembers the ids it has accepted, with the time it first saw
//! them. The receive path asks [`MessageCache::accept`]; the cleanup task calls
//! [`MessageCache::sweep`]. Check-and-insert happens under one lock so two
//! concurrent receipts of the same id cannot both be treated as new.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Bounded-lifetime set of seen message ids.
#[derive(Debug, Default)]
pub struct MessageCache {
    /// msg id -> first-seen instant
    seen: Mutex<HashMap<String, Instant>>,
}

impl MessageCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` the first time `id` is seen (recording it), `false` on every
    /// call after that until the entry is swept.
    pub fn accept(&self, id: &str) -> bool {
        self.accept_at(id, Instant::now())
    }

    /// [`accept`](Self::accept) with an explicit clock reading.
    pub fn accept_at(&self, id: &str, now: Instant) -> bool {
        match self.lock().entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Drop every entry first seen more than `expiry` before `now`.
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: Instant, expiry: Duration) -> usize {
        let mut seen = self.lock();
        let before = seen.len();
        seen.retain(|_, first_seen| now.saturating_duration_since(*first_seen) <= expiry);
        before - seen.len()
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when no id is remembered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
