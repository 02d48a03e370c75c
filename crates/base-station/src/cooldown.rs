//! Per-source alert cooldown.
//!
//! Governs local annunciation only. Incident recording never consults it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source node id -> last time an annunciation was triggered for it.
#[derive(Debug)]
pub struct CooldownTable {
    window: Duration,
    last_trigger: Mutex<HashMap<String, Instant>>,
}

impl CooldownTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_trigger: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// `true` if `src` has never triggered or its last trigger is older than
    /// the window; the trigger time is then moved to now. A `false` answer
    /// leaves the table untouched.
    pub fn should_alert(&self, src: &str) -> bool {
        self.should_alert_at(src, Instant::now())
    }

    pub fn should_alert_at(&self, src: &str, now: Instant) -> bool {
        let mut table = self
            .last_trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let due = match table.get(src) {
            Some(last) => now.saturating_duration_since(*last) > self.window,
            None => true,
        };
        if due {
            table.insert(src.to_string(), now);
        }
        due
    }
}
