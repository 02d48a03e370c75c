//! Wall-clock helpers.
//!
//! Mesh timestamps are diagnostic only; nothing in the protocol compares
//! clocks across nodes.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in fractional seconds, the `ts` unit on the wire.
pub fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
