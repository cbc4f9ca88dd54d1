//! Per-identity acceptance ledger for duplicate suppression.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Tracks, per identity, when an attendance event was last accepted.
///
/// `should_accept` is a single check-and-update step under one lock, so two
/// concurrent frames for the same identity can never both be accepted
/// inside the window. The lock is never held across I/O; the critical
/// section is one map lookup and at most one insert.
#[derive(Default)]
pub struct CooldownTracker {
    last_accepted: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether an event for `id` may be recorded at `now`.
    ///
    /// No prior entry: accept and record `now`. Prior entry: accept iff
    /// `now - last >= window`, updating the stored timestamp. A rejection
    /// leaves the timestamp unchanged — repeats do not extend the window.
    pub fn should_accept(&self, id: &str, now: DateTime<Utc>, window: Duration) -> bool {
        let mut ledger = self.last_accepted.lock();
        match ledger.get(id) {
            Some(last) if now.signed_duration_since(*last) < window => false,
            _ => {
                ledger.insert(id.to_string(), now);
                true
            }
        }
    }

    /// Drop the ledger entry for a removed identity, bounding ledger growth
    /// under enrollment churn. Returns whether an entry existed.
    pub fn remove(&self, id: &str) -> bool {
        self.last_accepted.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.last_accepted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_accepted.lock().is_empty()
    }
}
