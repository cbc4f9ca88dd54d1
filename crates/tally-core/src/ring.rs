//! Bounded in-memory view of recently accepted events.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::types::AttendanceEvent;

/// Fixed-capacity ring of the most recent attendance events, oldest
/// evicted first. Fast-path cache for the admin API; the durable sink is
/// the backstop.
pub struct RecentEvents {
    buf: Mutex<VecDeque<AttendanceEvent>>,
    capacity: usize,
}

impl RecentEvents {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, event: AttendanceEvent) {
        let mut buf = self.buf.lock();
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(event);
    }

    /// All buffered events, oldest first.
    pub fn to_vec(&self) -> Vec<AttendanceEvent> {
        self.buf.lock().iter().cloned().collect()
    }

    /// The most recently accepted event, if any.
    pub fn last(&self) -> Option<AttendanceEvent> {
        self.buf.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.buf.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(id: &str) -> AttendanceEvent {
        AttendanceEvent {
            identity_id: id.into(),
            display_name: id.to_uppercase(),
            recorded_at: Utc::now(),
            confidence: 90.0,
        }
    }

    #[test]
    fn test_push_preserves_order() {
        let ring = RecentEvents::new(10);
        ring.push(event("a"));
        ring.push(event("b"));
        let events = ring.to_vec();
        assert_eq!(events[0].identity_id, "a");
        assert_eq!(events[1].identity_id, "b");
        assert_eq!(ring.last().unwrap().identity_id, "b");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let ring = RecentEvents::new(3);
        for id in ["a", "b", "c", "d"] {
            ring.push(event(id));
        }
        let ids: Vec<_> = ring
            .to_vec()
            .into_iter()
            .map(|e| e.identity_id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_empty_ring() {
        let ring = RecentEvents::new(3);
        assert!(ring.is_empty());
        assert!(ring.last().is_none());
        assert!(ring.to_vec().is_empty());
    }
}
