// THEORY:
// The location history is the temporal de-duplicator. Edge-rich static texture (a
// patterned tank wall, a decoration) can occasionally score above the acceptance
// threshold. What gives it away is that it keeps being "found" at the same spot.
//
// Every accepted detection appends its top-left corner and time to a bounded ring
// buffer. Before a new candidate is accepted, the detector counts how many entries
// lie within a square neighbourhood of it inside a short recency window; too many
// recent hits and the candidate is treated as static clutter.
//
// Entries are evicted strictly oldest-first once capacity is exceeded. The recency
// window only filters lookups; it never removes entries.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One accepted detection location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationHistoryEntry {
    pub x: u32,
    pub y: u32,
    pub timestamp: Instant,
}

/// Bounded, insertion-ordered ring buffer of recent accepted locations.
#[derive(Debug, Clone)]
pub struct LocationHistory {
    entries: VecDeque<LocationHistoryEntry>,
    capacity: usize,
}

impl LocationHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn record(&mut self, x: u32, y: u32, timestamp: Instant) {
        self.entries.push_back(LocationHistoryEntry { x, y, timestamp });
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Entries strictly closer than `radius` on both axes and younger than `window`.
    pub fn recent_hits(&self, x: u32, y: u32, now: Instant, radius: u32, window: Duration) -> usize {
        self.entries
            .iter()
            .filter(|entry| {
                entry.x.abs_diff(x) < radius
                    && entry.y.abs_diff(y) < radius
                    && now.saturating_duration_since(entry.timestamp) < window
            })
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocationHistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
