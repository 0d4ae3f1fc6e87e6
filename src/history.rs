//! Append-only cue history.

use crate::types::{TimePoint, TimeRecord};
use std::collections::VecDeque;
use std::time::Instant;

/// Ordered record of every cue fired, oldest first.
///
/// Never deduplicates: firing the same cue twice yields two records. When a
/// limit is configured the oldest records are evicted once it is reached;
/// otherwise the history grows for the life of the process.
#[derive(Debug, Default)]
pub struct CueHistory {
    records: VecDeque<TimeRecord>,
    /// Maximum retained records (None = unbounded).
    limit: Option<usize>,
}

impl CueHistory {
    /// Create an unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history that retains at most `limit` records.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            records: VecDeque::new(),
            limit,
        }
    }

    /// Record that `cue` fired at `now`.
    pub fn append(&mut self, cue: impl Into<String>, now: Instant) {
        if let Some(limit) = self.limit {
            while self.records.len() >= limit.max(1) {
                self.records.pop_front();
            }
        }
        self.records.push_back(TimeRecord::new(cue, now));
    }

    /// Project every record onto `now`, preserving insertion order.
    pub fn time_points(&self, now: Instant) -> Vec<TimePoint> {
        self.records.iter().map(|r| r.at(now)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeRecord> {
        self.records.iter()
    }

    /// The most recently appended record.
    pub fn latest(&self) -> Option<&TimeRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
