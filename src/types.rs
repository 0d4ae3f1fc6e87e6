//! Core types for the showtime service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Why an announcement was broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    /// A cue was triggered.
    Cue,
    /// The periodic timer elapsed.
    Periodic,
}

impl Cause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cause::Cue => "cue",
            Cause::Periodic => "periodic",
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cue firing: "cue X occurred at instant T".
///
/// Created once per firing and never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeRecord {
    /// Opaque cue identifier, exactly as received.
    pub cue: String,

    /// Monotonic instant at which the cue was received.
    pub occurred_at: Instant,
}

impl TimeRecord {
    pub fn new(cue: impl Into<String>, occurred_at: Instant) -> Self {
        Self {
            cue: cue.into(),
            occurred_at,
        }
    }

    /// Seconds elapsed between the firing and `now`. Never negative.
    pub fn offset_seconds(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.occurred_at).as_secs_f64()
    }

    /// Project this record onto `now`.
    pub fn at(&self, now: Instant) -> TimePoint {
        TimePoint {
            cue: self.cue.clone(),
            offset: self.offset_seconds(now),
        }
    }
}

/// A point in performance time, exported to viewers.
///
/// Uses an offset rather than a timestamp so that viewers need not be
/// clock-synchronized with the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    /// The cue this point refers to.
    pub cue: String,

    /// Seconds since the cue was triggered.
    pub offset: f64,
}

/// A full snapshot of performance time, broadcast to every subscriber.
///
/// `time_points` lists every cue fired so far, oldest first. Because each
/// announcement is complete, a subscriber that misses one loses nothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub cause: Cause,
    pub time_points: Vec<TimePoint>,
}

impl Announcement {
    pub fn new(cause: Cause, time_points: Vec<TimePoint>) -> Self {
        Self { cause, time_points }
    }

    /// The most recently fired cue, if any.
    pub fn latest(&self) -> Option<&TimePoint> {
        self.time_points.last()
    }

    /// Seconds since the most recent firing of `cue`, or `None` if it has not fired.
    pub fn since(&self, cue: &str) -> Option<f64> {
        self.time_points
            .iter()
            .rev()
            .find(|p| p.cue == cue)
            .map(|p| p.offset)
    }

    /// Number of cues fired so far.
    pub fn len(&self) -> usize {
        self.time_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_points.is_empty()
    }
}
