//! Time interval helpers.
//!
//! All engine timestamps are wall-clock local `chrono::NaiveDateTime` values
//! and all durations are whole minutes. Intervals are half-open
//! `[start, end)`: two back-to-back slots do not overlap.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeSlot {
    /// Create a slot. Callers must ensure `start <= end`; a zero-length slot
    /// is valid and overlaps nothing.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start <= end, "TimeSlot start must not exceed end");
        Self { start, end }
    }

    /// Slot starting at `start` and lasting `minutes`.
    pub fn from_start(start: NaiveDateTime, minutes: i64) -> Self {
        Self::new(start, start + Duration::minutes(minutes))
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True if the two half-open intervals share any instant.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if `other` lies entirely within this slot.
    pub fn covers(&self, other: &TimeSlot) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Minutes of `self` falling after `boundary` (overtime math).
    pub fn minutes_past(&self, boundary: NaiveDateTime) -> i64 {
        if self.end <= boundary {
            0
        } else {
            (self.end - boundary.max(self.start)).num_minutes()
        }
    }
}

/// Minutes elapsed from `from` to `to`, negative if `to` precedes `from`.
pub fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_back_to_back_slots_do_not_overlap() {
        let a = TimeSlot::new(at(8, 0), at(9, 0));
        let b = TimeSlot::new(at(9, 0), at(10, 0));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn test_partial_overlap() {
        let a = TimeSlot::new(at(8, 0), at(9, 30));
        let b = TimeSlot::new(at(9, 0), at(10, 0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn test_covers_and_contains() {
        let window = TimeSlot::new(at(8, 0), at(17, 0));
        let inner = TimeSlot::new(at(8, 0), at(17, 0));
        assert!(window.covers(&inner));
        assert!(window.contains(at(8, 0)));
        assert!(!window.contains(at(17, 0)));
    }

    #[test]
    fn test_minutes_past_boundary() {
        let slot = TimeSlot::new(at(16, 0), at(18, 30));
        assert_eq!(slot.minutes_past(at(17, 0)), 90);
        assert_eq!(slot.minutes_past(at(19, 0)), 0);
        // Boundary before the slot: the entire slot is past it.
        assert_eq!(slot.minutes_past(at(15, 0)), 150);
    }

    #[test]
    fn test_from_start_duration() {
        let slot = TimeSlot::from_start(at(8, 15), 60);
        assert_eq!(slot.end, at(9, 15));
        assert_eq!(slot.duration_minutes(), 60);
    }
}
