// libs/scheduling-cell/src/services/allocator.rs
use chrono::{Duration, NaiveDateTime};

use crate::models::AvailabilityWindow;

/// Walks a day's timeline visit by visit, skipping the break.
#[derive(Debug, Clone, Copy)]
pub struct SlotCursor {
    current: NaiveDateTime,
    break_start: NaiveDateTime,
    break_end: NaiveDateTime,
}

impl SlotCursor {
    pub fn new(window: &AvailabilityWindow) -> Self {
        Self {
            current: window.starts_at(),
            break_start: window.break_starts_at(),
            break_end: window.break_ends_at(),
        }
    }

    /// Start time of the next visit.
    pub fn current(&self) -> NaiveDateTime {
        self.current
    }

    pub fn advance(&mut self, minutes: u32) {
        self.current += Duration::minutes(i64::from(minutes));
        if self.current >= self.break_start && self.current < self.break_end {
            self.current = self.break_end;
        }
    }
}

pub struct SlotAllocator;

impl SlotAllocator {
    /// Start time for serial `prior_durations.len() + 1`.
    ///
    /// `prior_durations` are the durations of serials `1..k` in ascending serial
    /// order. The result may fall past the window's end time; capacity is
    /// enforced before a visit is ever allocated.
    pub fn allocate(window: &AvailabilityWindow, prior_durations: &[u32]) -> NaiveDateTime {
        let mut cursor = SlotCursor::new(window);
        for &minutes in prior_durations {
            cursor.advance(minutes);
        }
        cursor.current()
    }
}
