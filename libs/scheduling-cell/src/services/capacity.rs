// libs/scheduling-cell/src/services/capacity.rs
use tracing::debug;

use crate::error::ScheduleError;
use crate::models::AvailabilityWindow;

/// Proof that a day had room for one more visit when the guard ran.
/// Only `CapacityGuard::can_book` creates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingClearance {
    max_appointments: u32,
}

impl BookingClearance {
    pub fn max_appointments(&self) -> u32 {
        self.max_appointments
    }
}

pub struct CapacityGuard;

impl CapacityGuard {
    pub fn can_book<'a>(
        window: &AvailabilityWindow,
        current_count: usize,
        identity: &str,
        existing_identities: impl IntoIterator<Item = &'a str>,
    ) -> Result<BookingClearance, ScheduleError> {
        if window.capacity_remaining(current_count) == 0 {
            debug!(
                "Day {} is full: {} of {} booked",
                window.key(), current_count, window.max_appointments
            );
            return Err(ScheduleError::CapacityExceeded {
                max_appointments: window.max_appointments,
            });
        }

        let identity = identity.trim();
        if identity.is_empty() {
            return Err(ScheduleError::MissingIdentity);
        }
        if existing_identities
            .into_iter()
            .any(|existing| existing.trim() == identity)
        {
            return Err(ScheduleError::DuplicateIdentity);
        }

        Ok(BookingClearance {
            max_appointments: window.max_appointments,
        })
    }
}
