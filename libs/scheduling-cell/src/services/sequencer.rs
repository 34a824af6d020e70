// libs/scheduling-cell/src/services/sequencer.rs
use crate::error::ScheduleError;
use crate::models::Visit;
use crate::services::capacity::BookingClearance;

pub struct SerialSequencer;

impl SerialSequencer {
    /// Next serial after the highest one in use.
    pub fn assign(
        clearance: &BookingClearance,
        existing_serials: impl IntoIterator<Item = u32>,
    ) -> Result<u32, ScheduleError> {
        let next = existing_serials.into_iter().max().unwrap_or(0) + 1;
        if next > clearance.max_appointments() {
            return Err(ScheduleError::CapacityExceeded {
                max_appointments: clearance.max_appointments(),
            });
        }
        Ok(next)
    }

    /// Renumber the surviving visits `1..=N`, keeping their relative order.
    ///
    /// The output carries stale `scheduled_time` values; callers must run the
    /// allocator over it before anything is persisted.
    pub fn compact(mut remaining: Vec<Visit>) -> Vec<Visit> {
        remaining.sort_by(|a, b| {
            a.serial
                .cmp(&b.serial)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        for (index, visit) in remaining.iter_mut().enumerate() {
            visit.serial = index as u32 + 1;
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AvailabilityWindow, DayKey, PatientContact, VisitReason, VisitStatus, WindowRequest};
    use crate::services::capacity::CapacityGuard;
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn clearance(capacity: u32) -> BookingClearance {
        let key = DayKey::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2025, 6, 20).unwrap());
        let window = AvailabilityWindow::from_request(key, WindowRequest {
            max_appointments: capacity,
            ..WindowRequest::default()
        }).unwrap();
        CapacityGuard::can_book(&window, 0, "1", std::iter::empty()).unwrap()
    }

    fn visit(serial: u32) -> Visit {
        let date = NaiveDate::from_ymd_opt(2025, 6, 20).unwrap();
        Visit {
            id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            date,
            patient_identity: format!("pin-{}", serial),
            contact: PatientContact::default(),
            reason: VisitReason::NewPatient,
            serial,
            scheduled_time: date.and_hms_opt(11, 0, 0).unwrap(),
            status: VisitStatus::Scheduled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn assign_starts_at_one() {
        assert_eq!(SerialSequencer::assign(&clearance(3), []), Ok(1));
    }

    #[test]
    fn assign_follows_highest_serial() {
        assert_eq!(SerialSequencer::assign(&clearance(10), [2, 1, 5]), Ok(6));
    }

    #[test]
    fn assign_refuses_serial_beyond_capacity() {
        assert_matches!(
            SerialSequencer::assign(&clearance(2), [1, 2]),
            Err(ScheduleError::CapacityExceeded { max_appointments: 2 })
        );
    }

    #[test]
    fn compact_preserves_relative_order() {
        let survivors = vec![visit(5), visit(1), visit(3)];
        let ids_in_order: Vec<Uuid> = {
            let mut sorted = survivors.clone();
            sorted.sort_by_key(|v| v.serial);
            sorted.iter().map(|v| v.id).collect()
        };

        let compacted = SerialSequencer::compact(survivors);

        let serials: Vec<u32> = compacted.iter().map(|v| v.serial).collect();
        assert_eq!(serials, vec![1, 2, 3]);
        let ids: Vec<Uuid> = compacted.iter().map(|v| v.id).collect();
        assert_eq!(ids, ids_in_order);
    }

    #[test]
    fn compact_of_nothing_is_nothing() {
        assert!(SerialSequencer::compact(Vec::new()).is_empty());
    }
}
