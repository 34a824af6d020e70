// libs/scheduling-cell/src/services/reschedule.rs
use tracing::debug;

use crate::error::ScheduleError;
use crate::models::{AvailabilityWindow, RescheduleResult, SlotAssignment, Visit};
use crate::services::allocator::SlotCursor;
use crate::services::duration::DurationPolicy;
use crate::services::sequencer::SerialSequencer;

pub struct RescheduleEngine;

impl RescheduleEngine {
    /// Compact and re-time every slot-holding visit of a day in one pass.
    ///
    /// Pure: the result depends only on the window, the policy and the visits'
    /// serial order. Nothing is written here, so a failure leaves storage untouched.
    pub fn recompute(
        window: &AvailabilityWindow,
        policy: &dyn DurationPolicy,
        visits: Vec<Visit>,
    ) -> Result<RescheduleResult, ScheduleError> {
        window.validate()?;

        let holding: Vec<Visit> = visits
            .into_iter()
            .filter(|v| v.status.holds_slot())
            .collect();
        let ordered = SerialSequencer::compact(holding);

        let mut cursor = SlotCursor::new(window);
        let mut assignments = Vec::with_capacity(ordered.len());
        for visit in &ordered {
            assignments.push(SlotAssignment {
                visit_id: visit.id,
                serial: visit.serial,
                scheduled_time: cursor.current(),
            });
            cursor.advance(policy.duration(visit.reason)?);
        }

        debug!("Recomputed {} slots for {}", assignments.len(), window.key());

        Ok(RescheduleResult {
            doctor_id: window.doctor_id,
            date: window.date,
            assignments,
        })
    }

    /// Assignments whose serial or time differ from what the visits currently hold.
    pub fn changed<'a>(
        before: &'a [Visit],
        result: &'a RescheduleResult,
    ) -> impl Iterator<Item = &'a SlotAssignment> + 'a {
        result.assignments.iter().filter(move |assignment| {
            before
                .iter()
                .find(|v| v.id == assignment.visit_id)
                .map_or(true, |v| {
                    v.serial != assignment.serial || v.scheduled_time != assignment.scheduled_time
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayKey, PatientContact, VisitReason, VisitStatus, WindowRequest};
    use crate::services::allocator::SlotAllocator;
    use crate::services::duration::{FlatDuration, ReasonDurationTable};
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 20).unwrap()
    }

    fn window() -> AvailabilityWindow {
        AvailabilityWindow::from_request(DayKey::new(Uuid::nil(), date()), WindowRequest {
            start_time: at(11, 0),
            break_start: at(13, 15),
            break_end: at(14, 30),
            end_time: at(16, 30),
            max_appointments: 20,
            location: None,
        }).unwrap()
    }

    fn visit(serial: u32, reason: VisitReason, status: VisitStatus) -> Visit {
        Visit {
            id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            date: date(),
            patient_identity: format!("pin-{}", serial),
            contact: PatientContact::default(),
            reason,
            serial,
            scheduled_time: date().and_time(at(9, 0)),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_day_is_a_no_op() {
        let result = RescheduleEngine::recompute(&window(), &ReasonDurationTable::standard(), vec![]).unwrap();
        assert!(result.assignments.is_empty());
    }

    #[test]
    fn removal_closes_the_gap() {
        let first = visit(1, VisitReason::NewPatient, VisitStatus::Scheduled);
        let third = visit(3, VisitReason::ReportShow, VisitStatus::Scheduled);
        let result = RescheduleEngine::recompute(
            &window(),
            &ReasonDurationTable::standard(),
            vec![third.clone(), first.clone()],
        ).unwrap();

        assert_eq!(result.assignments.len(), 2);
        assert_eq!(result.assignments[0].visit_id, first.id);
        assert_eq!(result.assignments[0].scheduled_time, date().and_time(at(11, 0)));
        assert_eq!(result.assignments[1].visit_id, third.id);
        assert_eq!(result.assignments[1].serial, 2);
        assert_eq!(result.assignments[1].scheduled_time, date().and_time(at(11, 10)));
    }

    #[test]
    fn released_visits_are_ignored() {
        let visits = vec![
            visit(1, VisitReason::NewPatient, VisitStatus::Completed),
            visit(2, VisitReason::FollowUp, VisitStatus::Absent),
            visit(3, VisitReason::FollowUp, VisitStatus::Scheduled),
        ];
        let result = RescheduleEngine::recompute(&window(), &ReasonDurationTable::standard(), visits).unwrap();

        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].serial, 1);
        assert_eq!(result.assignments[0].scheduled_time, date().and_time(at(11, 0)));
    }

    #[test]
    fn recompute_is_idempotent() {
        let visits: Vec<Visit> = (1..=12)
            .map(|serial| {
                let reason = VisitReason::ALL[serial as usize % 3];
                visit(serial, reason, VisitStatus::Scheduled)
            })
            .collect();
        let policy = ReasonDurationTable::standard();

        let first = RescheduleEngine::recompute(&window(), &policy, visits.clone()).unwrap();
        let second = RescheduleEngine::recompute(&window(), &policy, visits).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn matches_allocator_for_each_serial() {
        let visits: Vec<Visit> = (1..=15)
            .map(|serial| visit(serial, VisitReason::ALL[serial as usize % 3], VisitStatus::Scheduled))
            .collect();
        let policy = FlatDuration::new(25);
        let result = RescheduleEngine::recompute(&window(), &policy, visits).unwrap();

        for (index, assignment) in result.assignments.iter().enumerate() {
            let prior = vec![25; index];
            assert_eq!(assignment.scheduled_time, SlotAllocator::allocate(&window(), &prior));
            assert!(!window().is_in_break(assignment.scheduled_time));
        }
        for pair in result.assignments.windows(2) {
            assert!(pair[0].scheduled_time <= pair[1].scheduled_time);
        }
    }

    #[test]
    fn invalid_window_fails_whole_recompute() {
        let mut broken = window();
        broken.break_end = at(12, 0);
        let visits = vec![visit(1, VisitReason::NewPatient, VisitStatus::Scheduled)];
        assert_matches!(
            RescheduleEngine::recompute(&broken, &ReasonDurationTable::standard(), visits),
            Err(ScheduleError::InvalidWindow(_))
        );
    }

    #[test]
    fn changed_reports_only_moved_visits() {
        let mut first = visit(1, VisitReason::NewPatient, VisitStatus::Scheduled);
        first.scheduled_time = date().and_time(at(11, 0));
        let second = visit(3, VisitReason::FollowUp, VisitStatus::Scheduled);
        let before = vec![first.clone(), second.clone()];

        let result = RescheduleEngine::recompute(&window(), &ReasonDurationTable::standard(), before.clone()).unwrap();
        let changed: Vec<Uuid> = RescheduleEngine::changed(&before, &result).map(|a| a.visit_id).collect();
        assert_eq!(changed, vec![second.id]);
    }
}
