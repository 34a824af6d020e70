// libs/scheduling-cell/src/services/duration.rs
use std::collections::HashMap;

use crate::error::ScheduleError;
use crate::models::{DoctorCategory, VisitReason};

/// Minutes a visit occupies in the day. Selected per doctor.
pub trait DurationPolicy: Send + Sync {
    fn duration(&self, reason: VisitReason) -> Result<u32, ScheduleError>;
}

/// Reason-based durations used by general and homeopathy doctors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonDurationTable {
    minutes: HashMap<VisitReason, u32>,
}

impl ReasonDurationTable {
    pub fn standard() -> Self {
        Self::from_entries([
            (VisitReason::NewPatient, 10),
            (VisitReason::FollowUp, 7),
            (VisitReason::ReportShow, 12),
        ])
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (VisitReason, u32)>) -> Self {
        Self {
            minutes: entries.into_iter().collect(),
        }
    }
}

impl Default for ReasonDurationTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl DurationPolicy for ReasonDurationTable {
    fn duration(&self, reason: VisitReason) -> Result<u32, ScheduleError> {
        self.minutes
            .get(&reason)
            .copied()
            .ok_or_else(|| ScheduleError::UnknownReason(reason.to_string()))
    }
}

/// Same duration for every reason (physiotherapy sessions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatDuration {
    pub minutes: u32,
}

impl FlatDuration {
    pub fn new(minutes: u32) -> Self {
        Self { minutes }
    }
}

impl DurationPolicy for FlatDuration {
    fn duration(&self, _reason: VisitReason) -> Result<u32, ScheduleError> {
        Ok(self.minutes)
    }
}

/// The policies a deployment offers, chosen by doctor category.
#[derive(Debug, Clone)]
pub struct DurationPolicies {
    reason_table: ReasonDurationTable,
    flat: FlatDuration,
}

impl DurationPolicies {
    pub fn new(reason_table: ReasonDurationTable, flat: FlatDuration) -> Self {
        Self { reason_table, flat }
    }

    pub fn for_category(&self, category: DoctorCategory) -> &dyn DurationPolicy {
        match category {
            DoctorCategory::General | DoctorCategory::Homeopathy => &self.reason_table,
            DoctorCategory::Physiotherapist => &self.flat,
        }
    }
}

impl Default for DurationPolicies {
    fn default() -> Self {
        Self::new(ReasonDurationTable::standard(), FlatDuration::new(25))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn standard_table_durations() {
        let table = ReasonDurationTable::standard();
        assert_eq!(table.duration(VisitReason::NewPatient), Ok(10));
        assert_eq!(table.duration(VisitReason::FollowUp), Ok(7));
        assert_eq!(table.duration(VisitReason::ReportShow), Ok(12));
    }

    #[test]
    fn missing_entry_is_unknown_reason() {
        let table = ReasonDurationTable::from_entries([(VisitReason::NewPatient, 10)]);
        assert_matches!(
            table.duration(VisitReason::ReportShow),
            Err(ScheduleError::UnknownReason(_))
        );
    }

    #[test]
    fn physiotherapists_get_flat_duration() {
        let policies = DurationPolicies::default();
        let physio = policies.for_category(DoctorCategory::Physiotherapist);
        for reason in VisitReason::ALL {
            assert_eq!(physio.duration(reason), Ok(25));
        }

        let general = policies.for_category(DoctorCategory::General);
        assert_eq!(general.duration(VisitReason::FollowUp), Ok(7));
        let homeopathy = policies.for_category(DoctorCategory::Homeopathy);
        assert_eq!(homeopathy.duration(VisitReason::ReportShow), Ok(12));
    }
}
