// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ScheduleError;

// ==============================================================================
// DAY IDENTITY
// ==============================================================================

/// One doctor's schedule for one calendar date. Every write is serialized per key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DayKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(doctor_id: Uuid, date: NaiveDate) -> Self {
        Self { doctor_id, date }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doctor_id, self.date)
    }
}

// ==============================================================================
// ENUMS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum VisitReason {
    #[serde(alias = "new_patient", alias = "New Patient")]
    NewPatient,

    #[serde(alias = "follow_up", alias = "Follow Up")]
    FollowUp,

    #[serde(alias = "report_show", alias = "Report Show")]
    ReportShow,
}

impl VisitReason {
    pub const ALL: [VisitReason; 3] = [
        VisitReason::NewPatient,
        VisitReason::FollowUp,
        VisitReason::ReportShow,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            VisitReason::NewPatient => "New Patient",
            VisitReason::FollowUp => "Follow Up",
            VisitReason::ReportShow => "Report Show",
        }
    }
}

impl fmt::Display for VisitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for VisitReason {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "newpatient" => Ok(VisitReason::NewPatient),
            "followup" => Ok(VisitReason::FollowUp),
            "reportshow" => Ok(VisitReason::ReportShow),
            _ => Err(ScheduleError::UnknownReason(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Scheduled,
    Completed,
    Absent,
    Cancelled,
}

impl VisitStatus {
    /// Only scheduled visits hold a serial and count toward capacity.
    pub fn holds_slot(&self) -> bool {
        matches!(self, VisitStatus::Scheduled)
    }

    pub fn can_transition_to(&self, next: VisitStatus) -> bool {
        matches!(
            (self, next),
            (
                VisitStatus::Scheduled,
                VisitStatus::Completed | VisitStatus::Absent | VisitStatus::Cancelled
            )
        )
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitStatus::Scheduled => write!(f, "scheduled"),
            VisitStatus::Completed => write!(f, "completed"),
            VisitStatus::Absent => write!(f, "absent"),
            VisitStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a visit leaves the schedule without being seen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisitOutcome {
    Absent,
    Cancelled,
}

impl From<VisitOutcome> for VisitStatus {
    fn from(outcome: VisitOutcome) -> Self {
        match outcome {
            VisitOutcome::Absent => VisitStatus::Absent,
            VisitOutcome::Cancelled => VisitStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "PascalCase")]
pub enum DoctorCategory {
    #[default]
    General,
    Homeopathy,
    Physiotherapist,
}

impl FromStr for DoctorCategory {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(DoctorCategory::General),
            "homeopathy" => Ok(DoctorCategory::Homeopathy),
            "physiotherapist" | "physiotherapy" => Ok(DoctorCategory::Physiotherapist),
            other => Err(ScheduleError::Storage(format!("unknown doctor type: {}", other))),
        }
    }
}

// ==============================================================================
// AVAILABILITY WINDOW
// ==============================================================================

/// Admin-supplied bounds for one day. Validated into an `AvailabilityWindow`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowRequest {
    pub start_time: NaiveTime,
    pub break_start: NaiveTime,
    pub break_end: NaiveTime,
    pub end_time: NaiveTime,
    pub max_appointments: u32,
    #[serde(default)]
    pub location: Option<String>,
}

impl Default for WindowRequest {
    fn default() -> Self {
        Self {
            start_time: hm(11, 0),
            break_start: hm(13, 15),
            break_end: hm(14, 30),
            end_time: hm(16, 30),
            max_appointments: 17,
            location: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilityWindow {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub break_start: NaiveTime,
    pub break_end: NaiveTime,
    pub end_time: NaiveTime,
    pub max_appointments: u32,
    pub location: Option<String>,
}

impl AvailabilityWindow {
    pub fn from_request(key: DayKey, request: WindowRequest) -> Result<Self, ScheduleError> {
        let window = Self {
            doctor_id: key.doctor_id,
            date: key.date,
            start_time: request.start_time,
            break_start: request.break_start,
            break_end: request.break_end,
            end_time: request.end_time,
            max_appointments: request.max_appointments,
            location: request.location,
        };
        window.validate()?;
        Ok(window)
    }

    /// Windows loaded from storage bypass `from_request`, so every consumer re-validates.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.start_time >= self.break_start {
            return Err(ScheduleError::InvalidWindow(format!(
                "start time {} must be before break start {}",
                self.start_time, self.break_start
            )));
        }
        if self.break_start >= self.break_end {
            return Err(ScheduleError::InvalidWindow(format!(
                "break start {} must be before break end {}",
                self.break_start, self.break_end
            )));
        }
        if self.break_end >= self.end_time {
            return Err(ScheduleError::InvalidWindow(format!(
                "break end {} must be before end time {}",
                self.break_end, self.end_time
            )));
        }
        if self.max_appointments < 1 {
            return Err(ScheduleError::InvalidWindow(
                "max appointments must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn key(&self) -> DayKey {
        DayKey::new(self.doctor_id, self.date)
    }

    pub fn capacity_remaining(&self, booked_count: usize) -> u32 {
        let booked = u32::try_from(booked_count).unwrap_or(u32::MAX);
        self.max_appointments.saturating_sub(booked)
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn break_starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.break_start)
    }

    pub fn break_ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.break_end)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }

    pub fn is_in_break(&self, at: NaiveDateTime) -> bool {
        at >= self.break_starts_at() && at < self.break_ends_at()
    }
}

// ==============================================================================
// VISITS
// ==============================================================================

/// Contact details handed over by the identity collaborator. Opaque to scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PatientContact {
    pub name: String,
    pub phone: String,
    pub concern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Visit {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub patient_identity: String,
    #[serde(flatten)]
    pub contact: PatientContact,
    pub reason: VisitReason,
    pub serial: u32,
    pub scheduled_time: NaiveDateTime,
    pub status: VisitStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Visit {
    pub fn day_key(&self) -> DayKey {
        DayKey::new(self.doctor_id, self.date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookVisitRequest {
    pub patient_identity: String,
    pub reason: VisitReason,
    #[serde(flatten)]
    pub contact: PatientContact,
}

impl BookVisitRequest {
    /// The identity as stored and compared, without surrounding whitespace.
    pub fn identity(&self) -> Result<&str, ScheduleError> {
        let identity = self.patient_identity.trim();
        if identity.is_empty() {
            return Err(ScheduleError::MissingIdentity);
        }
        Ok(identity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelVisitRequest {
    pub outcome: VisitOutcome,
}

// ==============================================================================
// RESCHEDULE OUTPUT
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotAssignment {
    pub visit_id: Uuid,
    pub serial: u32,
    pub scheduled_time: NaiveDateTime,
}

/// The authoritative serial/time of every slot-holding visit after a recompute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RescheduleResult {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub assignments: Vec<SlotAssignment>,
}

impl RescheduleResult {
    pub fn empty(key: DayKey) -> Self {
        Self {
            doctor_id: key.doctor_id,
            date: key.date,
            assignments: Vec::new(),
        }
    }

    pub fn assignment_for(&self, visit_id: Uuid) -> Option<&SlotAssignment> {
        self.assignments.iter().find(|a| a.visit_id == visit_id)
    }
}

// ==============================================================================
// DAY VIEW
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySchedule {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub window: Option<AvailabilityWindow>,
    /// Scheduled visits ordered by serial.
    pub visits: Vec<Visit>,
    /// Completed, absent and cancelled visits, keeping the serial they last held.
    pub released: Vec<Visit>,
    pub capacity_remaining: u32,
}

impl DaySchedule {
    /// Serial of the next visit still waiting at `now`. Derived on read, never stored.
    pub fn now_serving(&self, now: NaiveDateTime) -> Option<u32> {
        self.visits
            .iter()
            .filter(|v| v.status == VisitStatus::Scheduled)
            .find(|v| v.scheduled_time >= now)
            .map(|v| v.serial)
    }
}

// ==============================================================================
// NOTIFICATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Booked,
    Released,
    Rescheduled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleNotification {
    pub kind: NotificationKind,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub visit_id: Uuid,
    pub serial: u32,
    pub scheduled_time: NaiveDateTime,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
