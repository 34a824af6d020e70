// libs/scheduling-cell/src/services/supabase_store.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::ScheduleError;
use crate::models::{
    AvailabilityWindow, DayKey, DoctorCategory, PatientContact, SlotAssignment, Visit,
    VisitReason, VisitStatus,
};
use crate::services::store::{DayCommit, ScheduleStore};

const COMMIT_FUNCTION: &str = "commit_schedule_day";

/// Row of `doctor_schedules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScheduleRow {
    doctor_id: Uuid,
    availability_date: NaiveDate,
    start_time: NaiveTime,
    break_start: NaiveTime,
    break_end: NaiveTime,
    end_time: NaiveTime,
    max_appointments: i32,
    location: Option<String>,
}

impl ScheduleRow {
    fn from_window(window: &AvailabilityWindow) -> Self {
        Self {
            doctor_id: window.doctor_id,
            availability_date: window.date,
            start_time: window.start_time,
            break_start: window.break_start,
            break_end: window.break_end,
            end_time: window.end_time,
            max_appointments: i32::try_from(window.max_appointments).unwrap_or(i32::MAX),
            location: window.location.clone(),
        }
    }

    fn into_window(self) -> AvailabilityWindow {
        AvailabilityWindow {
            doctor_id: self.doctor_id,
            date: self.availability_date,
            start_time: self.start_time,
            break_start: self.break_start,
            break_end: self.break_end,
            end_time: self.end_time,
            // A negative capacity fails `validate` downstream as zero.
            max_appointments: u32::try_from(self.max_appointments).unwrap_or(0),
            location: self.location,
        }
    }
}

/// Row of `appointments`. `reason` is kept as the portal's label text and the
/// visit time lives in `appointment_time`, next to `appointment_date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppointmentRow {
    id: Uuid,
    doctor_id: Uuid,
    appointment_date: NaiveDate,
    appointment_time: NaiveTime,
    serial_number: i32,
    #[serde(with = "pin_column")]
    pin: String,
    name: String,
    phone: String,
    concern: String,
    reason: String,
    status: VisitStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AppointmentRow {
    fn from_visit(visit: &Visit) -> Self {
        Self {
            id: visit.id,
            doctor_id: visit.doctor_id,
            appointment_date: visit.date,
            appointment_time: visit.scheduled_time.time(),
            serial_number: serial_column(visit.serial),
            pin: visit.patient_identity.clone(),
            name: visit.contact.name.clone(),
            phone: visit.contact.phone.clone(),
            concern: visit.contact.concern.clone(),
            reason: visit.reason.label().to_string(),
            status: visit.status,
            created_at: visit.created_at,
            updated_at: visit.updated_at,
        }
    }

    fn into_visit(self) -> Result<Visit, ScheduleError> {
        let reason: VisitReason = self.reason.parse().map_err(|e| {
            error!("Appointment {} carries an unrecognised reason {:?}", self.id, self.reason);
            e
        })?;

        Ok(Visit {
            id: self.id,
            doctor_id: self.doctor_id,
            date: self.appointment_date,
            patient_identity: self.pin,
            contact: PatientContact {
                name: self.name,
                phone: self.phone,
                concern: self.concern,
            },
            reason,
            serial: u32::try_from(self.serial_number).unwrap_or(0),
            scheduled_time: self.appointment_date.and_time(self.appointment_time),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// `pin` is a numeric column; identities are strings everywhere else.
mod pin_column {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Pin {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(pin: &str, serializer: S) -> Result<S::Ok, S::Error> {
        match pin.parse::<i64>() {
            Ok(number) => serializer.serialize_i64(number),
            Err(_) => serializer.serialize_str(pin),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Pin::deserialize(deserializer)? {
            Pin::Number(number) => number.to_string(),
            Pin::Text(text) => text,
        })
    }
}

fn serial_column(serial: u32) -> i32 {
    i32::try_from(serial).unwrap_or(i32::MAX)
}

fn assignment_rows(assignments: &[SlotAssignment]) -> Vec<Value> {
    assignments
        .iter()
        .map(|a| {
            json!({
                "id": a.visit_id,
                "serial_number": serial_column(a.serial),
                "appointment_time": a.scheduled_time.time(),
            })
        })
        .collect()
}

/// PostgREST-backed store. Day commits go through a single RPC so the
/// database applies each batch in one transaction.
pub struct SupabaseScheduleStore {
    supabase: SupabaseClient,
}

impl SupabaseScheduleStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn commit_payload(key: &DayKey, commit: &DayCommit) -> Value {
        let change = match commit {
            DayCommit::Insert { visit } => json!({
                "type": "insert",
                "appointment": AppointmentRow::from_visit(visit),
            }),
            DayCommit::Transition { visit_id, status, assignments } => json!({
                "type": "transition",
                "appointment_id": visit_id,
                "status": status,
                "assignments": assignment_rows(assignments),
            }),
            DayCommit::Window { window, assignments } => json!({
                "type": "window",
                "schedule": ScheduleRow::from_window(window),
                "assignments": assignment_rows(assignments),
            }),
        };

        json!({
            "p_doctor_id": key.doctor_id,
            "p_date": key.date,
            "p_change": change,
        })
    }
}

#[async_trait]
impl ScheduleStore for SupabaseScheduleStore {
    async fn window(&self, key: &DayKey) -> Result<Option<AvailabilityWindow>, ScheduleError> {
        let path = format!(
            "/rest/v1/doctor_schedules?doctor_id=eq.{}&availability_date=eq.{}&select=*",
            key.doctor_id, key.date
        );
        let rows: Vec<ScheduleRow> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next().map(ScheduleRow::into_window))
    }

    async fn visits_for_day(&self, key: &DayKey) -> Result<Vec<Visit>, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&order=serial_number.asc,created_at.asc",
            key.doctor_id, key.date
        );
        let rows: Vec<AppointmentRow> = self.supabase.request(Method::GET, &path, None, None).await?;
        debug!("Loaded {} appointments for {}", rows.len(), key);

        rows.into_iter().map(AppointmentRow::into_visit).collect()
    }

    async fn visit(&self, visit_id: Uuid) -> Result<Option<Visit>, ScheduleError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", visit_id);
        let rows: Vec<AppointmentRow> = self.supabase.request(Method::GET, &path, None, None).await?;
        rows.into_iter().next().map(AppointmentRow::into_visit).transpose()
    }

    async fn doctor_category(&self, doctor_id: Uuid) -> Result<DoctorCategory, ScheduleError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=doctor_type", doctor_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;

        match rows
            .first()
            .and_then(|row| row.get("doctor_type"))
            .and_then(|v| v.as_str())
        {
            Some(doctor_type) => doctor_type.parse(),
            None => Ok(DoctorCategory::default()),
        }
    }

    async fn commit(&self, key: &DayKey, commit: DayCommit) -> Result<(), ScheduleError> {
        let payload = Self::commit_payload(key, &commit);
        let _: Value = self.supabase.rpc(COMMIT_FUNCTION, None, payload).await?;
        debug!("Committed schedule change for {}", key);
        Ok(())
    }
}
