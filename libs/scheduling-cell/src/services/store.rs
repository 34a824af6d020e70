// libs/scheduling-cell/src/services/store.rs
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{AvailabilityWindow, DayKey, DoctorCategory, SlotAssignment, Visit, VisitStatus};

/// Every mutation of a day, applied by the store as a single unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DayCommit {
    Insert {
        visit: Visit,
    },
    Transition {
        visit_id: Uuid,
        status: VisitStatus,
        assignments: Vec<SlotAssignment>,
    },
    Window {
        window: AvailabilityWindow,
        assignments: Vec<SlotAssignment>,
    },
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn window(&self, key: &DayKey) -> Result<Option<AvailabilityWindow>, ScheduleError>;

    /// All visits of the day in any status, ordered by serial.
    async fn visits_for_day(&self, key: &DayKey) -> Result<Vec<Visit>, ScheduleError>;

    async fn visit(&self, visit_id: Uuid) -> Result<Option<Visit>, ScheduleError>;

    /// Unknown doctors are treated as general practice.
    async fn doctor_category(&self, doctor_id: Uuid) -> Result<DoctorCategory, ScheduleError>;

    async fn commit(&self, key: &DayKey, commit: DayCommit) -> Result<(), ScheduleError>;
}

#[derive(Default)]
struct MemoryState {
    windows: HashMap<DayKey, AvailabilityWindow>,
    visits: HashMap<Uuid, Visit>,
    categories: HashMap<Uuid, DoctorCategory>,
}

#[derive(Default)]
pub struct InMemoryScheduleStore {
    state: RwLock<MemoryState>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_doctor(&self, doctor_id: Uuid, category: DoctorCategory) {
        let mut state = self.state.write().await;
        state.categories.insert(doctor_id, category);
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn window(&self, key: &DayKey) -> Result<Option<AvailabilityWindow>, ScheduleError> {
        let state = self.state.read().await;
        Ok(state.windows.get(key).cloned())
    }

    async fn visits_for_day(&self, key: &DayKey) -> Result<Vec<Visit>, ScheduleError> {
        let state = self.state.read().await;
        let mut visits: Vec<Visit> = state
            .visits
            .values()
            .filter(|v| v.day_key() == *key)
            .cloned()
            .collect();
        visits.sort_by(|a, b| a.serial.cmp(&b.serial).then(a.created_at.cmp(&b.created_at)));
        Ok(visits)
    }

    async fn visit(&self, visit_id: Uuid) -> Result<Option<Visit>, ScheduleError> {
        let state = self.state.read().await;
        Ok(state.visits.get(&visit_id).cloned())
    }

    async fn doctor_category(&self, doctor_id: Uuid) -> Result<DoctorCategory, ScheduleError> {
        let state = self.state.read().await;
        Ok(state.categories.get(&doctor_id).copied().unwrap_or_default())
    }

    async fn commit(&self, key: &DayKey, commit: DayCommit) -> Result<(), ScheduleError> {
        let mut state = self.state.write().await;

        // Validate everything before touching state so a rejected commit changes nothing.
        match &commit {
            DayCommit::Insert { visit } => {
                if visit.day_key() != *key {
                    return Err(ScheduleError::Storage(format!(
                        "visit {} does not belong to day {}", visit.id, key
                    )));
                }
                if state.visits.contains_key(&visit.id) {
                    return Err(ScheduleError::Storage(format!("visit {} already exists", visit.id)));
                }
            }
            DayCommit::Transition { visit_id, assignments, .. } => {
                ensure_day_visit(&state, key, *visit_id)?;
                for assignment in assignments {
                    ensure_day_visit(&state, key, assignment.visit_id)?;
                }
            }
            DayCommit::Window { window, assignments } => {
                if window.key() != *key {
                    return Err(ScheduleError::Storage(format!(
                        "window does not belong to day {}", key
                    )));
                }
                for assignment in assignments {
                    ensure_day_visit(&state, key, assignment.visit_id)?;
                }
            }
        }

        let now = Utc::now();
        match commit {
            DayCommit::Insert { visit } => {
                debug!("Inserting visit {} as serial {} on {}", visit.id, visit.serial, key);
                state.visits.insert(visit.id, visit);
            }
            DayCommit::Transition { visit_id, status, assignments } => {
                if let Some(visit) = state.visits.get_mut(&visit_id) {
                    visit.status = status;
                    visit.updated_at = now;
                }
                apply_assignments(&mut state, &assignments, now);
            }
            DayCommit::Window { window, assignments } => {
                state.windows.insert(*key, window);
                apply_assignments(&mut state, &assignments, now);
            }
        }

        Ok(())
    }
}

fn ensure_day_visit(state: &MemoryState, key: &DayKey, visit_id: Uuid) -> Result<(), ScheduleError> {
    match state.visits.get(&visit_id) {
        Some(visit) if visit.day_key() == *key => Ok(()),
        Some(_) => Err(ScheduleError::Storage(format!(
            "visit {} does not belong to day {}", visit_id, key
        ))),
        None => Err(ScheduleError::NotFound(format!("visit {}", visit_id))),
    }
}

fn apply_assignments(state: &mut MemoryState, assignments: &[SlotAssignment], now: chrono::DateTime<Utc>) {
    for assignment in assignments {
        if let Some(visit) = state.visits.get_mut(&assignment.visit_id) {
            if visit.serial != assignment.serial || visit.scheduled_time != assignment.scheduled_time {
                visit.serial = assignment.serial;
                visit.scheduled_time = assignment.scheduled_time;
                visit.updated_at = now;
            }
        }
    }
}
