// libs/scheduling-cell/src/services/scheduling.rs
//
// Entry point for every schedule mutation. Each operation takes the day lease,
// reads the day, runs the guard/sequencer/allocator or the reschedule engine,
// and persists the outcome with one store commit, re-checked against the lease,
// before the lease is released.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::ScheduleError;
use crate::models::{
    AvailabilityWindow, BookVisitRequest, DayKey, DaySchedule, NotificationKind,
    RescheduleResult, ScheduleNotification, SlotAssignment, Visit, VisitOutcome, VisitStatus,
    WindowRequest,
};
use crate::services::allocator::SlotAllocator;
use crate::services::capacity::CapacityGuard;
use crate::services::duration::{DurationPolicies, FlatDuration, ReasonDurationTable};
use crate::services::locks::{DayLease, DayLockProvider, InProcessDayLocks};
use crate::services::notifier::{ScheduleNotifier, TracingNotifier};
use crate::services::reschedule::RescheduleEngine;
use crate::services::sequencer::SerialSequencer;
use crate::services::store::{DayCommit, InMemoryScheduleStore, ScheduleStore};

pub struct ScheduleService {
    store: Arc<dyn ScheduleStore>,
    locks: Arc<dyn DayLockProvider>,
    notifier: Arc<dyn ScheduleNotifier>,
    policies: DurationPolicies,
}

impl ScheduleService {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        locks: Arc<dyn DayLockProvider>,
        notifier: Arc<dyn ScheduleNotifier>,
    ) -> Self {
        Self {
            store,
            locks,
            notifier,
            policies: DurationPolicies::default(),
        }
    }

    /// In-memory store, in-process locks and log-only notifications.
    pub fn in_memory(store: Arc<InMemoryScheduleStore>) -> Self {
        Self::new(
            store,
            Arc::new(InProcessDayLocks::new(Duration::from_secs(5))),
            Arc::new(TracingNotifier),
        )
    }

    pub fn with_policies(mut self, policies: DurationPolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_config(self, config: &AppConfig) -> Self {
        self.with_policies(DurationPolicies::new(
            ReasonDurationTable::standard(),
            FlatDuration::new(config.flat_visit_minutes),
        ))
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    #[instrument(skip(self, request), fields(reason = %request.reason))]
    pub async fn book_visit(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        request: BookVisitRequest,
    ) -> Result<Visit, ScheduleError> {
        request.identity()?;

        let key = DayKey::new(doctor_id, date);
        let lease = self.locks.acquire(&key).await?;
        let outcome = self.book_locked(&lease, request).await;
        self.release(lease).await;

        let visit = outcome?;
        info!("Booked visit {} as serial {} at {} for {}",
              visit.id, visit.serial, visit.scheduled_time, key);

        self.dispatch(vec![notification(NotificationKind::Booked, &key, visit.id, visit.serial, visit.scheduled_time)]);
        Ok(visit)
    }

    async fn book_locked(&self, lease: &DayLease, request: BookVisitRequest) -> Result<Visit, ScheduleError> {
        let key = lease.key();
        let window = self.store.window(key).await?.ok_or(ScheduleError::NoWindow)?;
        window.validate()?;

        let day = self.store.visits_for_day(key).await?;
        let mut holding: Vec<&Visit> = day.iter().filter(|v| v.status.holds_slot()).collect();
        holding.sort_by_key(|v| v.serial);

        let clearance = CapacityGuard::can_book(
            &window,
            holding.len(),
            &request.patient_identity,
            holding.iter().map(|v| v.patient_identity.as_str()),
        )?;
        let serial = SerialSequencer::assign(&clearance, holding.iter().map(|v| v.serial))?;

        let category = self.store.doctor_category(key.doctor_id).await?;
        let policy = self.policies.for_category(category);
        let prior_durations = holding
            .iter()
            .map(|v| policy.duration(v.reason))
            .collect::<Result<Vec<u32>, _>>()?;
        policy.duration(request.reason)?;

        let scheduled_time = SlotAllocator::allocate(&window, &prior_durations);
        if scheduled_time >= window.ends_at() {
            warn!("Serial {} for {} starts at {}, after the window closes", serial, key, scheduled_time);
        }

        let now = Utc::now();
        let visit = Visit {
            id: Uuid::new_v4(),
            doctor_id: key.doctor_id,
            date: key.date,
            patient_identity: request.identity()?.to_string(),
            contact: request.contact,
            reason: request.reason,
            serial,
            scheduled_time,
            status: VisitStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };

        lease.ensure_held().await?;
        self.store.commit(key, DayCommit::Insert { visit: visit.clone() }).await?;
        Ok(visit)
    }

    // ==========================================================================
    // STATUS CHANGES
    // ==========================================================================

    /// Release a visit as absent or cancelled and close the gap it leaves.
    #[instrument(skip(self))]
    pub async fn cancel_visit(
        &self,
        visit_id: Uuid,
        outcome: VisitOutcome,
    ) -> Result<RescheduleResult, ScheduleError> {
        let key = self.day_of_visit(visit_id).await?;
        let lease = self.locks.acquire(&key).await?;
        let result = self.leave_day_locked(&lease, visit_id, outcome.into()).await;
        self.release(lease).await;

        let (visit, result, mut notifications) = result?;
        info!("Visit {} marked {:?}; {} visits rescheduled on {}",
              visit_id, outcome, result.assignments.len(), key);

        notifications.insert(0, notification(
            NotificationKind::Released, &key, visit.id, visit.serial, visit.scheduled_time,
        ));
        self.dispatch(notifications);
        Ok(result)
    }

    /// Completion frees the serial too; the visits after it move up.
    #[instrument(skip(self))]
    pub async fn complete_visit(&self, visit_id: Uuid) -> Result<Visit, ScheduleError> {
        let key = self.day_of_visit(visit_id).await?;
        let lease = self.locks.acquire(&key).await?;
        let result = self.leave_day_locked(&lease, visit_id, VisitStatus::Completed).await;
        self.release(lease).await;

        let (visit, result, notifications) = result?;
        info!("Visit {} completed (serial {}); {} visits rescheduled on {}",
              visit.id, visit.serial, result.assignments.len(), key);

        self.dispatch(notifications);
        Ok(visit)
    }

    /// Move a scheduled visit to a terminal status and compact the rest of
    /// the day in the same commit.
    async fn leave_day_locked(
        &self,
        lease: &DayLease,
        visit_id: Uuid,
        status: VisitStatus,
    ) -> Result<(Visit, RescheduleResult, Vec<ScheduleNotification>), ScheduleError> {
        let key = lease.key();
        let mut visit = self.load_visit(visit_id).await?;
        if !visit.status.can_transition_to(status) {
            return Err(ScheduleError::InvalidStatusTransition(visit.status));
        }

        let window = self.store.window(key).await?.ok_or(ScheduleError::NoWindow)?;
        let remaining: Vec<Visit> = self
            .store
            .visits_for_day(key)
            .await?
            .into_iter()
            .filter(|v| v.id != visit_id && v.status.holds_slot())
            .collect();

        let result = self.recompute(key, &window, remaining.clone()).await?;
        let notifications = rescheduled(key, &remaining, &result);

        lease.ensure_held().await?;
        self.store
            .commit(key, DayCommit::Transition {
                visit_id,
                status,
                assignments: result.assignments.clone(),
            })
            .await?;

        visit.status = status;
        visit.updated_at = Utc::now();
        Ok((visit, result, notifications))
    }

    // ==========================================================================
    // WINDOW EDITS
    // ==========================================================================

    /// Create or replace a day's window and re-time every visit against it.
    #[instrument(skip(self, request))]
    pub async fn edit_window(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        request: WindowRequest,
    ) -> Result<RescheduleResult, ScheduleError> {
        let key = DayKey::new(doctor_id, date);
        let window = AvailabilityWindow::from_request(key, request)?;

        let lease = self.locks.acquire(&key).await?;
        let result = self.edit_window_locked(&lease, window).await;
        self.release(lease).await;

        let (result, notifications) = result?;
        info!("Window updated for {}; {} visits re-timed", key, notifications.len());

        self.dispatch(notifications);
        Ok(result)
    }

    async fn edit_window_locked(
        &self,
        lease: &DayLease,
        window: AvailabilityWindow,
    ) -> Result<(RescheduleResult, Vec<ScheduleNotification>), ScheduleError> {
        let key = lease.key();
        let holding: Vec<Visit> = self
            .store
            .visits_for_day(key)
            .await?
            .into_iter()
            .filter(|v| v.status.holds_slot())
            .collect();

        if holding.len() > window.max_appointments as usize {
            return Err(ScheduleError::InvalidWindow(format!(
                "capacity {} is below the {} visits already booked",
                window.max_appointments,
                holding.len()
            )));
        }

        let result = self.recompute(key, &window, holding.clone()).await?;
        let notifications = rescheduled(key, &holding, &result);

        lease.ensure_held().await?;
        self.store
            .commit(key, DayCommit::Window {
                window,
                assignments: result.assignments.clone(),
            })
            .await?;

        Ok((result, notifications))
    }

    /// Recompute a day against its current window. Repeating it changes nothing.
    #[instrument(skip(self))]
    pub async fn reschedule_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<RescheduleResult, ScheduleError> {
        let key = DayKey::new(doctor_id, date);
        let lease = self.locks.acquire(&key).await?;
        let result = self.reschedule_locked(&lease).await;
        self.release(lease).await;

        let (result, notifications) = result?;
        self.dispatch(notifications);
        Ok(result)
    }

    async fn reschedule_locked(
        &self,
        lease: &DayLease,
    ) -> Result<(RescheduleResult, Vec<ScheduleNotification>), ScheduleError> {
        let key = lease.key();
        let window = match self.store.window(key).await? {
            Some(window) => window,
            None => return Ok((RescheduleResult::empty(*key), Vec::new())),
        };

        let holding: Vec<Visit> = self
            .store
            .visits_for_day(key)
            .await?
            .into_iter()
            .filter(|v| v.status.holds_slot())
            .collect();

        let result = self.recompute(key, &window, holding.clone()).await?;
        let notifications = rescheduled(key, &holding, &result);

        if !notifications.is_empty() {
            lease.ensure_held().await?;
            self.store
                .commit(key, DayCommit::Window {
                    window,
                    assignments: result.assignments.clone(),
                })
                .await?;
        }

        Ok((result, notifications))
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    pub async fn get_day_schedule(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<DaySchedule, ScheduleError> {
        let key = DayKey::new(doctor_id, date);
        let window = self.store.window(&key).await?;
        let (visits, released): (Vec<Visit>, Vec<Visit>) = self
            .store
            .visits_for_day(&key)
            .await?
            .into_iter()
            .partition(|v| v.status.holds_slot());

        let capacity_remaining = window
            .as_ref()
            .map_or(0, |w| w.capacity_remaining(visits.len()));

        Ok(DaySchedule {
            doctor_id,
            date,
            window,
            visits,
            released,
            capacity_remaining,
        })
    }

    pub async fn get_visit(&self, visit_id: Uuid) -> Result<Visit, ScheduleError> {
        self.load_visit(visit_id).await
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    async fn recompute(
        &self,
        key: &DayKey,
        window: &AvailabilityWindow,
        visits: Vec<Visit>,
    ) -> Result<RescheduleResult, ScheduleError> {
        let category = self.store.doctor_category(key.doctor_id).await?;
        RescheduleEngine::recompute(window, self.policies.for_category(category), visits)
    }

    async fn load_visit(&self, visit_id: Uuid) -> Result<Visit, ScheduleError> {
        self.store
            .visit(visit_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound(format!("visit {}", visit_id)))
    }

    async fn day_of_visit(&self, visit_id: Uuid) -> Result<DayKey, ScheduleError> {
        Ok(self.load_visit(visit_id).await?.day_key())
    }

    async fn release(&self, lease: DayLease) {
        let key = *lease.key();
        if let Err(e) = lease.release().await {
            warn!("Failed to release day lock {}: {}", key, e);
        }
    }

    fn dispatch(&self, notifications: Vec<ScheduleNotification>) {
        if notifications.is_empty() {
            return;
        }
        debug!("Dispatching {} schedule notifications", notifications.len());

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            for notification in notifications {
                notifier.notify(notification).await;
            }
        });
    }
}

fn notification(
    kind: NotificationKind,
    key: &DayKey,
    visit_id: Uuid,
    serial: u32,
    scheduled_time: chrono::NaiveDateTime,
) -> ScheduleNotification {
    ScheduleNotification {
        kind,
        doctor_id: key.doctor_id,
        date: key.date,
        visit_id,
        serial,
        scheduled_time,
    }
}

fn rescheduled(key: &DayKey, before: &[Visit], result: &RescheduleResult) -> Vec<ScheduleNotification> {
    RescheduleEngine::changed(before, result)
        .map(|a: &SlotAssignment| {
            notification(NotificationKind::Rescheduled, key, a.visit_id, a.serial, a.scheduled_time)
        })
        .collect()
}
