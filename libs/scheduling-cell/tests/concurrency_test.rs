// libs/scheduling-cell/tests/concurrency_test.rs
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_test::assert_ok;
use uuid::Uuid;

use scheduling_cell::error::ScheduleError;
use scheduling_cell::models::*;
use scheduling_cell::services::{
    locks::{DayLockProvider, InProcessDayLocks},
    notifier::TracingNotifier,
    scheduling::ScheduleService,
    store::InMemoryScheduleStore,
};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 20).unwrap()
}

fn booking(pin: String) -> BookVisitRequest {
    BookVisitRequest {
        patient_identity: pin,
        reason: VisitReason::FollowUp,
        contact: PatientContact::default(),
    }
}

async fn shared_service(max_appointments: u32) -> (Arc<ScheduleService>, Uuid) {
    let service = Arc::new(ScheduleService::new(
        Arc::new(InMemoryScheduleStore::new()),
        Arc::new(InProcessDayLocks::new(Duration::from_secs(10))),
        Arc::new(TracingNotifier),
    ));
    let doctor = Uuid::new_v4();
    service
        .edit_window(doctor, date(), WindowRequest {
            max_appointments,
            ..WindowRequest::default()
        })
        .await
        .unwrap();
    (service, doctor)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_slot_goes_to_exactly_one_request() {
    let (service, doctor) = shared_service(5).await;
    for index in 0..4 {
        service.book_visit(doctor, date(), booking(format!("early-{}", index))).await.unwrap();
    }

    let handles: Vec<_> = (0..16)
        .map(|index| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.book_visit(doctor, date(), booking(format!("race-{}", index))).await })
        })
        .collect();
    let results: Vec<Result<Visit, ScheduleError>> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<&Visit> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].serial, 5);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, ScheduleError::CapacityExceeded { max_appointments: 5 })));

    let schedule = service.get_day_schedule(doctor, date()).await.unwrap();
    assert_eq!(schedule.visits.len(), 5);
    assert_eq!(schedule.capacity_remaining, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_identity_race_admits_one() {
    let (service, doctor) = shared_service(17).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.book_visit(doctor, date(), booking("4821".to_string())).await })
        })
        .collect();
    let results: Vec<Result<Visit, ScheduleError>> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == ScheduleError::DuplicateIdentity));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_and_cancellations_keep_serials_unique() {
    let (service, doctor) = shared_service(17).await;
    let mut seeded = Vec::new();
    for index in 0..6 {
        let visit = service.book_visit(doctor, date(), booking(format!("seed-{}", index))).await.unwrap();
        seeded.push(visit.id);
    }

    let mut handles = Vec::new();
    for index in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.book_visit(doctor, date(), booking(format!("new-{}", index))).await.map(|_| ())
        }));
    }
    for visit_id in seeded.iter().step_by(2).copied() {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.cancel_visit(visit_id, VisitOutcome::Cancelled).await.map(|_| ())
        }));
    }
    for joined in futures::future::join_all(handles).await {
        joined.unwrap().unwrap();
    }

    let schedule = service.get_day_schedule(doctor, date()).await.unwrap();
    let serials: Vec<u32> = schedule.visits.iter().map(|v| v.serial).collect();
    assert_eq!(serials, (1..=11).collect::<Vec<u32>>());

    let times: HashSet<_> = schedule.visits.iter().map(|v| v.scheduled_time).collect();
    assert_eq!(times.len(), schedule.visits.len());
    for pair in schedule.visits.windows(2) {
        assert!(pair[0].scheduled_time < pair[1].scheduled_time);
    }
}

#[tokio::test]
async fn days_are_locked_independently() {
    let locks = Arc::new(InProcessDayLocks::new(Duration::from_millis(100)));
    let service = ScheduleService::new(
        Arc::new(InMemoryScheduleStore::new()),
        locks.clone(),
        Arc::new(TracingNotifier),
    );
    let doctor = Uuid::new_v4();
    let other_day = date().succ_opt().unwrap();
    service.edit_window(doctor, other_day, WindowRequest::default()).await.unwrap();

    let held = locks.acquire(&DayKey::new(doctor, date())).await.unwrap();

    assert_ok!(service.book_visit(doctor, other_day, booking("1".to_string())).await);
    assert_eq!(
        service.book_visit(doctor, date(), booking("2".to_string())).await,
        Err(ScheduleError::ScheduleBusy)
    );

    held.release().await.unwrap();
}
