use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{BookVisitRequest, CancelVisitRequest, WindowRequest};
use crate::services::scheduling::ScheduleService;

#[derive(Debug, Deserialize)]
pub struct DayScheduleQuery {
    /// Reference time for `now_serving`; defaults to the server's local clock.
    pub at: Option<NaiveDateTime>,
}

/// Book the next serial of a doctor's day.
pub async fn book_visit(
    State(service): State<Arc<ScheduleService>>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
    Json(request): Json<BookVisitRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Booking request for doctor {} on {}", doctor_id, date);

    let visit = service.book_visit(doctor_id, date, request).await?;

    Ok(Json(json!({
        "success": true,
        "visit": visit,
        "serial": visit.serial,
        "scheduled_time": visit.scheduled_time,
    })))
}

pub async fn get_day_schedule(
    State(service): State<Arc<ScheduleService>>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
    Query(query): Query<DayScheduleQuery>,
) -> Result<Json<Value>, AppError> {
    let schedule = service.get_day_schedule(doctor_id, date).await?;
    let now = query.at.unwrap_or_else(|| Local::now().naive_local());

    Ok(Json(json!({
        "success": true,
        "now_serving": schedule.now_serving(now),
        "schedule": schedule,
    })))
}

/// Create or replace the day's window; every booked visit is re-timed.
pub async fn edit_window(
    State(service): State<Arc<ScheduleService>>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
    Json(request): Json<WindowRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Window update for doctor {} on {}", doctor_id, date);

    let result = service.edit_window(doctor_id, date, request).await?;

    Ok(Json(json!({
        "success": true,
        "reschedule": result,
    })))
}

pub async fn reschedule_day(
    State(service): State<Arc<ScheduleService>>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<Value>, AppError> {
    let result = service.reschedule_day(doctor_id, date).await?;

    Ok(Json(json!({
        "success": true,
        "reschedule": result,
    })))
}

pub async fn get_visit(
    State(service): State<Arc<ScheduleService>>,
    Path(visit_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let visit = service.get_visit(visit_id).await?;

    Ok(Json(json!({
        "success": true,
        "visit": visit,
    })))
}

/// Mark a visit absent or cancelled and close the gap it leaves.
pub async fn cancel_visit(
    State(service): State<Arc<ScheduleService>>,
    Path(visit_id): Path<Uuid>,
    Json(request): Json<CancelVisitRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Release request for visit {}: {:?}", visit_id, request.outcome);

    let result = service.cancel_visit(visit_id, request.outcome).await?;

    Ok(Json(json!({
        "success": true,
        "reschedule": result,
    })))
}

pub async fn complete_visit(
    State(service): State<Arc<ScheduleService>>,
    Path(visit_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let visit = service.complete_visit(visit_id).await?;

    Ok(Json(json!({
        "success": true,
        "visit": visit,
    })))
}
