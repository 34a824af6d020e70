use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::handlers;
use crate::services::scheduling::ScheduleService;

pub fn scheduling_routes(service: Arc<ScheduleService>) -> Router {
    Router::new()
        .route("/doctors/{doctor_id}/days/{date}", get(handlers::get_day_schedule))
        .route("/doctors/{doctor_id}/days/{date}/visits", post(handlers::book_visit))
        .route("/doctors/{doctor_id}/days/{date}/window", put(handlers::edit_window))
        .route("/doctors/{doctor_id}/days/{date}/reschedule", post(handlers::reschedule_day))
        .route("/visits/{visit_id}", get(handlers::get_visit))
        .route("/visits/{visit_id}/cancel", post(handlers::cancel_visit))
        .route("/visits/{visit_id}/complete", post(handlers::complete_visit))
        .with_state(service)
}
