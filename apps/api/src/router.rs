use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use scheduling_cell::router::scheduling_routes;
use scheduling_cell::services::scheduling::ScheduleService;

pub fn create_router(service: Arc<ScheduleService>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic schedule API is running!" }))
        .nest("/schedule", scheduling_routes(service))
}
