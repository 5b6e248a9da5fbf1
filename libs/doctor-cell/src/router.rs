use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(handlers::list_doctors))
        .route("/{doctor_id}", get(handlers::get_doctor))
        .route("/{doctor_id}/slots", get(handlers::get_slot_calendar))
        .route("/{doctor_id}/availability", put(handlers::replace_availability))
        .route("/{doctor_id}/leave-overrides/{date}", put(handlers::set_leave_override))
        .with_state(state)
}
