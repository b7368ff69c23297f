use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::services::SlotAllocationService;

/// Admin surface over the slot allocation engine.
pub fn appointment_routes(allocation: Arc<SlotAllocationService>) -> Router {
    Router::new()
        .route("/", post(handlers::reserve_slot))
        .route("/candidates", get(handlers::find_candidates))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/patients/{patient_id}", get(handlers::patient_appointments))
        .with_state(allocation)
}
