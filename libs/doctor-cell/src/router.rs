use std::sync::Arc;

use axum::{
    routing::{get, patch},
    Router,
};

use crate::handlers;
use crate::services::DirectoryService;

/// Admin surface for the clinic directory.
pub fn directory_routes(directory: Arc<DirectoryService>) -> Router {
    Router::new()
        .route("/specialties", get(handlers::list_specialties).post(handlers::create_specialty))
        .route("/specialties/match", get(handlers::match_specialty_text))
        .route("/specialties/{specialty_id}/active", patch(handlers::set_specialty_active))
        .route("/locations", get(handlers::list_locations).post(handlers::create_location))
        .route("/locations/{location_id}/active", patch(handlers::set_location_active))
        .route("/doctors", get(handlers::list_doctors).post(handlers::create_doctor))
        .route("/doctors/match", get(handlers::match_doctor_text))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor))
        .route("/doctors/{doctor_id}/active", patch(handlers::set_doctor_active))
        .route(
            "/doctors/{doctor_id}/availability",
            get(handlers::list_availability).post(handlers::add_availability),
        )
        .with_state(directory)
}
