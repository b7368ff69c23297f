use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};

use crate::handlers::*;
use crate::services::IdentityResolver;

/// Admin surface for patient records.
pub fn patient_routes(resolver: Arc<IdentityResolver>) -> Router {
    Router::new()
        .route("/{id}", get(get_patient))
        .route("/{id}/contact", put(update_contact))
        .route("/by-cpf/{cpf}", get(lookup_by_national_id))
        .with_state(resolver)
}
