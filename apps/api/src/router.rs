use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, SlotAllocationService};
use conversation_cell::{chat_routes, ConversationEngine};
use doctor_cell::{directory_routes, DirectoryService};
use patient_cell::{patient_routes, IdentityResolver};

pub struct AppServices {
    pub engine: Arc<ConversationEngine>,
    pub identity: Arc<IdentityResolver>,
    pub directory: Arc<DirectoryService>,
    pub allocation: Arc<SlotAllocationService>,
}

pub fn create_router(services: AppServices) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic chat API is running!" }))
        .nest("/chat", chat_routes(services.engine))
        .nest("/admin/patients", patient_routes(services.identity))
        .nest("/admin/directory", directory_routes(services.directory))
        .nest("/admin/appointments", appointment_routes(services.allocation))
}
