use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{IdentityStatus, UpdateContactRequest};
use crate::services::national_id;
use crate::services::IdentityResolver;

#[axum::debug_handler]
pub async fn get_patient(
    State(resolver): State<Arc<IdentityResolver>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let patient = resolver.get_patient(patient_id).await?;
    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn lookup_by_national_id(
    State(resolver): State<Arc<IdentityResolver>>,
    Path(cpf): Path<String>,
) -> Result<Json<Value>, AppError> {
    let body = match resolver.resolve(&cpf).await? {
        IdentityStatus::Found(patient) => json!({
            "status": "found",
            "cpf": national_id::format(&patient.national_id),
            "patient": patient,
        }),
        IdentityStatus::NotFound => json!({ "status": "not_found" }),
        IdentityStatus::Invalid => json!({ "status": "invalid" }),
    };
    Ok(Json(body))
}

#[axum::debug_handler]
pub async fn update_contact(
    State(resolver): State<Arc<IdentityResolver>>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<UpdateContactRequest>,
) -> Result<Json<Value>, AppError> {
    let patient = resolver.update_contact(patient_id, request).await?;
    Ok(Json(json!(patient)))
}
