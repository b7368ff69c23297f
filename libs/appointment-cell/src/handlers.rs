use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::Slot;

use crate::models::{CancelOutcome, CandidateQuery};
use crate::services::SlotAllocationService;

// ==============================================================================
// REQUEST TYPES
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct CandidateParams {
    pub specialty_id: Uuid,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub doctor_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub patient_id: Uuid,
    pub slot: Slot,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub patient_id: Uuid,
}

// ==============================================================================
// HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn find_candidates(
    State(allocation): State<Arc<SlotAllocationService>>,
    Query(params): Query<CandidateParams>,
) -> Result<Json<Value>, AppError> {
    let query = CandidateQuery {
        specialty_id: params.specialty_id,
        date: params.date,
        time: params.time,
        window: None,
        doctor_id: params.doctor_id,
        location_id: params.location_id,
        limit: params.limit,
    };
    let search = allocation.find_candidates(&query).await?;

    Ok(Json(json!({
        "slots": search.slots,
        "requested_date_unavailable": search.requested_date_unavailable,
    })))
}

#[axum::debug_handler]
pub async fn reserve_slot(
    State(allocation): State<Arc<SlotAllocationService>>,
    Json(request): Json<ReserveRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = allocation
        .reserve(&request.slot, request.patient_id, request.notes)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(allocation): State<Arc<SlotAllocationService>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Value>, AppError> {
    match allocation.cancel(appointment_id, request.patient_id).await? {
        CancelOutcome::Ok => Ok(Json(json!({ "status": "cancelled" }))),
        CancelOutcome::NotFound => Err(AppError::NotFound("Appointment not found".to_string())),
        CancelOutcome::Forbidden => Err(AppError::Forbidden(
            "Appointment belongs to another patient".to_string(),
        )),
    }
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(allocation): State<Arc<SlotAllocationService>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = allocation.complete(appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn patient_appointments(
    State(allocation): State<Arc<SlotAllocationService>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointments = allocation.list_for_patient(patient_id).await?;
    Ok(Json(json!(appointments)))
}
