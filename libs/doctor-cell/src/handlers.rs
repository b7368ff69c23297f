use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    CreateAvailabilityRequest, CreateDoctorRequest, CreateLocationRequest, CreateSpecialtyRequest, DoctorMatch,
    SpecialtyMatch,
};
use crate::services::{match_doctor, match_specialty, DirectoryService};

#[derive(Debug, Deserialize)]
pub struct IncludeInactive {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
pub struct DoctorListQuery {
    pub specialty_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct MatchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ActiveFlag {
    pub active: bool,
}

// ==============================================================================
// SPECIALTIES
// ==============================================================================

#[axum::debug_handler]
pub async fn list_specialties(
    State(directory): State<Arc<DirectoryService>>,
    Query(query): Query<IncludeInactive>,
) -> Result<Json<Value>, AppError> {
    let specialties = if query.include_inactive {
        directory.all_specialties().await?
    } else {
        directory.active_specialties().await?
    };
    Ok(Json(json!({
        "specialties": specialties,
        "total": specialties.len(),
    })))
}

#[axum::debug_handler]
pub async fn create_specialty(
    State(directory): State<Arc<DirectoryService>>,
    Json(request): Json<CreateSpecialtyRequest>,
) -> Result<Json<Value>, AppError> {
    let specialty = directory.create_specialty(request).await?;
    Ok(Json(json!(specialty)))
}

#[axum::debug_handler]
pub async fn set_specialty_active(
    State(directory): State<Arc<DirectoryService>>,
    Path(specialty_id): Path<Uuid>,
    Json(flag): Json<ActiveFlag>,
) -> Result<Json<Value>, AppError> {
    let specialty = directory.set_specialty_active(specialty_id, flag.active).await?;
    Ok(Json(json!(specialty)))
}

/// Debug view of how free text resolves against the active specialties.
#[axum::debug_handler]
pub async fn match_specialty_text(
    State(directory): State<Arc<DirectoryService>>,
    Query(query): Query<MatchQuery>,
) -> Result<Json<Value>, AppError> {
    let specialties = directory.active_specialties().await?;
    let body = match match_specialty(&query.q, &specialties) {
        SpecialtyMatch::Matched(s) => json!({ "result": "matched", "specialties": [s] }),
        SpecialtyMatch::Ambiguous(list) => json!({ "result": "ambiguous", "specialties": list }),
        SpecialtyMatch::NoMatch => json!({ "result": "no_match", "specialties": [] }),
    };
    Ok(Json(body))
}

// ==============================================================================
// LOCATIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_locations(
    State(directory): State<Arc<DirectoryService>>,
    Query(query): Query<IncludeInactive>,
) -> Result<Json<Value>, AppError> {
    let locations = if query.include_inactive {
        directory.all_locations().await?
    } else {
        directory.active_locations().await?
    };
    Ok(Json(json!({
        "locations": locations,
        "total": locations.len(),
    })))
}

#[axum::debug_handler]
pub async fn create_location(
    State(directory): State<Arc<DirectoryService>>,
    Json(request): Json<CreateLocationRequest>,
) -> Result<Json<Value>, AppError> {
    let location = directory.create_location(request).await?;
    Ok(Json(json!(location)))
}

#[axum::debug_handler]
pub async fn set_location_active(
    State(directory): State<Arc<DirectoryService>>,
    Path(location_id): Path<Uuid>,
    Json(flag): Json<ActiveFlag>,
) -> Result<Json<Value>, AppError> {
    let location = directory.set_location_active(location_id, flag.active).await?;
    Ok(Json(json!(location)))
}

// ==============================================================================
// DOCTORS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctors(
    State(directory): State<Arc<DirectoryService>>,
    Query(query): Query<DoctorListQuery>,
) -> Result<Json<Value>, AppError> {
    let doctors = directory.doctors(query.specialty_id).await?;
    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(directory): State<Arc<DirectoryService>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = directory.get_doctor(doctor_id).await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn create_doctor(
    State(directory): State<Arc<DirectoryService>>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor = directory.create_doctor(request).await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn set_doctor_active(
    State(directory): State<Arc<DirectoryService>>,
    Path(doctor_id): Path<Uuid>,
    Json(flag): Json<ActiveFlag>,
) -> Result<Json<Value>, AppError> {
    let doctor = directory.set_doctor_active(doctor_id, flag.active).await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn match_doctor_text(
    State(directory): State<Arc<DirectoryService>>,
    Query(query): Query<MatchQuery>,
) -> Result<Json<Value>, AppError> {
    let doctors = directory.doctors(None).await?;
    let body = match match_doctor(&query.q, &doctors) {
        DoctorMatch::Matched(d) => json!({ "result": "matched", "doctors": [d] }),
        DoctorMatch::Ambiguous(list) => json!({ "result": "ambiguous", "doctors": list }),
        DoctorMatch::NoMatch => json!({ "result": "no_match", "doctors": [] }),
    };
    Ok(Json(body))
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

#[axum::debug_handler]
pub async fn list_availability(
    State(directory): State<Arc<DirectoryService>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let templates = directory.availability(doctor_id).await?;
    Ok(Json(json!({ "availability": templates })))
}

#[axum::debug_handler]
pub async fn add_availability(
    State(directory): State<Arc<DirectoryService>>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let template = directory.add_availability(doctor_id, request).await?;
    Ok(Json(json!(template)))
}
