use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::{Doctor, EntityValidationError, Location, Specialty};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSpecialtyRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub requires_referral: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub name: String,
    pub specialty_id: Uuid,
    #[serde(default = "default_capacity")]
    pub capacity_per_slot: u32,
    #[serde(default = "default_duration")]
    pub consultation_duration_minutes: u32,
    pub schedule_opens_on: Option<NaiveDate>,
}

fn default_capacity() -> u32 {
    1
}

fn default_duration() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub day_of_week: u8, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub location_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLocationRequest {
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpecialtyMatch {
    Matched(Specialty),
    /// Several specialties fit equally well.
    Ambiguous(Vec<Specialty>),
    NoMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DoctorMatch {
    Matched(Doctor),
    Ambiguous(Vec<Doctor>),
    NoMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationMatch {
    Matched(Location),
    /// Several locations share the name or city mentioned.
    Ambiguous(Vec<Location>),
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Specialty not found")]
    SpecialtyNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Specialty is inactive")]
    SpecialtyInactive,

    #[error("Location not found")]
    LocationNotFound,

    #[error("Location is inactive")]
    LocationInactive,

    #[error("Validation error: {0}")]
    Validation(#[from] EntityValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<DirectoryError> for AppError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::SpecialtyNotFound | DirectoryError::DoctorNotFound | DirectoryError::LocationNotFound => {
                AppError::NotFound(e.to_string())
            }
            DirectoryError::SpecialtyInactive | DirectoryError::LocationInactive | DirectoryError::Validation(_) => {
                AppError::ValidationError(e.to_string())
            }
            DirectoryError::Storage(inner) => inner.into(),
        }
    }
}
