use serde::{Deserialize, Serialize};

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::{CareType, Patient};

/// Outcome of looking a CPF up.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityStatus {
    Found(Patient),
    NotFound,
    /// Failed the check-digit test; no lookup was made.
    Invalid,
}

/// Fields collected during registration, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRegistration {
    pub national_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub care_type: CareType,
    /// Required when `care_type` is `HealthPlan`.
    #[serde(default)]
    pub health_plan_card: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateContactRequest {
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    NationalId,
    Name,
    Phone,
    Email,
    HealthPlanCard,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid {field:?}: {reason}")]
    Invalid { field: ContactField, reason: String },

    #[error("Patient not found")]
    NotFound,

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl IdentityError {
    pub fn invalid(field: ContactField, reason: impl Into<String>) -> Self {
        IdentityError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for IdentityError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => IdentityError::NotFound,
            other => IdentityError::Storage(other),
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Invalid { .. } => AppError::ValidationError(e.to_string()),
            IdentityError::NotFound => AppError::NotFound(e.to_string()),
            IdentityError::Storage(inner) => inner.into(),
        }
    }
}
