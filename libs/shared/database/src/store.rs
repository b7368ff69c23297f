use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::{
    Appointment, AvailabilitySlotTemplate, ContactUpdate, Doctor, Location, NewPatient, Patient, Specialty,
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Duplicate(msg) | StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Backend(msg) => AppError::Database(msg),
            StoreError::Serialization(msg) => AppError::Internal(msg),
        }
    }
}

/// Everything needed to book one seat in a slot. Capacity is read by the store
/// inside the same atomic section that counts existing bookings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub specialty_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Reserved(Appointment),
    /// The slot already holds `capacity_per_slot` scheduled appointments.
    Full,
}

/// Persistence for patients, the clinic directory and appointments.
///
/// `reserve_if_available` must count scheduled appointments for the slot and
/// insert the new one as a single atomic step; concurrent callers never push a
/// slot past its doctor's capacity.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    // Patients
    async fn find_patient_by_national_id(&self, national_id: &str) -> StoreResult<Option<Patient>>;
    async fn get_patient(&self, id: Uuid) -> StoreResult<Option<Patient>>;
    /// Fails with `StoreError::Duplicate` when the CPF is already registered.
    async fn insert_patient(&self, patient: NewPatient) -> StoreResult<Patient>;
    async fn update_patient_contact(&self, id: Uuid, update: ContactUpdate) -> StoreResult<Patient>;

    // Directory
    async fn list_specialties(&self, active_only: bool) -> StoreResult<Vec<Specialty>>;
    async fn get_specialty(&self, id: Uuid) -> StoreResult<Option<Specialty>>;
    async fn upsert_specialty(&self, specialty: Specialty) -> StoreResult<Specialty>;
    async fn list_locations(&self, active_only: bool) -> StoreResult<Vec<Location>>;
    async fn get_location(&self, id: Uuid) -> StoreResult<Option<Location>>;
    async fn upsert_location(&self, location: Location) -> StoreResult<Location>;
    async fn list_doctors(&self, specialty_id: Option<Uuid>) -> StoreResult<Vec<Doctor>>;
    async fn get_doctor(&self, id: Uuid) -> StoreResult<Option<Doctor>>;
    async fn upsert_doctor(&self, doctor: Doctor) -> StoreResult<Doctor>;
    async fn list_templates(&self, doctor_id: Uuid) -> StoreResult<Vec<AvailabilitySlotTemplate>>;
    async fn add_template(&self, template: AvailabilitySlotTemplate) -> StoreResult<AvailabilitySlotTemplate>;

    // Appointments
    /// Scheduled appointments of a doctor with `from <= date <= to`.
    async fn list_scheduled_for_doctor(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Appointment>>;
    async fn reserve_if_available(&self, request: ReservationRequest) -> StoreResult<ReserveOutcome>;
    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>>;
    async fn list_appointments_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<Appointment>>;
    /// Flips a scheduled appointment to cancelled. `NotFound` when no scheduled
    /// appointment with that id exists.
    async fn cancel_appointment(&self, id: Uuid) -> StoreResult<Appointment>;
    /// Flips a scheduled appointment to completed, with the same `NotFound` rule.
    async fn complete_appointment(&self, id: Uuid) -> StoreResult<Appointment>;
}
