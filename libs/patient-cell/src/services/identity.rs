use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_database::{ClinicStore, StoreError};
use shared_models::{CareType, ContactUpdate, NewPatient, Patient};

use crate::models::{ContactField, IdentityError, IdentityStatus, PatientRegistration, UpdateContactRequest};
use crate::services::contact::{validate_email, validate_health_plan_card, validate_name, validate_phone};
use crate::services::national_id;

pub struct IdentityResolver {
    store: Arc<dyn ClinicStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self { store }
    }

    /// Looks a CPF up. Malformed input is `Invalid` and never reaches the store.
    #[instrument(skip(self, national_id), fields(cpf = %national_id::mask(national_id)))]
    pub async fn resolve(&self, national_id: &str) -> Result<IdentityStatus, IdentityError> {
        if !national_id::is_valid(national_id) {
            debug!("CPF failed validation");
            return Ok(IdentityStatus::Invalid);
        }
        let cpf = national_id::normalize(national_id).unwrap_or_default();

        match self.store.find_patient_by_national_id(&cpf).await? {
            Some(patient) => {
                debug!("Patient {} found", patient.id);
                Ok(IdentityStatus::Found(patient))
            }
            None => Ok(IdentityStatus::NotFound),
        }
    }

    /// Validates and stores a new patient. When another conversation registered
    /// the same CPF first, the existing record is returned instead.
    #[instrument(skip(self, registration), fields(cpf = %national_id::mask(&registration.national_id)))]
    pub async fn create_patient(&self, registration: PatientRegistration) -> Result<Patient, IdentityError> {
        let new_patient = validate_registration(registration)?;
        let cpf = new_patient.national_id.clone();

        match self.store.insert_patient(new_patient).await {
            Ok(patient) => {
                info!("Patient {} registered", patient.id);
                Ok(patient)
            }
            Err(StoreError::Duplicate(_)) => {
                warn!("CPF registered concurrently, returning existing patient");
                self.store
                    .find_patient_by_national_id(&cpf)
                    .await?
                    .ok_or(IdentityError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_patient(&self, id: Uuid) -> Result<Patient, IdentityError> {
        self.store.get_patient(id).await?.ok_or(IdentityError::NotFound)
    }

    /// Contact fields are the only mutable part of a patient.
    pub async fn update_contact(&self, id: Uuid, request: UpdateContactRequest) -> Result<Patient, IdentityError> {
        let update = ContactUpdate {
            phone: request.phone.as_deref().map(validate_phone).transpose()?,
            email: request.email.as_deref().map(validate_email).transpose()?,
        };
        Ok(self.store.update_patient_contact(id, update).await?)
    }
}

pub fn validate_registration(registration: PatientRegistration) -> Result<NewPatient, IdentityError> {
    if !national_id::is_valid(&registration.national_id) {
        return Err(IdentityError::invalid(ContactField::NationalId, "invalid CPF"));
    }

    let health_plan_card = match registration.care_type {
        CareType::Private => None,
        CareType::HealthPlan => {
            let raw = registration.health_plan_card.as_deref().unwrap_or_default();
            Some(validate_health_plan_card(raw)?)
        }
    };

    Ok(NewPatient {
        national_id: national_id::normalize(&registration.national_id).unwrap_or_default(),
        name: validate_name(&registration.name)?,
        phone: registration.phone.as_deref().map(validate_phone).transpose()?,
        email: registration.email.as_deref().map(validate_email).transpose()?,
        care_type: registration.care_type,
        health_plan_card,
    })
}
