use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use shared_database::ClinicStore;
use shared_models::{AvailabilitySlotTemplate, Doctor, EntityValidationError, Location, Specialty};

use crate::models::{
    CreateAvailabilityRequest, CreateDoctorRequest, CreateLocationRequest, CreateSpecialtyRequest, DirectoryError,
};

/// Specialties, doctors, clinic locations and recurring availability.
pub struct DirectoryService {
    store: Arc<dyn ClinicStore>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self { store }
    }

    pub async fn active_specialties(&self) -> Result<Vec<Specialty>, DirectoryError> {
        Ok(self.store.list_specialties(true).await?)
    }

    pub async fn all_specialties(&self) -> Result<Vec<Specialty>, DirectoryError> {
        Ok(self.store.list_specialties(false).await?)
    }

    pub async fn get_specialty(&self, id: Uuid) -> Result<Specialty, DirectoryError> {
        self.store
            .get_specialty(id)
            .await?
            .ok_or(DirectoryError::SpecialtyNotFound)
    }

    pub async fn active_locations(&self) -> Result<Vec<Location>, DirectoryError> {
        Ok(self.store.list_locations(true).await?)
    }

    pub async fn all_locations(&self) -> Result<Vec<Location>, DirectoryError> {
        Ok(self.store.list_locations(false).await?)
    }

    pub async fn get_location(&self, id: Uuid) -> Result<Location, DirectoryError> {
        self.store
            .get_location(id)
            .await?
            .ok_or(DirectoryError::LocationNotFound)
    }

    /// Active doctors, optionally restricted to one specialty.
    pub async fn doctors(&self, specialty_id: Option<Uuid>) -> Result<Vec<Doctor>, DirectoryError> {
        Ok(self.store.list_doctors(specialty_id).await?)
    }

    pub async fn get_doctor(&self, id: Uuid) -> Result<Doctor, DirectoryError> {
        self.store.get_doctor(id).await?.ok_or(DirectoryError::DoctorNotFound)
    }

    pub async fn availability(&self, doctor_id: Uuid) -> Result<Vec<AvailabilitySlotTemplate>, DirectoryError> {
        Ok(self.store.list_templates(doctor_id).await?)
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_specialty(&self, request: CreateSpecialtyRequest) -> Result<Specialty, DirectoryError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(EntityValidationError::MissingField("name").into());
        }

        let specialty = Specialty {
            id: Uuid::new_v4(),
            name,
            description: request.description,
            active: true,
            requires_referral: request.requires_referral,
        };
        let stored = self.store.upsert_specialty(specialty).await?;
        info!("Specialty {} created", stored.id);
        Ok(stored)
    }

    pub async fn set_specialty_active(&self, id: Uuid, active: bool) -> Result<Specialty, DirectoryError> {
        let mut specialty = self.get_specialty(id).await?;
        specialty.active = active;
        Ok(self.store.upsert_specialty(specialty).await?)
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_location(&self, request: CreateLocationRequest) -> Result<Location, DirectoryError> {
        let location = Location {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            address: request.address,
            city: request.city,
            phone: request.phone,
            active: true,
        };
        location.validate()?;

        let stored = self.store.upsert_location(location).await?;
        info!("Location {} created", stored.id);
        Ok(stored)
    }

    pub async fn set_location_active(&self, id: Uuid, active: bool) -> Result<Location, DirectoryError> {
        let mut location = self.get_location(id).await?;
        location.active = active;
        Ok(self.store.upsert_location(location).await?)
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_doctor(&self, request: CreateDoctorRequest) -> Result<Doctor, DirectoryError> {
        let specialty = self.get_specialty(request.specialty_id).await?;
        if !specialty.active {
            return Err(DirectoryError::SpecialtyInactive);
        }

        let doctor = Doctor {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            specialty_id: specialty.id,
            active: true,
            capacity_per_slot: request.capacity_per_slot,
            consultation_duration_minutes: request.consultation_duration_minutes,
            schedule_opens_on: request.schedule_opens_on,
        };
        doctor.validate()?;

        let stored = self.store.upsert_doctor(doctor).await?;
        info!("Doctor {} created", stored.id);
        Ok(stored)
    }

    pub async fn set_doctor_active(&self, id: Uuid, active: bool) -> Result<Doctor, DirectoryError> {
        let mut doctor = self.get_doctor(id).await?;
        doctor.active = active;
        Ok(self.store.upsert_doctor(doctor).await?)
    }

    /// Templates may extend past clinic hours; slot generation clips them.
    pub async fn add_availability(
        &self,
        doctor_id: Uuid,
        request: CreateAvailabilityRequest,
    ) -> Result<AvailabilitySlotTemplate, DirectoryError> {
        self.get_doctor(doctor_id).await?;
        if let Some(location_id) = request.location_id {
            if !self.get_location(location_id).await?.active {
                return Err(DirectoryError::LocationInactive);
            }
        }

        let template = AvailabilitySlotTemplate {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: request.day_of_week,
            start_time: request.start_time,
            end_time: request.end_time,
            location_id: request.location_id,
        };
        template.validate()?;

        debug!("Adding availability for doctor {} on day {}", doctor_id, template.day_of_week);
        Ok(self.store.add_template(template).await?)
    }
}
