use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, AvailabilitySlotTemplate, ContactUpdate, Doctor, Location, NewPatient,
    Patient, Specialty,
};

use crate::store::{ClinicStore, ReservationRequest, ReserveOutcome, StoreError, StoreResult};

#[derive(Default)]
struct ClinicTables {
    patients: HashMap<Uuid, Patient>,
    specialties: HashMap<Uuid, Specialty>,
    locations: HashMap<Uuid, Location>,
    doctors: HashMap<Uuid, Doctor>,
    templates: HashMap<Uuid, AvailabilitySlotTemplate>,
    appointments: HashMap<Uuid, Appointment>,
}

/// Process-local store used when Supabase is not configured and in tests.
/// A single lock guards all tables, so every trait call is atomic.
#[derive(Default)]
pub struct InMemoryClinicStore {
    tables: Mutex<ClinicTables>,
}

impl InMemoryClinicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an appointment as-is, bypassing capacity checks. Used to seed history.
    pub async fn insert_appointment_raw(&self, appointment: Appointment) {
        let mut tables = self.tables.lock().await;
        tables.appointments.insert(appointment.id, appointment);
    }

    pub async fn appointment_count(&self) -> usize {
        self.tables.lock().await.appointments.len()
    }

    async fn close_appointment(&self, id: Uuid, status: AppointmentStatus) -> StoreResult<Appointment> {
        let mut tables = self.tables.lock().await;
        match tables.appointments.get_mut(&id) {
            Some(appointment) if appointment.is_scheduled() => {
                appointment.status = status;
                Ok(appointment.clone())
            }
            _ => Err(StoreError::NotFound(format!("scheduled appointment {}", id))),
        }
    }
}

#[async_trait]
impl ClinicStore for InMemoryClinicStore {
    async fn find_patient_by_national_id(&self, national_id: &str) -> StoreResult<Option<Patient>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .patients
            .values()
            .find(|p| p.national_id == national_id)
            .cloned())
    }

    async fn get_patient(&self, id: Uuid) -> StoreResult<Option<Patient>> {
        Ok(self.tables.lock().await.patients.get(&id).cloned())
    }

    async fn insert_patient(&self, patient: NewPatient) -> StoreResult<Patient> {
        let mut tables = self.tables.lock().await;

        if tables.patients.values().any(|p| p.national_id == patient.national_id) {
            return Err(StoreError::Duplicate("national_id already registered".to_string()));
        }

        let now = Utc::now();
        let created = Patient {
            id: Uuid::new_v4(),
            national_id: patient.national_id,
            name: patient.name,
            phone: patient.phone,
            email: patient.email,
            care_type: patient.care_type,
            health_plan_card: patient.health_plan_card,
            created_at: now,
            updated_at: now,
        };
        tables.patients.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_patient_contact(&self, id: Uuid, update: ContactUpdate) -> StoreResult<Patient> {
        let mut tables = self.tables.lock().await;
        let patient = tables
            .patients
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("patient {}", id)))?;

        if let Some(phone) = update.phone {
            patient.phone = Some(phone);
        }
        if let Some(email) = update.email {
            patient.email = Some(email);
        }
        patient.updated_at = Utc::now();
        Ok(patient.clone())
    }

    async fn list_specialties(&self, active_only: bool) -> StoreResult<Vec<Specialty>> {
        let tables = self.tables.lock().await;
        let mut specialties: Vec<Specialty> = tables
            .specialties
            .values()
            .filter(|s| !active_only || s.active)
            .cloned()
            .collect();
        specialties.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specialties)
    }

    async fn get_specialty(&self, id: Uuid) -> StoreResult<Option<Specialty>> {
        Ok(self.tables.lock().await.specialties.get(&id).cloned())
    }

    async fn upsert_specialty(&self, specialty: Specialty) -> StoreResult<Specialty> {
        let mut tables = self.tables.lock().await;
        tables.specialties.insert(specialty.id, specialty.clone());
        Ok(specialty)
    }

    async fn list_locations(&self, active_only: bool) -> StoreResult<Vec<Location>> {
        let tables = self.tables.lock().await;
        let mut locations: Vec<Location> = tables
            .locations
            .values()
            .filter(|l| !active_only || l.active)
            .cloned()
            .collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn get_location(&self, id: Uuid) -> StoreResult<Option<Location>> {
        Ok(self.tables.lock().await.locations.get(&id).cloned())
    }

    async fn upsert_location(&self, location: Location) -> StoreResult<Location> {
        let mut tables = self.tables.lock().await;
        tables.locations.insert(location.id, location.clone());
        Ok(location)
    }

    async fn list_doctors(&self, specialty_id: Option<Uuid>) -> StoreResult<Vec<Doctor>> {
        let tables = self.tables.lock().await;
        let mut doctors: Vec<Doctor> = tables
            .doctors
            .values()
            .filter(|d| d.active && specialty_id.map_or(true, |id| d.specialty_id == id))
            .cloned()
            .collect();
        doctors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(doctors)
    }

    async fn get_doctor(&self, id: Uuid) -> StoreResult<Option<Doctor>> {
        Ok(self.tables.lock().await.doctors.get(&id).cloned())
    }

    async fn upsert_doctor(&self, doctor: Doctor) -> StoreResult<Doctor> {
        let mut tables = self.tables.lock().await;
        tables.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    async fn list_templates(&self, doctor_id: Uuid) -> StoreResult<Vec<AvailabilitySlotTemplate>> {
        let tables = self.tables.lock().await;
        let mut templates: Vec<AvailabilitySlotTemplate> = tables
            .templates
            .values()
            .filter(|t| t.doctor_id == doctor_id)
            .cloned()
            .collect();
        templates.sort_by_key(|t| (t.day_of_week, t.start_time));
        Ok(templates)
    }

    async fn add_template(&self, template: AvailabilitySlotTemplate) -> StoreResult<AvailabilitySlotTemplate> {
        let mut tables = self.tables.lock().await;
        tables.templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn list_scheduled_for_doctor(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.is_scheduled() && a.date >= from && a.date <= to)
            .cloned()
            .collect())
    }

    async fn reserve_if_available(&self, request: ReservationRequest) -> StoreResult<ReserveOutcome> {
        let mut tables = self.tables.lock().await;

        let capacity = tables
            .doctors
            .get(&request.doctor_id)
            .map(|d| d.capacity_per_slot)
            .ok_or_else(|| StoreError::NotFound(format!("doctor {}", request.doctor_id)))?;

        let taken = tables
            .appointments
            .values()
            .filter(|a| {
                a.is_scheduled()
                    && a.doctor_id == request.doctor_id
                    && a.date == request.date
                    && a.start_time == request.start_time
            })
            .count() as u32;

        if taken >= capacity {
            debug!("Slot full ({}/{})", taken, capacity);
            return Ok(ReserveOutcome::Full);
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            specialty_id: request.specialty_id,
            date: request.date,
            start_time: request.start_time,
            duration_minutes: request.duration_minutes,
            status: AppointmentStatus::Scheduled,
            notes: request.notes,
            created_at: Utc::now(),
        };
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(ReserveOutcome::Reserved(appointment))
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.tables.lock().await.appointments.get(&id).cloned())
    }

    async fn list_appointments_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.lock().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        appointments.sort_by_key(|a| (a.date, a.start_time));
        Ok(appointments)
    }

    async fn cancel_appointment(&self, id: Uuid) -> StoreResult<Appointment> {
        self.close_appointment(id, AppointmentStatus::Cancelled).await
    }

    async fn complete_appointment(&self, id: Uuid) -> StoreResult<Appointment> {
        self.close_appointment(id, AppointmentStatus::Completed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveTime;
    use std::sync::Arc;

    fn doctor(capacity: u32) -> Doctor {
        Doctor {
            id: Uuid::new_v4(),
            name: "Dr. Carlos Lima".to_string(),
            specialty_id: Uuid::new_v4(),
            active: true,
            capacity_per_slot: capacity,
            consultation_duration_minutes: 30,
            schedule_opens_on: None,
        }
    }

    fn request_for(doctor: &Doctor) -> ReservationRequest {
        ReservationRequest {
            patient_id: Uuid::new_v4(),
            doctor_id: doctor.id,
            specialty_id: doctor.specialty_id,
            date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_minutes: 30,
            notes: None,
        }
    }

    #[tokio::test]
    async fn duplicate_national_id_is_rejected() {
        let store = InMemoryClinicStore::new();
        let new = NewPatient {
            national_id: "52998224725".to_string(),
            name: "Maria Silva".to_string(),
            phone: None,
            email: None,
            care_type: Default::default(),
            health_plan_card: None,
        };
        store.insert_patient(new.clone()).await.unwrap();
        assert_matches!(store.insert_patient(new).await, Err(StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn reservation_stops_at_capacity() {
        let store = InMemoryClinicStore::new();
        let d = store.upsert_doctor(doctor(2)).await.unwrap();

        assert_matches!(store.reserve_if_available(request_for(&d)).await, Ok(ReserveOutcome::Reserved(_)));
        assert_matches!(store.reserve_if_available(request_for(&d)).await, Ok(ReserveOutcome::Reserved(_)));
        assert_matches!(store.reserve_if_available(request_for(&d)).await, Ok(ReserveOutcome::Full));
    }

    #[tokio::test]
    async fn cancelled_seat_is_released() {
        let store = InMemoryClinicStore::new();
        let d = store.upsert_doctor(doctor(1)).await.unwrap();

        let first = match store.reserve_if_available(request_for(&d)).await.unwrap() {
            ReserveOutcome::Reserved(a) => a,
            ReserveOutcome::Full => panic!("first reservation must succeed"),
        };
        store.cancel_appointment(first.id).await.unwrap();
        assert_matches!(store.cancel_appointment(first.id).await, Err(StoreError::NotFound(_)));
        assert_matches!(store.reserve_if_available(request_for(&d)).await, Ok(ReserveOutcome::Reserved(_)));
    }

    #[tokio::test]
    async fn completed_appointment_cannot_be_cancelled() {
        let store = InMemoryClinicStore::new();
        let d = store.upsert_doctor(doctor(1)).await.unwrap();
        let booked = match store.reserve_if_available(request_for(&d)).await.unwrap() {
            ReserveOutcome::Reserved(a) => a,
            ReserveOutcome::Full => panic!("first reservation must succeed"),
        };

        let done = store.complete_appointment(booked.id).await.unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert_matches!(store.cancel_appointment(booked.id).await, Err(StoreError::NotFound(_)));
        assert_matches!(store.complete_appointment(booked.id).await, Err(StoreError::NotFound(_)));
        assert_matches!(store.complete_appointment(Uuid::new_v4()).await, Err(StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn inactive_locations_can_be_filtered() {
        let store = InMemoryClinicStore::new();
        for (name, active) in [("Unidade Norte", false), ("Unidade Centro", true)] {
            store
                .upsert_location(Location {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    address: None,
                    city: Some("Campinas".to_string()),
                    phone: None,
                    active,
                })
                .await
                .unwrap();
        }

        let all: Vec<String> = store.list_locations(false).await.unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(all, vec!["Unidade Centro", "Unidade Norte"]);
        assert_eq!(store.list_locations(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_reservations_never_overbook() {
        let store = Arc::new(InMemoryClinicStore::new());
        let d = store.upsert_doctor(doctor(3)).await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                let request = request_for(&d);
                tokio::spawn(async move { store.reserve_if_available(request).await })
            })
            .collect();

        let mut reserved = 0;
        for handle in handles {
            if let Ok(ReserveOutcome::Reserved(_)) = handle.await.unwrap() {
                reserved += 1;
            }
        }
        assert_eq!(reserved, 3);
        assert_eq!(store.appointment_count().await, 3);
    }
}
