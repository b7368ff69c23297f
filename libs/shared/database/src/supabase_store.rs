use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use shared_models::{
    Appointment, AvailabilitySlotTemplate, ContactUpdate, Doctor, Location, NewPatient, Patient, Specialty,
};

use crate::store::{ClinicStore, ReservationRequest, ReserveOutcome, StoreError, StoreResult};
use crate::supabase::{merge_duplicates, return_representation, SupabaseClient};

/// Postgres function defined in `migrations/0001_clinic_schema.sql`.
const RESERVE_FUNCTION: &str = "reserve_appointment_if_available";

pub struct SupabaseClinicStore {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Deserialize)]
struct ReservationRow {
    reserved: bool,
    appointment: Option<Appointment>,
}

impl SupabaseClinicStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch_one<T>(&self, path: &str) -> StoreResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut rows: Vec<T> = self.supabase.request(Method::GET, path, None).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn write_one<T>(&self, method: Method, path: &str, body: Value, upsert: bool) -> StoreResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let headers = if upsert { merge_duplicates() } else { return_representation() };
        let mut rows: Vec<T> = self
            .supabase
            .request_with_headers(method, path, Some(body), Some(headers))
            .await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("no row returned from {}", path)));
        }
        Ok(rows.swap_remove(0))
    }
}

#[async_trait]
impl ClinicStore for SupabaseClinicStore {
    #[instrument(skip(self, national_id))]
    async fn find_patient_by_national_id(&self, national_id: &str) -> StoreResult<Option<Patient>> {
        let path = format!(
            "/rest/v1/patients?national_id=eq.{}&select=*",
            urlencoding::encode(national_id)
        );
        self.fetch_one(&path).await
    }

    async fn get_patient(&self, id: Uuid) -> StoreResult<Option<Patient>> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=*", id);
        self.fetch_one(&path).await
    }

    #[instrument(skip(self, patient))]
    async fn insert_patient(&self, patient: NewPatient) -> StoreResult<Patient> {
        let body = json!({
            "national_id": patient.national_id,
            "name": patient.name,
            "phone": patient.phone,
            "email": patient.email,
            "care_type": patient.care_type,
            "health_plan_card": patient.health_plan_card,
        });

        let created: Patient = self.write_one(Method::POST, "/rest/v1/patients", body, false).await?;
        debug!("Patient {} created", created.id);
        Ok(created)
    }

    async fn update_patient_contact(&self, id: Uuid, update: ContactUpdate) -> StoreResult<Patient> {
        let mut body = serde_json::Map::new();
        if let Some(phone) = update.phone {
            body.insert("phone".to_string(), json!(phone));
        }
        if let Some(email) = update.email {
            body.insert("email".to_string(), json!(email));
        }
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/patients?id=eq.{}", id);
        self.write_one(Method::PATCH, &path, Value::Object(body), false).await
    }

    async fn list_specialties(&self, active_only: bool) -> StoreResult<Vec<Specialty>> {
        let mut path = "/rest/v1/specialties?select=*&order=name.asc".to_string();
        if active_only {
            path.push_str("&active=eq.true");
        }
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn get_specialty(&self, id: Uuid) -> StoreResult<Option<Specialty>> {
        let path = format!("/rest/v1/specialties?id=eq.{}&select=*", id);
        self.fetch_one(&path).await
    }

    async fn upsert_specialty(&self, specialty: Specialty) -> StoreResult<Specialty> {
        let body = serde_json::to_value(&specialty)?;
        self.write_one(Method::POST, "/rest/v1/specialties", body, true).await
    }

    async fn list_locations(&self, active_only: bool) -> StoreResult<Vec<Location>> {
        let mut path = "/rest/v1/locations?select=*&order=name.asc".to_string();
        if active_only {
            path.push_str("&active=eq.true");
        }
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn get_location(&self, id: Uuid) -> StoreResult<Option<Location>> {
        let path = format!("/rest/v1/locations?id=eq.{}&select=*", id);
        self.fetch_one(&path).await
    }

    async fn upsert_location(&self, location: Location) -> StoreResult<Location> {
        let body = serde_json::to_value(&location)?;
        self.write_one(Method::POST, "/rest/v1/locations", body, true).await
    }

    async fn list_doctors(&self, specialty_id: Option<Uuid>) -> StoreResult<Vec<Doctor>> {
        let mut path = "/rest/v1/doctors?select=*&active=eq.true&order=name.asc".to_string();
        if let Some(specialty_id) = specialty_id {
            path.push_str(&format!("&specialty_id=eq.{}", specialty_id));
        }
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn get_doctor(&self, id: Uuid) -> StoreResult<Option<Doctor>> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=*", id);
        self.fetch_one(&path).await
    }

    async fn upsert_doctor(&self, doctor: Doctor) -> StoreResult<Doctor> {
        let body = serde_json::to_value(&doctor)?;
        self.write_one(Method::POST, "/rest/v1/doctors", body, true).await
    }

    async fn list_templates(&self, doctor_id: Uuid) -> StoreResult<Vec<AvailabilitySlotTemplate>> {
        let path = format!(
            "/rest/v1/availability_templates?doctor_id=eq.{}&select=*&order=day_of_week.asc,start_time.asc",
            doctor_id
        );
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn add_template(&self, template: AvailabilitySlotTemplate) -> StoreResult<AvailabilitySlotTemplate> {
        let body = serde_json::to_value(&template)?;
        self.write_one(Method::POST, "/rest/v1/availability_templates", body, false).await
    }

    async fn list_scheduled_for_doctor(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=eq.scheduled&date=gte.{}&date=lte.{}&select=*",
            doctor_id, from, to
        );
        self.supabase.request(Method::GET, &path, None).await
    }

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, date = %request.date, start = %request.start_time))]
    async fn reserve_if_available(&self, request: ReservationRequest) -> StoreResult<ReserveOutcome> {
        let args = json!({
            "p_patient_id": request.patient_id,
            "p_doctor_id": request.doctor_id,
            "p_specialty_id": request.specialty_id,
            "p_date": request.date,
            "p_start_time": request.start_time,
            "p_duration_minutes": request.duration_minutes,
            "p_notes": request.notes,
        });

        let row: ReservationRow = self.supabase.rpc(RESERVE_FUNCTION, args).await?;

        match (row.reserved, row.appointment) {
            (true, Some(appointment)) => Ok(ReserveOutcome::Reserved(appointment)),
            (true, None) => Err(StoreError::Serialization(
                "reservation reported success without an appointment".to_string(),
            )),
            (false, _) => {
                warn!("Slot is full");
                Ok(ReserveOutcome::Full)
            }
        }
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        let path = format!("/rest/v1/appointments?id=eq.{}&select=*", id);
        self.fetch_one(&path).await
    }

    async fn list_appointments_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&select=*&order=date.asc,start_time.asc",
            patient_id
        );
        self.supabase.request(Method::GET, &path, None).await
    }

    #[instrument(skip(self))]
    async fn cancel_appointment(&self, id: Uuid) -> StoreResult<Appointment> {
        // The status filter makes the flip conditional; an empty result means it
        // was already cancelled or completed.
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.scheduled", id);
        self.write_one(Method::PATCH, &path, json!({ "status": "cancelled" }), false)
            .await
    }

    #[instrument(skip(self))]
    async fn complete_appointment(&self, id: Uuid) -> StoreResult<Appointment> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.scheduled", id);
        self.write_one(Method::PATCH, &path, json!({ "status": "completed" }), false)
            .await
    }
}
