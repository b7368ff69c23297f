use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_database::{ClinicStore, ReservationRequest, ReserveOutcome, StoreError};
use shared_models::{Appointment, AppointmentStatus, AvailabilitySlotTemplate, Doctor, Slot};
use shared_utils::Clock;

use crate::models::{
    AppointmentDetails, CancelOutcome, CandidateQuery, CandidateSearch, PatientAppointments, SchedulingError,
    SchedulingRules,
};
use crate::services::slots::{expand_day, free_slots, nearest_to, occupancy, rank};

type Roster = Vec<(Doctor, Vec<AvailabilitySlotTemplate>)>;

/// Turns scheduling constraints into bookable slots and commits reservations.
pub struct SlotAllocationService {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    rules: SchedulingRules,
}

impl SlotAllocationService {
    pub fn new(store: Arc<dyn ClinicStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_rules(store, clock, SchedulingRules::default())
    }

    pub fn with_rules(store: Arc<dyn ClinicStore>, clock: Arc<dyn Clock>, rules: SchedulingRules) -> Self {
        Self { store, clock, rules }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    /// Ranked free slots for the query, capped at `limit` (or the offer cap).
    ///
    /// When a date is given and nothing is free on it, the search continues
    /// from the following day and the result is flagged.
    #[instrument(skip(self, query), fields(specialty = %query.specialty_id, date = ?query.date, time = ?query.time))]
    pub async fn find_candidates(&self, query: &CandidateQuery) -> Result<CandidateSearch, SchedulingError> {
        let today = self.clock.today();
        if let Some(date) = query.date {
            if date < today {
                return Err(SchedulingError::Validation(format!("{} is in the past", date)));
            }
        }

        let specialty = self
            .store
            .get_specialty(query.specialty_id)
            .await?
            .filter(|s| s.active)
            .ok_or_else(|| SchedulingError::NotFound("Specialty".to_string()))?;

        let roster = self.roster(specialty.id, query.doctor_id).await?;
        if roster.is_empty() {
            debug!("No active doctors for {}", specialty.name);
            return Ok(CandidateSearch::default());
        }

        let limit = query.limit.unwrap_or(self.rules.max_offered);
        let horizon = Duration::days(self.rules.horizon_days);

        let mut found = match query.date {
            Some(date) => {
                let slots = self.search(&roster, query, date, date, limit).await?;
                if !slots.is_empty() {
                    CandidateSearch {
                        slots,
                        requested_date_unavailable: false,
                    }
                } else if let Some(next) = date.succ_opt() {
                    debug!("Nothing free on {}, searching forward", date);
                    CandidateSearch {
                        slots: self.search(&roster, query, next, date + horizon, limit).await?,
                        requested_date_unavailable: true,
                    }
                } else {
                    CandidateSearch::default()
                }
            }
            None => CandidateSearch {
                slots: self.search(&roster, query, today, today + horizon, limit).await?,
                requested_date_unavailable: false,
            },
        };

        self.name_locations(&mut found.slots).await?;
        Ok(found)
    }

    async fn name_locations(&self, slots: &mut [Slot]) -> Result<(), SchedulingError> {
        if slots.iter().all(|s| s.location_id.is_none()) {
            return Ok(());
        }
        let names: HashMap<Uuid, String> = self
            .store
            .list_locations(false)
            .await?
            .into_iter()
            .map(|l| (l.id, l.name))
            .collect();
        for slot in slots.iter_mut() {
            slot.location_name = slot.location_id.and_then(|id| names.get(&id).cloned());
        }
        Ok(())
    }

    async fn roster(&self, specialty_id: Uuid, doctor_id: Option<Uuid>) -> Result<Roster, SchedulingError> {
        let doctors = self.store.list_doctors(Some(specialty_id)).await?;

        let mut roster = Vec::with_capacity(doctors.len());
        for doctor in doctors.into_iter().filter(|d| doctor_id.map_or(true, |id| d.id == id)) {
            let templates = self.store.list_templates(doctor.id).await?;
            roster.push((doctor, templates));
        }
        Ok(roster)
    }

    async fn search(
        &self,
        roster: &Roster,
        query: &CandidateQuery,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Slot>, SchedulingError> {
        let mut taken = HashMap::new();
        for (doctor, _) in roster {
            let booked = self.store.list_scheduled_for_doctor(doctor.id, from, to).await?;
            taken.extend(occupancy(&booked));
        }

        let earliest = self.earliest_start();
        let tolerance = Duration::minutes(self.rules.time_tolerance_minutes);

        let mut found = Vec::new();
        let mut day = from;
        while day <= to && found.len() < limit {
            let mut daily: Vec<Slot> = roster
                .iter()
                .flat_map(|(doctor, templates)| free_slots(doctor, templates, &taken, day, earliest))
                .collect();

            if let Some(location) = query.location_id {
                daily.retain(|slot| slot.location_id == Some(location));
            }
            if let Some(window) = query.window {
                daily.retain(|slot| window.contains(slot.start_time));
            }
            if let Some(wanted) = query.time {
                daily = nearest_to(daily, wanted, tolerance);
            }

            rank(&mut daily);
            found.extend(daily);

            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        found.truncate(limit);
        Ok(found)
    }

    fn earliest_start(&self) -> NaiveDateTime {
        self.clock.local_now() + Duration::minutes(self.rules.min_lead_minutes)
    }

    /// Books one seat in `slot`. The slot is re-validated against the
    /// doctor's current schedule, then committed through the store's atomic
    /// capacity check; a full slot is `Conflict`.
    #[instrument(skip(self, slot, notes), fields(doctor = %slot.doctor_id, date = %slot.date, start = %slot.start_time))]
    pub async fn reserve(
        &self,
        slot: &Slot,
        patient_id: Uuid,
        notes: Option<String>,
    ) -> Result<Appointment, SchedulingError> {
        let doctor = self
            .store
            .get_doctor(slot.doctor_id)
            .await?
            .filter(|d| d.active)
            .ok_or_else(|| SchedulingError::NotFound("Doctor".to_string()))?;

        let templates = self.store.list_templates(doctor.id).await?;
        let offered = expand_day(&doctor, &templates, slot.date).contains(&slot.start_time);
        if !offered || slot.date.and_time(slot.start_time) < self.earliest_start() {
            warn!("Slot is no longer bookable");
            return Err(SchedulingError::Conflict);
        }

        let request = ReservationRequest {
            patient_id,
            doctor_id: doctor.id,
            specialty_id: doctor.specialty_id,
            date: slot.date,
            start_time: slot.start_time,
            duration_minutes: doctor.consultation_duration_minutes,
            notes,
        };

        match self.store.reserve_if_available(request).await? {
            ReserveOutcome::Reserved(appointment) => {
                info!("Appointment {} reserved", appointment.id);
                Ok(appointment)
            }
            ReserveOutcome::Full => {
                warn!("Reservation lost: slot is full");
                Err(SchedulingError::Conflict)
            }
        }
    }

    /// The patient's scheduled appointment in exactly this slot, if any.
    pub async fn existing_booking(&self, patient_id: Uuid, slot: &Slot) -> Result<Option<Appointment>, SchedulingError> {
        let key = slot.key();
        Ok(self
            .store
            .list_appointments_for_patient(patient_id)
            .await?
            .into_iter()
            .find(|a| a.is_scheduled() && a.slot_key() == key))
    }

    /// Marks a scheduled appointment as completed once its start time has passed.
    #[instrument(skip(self))]
    pub async fn complete(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        let appointment = self
            .store
            .get_appointment(appointment_id)
            .await?
            .filter(|a| a.is_scheduled())
            .ok_or_else(|| SchedulingError::NotFound("Scheduled appointment".to_string()))?;

        if appointment.date.and_time(appointment.start_time) > self.clock.local_now() {
            return Err(SchedulingError::Validation(
                "appointment has not started yet".to_string(),
            ));
        }

        match self.store.complete_appointment(appointment_id).await {
            Ok(completed) => {
                info!("Appointment completed");
                Ok(completed)
            }
            Err(StoreError::NotFound(_)) => Err(SchedulingError::NotFound("Scheduled appointment".to_string())),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, appointment_id: Uuid, patient_id: Uuid) -> Result<CancelOutcome, SchedulingError> {
        let Some(appointment) = self.store.get_appointment(appointment_id).await? else {
            return Ok(CancelOutcome::NotFound);
        };
        if appointment.patient_id != patient_id {
            warn!("Patient does not own the appointment");
            return Ok(CancelOutcome::Forbidden);
        }
        if !appointment.is_scheduled() {
            return Ok(CancelOutcome::NotFound);
        }

        match self.store.cancel_appointment(appointment_id).await {
            Ok(_) => {
                info!("Appointment cancelled");
                Ok(CancelOutcome::Ok)
            }
            Err(StoreError::NotFound(_)) => Ok(CancelOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Scheduled appointments in date order plus the most recent cancelled
    /// and completed ones.
    pub async fn list_for_patient(&self, patient_id: Uuid) -> Result<PatientAppointments, SchedulingError> {
        let appointments = self.store.list_appointments_for_patient(patient_id).await?;
        let mut details = self.describe(appointments).await?;
        details.sort_by_key(|d| (d.appointment.date, d.appointment.start_time));

        let keep = self.rules.recent_history;
        let recent = |status: AppointmentStatus| -> Vec<AppointmentDetails> {
            details
                .iter()
                .rev()
                .filter(|d| d.appointment.status == status)
                .take(keep)
                .cloned()
                .collect()
        };

        Ok(PatientAppointments {
            scheduled: details
                .iter()
                .filter(|d| d.appointment.is_scheduled())
                .cloned()
                .collect(),
            recent_cancelled: recent(AppointmentStatus::Cancelled),
            recent_completed: recent(AppointmentStatus::Completed),
        })
    }

    async fn describe(&self, appointments: Vec<Appointment>) -> Result<Vec<AppointmentDetails>, SchedulingError> {
        let mut doctor_names: HashMap<Uuid, String> = HashMap::new();
        let mut specialty_names: HashMap<Uuid, String> = HashMap::new();
        let mut details = Vec::with_capacity(appointments.len());

        for appointment in appointments {
            if !doctor_names.contains_key(&appointment.doctor_id) {
                let name = self
                    .store
                    .get_doctor(appointment.doctor_id)
                    .await?
                    .map(|d| d.name)
                    .unwrap_or_default();
                doctor_names.insert(appointment.doctor_id, name);
            }
            if !specialty_names.contains_key(&appointment.specialty_id) {
                let name = self
                    .store
                    .get_specialty(appointment.specialty_id)
                    .await?
                    .map(|s| s.name)
                    .unwrap_or_default();
                specialty_names.insert(appointment.specialty_id, name);
            }

            details.push(AppointmentDetails {
                doctor_name: doctor_names.get(&appointment.doctor_id).cloned().unwrap_or_default(),
                specialty_name: specialty_names
                    .get(&appointment.specialty_id)
                    .cloned()
                    .unwrap_or_default(),
                appointment,
            });
        }
        Ok(details)
    }
}
