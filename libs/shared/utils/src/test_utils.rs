use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{ClinicStore, InMemoryClinicStore, StoreResult};
use shared_models::{AvailabilitySlotTemplate, CareType, Doctor, Location, NewPatient, Patient, Specialty};

use crate::clock::FixedClock;

pub const TEST_UTC_OFFSET_MINUTES: i32 = -180;

/// Valid CPFs (check digits verified).
pub const CPF_MARIA: &str = "52998224725";
pub const CPF_JOAO: &str = "11144477735";
pub const CPF_UNREGISTERED: &str = "12345678909";

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn test_config() -> AppConfig {
    AppConfig {
        supabase_url: "http://localhost:54321".to_string(),
        supabase_anon_key: "test-anon-key".to_string(),
        clinic_utc_offset_minutes: TEST_UTC_OFFSET_MINUTES,
        ..AppConfig::default()
    }
}

pub fn specialty(name: &str, requires_referral: bool) -> Specialty {
    Specialty {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: None,
        active: true,
        requires_referral,
    }
}

pub fn location(name: &str, city: &str) -> Location {
    Location {
        id: Uuid::new_v4(),
        name: name.to_string(),
        address: None,
        city: Some(city.to_string()),
        phone: None,
        active: true,
    }
}

pub fn doctor(name: &str, specialty: &Specialty, capacity: u32, duration: u32) -> Doctor {
    Doctor {
        id: Uuid::new_v4(),
        name: name.to_string(),
        specialty_id: specialty.id,
        active: true,
        capacity_per_slot: capacity,
        consultation_duration_minutes: duration,
        schedule_opens_on: None,
    }
}

/// A small seeded clinic. "Now" is Wednesday 2026-10-14 10:00 (UTC-3).
///
/// | doctor          | specialty     | days          | hours       | cap | min |
/// |-----------------|---------------|---------------|-------------|-----|-----|
/// | Dra. Ana Souza  | Cardiologia   | Mon-Fri       | 08:00-12:00 | 1   | 30  |
/// | Dr. Bruno Costa | Cardiologia   | Mon, Wed, Fri | 14:00-18:00 | 2   | 60  |
/// | Dra. Carla Dias | Dermatologia  | Tue, Thu      | 09:00-12:00 | 1   | 30  |
/// | Dr. Diego Melo  | Ortopedia     | Mon           | 08:00-10:00 | 1   | 60  |
///
/// Ortopedia requires a referral; Neurologia exists but is inactive. Dr. Bruno
/// attends at Unidade Norte, everyone else at Unidade Centro (both in Campinas).
pub struct ClinicFixture {
    pub store: Arc<InMemoryClinicStore>,
    pub clock: Arc<FixedClock>,
    pub cardiology: Specialty,
    pub dermatology: Specialty,
    pub orthopedics: Specialty,
    pub neurology: Specialty,
    pub centro: Location,
    pub norte: Location,
    pub dr_ana: Doctor,
    pub dr_bruno: Doctor,
    pub dr_carla: Doctor,
    pub dr_diego: Doctor,
}

impl ClinicFixture {
    pub fn now_date() -> NaiveDate {
        date(2026, 10, 14)
    }

    pub async fn new() -> Self {
        Self::seed(Self::now_date(), time(10, 0))
            .await
            .unwrap()
    }

    pub async fn seed(today: NaiveDate, now: NaiveTime) -> StoreResult<Self> {
        let store = Arc::new(InMemoryClinicStore::new());
        let clock = Arc::new(FixedClock::at(today, now, TEST_UTC_OFFSET_MINUTES));

        let cardiology = store.upsert_specialty(specialty("Cardiologia", false)).await?;
        let dermatology = store.upsert_specialty(specialty("Dermatologia", false)).await?;
        let orthopedics = store.upsert_specialty(specialty("Ortopedia", true)).await?;
        let mut inactive = specialty("Neurologia", false);
        inactive.active = false;
        let neurology = store.upsert_specialty(inactive).await?;

        let centro = store.upsert_location(location("Unidade Centro", "Campinas")).await?;
        let norte = store.upsert_location(location("Unidade Norte", "Campinas")).await?;

        let dr_ana = store.upsert_doctor(doctor("Dra. Ana Souza", &cardiology, 1, 30)).await?;
        let dr_bruno = store.upsert_doctor(doctor("Dr. Bruno Costa", &cardiology, 2, 60)).await?;
        let dr_carla = store.upsert_doctor(doctor("Dra. Carla Dias", &dermatology, 1, 30)).await?;
        let dr_diego = store.upsert_doctor(doctor("Dr. Diego Melo", &orthopedics, 1, 60)).await?;

        for day in 1..=5 {
            add_template(&store, &dr_ana, &centro, day, time(8, 0), time(12, 0)).await?;
        }
        for day in [1, 3, 5] {
            add_template(&store, &dr_bruno, &norte, day, time(14, 0), time(18, 0)).await?;
        }
        for day in [2, 4] {
            add_template(&store, &dr_carla, &centro, day, time(9, 0), time(12, 0)).await?;
        }
        add_template(&store, &dr_diego, &centro, 1, time(8, 0), time(10, 0)).await?;

        Ok(Self {
            store,
            clock,
            cardiology,
            dermatology,
            orthopedics,
            neurology,
            centro,
            norte,
            dr_ana,
            dr_bruno,
            dr_carla,
            dr_diego,
        })
    }

    pub async fn seed_patient(&self, national_id: &str, name: &str) -> Patient {
        self.store
            .insert_patient(NewPatient {
                national_id: national_id.to_string(),
                name: name.to_string(),
                phone: Some("31999998888".to_string()),
                email: None,
                care_type: CareType::Private,
                health_plan_card: None,
            })
            .await
            .unwrap()
    }

    pub fn store_handle(&self) -> Arc<dyn ClinicStore> {
        self.store.clone()
    }
}

async fn add_template(
    store: &InMemoryClinicStore,
    doctor: &Doctor,
    location: &Location,
    day_of_week: u8,
    start_time: NaiveTime,
    end_time: NaiveTime,
) -> StoreResult<AvailabilitySlotTemplate> {
    store
        .add_template(AvailabilitySlotTemplate {
            id: Uuid::new_v4(),
            doctor_id: doctor.id,
            day_of_week,
            start_time,
            end_time,
            location_id: Some(location.id),
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;

    #[tokio::test]
    async fn fixture_seeds_directory() {
        let fixture = ClinicFixture::new().await;

        let active = fixture.store.list_specialties(true).await.unwrap();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(|s| s.name != "Neurologia"));

        let cardiologists = fixture
            .store
            .list_doctors(Some(fixture.cardiology.id))
            .await
            .unwrap();
        assert_eq!(cardiologists.len(), 2);
        assert_eq!(fixture.clock.today(), ClinicFixture::now_date());
    }
}
