// libs/shared/models/src/clinic.rs
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ==============================================================================
// CLINIC-WIDE RULES
// ==============================================================================

pub const MIN_CONSULTATION_MINUTES: u32 = 15;
pub const MAX_CONSULTATION_MINUTES: u32 = 60;

pub const MIN_HEALTH_PLAN_CARD_LEN: usize = 6;
pub const MAX_HEALTH_PLAN_CARD_LEN: usize = 50;

/// Opening hour of the clinic, independent of any doctor's template.
pub fn clinic_opens_at() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Closing hour of the clinic. A slot must end at or before this time.
pub fn clinic_closes_at() -> NaiveTime {
    NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Monday to Friday.
pub fn is_clinic_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Day-of-week index used by availability templates: 0 = Sunday ... 6 = Saturday.
pub fn day_of_week_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum EntityValidationError {
    #[error("consultation duration {0} min is outside {MIN_CONSULTATION_MINUTES}-{MAX_CONSULTATION_MINUTES} min")]
    DurationOutOfRange(u32),

    #[error("capacity per slot must be at least 1")]
    ZeroCapacity,

    #[error("day of week {0} must be between 0 (Sunday) and 6 (Saturday)")]
    InvalidDayOfWeek(u8),

    #[error("start time must be before end time")]
    EmptyTimeRange,

    #[error("{0} must not be empty")]
    MissingField(&'static str),
}

// ==============================================================================
// PATIENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareType {
    #[default]
    Private,
    HealthPlan,
}

impl fmt::Display for CareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CareType::Private => write!(f, "private"),
            CareType::HealthPlan => write!(f, "health_plan"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    /// CPF, 11 digits, no punctuation.
    pub national_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub care_type: CareType,
    /// Set only for `CareType::HealthPlan`.
    #[serde(default)]
    pub health_plan_card: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub national_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub care_type: CareType,
    #[serde(default)]
    pub health_plan_card: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactUpdate {
    pub phone: Option<String>,
    pub email: Option<String>,
}

// ==============================================================================
// DIRECTORY
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialty {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub requires_referral: bool,
}

/// Clinic unit where a doctor attends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub active: bool,
}

impl Location {
    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if self.name.trim().is_empty() {
            return Err(EntityValidationError::MissingField("name"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub specialty_id: Uuid,
    pub active: bool,
    pub capacity_per_slot: u32,
    pub consultation_duration_minutes: u32,
    /// No slot is generated before this date when set.
    #[serde(default)]
    pub schedule_opens_on: Option<NaiveDate>,
}

impl Doctor {
    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if self.name.trim().is_empty() {
            return Err(EntityValidationError::MissingField("name"));
        }
        if self.capacity_per_slot == 0 {
            return Err(EntityValidationError::ZeroCapacity);
        }
        if !(MIN_CONSULTATION_MINUTES..=MAX_CONSULTATION_MINUTES)
            .contains(&self.consultation_duration_minutes)
        {
            return Err(EntityValidationError::DurationOutOfRange(
                self.consultation_duration_minutes,
            ));
        }
        Ok(())
    }

    pub fn schedule_open_on(&self, date: NaiveDate) -> bool {
        self.schedule_opens_on.map_or(true, |opens| date >= opens)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilitySlotTemplate {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: u8, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub location_id: Option<Uuid>,
}

impl AvailabilitySlotTemplate {
    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if self.day_of_week > 6 {
            return Err(EntityValidationError::InvalidDayOfWeek(self.day_of_week));
        }
        if self.start_time >= self.end_time {
            return Err(EntityValidationError::EmptyTimeRange);
        }
        Ok(())
    }
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub specialty_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_scheduled(&self) -> bool {
        self.status == AppointmentStatus::Scheduled
    }

    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            date: self.date,
            start_time: self.start_time,
        }
    }
}

/// Identity of a bookable slot; capacity is counted per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

/// A discrete bookable (doctor, date, start_time, duration) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub specialty_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    /// Unit of the template the slot came from.
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub location_name: Option<String>,
}

impl Slot {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            date: self.date,
            start_time: self.start_time,
        }
    }

    pub fn end_time(&self) -> NaiveTime {
        self.start_time + Duration::minutes(self.duration_minutes as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doctor(duration: u32, capacity: u32) -> Doctor {
        Doctor {
            id: Uuid::new_v4(),
            name: "Dra. Ana Souza".to_string(),
            specialty_id: Uuid::new_v4(),
            active: true,
            capacity_per_slot: capacity,
            consultation_duration_minutes: duration,
            schedule_opens_on: None,
        }
    }

    #[test]
    fn doctor_duration_bounds() {
        assert!(doctor(15, 1).validate().is_ok());
        assert!(doctor(60, 1).validate().is_ok());
        assert_eq!(
            doctor(10, 1).validate(),
            Err(EntityValidationError::DurationOutOfRange(10))
        );
        assert_eq!(
            doctor(90, 1).validate(),
            Err(EntityValidationError::DurationOutOfRange(90))
        );
        assert_eq!(doctor(30, 0).validate(), Err(EntityValidationError::ZeroCapacity));
    }

    #[test]
    fn weekday_index_starts_on_sunday() {
        let sunday = NaiveDate::from_ymd_opt(2026, 10, 11).unwrap();
        let wednesday = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        assert_eq!(day_of_week_index(sunday), 0);
        assert_eq!(day_of_week_index(wednesday), 3);
        assert!(!is_clinic_day(sunday));
        assert!(is_clinic_day(wednesday));
    }

    #[test]
    fn schedule_opening_date_blocks_earlier_days() {
        let mut d = doctor(30, 1);
        let opens = NaiveDate::from_ymd_opt(2026, 11, 2).unwrap();
        d.schedule_opens_on = Some(opens);
        assert!(!d.schedule_open_on(NaiveDate::from_ymd_opt(2026, 10, 30).unwrap()));
        assert!(d.schedule_open_on(opens));
    }
}
