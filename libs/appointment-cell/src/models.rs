use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::{Appointment, Slot};

// ==============================================================================
// BUSINESS RULES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SchedulingRules {
    /// Same-day slots must start at least this long after now.
    pub min_lead_minutes: i64,
    /// Days searched forward when no date (or no free date) is given.
    pub horizon_days: i64,
    pub max_offered: usize,
    /// Maximum distance between a requested hour and an offered slot.
    pub time_tolerance_minutes: i64,
    pub recent_history: usize,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            min_lead_minutes: 60,
            horizon_days: 50,
            max_offered: 5,
            time_tolerance_minutes: 60,
            recent_history: 3,
        }
    }
}

// ==============================================================================
// CANDIDATE SEARCH
// ==============================================================================

/// Half-open time-of-day window, `from <= start_time < to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: NaiveTime,
    pub to: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.from && time < self.to
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateQuery {
    pub specialty_id: Uuid,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub window: Option<TimeWindow>,
    pub doctor_id: Option<Uuid>,
    /// Only slots whose template belongs to this location.
    #[serde(default)]
    pub location_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl CandidateQuery {
    pub fn for_specialty(specialty_id: Uuid) -> Self {
        Self {
            specialty_id,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CandidateSearch {
    pub slots: Vec<Slot>,
    /// The requested date had nothing free; `slots` come from later days.
    pub requested_date_unavailable: bool,
}

// ==============================================================================
// RESERVATION AND CANCELLATION
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Ok,
    NotFound,
    /// The appointment belongs to another patient.
    Forbidden,
}

/// An appointment with the directory names needed to show it to a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentDetails {
    pub appointment: Appointment,
    pub doctor_name: String,
    pub specialty_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatientAppointments {
    pub scheduled: Vec<AppointmentDetails>,
    pub recent_cancelled: Vec<AppointmentDetails>,
    pub recent_completed: Vec<AppointmentDetails>,
}

impl PatientAppointments {
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty() && self.recent_cancelled.is_empty() && self.recent_completed.is_empty()
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Lost the race for the slot, or it is no longer bookable.
    #[error("Slot no longer available")]
    Conflict,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<SchedulingError> for AppError {
    fn from(e: SchedulingError) -> Self {
        match e {
            SchedulingError::Validation(msg) => AppError::ValidationError(msg),
            SchedulingError::NotFound(_) => AppError::NotFound(e.to_string()),
            SchedulingError::Conflict => AppError::Conflict(e.to_string()),
            SchedulingError::Storage(inner) => inner.into(),
        }
    }
}
