use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use appointment_cell::{AppointmentDetails, SchedulingError};
use doctor_cell::DirectoryError;
use intent_cell::{DayPeriod, Intent};
use patient_cell::IdentityError;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::{Slot, Specialty};

// ==============================================================================
// STATES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    #[default]
    Start,
    IdentifyPatient,
    RegisterPatient,
    ChooseIntent,
    SelectSpecialty,
    SelectSlot,
    Confirm,
    ListAppointments,
    SelectCancelTarget,
    ConfirmCancel,
    Done,
    Error,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Start => "START",
            ConversationState::IdentifyPatient => "IDENTIFY_PATIENT",
            ConversationState::RegisterPatient => "REGISTER_PATIENT",
            ConversationState::ChooseIntent => "CHOOSE_INTENT",
            ConversationState::SelectSpecialty => "SELECT_SPECIALTY",
            ConversationState::SelectSlot => "SELECT_SLOT",
            ConversationState::Confirm => "CONFIRM",
            ConversationState::ListAppointments => "LIST_APPOINTMENTS",
            ConversationState::SelectCancelTarget => "SELECT_CANCEL_TARGET",
            ConversationState::ConfirmCancel => "CONFIRM_CANCEL",
            ConversationState::Done => "DONE",
            ConversationState::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationState::Done)
    }

    /// States waiting for an explicit yes/no.
    pub fn is_confirmation(&self) -> bool {
        matches!(self, ConversationState::Confirm | ConversationState::ConfirmCancel)
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// COLLECTED FIELDS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Flag,
    Date,
    Time,
    Id,
    Index,
    Intent,
    Period,
}

/// Every field a conversation can collect. Each one has a fixed value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    NationalId,
    Name,
    Phone,
    Email,
    EmailSkipped,
    HealthPlanCard,
    PrivateCare,
    PendingIntent,
    SpecialtyId,
    SpecialtyName,
    LocationId,
    LocationName,
    Date,
    Time,
    Period,
    TimeFollowUpAsked,
    DoctorId,
    DoctorReference,
    SlotChoice,
    CancelTarget,
    AttachmentReceived,
}

impl FieldName {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldName::NationalId
            | FieldName::Name
            | FieldName::Phone
            | FieldName::Email
            | FieldName::HealthPlanCard
            | FieldName::SpecialtyName
            | FieldName::LocationName
            | FieldName::DoctorReference => FieldKind::Text,
            FieldName::EmailSkipped
            | FieldName::PrivateCare
            | FieldName::TimeFollowUpAsked
            | FieldName::AttachmentReceived => FieldKind::Flag,
            FieldName::PendingIntent => FieldKind::Intent,
            FieldName::SpecialtyId | FieldName::LocationId | FieldName::DoctorId | FieldName::CancelTarget => {
                FieldKind::Id
            }
            FieldName::Date => FieldKind::Date,
            FieldName::Time => FieldKind::Time,
            FieldName::Period => FieldKind::Period,
            FieldName::SlotChoice => FieldKind::Index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Id(Uuid),
    Index(usize),
    Intent(Intent),
    Period(DayPeriod),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Flag(_) => FieldKind::Flag,
            FieldValue::Date(_) => FieldKind::Date,
            FieldValue::Time(_) => FieldKind::Time,
            FieldValue::Id(_) => FieldKind::Id,
            FieldValue::Index(_) => FieldKind::Index,
            FieldValue::Intent(_) => FieldKind::Intent,
            FieldValue::Period(_) => FieldKind::Period,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Inserted,
    /// Same value supplied again.
    Unchanged,
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("field {field:?} expects {expected:?}, got {actual:?}")]
pub struct FieldKindMismatch {
    pub field: FieldName,
    pub expected: FieldKind,
    pub actual: FieldKind,
}

/// Typed field map; a value is only stored under a name of the same kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectedFields(BTreeMap<FieldName, FieldValue>);

impl CollectedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: FieldName, value: FieldValue) -> Result<SetOutcome, FieldKindMismatch> {
        if name.kind() != value.kind() {
            return Err(FieldKindMismatch {
                field: name,
                expected: name.kind(),
                actual: value.kind(),
            });
        }

        Ok(match self.0.insert(name, value.clone()) {
            None => SetOutcome::Inserted,
            Some(previous) if previous == value => SetOutcome::Unchanged,
            Some(_) => SetOutcome::Replaced,
        })
    }

    pub fn get(&self, name: FieldName) -> Option<&FieldValue> {
        self.0.get(&name)
    }

    pub fn contains(&self, name: FieldName) -> bool {
        self.0.contains_key(&name)
    }

    pub fn remove(&mut self, name: FieldName) -> Option<FieldValue> {
        self.0.remove(&name)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn text(&self, name: FieldName) -> Option<&str> {
        match self.get(name) {
            Some(FieldValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    pub fn flag(&self, name: FieldName) -> bool {
        matches!(self.get(name), Some(FieldValue::Flag(true)))
    }

    pub fn date(&self, name: FieldName) -> Option<NaiveDate> {
        match self.get(name) {
            Some(FieldValue::Date(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn time(&self, name: FieldName) -> Option<NaiveTime> {
        match self.get(name) {
            Some(FieldValue::Time(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn id(&self, name: FieldName) -> Option<Uuid> {
        match self.get(name) {
            Some(FieldValue::Id(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn index(&self, name: FieldName) -> Option<usize> {
        match self.get(name) {
            Some(FieldValue::Index(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn intent(&self, name: FieldName) -> Option<Intent> {
        match self.get(name) {
            Some(FieldValue::Intent(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn period(&self, name: FieldName) -> Option<DayPeriod> {
        match self.get(name) {
            Some(FieldValue::Period(value)) => Some(*value),
            _ => None,
        }
    }
}

// ==============================================================================
// CONVERSATION
// ==============================================================================

/// Serializable snapshot of one chat session, stored between turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub state: ConversationState,
    /// State re-entered on the next message after an `Error` checkpoint.
    #[serde(default)]
    pub resume_state: Option<ConversationState>,
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub collected_fields: CollectedFields,
    /// Slots exactly as numbered for the patient.
    #[serde(default)]
    pub pending_candidate_slots: Vec<Slot>,
    #[serde(default)]
    pub pending_appointments: Vec<AppointmentDetails>,
    #[serde(default)]
    pub offered_specialties: Vec<Specialty>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            state: ConversationState::Start,
            resume_state: None,
            patient_id: None,
            collected_fields: CollectedFields::new(),
            pending_candidate_slots: Vec::new(),
            pending_appointments: Vec::new(),
            offered_specialties: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// New logical booking; an identified patient and their CPF are kept.
    pub fn reset(&mut self) {
        let national_id = self
            .patient_id
            .and_then(|_| self.collected_fields.get(FieldName::NationalId).cloned());

        self.state = ConversationState::Start;
        self.resume_state = None;
        self.collected_fields.clear();
        if let Some(value) = national_id {
            self.collected_fields.0.insert(FieldName::NationalId, value);
        }
        self.clear_offers();
    }

    pub fn clear_offers(&mut self) {
        self.pending_candidate_slots.clear();
        self.pending_appointments.clear();
        self.offered_specialties.clear();
    }

    /// Number of options currently on screen for the patient.
    pub fn offered_options(&self) -> usize {
        match self.state {
            ConversationState::ChooseIntent => 3,
            ConversationState::SelectSpecialty => self.offered_specialties.len(),
            ConversationState::SelectSlot => self.pending_candidate_slots.len(),
            ConversationState::SelectCancelTarget => self.pending_appointments.len(),
            _ => 0,
        }
    }
}

// ==============================================================================
// RESPONSES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyOption {
    pub index: usize,
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotOption {
    pub index: usize,
    pub label: String,
    pub doctor_name: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    #[serde(default)]
    pub location_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentOption {
    pub index: usize,
    pub id: Uuid,
    pub label: String,
    pub status: String,
}

/// Selectable buttons rendered next to the reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum OptionsPayload {
    #[default]
    None,
    SpecialtyList(Vec<SpecialtyOption>),
    SlotList(Vec<SlotOption>),
    AppointmentList(Vec<AppointmentOption>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response_text: String,
    pub options: OptionsPayload,
    pub state: ConversationState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageRequest {
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentNotice {
    pub file_name: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversationError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Slot no longer available")]
    Conflict,

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<FieldKindMismatch> for ConversationError {
    fn from(e: FieldKindMismatch) -> Self {
        ConversationError::Validation(e.to_string())
    }
}

impl From<StoreError> for ConversationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ConversationError::NotFound(what),
            StoreError::Duplicate(_) | StoreError::Conflict(_) => ConversationError::Conflict,
            other => ConversationError::Storage(other.to_string()),
        }
    }
}

impl From<IdentityError> for ConversationError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Invalid { reason, .. } => ConversationError::Validation(reason),
            IdentityError::NotFound => ConversationError::NotFound("Patient".to_string()),
            IdentityError::Storage(inner) => ConversationError::Storage(inner.to_string()),
        }
    }
}

impl From<DirectoryError> for ConversationError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::Storage(inner) => ConversationError::Storage(inner.to_string()),
            DirectoryError::SpecialtyNotFound => ConversationError::NotFound("Specialty".to_string()),
            DirectoryError::DoctorNotFound => ConversationError::NotFound("Doctor".to_string()),
            other => ConversationError::Validation(other.to_string()),
        }
    }
}

impl From<SchedulingError> for ConversationError {
    fn from(e: SchedulingError) -> Self {
        match e {
            SchedulingError::Validation(msg) => ConversationError::Validation(msg),
            SchedulingError::NotFound(what) => ConversationError::NotFound(what),
            SchedulingError::Conflict => ConversationError::Conflict,
            SchedulingError::Storage(inner) => ConversationError::Storage(inner.to_string()),
        }
    }
}

impl From<ConversationError> for AppError {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::Validation(msg) => AppError::ValidationError(msg),
            ConversationError::NotFound(_) => AppError::NotFound(e.to_string()),
            ConversationError::Conflict => AppError::Conflict(e.to_string()),
            ConversationError::ExternalService(msg) => AppError::ExternalService(msg),
            ConversationError::Storage(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn conversation() -> Conversation {
        Conversation::new("chat", Utc.with_ymd_and_hms(2026, 10, 14, 13, 0, 0).unwrap())
    }

    #[test]
    fn fields_reject_values_of_another_kind() {
        let mut fields = CollectedFields::new();
        let err = fields
            .set(FieldName::Date, FieldValue::Text("amanhã".to_string()))
            .unwrap_err();
        assert_eq!(err.expected, FieldKind::Date);
        assert_eq!(err.actual, FieldKind::Text);
        assert!(fields.is_empty());
    }

    #[test]
    fn repeated_value_is_unchanged() {
        let mut fields = CollectedFields::new();
        let value = FieldValue::Text("Maria Silva".to_string());
        assert_eq!(fields.set(FieldName::Name, value.clone()), Ok(SetOutcome::Inserted));
        assert_eq!(fields.set(FieldName::Name, value), Ok(SetOutcome::Unchanged));
        assert_eq!(
            fields.set(FieldName::Name, FieldValue::Text("Maria S.".to_string())),
            Ok(SetOutcome::Replaced)
        );
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn reset_keeps_cpf_of_identified_patient() {
        let cpf = FieldValue::Text("52998224725".to_string());

        let mut anonymous = conversation();
        anonymous.collected_fields.set(FieldName::NationalId, cpf.clone()).unwrap();
        anonymous.reset();
        assert!(anonymous.collected_fields.is_empty());

        let mut known = conversation();
        known.patient_id = Some(Uuid::new_v4());
        known.state = ConversationState::Done;
        known.collected_fields.set(FieldName::NationalId, cpf.clone()).unwrap();
        known.collected_fields.set(FieldName::SlotChoice, FieldValue::Index(2)).unwrap();
        known.reset();
        assert_eq!(known.state, ConversationState::Start);
        assert_eq!(known.collected_fields.len(), 1);
        assert_eq!(known.collected_fields.get(FieldName::NationalId), Some(&cpf));
    }

    #[test]
    fn states_serialize_in_screaming_case() {
        let json = serde_json::to_value(ConversationState::SelectCancelTarget).unwrap();
        assert_eq!(json, "SELECT_CANCEL_TARGET");
        assert_eq!(ConversationState::SelectCancelTarget.as_str(), "SELECT_CANCEL_TARGET");
    }
}
