use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Schedule,
    Cancel,
    List,
    ProvideField,
    SelectOption,
    /// Bare greeting; restarts the conversation.
    Greeting,
    /// Question about the clinic itself (phone, address, opening hours).
    Info,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Evening,
}

impl DayPeriod {
    pub fn contains(&self, time: NaiveTime) -> bool {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        let evening = NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN);
        match self {
            DayPeriod::Morning => time < noon,
            DayPeriod::Afternoon => time >= noon && time < evening,
            DayPeriod::Evening => time >= evening,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    LanguageModel,
    Keyword,
}

/// What the conversation is currently waiting for. Lets the extractor read a bare
/// "123" as a CPF attempt, or a bare "2" as an option number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedInput {
    NationalId,
    Name,
    Phone,
    Email,
    /// Health-plan card number, or a word meaning private care.
    HealthPlan,
    Intent,
    Specialty,
    SlotChoice,
    TimeOfDay,
    Confirmation,
    AppointmentChoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionContext {
    /// Clinic-local date and time used to anchor relative phrases.
    pub today: NaiveDate,
    pub now: NaiveTime,
    pub expecting: Option<ExpectedInput>,
    /// Number of options currently on screen, 0 when none.
    pub offered_options: usize,
    /// Active specialty names, so the model can pick one verbatim.
    pub known_specialties: Vec<String>,
    /// Active clinic locations, by name and city.
    #[serde(default)]
    pub known_locations: Vec<String>,
}

impl ExtractionContext {
    pub fn new(today: NaiveDate, now: NaiveTime) -> Self {
        Self {
            today,
            now,
            expecting: None,
            offered_options: 0,
            known_specialties: Vec::new(),
            known_locations: Vec::new(),
        }
    }

    pub fn expecting(mut self, expected: ExpectedInput) -> Self {
        self.expecting = Some(expected);
        self
    }

    pub fn with_options(mut self, offered: usize) -> Self {
        self.offered_options = offered;
        self
    }

    pub fn with_specialties(mut self, names: Vec<String>) -> Self {
        self.known_specialties = names;
        self
    }

    pub fn with_locations(mut self, names: Vec<String>) -> Self {
        self.known_locations = names;
        self
    }

    pub fn is_expecting(&self, expected: ExpectedInput) -> bool {
        self.expecting == Some(expected)
    }
}

/// Structured reading of one utterance. Absent fields are `None`; nothing is guessed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub intent: Intent,
    pub national_id: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Patient declined to give an e-mail ("pular").
    #[serde(default)]
    pub email_skipped: bool,
    /// Card number as typed, before validation.
    #[serde(default)]
    pub health_plan_card: Option<String>,
    /// Patient chose private care instead of a health plan.
    #[serde(default)]
    pub private_care: bool,
    pub specialty_name: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    pub raw_date_phrase: Option<String>,
    pub raw_time_phrase: Option<String>,
    pub resolved_date: Option<NaiveDate>,
    pub resolved_time: Option<NaiveTime>,
    pub period: Option<DayPeriod>,
    pub doctor_reference: Option<String>,
    /// 1-based option number.
    pub selection_index: Option<usize>,
    /// `Some(true)` for yes, `Some(false)` for no.
    pub affirmative: Option<bool>,
    pub original_text: String,
    pub source: ExtractionSource,
}

impl ExtractionResult {
    pub fn empty(original_text: &str, source: ExtractionSource) -> Self {
        Self {
            intent: Intent::Unknown,
            national_id: None,
            name: None,
            phone: None,
            email: None,
            email_skipped: false,
            health_plan_card: None,
            private_care: false,
            specialty_name: None,
            location_name: None,
            raw_date_phrase: None,
            raw_time_phrase: None,
            resolved_date: None,
            resolved_time: None,
            period: None,
            doctor_reference: None,
            selection_index: None,
            affirmative: None,
            original_text: original_text.to_string(),
            source,
        }
    }

    /// Intent `Unknown` with the text kept for the manual fallback prompt.
    pub fn unknown(original_text: &str) -> Self {
        Self::empty(original_text, ExtractionSource::Keyword)
    }

    pub fn has_any_field(&self) -> bool {
        self.national_id.is_some()
            || self.name.is_some()
            || self.phone.is_some()
            || self.email.is_some()
            || self.email_skipped
            || self.health_plan_card.is_some()
            || self.private_care
            || self.specialty_name.is_some()
            || self.location_name.is_some()
            || self.resolved_date.is_some()
            || self.resolved_time.is_some()
            || self.period.is_some()
            || self.doctor_reference.is_some()
            || self.selection_index.is_some()
            || self.affirmative.is_some()
    }

    pub fn is_unknown(&self) -> bool {
        self.intent == Intent::Unknown && !self.has_any_field()
    }
}
