use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::{
    AppointmentDetails, CancelOutcome, CandidateQuery, SchedulingError, SchedulingRules, SlotAllocationService,
    TimeWindow,
};
use doctor_cell::{
    match_doctor, match_location, match_specialty, DirectoryService, DoctorMatch, LocationMatch, SpecialtyMatch,
};
use intent_cell::{DayPeriod, ExpectedInput, ExtractionContext, ExtractionResult, Intent, IntentExtractor};
use patient_cell::services::contact::{validate_email, validate_health_plan_card, validate_name, validate_phone};
use patient_cell::services::national_id;
use patient_cell::{IdentityError, IdentityResolver, IdentityStatus, PatientRegistration};
use shared_config::AppConfig;
use shared_database::ClinicStore;
use shared_models::{Appointment, CareType, Location, Slot, Specialty};
use shared_utils::Clock;

use crate::models::{
    AppointmentOption, AttachmentNotice, ChatResponse, Conversation, ConversationError, ConversationState,
    FieldName, FieldValue, OptionsPayload, SlotOption, SpecialtyOption,
};
use crate::prompts;
use crate::store::ConversationStore;

pub const MAX_MESSAGE_CHARS: usize = 2000;

const REFERRAL_RECEIVED_NOTE: &str = "Encaminhamento médico recebido pelo chat.";
const REFERRAL_PENDING_NOTE: &str = "Encaminhamento médico pendente: paciente apresentará no dia da consulta.";

/// Fields that belong to one booking attempt.
const BOOKING_FIELDS: [FieldName; 11] = [
    FieldName::SpecialtyId,
    FieldName::SpecialtyName,
    FieldName::LocationId,
    FieldName::LocationName,
    FieldName::Date,
    FieldName::Time,
    FieldName::Period,
    FieldName::TimeFollowUpAsked,
    FieldName::DoctorId,
    FieldName::DoctorReference,
    FieldName::SlotChoice,
];

/// Drives one conversation turn at a time: extraction, field merge,
/// transition, persistence.
///
/// Turns of the same conversation are serialized; different conversations
/// run concurrently and only meet at the clinic store.
pub struct ConversationEngine {
    store: Arc<dyn ClinicStore>,
    conversations: Arc<dyn ConversationStore>,
    extractor: Arc<dyn IntentExtractor>,
    identity: IdentityResolver,
    directory: DirectoryService,
    allocation: SlotAllocationService,
    clock: Arc<dyn Clock>,
    clinic_name: String,
    clinic_phone: String,
    sessions: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<dyn ClinicStore>,
        conversations: Arc<dyn ConversationStore>,
        extractor: Arc<dyn IntentExtractor>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(store.clone()),
            directory: DirectoryService::new(store.clone()),
            allocation: SlotAllocationService::new(store.clone(), clock.clone()),
            store,
            conversations,
            extractor,
            clock,
            clinic_name: config.clinic_name.clone(),
            clinic_phone: config.clinic_phone.clone(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_rules(mut self, rules: SchedulingRules) -> Self {
        self.allocation = SlotAllocationService::with_rules(self.store.clone(), self.clock.clone(), rules);
        self
    }

    async fn session_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(id.to_string()).or_default().clone()
    }

    /// Drops the per-conversation lock once no other turn holds or awaits it.
    async fn release_session(&self, id: &str, session: Arc<Mutex<()>>) {
        let mut sessions = self.sessions.lock().await;
        let idle = sessions
            .get(id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &session) && Arc::strong_count(&session) == 2);
        if idle {
            sessions.remove(id);
        }
    }

    /// Conversations with a turn in flight or waiting for one.
    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    // ==========================================================================
    // ENTRY POINTS
    // ==========================================================================

    /// Processes one patient message and persists the resulting state.
    ///
    /// A storage failure leaves the last stored conversation as the
    /// checkpoint, marked `Error`, and the next message resumes from it.
    #[instrument(skip(self, message), fields(conversation = %conversation_id))]
    pub async fn handle_message(
        &self,
        conversation_id: &str,
        message: &str,
    ) -> Result<ChatResponse, ConversationError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ConversationError::Validation("message must not be empty".to_string()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ConversationError::Validation(format!(
                "message longer than {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        let session = self.session_lock(conversation_id).await;
        let response = {
            let _turn = session.lock().await;
            self.message_turn(conversation_id, message).await
        };
        self.release_session(conversation_id, session).await;
        Ok(response)
    }

    async fn message_turn(&self, conversation_id: &str, message: &str) -> ChatResponse {
        let now = self.clock.now().with_timezone(&Utc);

        let checkpoint = match self.conversations.load(conversation_id).await {
            Ok(found) => found,
            Err(e) => {
                error!("Failed to load conversation: {}", e);
                return storage_failure_response();
            }
        };

        let mut conversation = checkpoint
            .clone()
            .unwrap_or_else(|| Conversation::new(conversation_id, now));
        match conversation.state {
            ConversationState::Error => {
                conversation.state = conversation.resume_state.take().unwrap_or_default();
                info!("Resuming from {}", conversation.state);
            }
            ConversationState::Done => {
                conversation.reset();
                if conversation.patient_id.is_some() {
                    conversation.state = ConversationState::ChooseIntent;
                }
            }
            _ => {}
        }
        let before = conversation.state;

        match self.turn(&mut conversation, message).await {
            Ok(text) => {
                conversation.updated_at = now;
                if let Err(e) = self.conversations.save(&conversation).await {
                    error!("Failed to save conversation: {}", e);
                    self.mark_failed(conversation_id, checkpoint, now).await;
                    return storage_failure_response();
                }
                info!(from = %before, to = %conversation.state, "Turn handled");
                ChatResponse {
                    response_text: text,
                    options: options_for(&conversation),
                    state: conversation.state,
                }
            }
            Err(ConversationError::Storage(reason)) => {
                error!(state = %before, "Storage failure during turn: {}", reason);
                self.mark_failed(conversation_id, checkpoint, now).await;
                storage_failure_response()
            }
            Err(other) => {
                warn!(state = %before, "Turn rejected: {}", other);
                let unchanged = match checkpoint {
                    Some(previous) => previous,
                    None => Conversation::new(conversation_id, now),
                };
                ChatResponse {
                    response_text: prompts::not_understood(),
                    options: options_for(&unchanged),
                    state: unchanged.state,
                }
            }
        }
    }

    /// Records the already-validated "attachment received" fact. Storage
    /// failures checkpoint the conversation exactly like a failed message turn.
    #[instrument(skip(self, notice), fields(conversation = %conversation_id))]
    pub async fn handle_attachment(
        &self,
        conversation_id: &str,
        notice: AttachmentNotice,
    ) -> Result<ChatResponse, ConversationError> {
        let session = self.session_lock(conversation_id).await;
        let response = {
            let _turn = session.lock().await;
            self.attachment_turn(conversation_id, &notice).await
        };
        self.release_session(conversation_id, session).await;
        response
    }

    async fn attachment_turn(
        &self,
        conversation_id: &str,
        notice: &AttachmentNotice,
    ) -> Result<ChatResponse, ConversationError> {
        let now = self.clock.now().with_timezone(&Utc);

        let checkpoint = match self.conversations.load(conversation_id).await {
            Ok(found) => found,
            Err(e) => {
                error!("Failed to load conversation: {}", e);
                return Ok(storage_failure_response());
            }
        };

        let mut conversation = checkpoint
            .clone()
            .unwrap_or_else(|| Conversation::new(conversation_id, now));
        conversation
            .collected_fields
            .set(FieldName::AttachmentReceived, FieldValue::Flag(true))?;
        conversation.updated_at = now;
        if let Err(e) = self.conversations.save(&conversation).await {
            error!("Failed to save conversation: {}", e);
            self.mark_failed(conversation_id, checkpoint, now).await;
            return Ok(storage_failure_response());
        }
        info!(file = ?notice.file_name, "Attachment recorded");

        Ok(ChatResponse {
            response_text: prompts::attachment_received(),
            options: options_for(&conversation),
            state: conversation.state,
        })
    }

    pub async fn snapshot(&self, conversation_id: &str) -> Result<Conversation, ConversationError> {
        self.conversations
            .load(conversation_id)
            .await?
            .ok_or_else(|| ConversationError::NotFound("Conversation".to_string()))
    }

    /// Conversations idle for longer than `idle_minutes`.
    pub async fn stale(&self, idle_minutes: i64) -> Result<Vec<String>, ConversationError> {
        if idle_minutes < 0 {
            return Err(ConversationError::Validation("idle_minutes must not be negative".to_string()));
        }
        let cutoff = Duration::try_minutes(idle_minutes)
            .and_then(|idle| self.clock.now().with_timezone(&Utc).checked_sub_signed(idle))
            .ok_or_else(|| ConversationError::Validation("idle_minutes is too large".to_string()))?;
        Ok(self.conversations.list_stale(cutoff).await?)
    }

    pub async fn expire(&self, conversation_id: &str) -> Result<bool, ConversationError> {
        let removed = self.conversations.delete(conversation_id).await?;
        if removed {
            info!(conversation = %conversation_id, "Conversation expired");
        }
        Ok(removed)
    }

    async fn mark_failed(&self, conversation_id: &str, checkpoint: Option<Conversation>, now: DateTime<Utc>) {
        let mut failed = checkpoint.unwrap_or_else(|| Conversation::new(conversation_id, now));
        if failed.state != ConversationState::Error {
            failed.resume_state = Some(failed.state);
            failed.state = ConversationState::Error;
        }
        failed.updated_at = now;
        if let Err(e) = self.conversations.save(&failed).await {
            error!("Could not write error checkpoint: {}", e);
        }
    }

    // ==========================================================================
    // TURN
    // ==========================================================================

    async fn turn(&self, c: &mut Conversation, message: &str) -> Result<String, ConversationError> {
        let specialties = self.directory.active_specialties().await?;
        let locations = self.directory.active_locations().await?;
        let context = self.context_for(c, &specialties, &locations);

        let extraction = match self.extractor.extract(message, &context).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Extraction failed, treating message as unknown: {}", e);
                ExtractionResult::unknown(message)
            }
        };
        debug!(intent = ?extraction.intent, source = ?extraction.source, "Message extracted");

        self.step(c, &extraction).await
    }

    fn context_for(&self, c: &Conversation, specialties: &[Specialty], locations: &[Location]) -> ExtractionContext {
        let now = self.clock.local_now();
        let mut places: Vec<String> = Vec::new();
        for place in locations
            .iter()
            .flat_map(|l| std::iter::once(l.name.clone()).chain(l.city.clone()))
        {
            if !places.contains(&place) {
                places.push(place);
            }
        }
        let mut context = ExtractionContext::new(now.date(), now.time())
            .with_options(c.offered_options())
            .with_specialties(specialties.iter().map(|s| s.name.clone()).collect())
            .with_locations(places);
        if let Some(expected) = expected_input(c) {
            context = context.expecting(expected);
        }
        context
    }

    async fn step(&self, c: &mut Conversation, ex: &ExtractionResult) -> Result<String, ConversationError> {
        match ex.intent {
            Intent::Greeting => {
                c.reset();
                return self.start(c, ex).await;
            }
            Intent::Info => {
                let locations = self.directory.active_locations().await?;
                return Ok(prompts::clinic_info(&self.clinic_name, &self.clinic_phone, &locations));
            }
            Intent::Cancel | Intent::List if switches_flow(c, ex) => {
                if c.patient_id.is_some() {
                    return self.open_listing(c, ex.intent).await;
                }
                c.collected_fields.set(FieldName::PendingIntent, FieldValue::Intent(ex.intent))?;
            }
            Intent::Schedule if c.patient_id.is_none() => {
                c.collected_fields.set(FieldName::PendingIntent, FieldValue::Intent(Intent::Schedule))?;
            }
            _ => {}
        }

        match c.state {
            ConversationState::Start | ConversationState::Done | ConversationState::Error => self.start(c, ex).await,
            ConversationState::IdentifyPatient => self.identify(c, ex).await,
            ConversationState::RegisterPatient => self.register(c, ex).await,
            ConversationState::ChooseIntent => self.choose_intent(c, ex).await,
            ConversationState::SelectSpecialty => self.select_specialty(c, ex).await,
            ConversationState::SelectSlot => self.select_slot(c, ex).await,
            ConversationState::Confirm => self.confirm(c, ex).await,
            ConversationState::ListAppointments => self.open_listing(c, Intent::List).await,
            ConversationState::SelectCancelTarget => self.select_cancel_target(c, ex).await,
            ConversationState::ConfirmCancel => self.confirm_cancel(c, ex).await,
        }
    }

    // ==========================================================================
    // IDENTIFICATION AND REGISTRATION
    // ==========================================================================

    async fn start(&self, c: &mut Conversation, ex: &ExtractionResult) -> Result<String, ConversationError> {
        absorb_booking_fields(c, ex)?;

        if let Some(patient_id) = c.patient_id {
            match self.identity.get_patient(patient_id).await {
                Ok(patient) => return self.after_identification(c, Some(&patient.name)).await,
                Err(IdentityError::NotFound) => c.patient_id = None,
                Err(e) => return Err(e.into()),
            }
        }

        c.state = ConversationState::IdentifyPatient;
        if ex.national_id.is_some() {
            return self.identify(c, ex).await;
        }
        Ok(prompts::welcome(&self.clinic_name))
    }

    async fn identify(&self, c: &mut Conversation, ex: &ExtractionResult) -> Result<String, ConversationError> {
        absorb_booking_fields(c, ex)?;
        let Some(raw) = ex.national_id.as_deref() else {
            return Ok(prompts::ask_national_id());
        };

        match self.identity.resolve(raw).await? {
            IdentityStatus::Invalid => Ok(prompts::invalid_national_id()),
            IdentityStatus::Found(patient) => {
                c.patient_id = Some(patient.id);
                c.collected_fields
                    .set(FieldName::NationalId, FieldValue::Text(patient.national_id.clone()))?;
                self.after_identification(c, Some(&patient.name)).await
            }
            IdentityStatus::NotFound => {
                let cpf = national_id::normalize(raw).unwrap_or_default();
                let formatted = national_id::format(&cpf);
                if matches!(
                    c.collected_fields.intent(FieldName::PendingIntent),
                    Some(Intent::Cancel | Intent::List)
                ) {
                    c.reset();
                    return Ok(prompts::no_registration_for_lookup(&formatted));
                }

                c.collected_fields.set(FieldName::NationalId, FieldValue::Text(cpf))?;
                c.state = ConversationState::RegisterPatient;
                Ok(prompts::not_registered(&formatted))
            }
        }
    }

    async fn register(&self, c: &mut Conversation, ex: &ExtractionResult) -> Result<String, ConversationError> {
        if !c.collected_fields.contains(FieldName::Name) {
            if let Some(raw) = ex.name.as_deref() {
                match validate_name(raw) {
                    Ok(name) => {
                        c.collected_fields.set(FieldName::Name, FieldValue::Text(name))?;
                    }
                    Err(e) => return Ok(format!("{}\n{}", rejection(e)?, prompts::ask_name())),
                }
            }
        }
        if !c.collected_fields.contains(FieldName::Phone) {
            if let Some(raw) = ex.phone.as_deref() {
                match validate_phone(raw) {
                    Ok(phone) => {
                        c.collected_fields.set(FieldName::Phone, FieldValue::Text(phone))?;
                    }
                    Err(e) => return Ok(format!("{}\n{}", rejection(e)?, prompts::ask_phone())),
                }
            }
        }
        if !c.collected_fields.contains(FieldName::Email) && !c.collected_fields.flag(FieldName::EmailSkipped) {
            if let Some(raw) = ex.email.as_deref() {
                match validate_email(raw) {
                    Ok(email) => {
                        c.collected_fields.set(FieldName::Email, FieldValue::Text(email))?;
                    }
                    Err(e) => return Ok(format!("{}\n{}", rejection(e)?, prompts::ask_email())),
                }
            } else if ex.email_skipped && c.collected_fields.contains(FieldName::Phone) {
                c.collected_fields.set(FieldName::EmailSkipped, FieldValue::Flag(true))?;
            }
        } else if !c.collected_fields.contains(FieldName::HealthPlanCard)
            && !c.collected_fields.flag(FieldName::PrivateCare)
        {
            if ex.private_care {
                c.collected_fields.set(FieldName::PrivateCare, FieldValue::Flag(true))?;
            } else if let Some(raw) = ex.health_plan_card.as_deref() {
                match validate_health_plan_card(raw) {
                    Ok(card) => {
                        c.collected_fields.set(FieldName::HealthPlanCard, FieldValue::Text(card))?;
                    }
                    Err(e) => return Ok(format!("{}\n{}", rejection(e)?, prompts::ask_health_plan())),
                }
            }
        }

        let fields = &c.collected_fields;
        let (Some(cpf), Some(name), Some(phone)) = (
            fields.text(FieldName::NationalId),
            fields.text(FieldName::Name),
            fields.text(FieldName::Phone),
        ) else {
            return Ok(match (fields.contains(FieldName::NationalId), fields.contains(FieldName::Name)) {
                (false, _) => {
                    c.state = ConversationState::IdentifyPatient;
                    prompts::ask_national_id()
                }
                (true, false) => prompts::ask_name(),
                (true, true) => prompts::ask_phone(),
            });
        };
        if !fields.contains(FieldName::Email) && !fields.flag(FieldName::EmailSkipped) {
            return Ok(prompts::ask_email());
        }
        let card = fields.text(FieldName::HealthPlanCard);
        if card.is_none() && !fields.flag(FieldName::PrivateCare) {
            return Ok(prompts::ask_health_plan());
        }

        let registration = PatientRegistration {
            national_id: cpf.to_string(),
            name: name.to_string(),
            phone: Some(phone.to_string()),
            email: fields.text(FieldName::Email).map(str::to_string),
            care_type: if card.is_some() { CareType::HealthPlan } else { CareType::Private },
            health_plan_card: card.map(str::to_string),
        };
        let patient = self.identity.create_patient(registration).await?;
        c.patient_id = Some(patient.id);
        for field in [
            FieldName::Name,
            FieldName::Phone,
            FieldName::Email,
            FieldName::EmailSkipped,
            FieldName::HealthPlanCard,
            FieldName::PrivateCare,
        ] {
            c.collected_fields.remove(field);
        }

        let next = self.after_identification(c, None).await?;
        Ok(format!("{}\n{}", prompts::registered(&patient), next))
    }

    /// Continues whatever the patient asked for before being identified.
    async fn after_identification(
        &self,
        c: &mut Conversation,
        name: Option<&str>,
    ) -> Result<String, ConversationError> {
        match c.collected_fields.intent(FieldName::PendingIntent) {
            Some(mode @ (Intent::Cancel | Intent::List)) => return self.open_listing(c, mode).await,
            Some(Intent::Schedule) => return self.begin_scheduling(c).await,
            _ => {}
        }
        if has_booking_fields(c) {
            return self.begin_scheduling(c).await;
        }

        c.state = ConversationState::ChooseIntent;
        Ok(match name {
            Some(name) => prompts::greet_patient(name),
            None => prompts::MENU.to_string(),
        })
    }

    async fn choose_intent(&self, c: &mut Conversation, ex: &ExtractionResult) -> Result<String, ConversationError> {
        let wants_booking = ex.specialty_name.is_some()
            || ex.location_name.is_some()
            || ex.resolved_date.is_some()
            || ex.resolved_time.is_some();
        let choice = match (ex.intent, ex.selection_index) {
            (Intent::Schedule, _) | (_, Some(1)) => Intent::Schedule,
            (_, Some(2)) => Intent::List,
            (_, Some(3)) => Intent::Cancel,
            (_, Some(_)) => return Ok(format!("{}\n{}", prompts::invalid_option(3), prompts::MENU)),
            _ if wants_booking => Intent::Schedule,
            _ if ex.is_unknown() => return Ok(format!("{}\n{}", prompts::not_understood(), prompts::MENU)),
            _ => return Ok(prompts::MENU.to_string()),
        };

        if choice == Intent::Schedule {
            absorb_booking_fields(c, ex)?;
            return self.begin_scheduling(c).await;
        }
        self.open_listing(c, choice).await
    }

    // ==========================================================================
    // SCHEDULING
    // ==========================================================================

    async fn begin_scheduling(&self, c: &mut Conversation) -> Result<String, ConversationError> {
        c.collected_fields.remove(FieldName::PendingIntent);
        c.clear_offers();

        let specialties = self.directory.active_specialties().await?;
        if specialties.is_empty() {
            c.state = ConversationState::ChooseIntent;
            return Ok(format!("{}\n{}", prompts::no_specialties(), prompts::MENU));
        }

        if let Some(id) = c.collected_fields.id(FieldName::SpecialtyId) {
            if let Some(specialty) = specialties.iter().find(|s| s.id == id).cloned() {
                return self.offer_candidates(c, &specialty).await;
            }
            c.collected_fields.remove(FieldName::SpecialtyId);
        }

        if let Some(name) = c.collected_fields.text(FieldName::SpecialtyName).map(str::to_string) {
            match match_specialty(&name, &specialties) {
                SpecialtyMatch::Matched(specialty) => {
                    self.choose_specialty(c, &specialty)?;
                    return self.offer_candidates(c, &specialty).await;
                }
                SpecialtyMatch::Ambiguous(options) => {
                    debug!("Specialty {:?} is ambiguous between {} options", name, options.len());
                }
                SpecialtyMatch::NoMatch => debug!("No specialty matches {:?}", name),
            }
            c.collected_fields.remove(FieldName::SpecialtyName);
            return Ok(self.show_specialties(c, specialties, true));
        }

        Ok(self.show_specialties(c, specialties, false))
    }

    fn show_specialties(&self, c: &mut Conversation, specialties: Vec<Specialty>, not_understood: bool) -> String {
        let text = if not_understood {
            prompts::specialty_not_understood(&specialties)
        } else {
            prompts::choose_specialty(&specialties)
        };
        c.state = ConversationState::SelectSpecialty;
        c.offered_specialties = specialties;
        text
    }

    fn choose_specialty(&self, c: &mut Conversation, specialty: &Specialty) -> Result<(), ConversationError> {
        c.collected_fields.set(FieldName::SpecialtyId, FieldValue::Id(specialty.id))?;
        c.collected_fields
            .set(FieldName::SpecialtyName, FieldValue::Text(specialty.name.clone()))?;
        Ok(())
    }

    async fn select_specialty(&self, c: &mut Conversation, ex: &ExtractionResult) -> Result<String, ConversationError> {
        absorb_booking_fields(c, ex)?;

        if let Some(index) = ex.selection_index {
            let count = c.offered_specialties.len();
            let Some(specialty) = pick(&c.offered_specialties, index).cloned() else {
                let specialties = std::mem::take(&mut c.offered_specialties);
                let list = self.show_specialties(c, specialties, false);
                return Ok(format!("{}\n{}", prompts::invalid_option(count), list));
            };
            self.choose_specialty(c, &specialty)?;
            return self.offer_candidates(c, &specialty).await;
        }

        if ex.specialty_name.is_some() {
            return self.begin_scheduling(c).await;
        }

        let specialties = self.directory.active_specialties().await?;
        Ok(self.show_specialties(c, specialties, true))
    }

    /// Searches slots for the collected constraints and puts the numbered
    /// list on screen.
    async fn offer_candidates(&self, c: &mut Conversation, specialty: &Specialty) -> Result<String, ConversationError> {
        let mut notes: Vec<String> = Vec::new();

        let mut doctor_id = c.collected_fields.id(FieldName::DoctorId);
        if doctor_id.is_none() {
            if let Some(reference) = c.collected_fields.text(FieldName::DoctorReference).map(str::to_string) {
                let doctors = self.directory.doctors(Some(specialty.id)).await?;
                match match_doctor(&reference, &doctors) {
                    DoctorMatch::Matched(doctor) => {
                        c.collected_fields.set(FieldName::DoctorId, FieldValue::Id(doctor.id))?;
                        doctor_id = Some(doctor.id);
                    }
                    DoctorMatch::Ambiguous(_) | DoctorMatch::NoMatch => {
                        c.collected_fields.remove(FieldName::DoctorReference);
                        notes.push(prompts::doctor_not_found(&reference));
                    }
                }
            }
        }

        let mut location_id = c.collected_fields.id(FieldName::LocationId);
        if location_id.is_none() {
            if let Some(name) = c.collected_fields.text(FieldName::LocationName).map(str::to_string) {
                let locations = self.directory.active_locations().await?;
                match match_location(&name, &locations) {
                    LocationMatch::Matched(location) => {
                        c.collected_fields.set(FieldName::LocationId, FieldValue::Id(location.id))?;
                        location_id = Some(location.id);
                    }
                    LocationMatch::Ambiguous(_) | LocationMatch::NoMatch => {
                        c.collected_fields.remove(FieldName::LocationName);
                        notes.push(prompts::location_not_found(&name));
                    }
                }
            }
        }

        let time = c.collected_fields.time(FieldName::Time);
        let period = c.collected_fields.period(FieldName::Period);
        if let (None, Some(period)) = (time, period) {
            if !c.collected_fields.flag(FieldName::TimeFollowUpAsked) {
                c.collected_fields.set(FieldName::TimeFollowUpAsked, FieldValue::Flag(true))?;
                c.clear_offers();
                c.state = ConversationState::SelectSlot;
                notes.push(prompts::ask_time_for_period(period));
                return Ok(notes.join("\n"));
            }
        }

        let mut query = CandidateQuery {
            date: c.collected_fields.date(FieldName::Date),
            time,
            window: if time.is_none() { period.map(window_for) } else { None },
            doctor_id,
            location_id,
            ..CandidateQuery::for_specialty(specialty.id)
        };

        let search = match self.allocation.find_candidates(&query).await {
            Ok(search) => search,
            Err(SchedulingError::Validation(reason)) if query.date.is_some() => {
                debug!("Requested date rejected: {}", reason);
                c.collected_fields.remove(FieldName::Date);
                notes.push(prompts::date_in_past());
                query.date = None;
                self.allocation.find_candidates(&query).await?
            }
            Err(e) => return Err(e.into()),
        };

        c.clear_offers();
        c.collected_fields.remove(FieldName::SlotChoice);

        if search.slots.is_empty() {
            for field in BOOKING_FIELDS {
                c.collected_fields.remove(field);
            }
            notes.push(prompts::no_slots(&specialty.name));
            let specialties = self.directory.active_specialties().await?;
            notes.push(self.show_specialties(c, specialties, false));
            return Ok(notes.join("\n"));
        }

        if search.requested_date_unavailable {
            if let Some(date) = query.date {
                notes.push(prompts::date_unavailable(date));
            }
        }
        notes.push(prompts::slot_list(&search.slots));
        c.pending_candidate_slots = search.slots;
        c.state = ConversationState::SelectSlot;
        Ok(notes.join("\n"))
    }

    async fn select_slot(&self, c: &mut Conversation, ex: &ExtractionResult) -> Result<String, ConversationError> {
        if ex.specialty_name.is_some() {
            absorb_booking_fields(c, ex)?;
            return self.begin_scheduling(c).await;
        }

        if let (Some(index), false) = (ex.selection_index, c.pending_candidate_slots.is_empty()) {
            let Some(slot) = pick(&c.pending_candidate_slots, index).cloned() else {
                return Ok(format!(
                    "{}\n{}",
                    prompts::invalid_option(c.pending_candidate_slots.len()),
                    prompts::slot_list(&c.pending_candidate_slots)
                ));
            };
            c.collected_fields.set(FieldName::SlotChoice, FieldValue::Index(index))?;
            let specialty = self.current_specialty(c).await?;
            c.state = ConversationState::Confirm;
            return Ok(prompts::confirm_booking(&slot, &specialty.name, self.referral_status(c, &specialty)));
        }

        let refines = ex.resolved_date.is_some()
            || ex.resolved_time.is_some()
            || ex.period.is_some()
            || ex.location_name.is_some()
            || ex.doctor_reference.is_some();
        if refines || c.pending_candidate_slots.is_empty() {
            absorb_booking_fields(c, ex)?;
            let specialty = self.current_specialty(c).await?;
            return self.offer_candidates(c, &specialty).await;
        }

        Ok(format!(
            "{}\n{}",
            prompts::invalid_option(c.pending_candidate_slots.len()),
            prompts::slot_list(&c.pending_candidate_slots)
        ))
    }

    async fn confirm(&self, c: &mut Conversation, ex: &ExtractionResult) -> Result<String, ConversationError> {
        if ex.affirmative == Some(true) {
            return self.book(c).await;
        }

        c.collected_fields.remove(FieldName::SlotChoice);
        c.state = ConversationState::SelectSlot;
        Ok(format!(
            "{}\n{}",
            prompts::booking_declined(),
            prompts::slot_list(&c.pending_candidate_slots)
        ))
    }

    async fn book(&self, c: &mut Conversation) -> Result<String, ConversationError> {
        let chosen = c
            .collected_fields
            .index(FieldName::SlotChoice)
            .and_then(|index| pick(&c.pending_candidate_slots, index))
            .cloned();
        let (Some(slot), Some(patient_id)) = (chosen, c.patient_id) else {
            c.state = ConversationState::SelectSlot;
            return Ok(prompts::slot_list(&c.pending_candidate_slots));
        };

        let specialty = self.current_specialty(c).await?;
        if let Some(existing) = self.allocation.existing_booking(patient_id, &slot).await? {
            info!(appointment = %existing.id, "Slot already booked by this patient");
            return Ok(self.finish_booking(c, &slot, &specialty));
        }

        let notes = specialty.requires_referral.then(|| {
            if c.collected_fields.flag(FieldName::AttachmentReceived) {
                REFERRAL_RECEIVED_NOTE.to_string()
            } else {
                REFERRAL_PENDING_NOTE.to_string()
            }
        });

        let booked = match self.allocation.reserve(&slot, patient_id, notes.clone()).await {
            Ok(appointment) => Some((slot.clone(), appointment)),
            Err(SchedulingError::Conflict) => {
                warn!("Chosen slot was taken, retrying once");
                self.retry_equivalent(&slot, patient_id, notes).await?
            }
            Err(e) => return Err(e.into()),
        };

        match booked {
            Some((slot, appointment)) => {
                info!(appointment = %appointment.id, "Booking confirmed");
                Ok(self.finish_booking(c, &slot, &specialty))
            }
            None => {
                let fresh = self.offer_candidates(c, &specialty).await?;
                Ok(format!("{}\n{}", prompts::slot_taken(), fresh))
            }
        }
    }

    fn finish_booking(&self, c: &mut Conversation, slot: &Slot, specialty: &Specialty) -> String {
        c.clear_offers();
        c.state = ConversationState::Done;
        let cpf = c.collected_fields.text(FieldName::NationalId).map(national_id::format);
        prompts::booked(slot, &specialty.name, cpf.as_deref())
    }

    /// Another free seat at the same date and start time, booked at once.
    async fn retry_equivalent(
        &self,
        slot: &Slot,
        patient_id: Uuid,
        notes: Option<String>,
    ) -> Result<Option<(Slot, Appointment)>, ConversationError> {
        let query = CandidateQuery {
            date: Some(slot.date),
            time: Some(slot.start_time),
            location_id: slot.location_id,
            ..CandidateQuery::for_specialty(slot.specialty_id)
        };
        let search = match self.allocation.find_candidates(&query).await {
            Ok(search) => search,
            Err(SchedulingError::Validation(_)) | Err(SchedulingError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(alternative) = search
            .slots
            .into_iter()
            .find(|s| s.date == slot.date && s.start_time == slot.start_time)
        else {
            return Ok(None);
        };

        match self.allocation.reserve(&alternative, patient_id, notes).await {
            Ok(appointment) => Ok(Some((alternative, appointment))),
            Err(SchedulingError::Conflict) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn current_specialty(&self, c: &Conversation) -> Result<Specialty, ConversationError> {
        let id = c
            .collected_fields
            .id(FieldName::SpecialtyId)
            .ok_or_else(|| ConversationError::NotFound("Specialty".to_string()))?;
        Ok(self.directory.get_specialty(id).await?)
    }

    fn referral_status(&self, c: &Conversation, specialty: &Specialty) -> Option<bool> {
        specialty
            .requires_referral
            .then(|| c.collected_fields.flag(FieldName::AttachmentReceived))
    }

    // ==========================================================================
    // LISTING AND CANCELLATION
    // ==========================================================================

    async fn open_listing(&self, c: &mut Conversation, mode: Intent) -> Result<String, ConversationError> {
        let Some(patient_id) = c.patient_id else {
            c.state = ConversationState::IdentifyPatient;
            return Ok(prompts::ask_national_id());
        };

        c.clear_offers();
        for field in BOOKING_FIELDS {
            c.collected_fields.remove(field);
        }
        c.collected_fields.remove(FieldName::CancelTarget);
        c.collected_fields.remove(FieldName::PendingIntent);
        c.state = ConversationState::ListAppointments;

        let listing = self.allocation.list_for_patient(patient_id).await?;

        if mode == Intent::Cancel {
            if listing.scheduled.is_empty() {
                c.state = ConversationState::Done;
                return Ok(prompts::no_scheduled_appointments());
            }
            let text = prompts::choose_cancel_target(&listing.scheduled);
            c.pending_appointments = listing.scheduled;
            c.state = ConversationState::SelectCancelTarget;
            return Ok(text);
        }

        c.state = ConversationState::Done;
        Ok(prompts::appointment_overview(&listing))
    }

    async fn select_cancel_target(
        &self,
        c: &mut Conversation,
        ex: &ExtractionResult,
    ) -> Result<String, ConversationError> {
        let chosen = ex.selection_index.and_then(|index| pick(&c.pending_appointments, index)).cloned();
        let Some(details) = chosen else {
            return Ok(format!(
                "{}\n{}",
                prompts::invalid_option(c.pending_appointments.len()),
                prompts::choose_cancel_target(&c.pending_appointments)
            ));
        };

        c.collected_fields
            .set(FieldName::CancelTarget, FieldValue::Id(details.appointment.id))?;
        c.state = ConversationState::ConfirmCancel;
        Ok(prompts::confirm_cancel(&details))
    }

    async fn confirm_cancel(&self, c: &mut Conversation, ex: &ExtractionResult) -> Result<String, ConversationError> {
        let target = c.collected_fields.id(FieldName::CancelTarget).and_then(|id| {
            c.pending_appointments
                .iter()
                .find(|d| d.appointment.id == id)
                .cloned()
        });

        let (Some(true), Some(details), Some(patient_id)) = (ex.affirmative, target, c.patient_id) else {
            c.collected_fields.remove(FieldName::CancelTarget);
            c.state = ConversationState::SelectCancelTarget;
            return Ok(format!(
                "{}\n{}",
                prompts::cancel_declined(),
                prompts::choose_cancel_target(&c.pending_appointments)
            ));
        };

        let text = match self.allocation.cancel(details.appointment.id, patient_id).await? {
            CancelOutcome::Ok => prompts::cancelled(&details),
            CancelOutcome::NotFound => prompts::cancel_not_found(),
            CancelOutcome::Forbidden => prompts::cancel_forbidden(),
        };
        c.clear_offers();
        c.collected_fields.remove(FieldName::CancelTarget);
        c.state = ConversationState::Done;
        Ok(text)
    }
}

// ==============================================================================
// HELPERS
// ==============================================================================

/// Merges booking constraints from the message, replacing older values.
fn absorb_booking_fields(c: &mut Conversation, ex: &ExtractionResult) -> Result<(), ConversationError> {
    let fields = &mut c.collected_fields;

    if let Some(name) = &ex.specialty_name {
        if fields.text(FieldName::SpecialtyName) != Some(name.as_str()) {
            fields.remove(FieldName::SpecialtyId);
            fields.remove(FieldName::DoctorId);
            fields.set(FieldName::SpecialtyName, FieldValue::Text(name.clone()))?;
        }
    }
    if let Some(name) = &ex.location_name {
        if fields.text(FieldName::LocationName) != Some(name.as_str()) {
            fields.remove(FieldName::LocationId);
            fields.set(FieldName::LocationName, FieldValue::Text(name.clone()))?;
        }
    }
    if let Some(date) = ex.resolved_date {
        fields.set(FieldName::Date, FieldValue::Date(date))?;
    }
    if let Some(time) = ex.resolved_time {
        fields.set(FieldName::Time, FieldValue::Time(time))?;
    }
    if let Some(period) = ex.period {
        fields.set(FieldName::Period, FieldValue::Period(period))?;
    }
    if let Some(reference) = &ex.doctor_reference {
        fields.remove(FieldName::DoctorId);
        fields.set(FieldName::DoctorReference, FieldValue::Text(reference.clone()))?;
    }
    Ok(())
}

/// CANCEL/LIST leave the current flow, except while confirming and when
/// picking which appointment to cancel.
fn switches_flow(c: &Conversation, ex: &ExtractionResult) -> bool {
    if c.state.is_confirmation() {
        return false;
    }
    !(c.state == ConversationState::SelectCancelTarget && ex.selection_index.is_some())
}

fn has_booking_fields(c: &Conversation) -> bool {
    [
        FieldName::SpecialtyId,
        FieldName::SpecialtyName,
        FieldName::LocationName,
        FieldName::Date,
        FieldName::Time,
        FieldName::Period,
    ]
    .into_iter()
    .any(|field| c.collected_fields.contains(field))
}

fn expected_input(c: &Conversation) -> Option<ExpectedInput> {
    let fields = &c.collected_fields;
    match c.state {
        ConversationState::IdentifyPatient => Some(ExpectedInput::NationalId),
        ConversationState::RegisterPatient if !fields.contains(FieldName::Name) => Some(ExpectedInput::Name),
        ConversationState::RegisterPatient if !fields.contains(FieldName::Phone) => Some(ExpectedInput::Phone),
        ConversationState::RegisterPatient
            if !fields.contains(FieldName::Email) && !fields.flag(FieldName::EmailSkipped) =>
        {
            Some(ExpectedInput::Email)
        }
        ConversationState::RegisterPatient => Some(ExpectedInput::HealthPlan),
        ConversationState::ChooseIntent => Some(ExpectedInput::Intent),
        ConversationState::SelectSpecialty => Some(ExpectedInput::Specialty),
        ConversationState::SelectSlot if c.pending_candidate_slots.is_empty() => Some(ExpectedInput::TimeOfDay),
        ConversationState::SelectSlot => Some(ExpectedInput::SlotChoice),
        ConversationState::Confirm | ConversationState::ConfirmCancel => Some(ExpectedInput::Confirmation),
        ConversationState::SelectCancelTarget => Some(ExpectedInput::AppointmentChoice),
        _ => None,
    }
}

/// 1-based lookup.
fn pick<T>(items: &[T], index: usize) -> Option<&T> {
    index.checked_sub(1).and_then(|i| items.get(i))
}

fn window_for(period: DayPeriod) -> TimeWindow {
    let at = |h: u32| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN);
    match period {
        DayPeriod::Morning => TimeWindow {
            from: NaiveTime::MIN,
            to: at(12),
        },
        DayPeriod::Afternoon => TimeWindow { from: at(12), to: at(18) },
        DayPeriod::Evening => TimeWindow {
            from: at(18),
            to: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        },
    }
}

fn rejection(e: IdentityError) -> Result<String, ConversationError> {
    match e {
        IdentityError::Invalid { field, .. } => Ok(prompts::invalid_field(field)),
        other => Err(other.into()),
    }
}

fn storage_failure_response() -> ChatResponse {
    ChatResponse {
        response_text: prompts::storage_failure(),
        options: OptionsPayload::None,
        state: ConversationState::Error,
    }
}

/// Buttons for whatever list the conversation currently shows.
pub fn options_for(c: &Conversation) -> OptionsPayload {
    match c.state {
        ConversationState::SelectSpecialty if !c.offered_specialties.is_empty() => OptionsPayload::SpecialtyList(
            c.offered_specialties
                .iter()
                .enumerate()
                .map(|(i, s)| SpecialtyOption {
                    index: i + 1,
                    id: s.id,
                    name: s.name.clone(),
                })
                .collect(),
        ),
        ConversationState::SelectSlot if !c.pending_candidate_slots.is_empty() => OptionsPayload::SlotList(
            c.pending_candidate_slots
                .iter()
                .enumerate()
                .map(|(i, slot)| SlotOption {
                    index: i + 1,
                    label: prompts::slot_label(slot),
                    doctor_name: slot.doctor_name.clone(),
                    date: slot.date,
                    start_time: slot.start_time,
                    location_name: slot.location_name.clone(),
                })
                .collect(),
        ),
        ConversationState::SelectCancelTarget if !c.pending_appointments.is_empty() => {
            OptionsPayload::AppointmentList(c.pending_appointments.iter().enumerate().map(appointment_option).collect())
        }
        _ => OptionsPayload::None,
    }
}

fn appointment_option((i, details): (usize, &AppointmentDetails)) -> AppointmentOption {
    AppointmentOption {
        index: i + 1,
        id: details.appointment.id,
        label: prompts::appointment_label(details),
        status: details.appointment.status.to_string(),
    }
}
