use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use shared_config::AppConfig;
use shared_utils::text::{digits, fold};

use crate::dates::{resolve_date, resolve_time};
use crate::error::ExtractionError;
use crate::models::{DayPeriod, ExtractionContext, ExtractionResult, ExtractionSource, Intent};
use crate::services::IntentExtractor;

/// Extractor backed by the Gemini `generateContent` endpoint, asked to answer in JSON.
pub struct GeminiExtractor {
    http_client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

/// Shape the model is instructed to return. Everything optional; unknown keys ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelFields {
    intent: Option<Intent>,
    national_id: Option<String>,
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    email_skipped: bool,
    health_plan_card: Option<String>,
    private_care: bool,
    specialty_name: Option<String>,
    location_name: Option<String>,
    date_phrase: Option<String>,
    time_phrase: Option<String>,
    date: Option<String>,
    time: Option<String>,
    period: Option<DayPeriod>,
    doctor_reference: Option<String>,
    selection_index: Option<usize>,
    affirmative: Option<bool>,
}

impl GeminiExtractor {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http_client: Client::new(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_prompt(&self, utterance: &str, context: &ExtractionContext) -> String {
        let specialties = if context.known_specialties.is_empty() {
            "(nenhuma informada)".to_string()
        } else {
            context.known_specialties.join(", ")
        };
        let locations = if context.known_locations.is_empty() {
            "(nenhuma informada)".to_string()
        } else {
            context.known_locations.join(", ")
        };
        let expecting = context
            .expecting
            .map(|e| serde_json::to_string(&e).unwrap_or_default())
            .unwrap_or_else(|| "null".to_string());

        format!(
            r#"Você é o assistente de agendamentos de uma clínica médica. Extraia os campos da mensagem do paciente.
Hoje é {today} e agora são {now}. Resolva datas relativas ("amanhã", "próxima segunda") a partir de hoje.
Se a mensagem não disser a hora exata, deixe "time" nulo e preencha "period" quando houver manhã/tarde/noite.
Especialidades ativas: {specialties}.
Unidades de atendimento: {locations}.
Campo aguardado pela conversa: {expecting}. Opções numeradas na tela: {offered}.
Nunca invente valores: use null para o que não estiver na mensagem.

Responda APENAS com um objeto JSON com as chaves:
intent ("schedule", "cancel", "list", "provide_field", "select_option", "greeting", "info" ou "unknown"),
national_id, name, phone, email, email_skipped (bool), health_plan_card, private_care (bool),
specialty_name, location_name, date_phrase, time_phrase,
date ("AAAA-MM-DD"), time ("HH:MM"), period ("morning", "afternoon" ou "evening"),
doctor_reference, selection_index (número da opção, começando em 1), affirmative (bool).

Mensagem: "{utterance}""#,
            today = context.today,
            now = context.now.format("%H:%M"),
            specialties = specialties,
            locations = locations,
            expecting = expecting,
            offered = context.offered_options,
            utterance = utterance.replace('"', "'"),
        )
    }

    fn into_result(&self, fields: ModelFields, utterance: &str, context: &ExtractionContext) -> ExtractionResult {
        let mut result = ExtractionResult::empty(utterance, ExtractionSource::LanguageModel);

        result.intent = fields.intent.unwrap_or(Intent::Unknown);
        result.national_id = fields.national_id.map(|v| digits(&v)).filter(|v| !v.is_empty());
        result.name = non_empty(fields.name);
        result.phone = fields.phone.map(|v| digits(&v)).filter(|v| !v.is_empty());
        result.email = non_empty(fields.email).map(|v| v.to_lowercase());
        result.email_skipped = fields.email_skipped;
        result.health_plan_card = fields
            .health_plan_card
            .map(|v| v.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>())
            .filter(|v| !v.is_empty());
        result.private_care = fields.private_care;
        result.specialty_name = non_empty(fields.specialty_name);
        result.location_name = non_empty(fields.location_name);
        result.doctor_reference = non_empty(fields.doctor_reference);
        result.selection_index = fields.selection_index.filter(|i| *i > 0);
        result.affirmative = fields.affirmative;
        result.period = fields.period;

        result.raw_date_phrase = non_empty(fields.date_phrase);
        result.resolved_date = fields
            .date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());
        if result.resolved_date.is_none() {
            // The phrase was seen but not resolved; resolve it locally.
            if let Some(phrase) = result.raw_date_phrase.as_deref() {
                result.resolved_date = resolve_date(&fold(phrase), context.today).map(|m| m.date);
            }
        }

        result.raw_time_phrase = non_empty(fields.time_phrase);
        result.resolved_time = fields.time.as_deref().and_then(parse_time);
        if result.resolved_time.is_none() {
            if let Some(m) = result.raw_time_phrase.as_deref().and_then(|p| resolve_time(&fold(p))) {
                result.resolved_time = m.time;
                result.period = result.period.or(m.period);
            }
        }

        result
    }
}

#[async_trait]
impl IntentExtractor for GeminiExtractor {
    #[instrument(skip(self, utterance, context), fields(model = %self.model))]
    async fn extract(&self, utterance: &str, context: &ExtractionContext) -> Result<ExtractionResult, ExtractionError> {
        let prompt = self.build_prompt(utterance, context);

        let request = json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "generationConfig": {
                "temperature": 0.0,
                "responseMimeType": "application/json"
            }
        });

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error ({}): {}", status, error_text);
            return Err(ExtractionError::Unavailable(format!("status {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::Malformed(e.to_string()))?;

        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| ExtractionError::Malformed("response has no candidate text".to_string()))?;

        let fields: ModelFields = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
            debug!("Raw model output: {}", text);
            ExtractionError::Malformed(e.to_string())
        })?;

        Ok(self.into_result(fields, utterance, context))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

/// Models sometimes wrap JSON in a ```json fence despite the mime type.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
