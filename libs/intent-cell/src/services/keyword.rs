use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use shared_utils::synonyms;
use shared_utils::text::{digits, fold, squash_whitespace, tokens};

use crate::dates::{resolve_date, resolve_time};
use crate::error::ExtractionError;
use crate::models::{ExpectedInput, ExtractionContext, ExtractionResult, ExtractionSource, Intent};
use crate::services::IntentExtractor;

static CPF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}\.?\d{3}\.?\d{3}-?\d{2}\b").expect("static regex"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+").expect("static regex")
});
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\d{2}\)\s?\d{4,5}-?\d{4}").expect("static regex"));
static NAME_INTRO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:meu nome (?:é|e)|me chamo|sou (?:o|a))\s+([\p{L} ']{3,120})").expect("static regex")
});
static DOCTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:dr|dra|doutor|doutora)\.?\s+([a-z]{2,})").expect("static regex")
});
static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:oi+|ola|opa|hey|hello|hi|e ai|bom dia|boa tarde|boa noite|inicio|menu|recomecar|comecar de novo)(?: tudo bem)?$")
        .expect("static regex")
});
static BARE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:opcao|numero|n|a|o|op)\s*)?(\d{1,2})$").expect("static regex")
});
static OPTION_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:opcao|numero|alternativa)\s*(\d{1,2})\b").expect("static regex")
});
static ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(primeira|primeiro|segunda|segundo|terceira|terceiro|quarta|quarto|quinta|quinto|ultima|ultimo)(?:\s+(?:opcao|alternativa|da lista|horario|consulta))?\b")
        .expect("static regex")
});

const AFFIRMATIVE: &[&str] = &[
    "sim", "s", "ok", "okay", "confirmo", "confirmar", "confirma", "pode", "pode ser", "isso", "claro",
    "certo", "com certeza", "perfeito", "yes", "beleza", "fechado",
];
const NEGATIVE: &[&str] = &["nao", "n", "voltar", "errado", "no", "negativo", "nao quero"];
const SKIP_EMAIL: &[&str] = &["pular", "pula", "nao", "n", "nao tenho", "sem email", "sem e-mail", "nenhum"];
const PRIVATE_CARE: &[&str] = &[
    "particular", "pular", "pula", "nao", "n", "nao tenho", "nenhum", "sem plano", "nao tenho plano",
];

/// Deterministic keyword/regex extractor. Never fails; used when the language
/// model is unavailable, slow or returns garbage.
#[derive(Debug, Default, Clone)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, utterance: &str, context: &ExtractionContext) -> ExtractionResult {
        let mut result = ExtractionResult::empty(utterance, ExtractionSource::Keyword);
        let folded = squash_whitespace(&fold(utterance));
        let bare = strip_punctuation(&folded);

        if GREETING.is_match(&bare) {
            result.intent = Intent::Greeting;
            return result;
        }

        let keyword_intent = intent_from_keywords(&bare);

        self.extract_contact_fields(utterance, &folded, context, &mut result);
        let remaining = self.extract_selection(&bare, context, &mut result);
        self.extract_confirmation(&bare, &mut result);

        if let Some(m) = resolve_date(&remaining, context.today) {
            result.raw_date_phrase = Some(m.phrase);
            result.resolved_date = Some(m.date);
        }
        if result.selection_index.is_none() || !BARE_NUMBER.is_match(&bare) {
            if let Some(m) = resolve_time(&remaining) {
                result.raw_time_phrase = Some(m.phrase);
                result.resolved_time = m.time;
                result.period = m.period;
            }
        }

        if let Some(caps) = DOCTOR.captures(&folded) {
            result.doctor_reference = caps.get(1).map(|m| m.as_str().to_string());
        }

        result.specialty_name = specialty_mention(&folded, context);
        result.location_name = location_mention(&folded, context);
        if result.specialty_name.is_none()
            && context.is_expecting(ExpectedInput::Specialty)
            && result.selection_index.is_none()
            && keyword_intent.is_none()
        {
            // Let the directory matcher decide; it re-prompts on no match.
            result.specialty_name = Some(squash_whitespace(utterance));
        }

        result.intent = match keyword_intent {
            Some(intent) => intent,
            None if result.selection_index.is_some() => Intent::SelectOption,
            None if result.has_any_field() => Intent::ProvideField,
            None => Intent::Unknown,
        };

        debug!(intent = ?result.intent, "Keyword extraction finished");
        result
    }

    fn extract_contact_fields(
        &self,
        utterance: &str,
        folded: &str,
        context: &ExtractionContext,
        result: &mut ExtractionResult,
    ) {
        if context.is_expecting(ExpectedInput::HealthPlan) {
            let bare = strip_punctuation(folded);
            if PRIVATE_CARE.contains(&bare.as_str()) || bare.contains("particular") {
                result.private_care = true;
            } else {
                let card: String = utterance.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
                if !card.is_empty() {
                    result.health_plan_card = Some(card);
                }
            }
            return;
        }

        if let Some(m) = CPF.find(utterance) {
            result.national_id = Some(digits(m.as_str()));
        } else if context.is_expecting(ExpectedInput::NationalId) {
            let found = digits(utterance);
            if !found.is_empty() {
                result.national_id = Some(found);
            }
        }

        if let Some(m) = EMAIL.find(utterance) {
            result.email = Some(m.as_str().to_lowercase());
        } else if context.is_expecting(ExpectedInput::Email) {
            let bare = strip_punctuation(folded);
            if SKIP_EMAIL.contains(&bare.as_str()) {
                result.email_skipped = true;
            }
        }

        if context.is_expecting(ExpectedInput::Phone) {
            let found = digits(utterance);
            if !found.is_empty() {
                result.phone = Some(found);
            }
        } else if let Some(m) = PHONE.find(utterance) {
            result.phone = Some(digits(m.as_str()));
        }

        if let Some(caps) = NAME_INTRO.captures(utterance) {
            result.name = caps.get(1).map(|m| squash_whitespace(m.as_str()));
        } else if context.is_expecting(ExpectedInput::Name) && !utterance.chars().any(|c| c.is_ascii_digit()) {
            let name = squash_whitespace(utterance);
            if !name.is_empty() {
                result.name = Some(name);
            }
        }
    }

    /// Picks an option number when options are on screen. Returns the text with
    /// any ordinal phrase removed, so "segunda opcao" is not read as Monday.
    fn extract_selection(&self, bare: &str, context: &ExtractionContext, result: &mut ExtractionResult) -> String {
        if context.offered_options == 0 {
            return bare.to_string();
        }

        if let Some(caps) = BARE_NUMBER.captures(bare).or_else(|| OPTION_NUMBER.captures(bare)) {
            result.selection_index = caps.get(1).and_then(|m| m.as_str().parse().ok());
            return bare.to_string();
        }

        if let Some(caps) = ORDINAL.captures(bare) {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let word = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let with_noun = whole.len() > word.len();
            // A bare "segunda" or "quinta" is a weekday unless it is the whole reply.
            let is_weekday_word = matches!(word, "segunda" | "quarta" | "quinta");
            if with_noun || !is_weekday_word || bare.trim_start_matches("a ").trim_start_matches("o ") == word {
                result.selection_index = ordinal_index(word, context.offered_options);
                return bare.replacen(whole, " ", 1);
            }
        }

        bare.to_string()
    }

    fn extract_confirmation(&self, bare: &str, result: &mut ExtractionResult) {
        if AFFIRMATIVE.contains(&bare) || bare.starts_with("sim ") || bare.starts_with("pode confirmar") {
            result.affirmative = Some(true);
        } else if NEGATIVE.contains(&bare) || bare.starts_with("nao ") {
            result.affirmative = Some(false);
        }
    }
}

#[async_trait]
impl IntentExtractor for KeywordExtractor {
    async fn extract(&self, utterance: &str, context: &ExtractionContext) -> Result<ExtractionResult, ExtractionError> {
        Ok(self.parse(utterance, context))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

fn strip_punctuation(folded: &str) -> String {
    let cleaned: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' || c == '-' { c } else { ' ' })
        .collect();
    squash_whitespace(&cleaned)
}

fn intent_from_keywords(bare: &str) -> Option<Intent> {
    let words = tokens(bare);
    let has = |w: &str| words.iter().any(|t| t == w);
    let has_prefix = |p: &str| words.iter().any(|t| t.starts_with(p));

    if has_prefix("cancel") || has_prefix("desmarc") {
        return Some(Intent::Cancel);
    }
    if bare.contains("minhas consultas")
        || bare.contains("meus agendamentos")
        || bare.contains("ver minha consulta")
        || bare.contains("ver consultas")
        || bare.contains("quais consultas")
        || has("listar")
        || has("agendamentos")
    {
        return Some(Intent::List);
    }
    if has_prefix("agend") || has("marcar") || has("consulta") || (has("quero") && has("medico")) {
        return Some(Intent::Schedule);
    }
    if has("telefone")
        || has("endereco")
        || has("contato")
        || bare.contains("onde fica")
        || bare.contains("horario de funcionamento")
        || bare.contains("que horas abre")
    {
        return Some(Intent::Info);
    }
    None
}

fn ordinal_index(word: &str, offered: usize) -> Option<usize> {
    let index = match word {
        "primeira" | "primeiro" => 1,
        "segunda" | "segundo" => 2,
        "terceira" | "terceiro" => 3,
        "quarta" | "quarto" => 4,
        "quinta" | "quinto" => 5,
        _ => offered,
    };
    (index > 0).then_some(index)
}

/// Specialty named in the text: an active specialty name first, then a lay synonym.
fn specialty_mention(folded: &str, context: &ExtractionContext) -> Option<String> {
    let words = tokens(folded);

    for name in &context.known_specialties {
        let key = fold(name);
        if folded.contains(&key) {
            return Some(name.clone());
        }
        // "cardiologista" for "Cardiologia"
        let stem = key.trim_end_matches('a');
        if stem.len() >= 5 && words.iter().any(|w| w.starts_with(stem)) {
            return Some(name.clone());
        }
    }

    synonyms::specialty_for(folded).map(str::to_string)
}

fn location_mention(folded: &str, context: &ExtractionContext) -> Option<String> {
    context
        .known_locations
        .iter()
        .find(|name| {
            let key = fold(name);
            !key.is_empty() && folded.contains(&key)
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn context() -> ExtractionContext {
        ExtractionContext::new(
            NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        )
        .with_specialties(vec!["Cardiologia".to_string(), "Dermatologia".to_string()])
    }

    #[test]
    fn schedule_sentence_carries_all_fields() {
        let r = KeywordExtractor::new().parse("Quero agendar cardiologia para amanhã às 15h", &context());
        assert_eq!(r.intent, Intent::Schedule);
        assert_eq!(r.specialty_name.as_deref(), Some("Cardiologia"));
        assert_eq!(r.resolved_date, NaiveDate::from_ymd_opt(2026, 10, 15));
        assert_eq!(r.resolved_time, NaiveTime::from_hms_opt(15, 0, 0));
    }

    #[test]
    fn cpf_with_punctuation() {
        let r = KeywordExtractor::new().parse("meu cpf é 529.982.247-25", &context());
        assert_eq!(r.national_id.as_deref(), Some("52998224725"));
    }

    #[test]
    fn short_digits_count_as_cpf_attempt_when_asked() {
        let ctx = context().expecting(ExpectedInput::NationalId);
        let r = KeywordExtractor::new().parse("123", &ctx);
        assert_eq!(r.national_id.as_deref(), Some("123"));
        assert_eq!(r.intent, Intent::ProvideField);
    }

    #[test]
    fn numeric_and_ordinal_selection() {
        let ctx = context().expecting(ExpectedInput::SlotChoice).with_options(3);
        let ex = KeywordExtractor::new();

        let r = ex.parse("2", &ctx);
        assert_eq!(r.selection_index, Some(2));
        assert_eq!(r.intent, Intent::SelectOption);
        assert_eq!(r.resolved_time, None);

        let r = ex.parse("a segunda opção", &ctx);
        assert_eq!(r.selection_index, Some(2));
        assert_eq!(r.resolved_date, None);

        let r = ex.parse("quero a última", &ctx);
        assert_eq!(r.selection_index, Some(3));
    }

    #[test]
    fn weekday_is_not_selection_inside_a_sentence() {
        let ctx = context().expecting(ExpectedInput::SlotChoice).with_options(3);
        let r = KeywordExtractor::new().parse("tem na segunda de manhã?", &ctx);
        assert_eq!(r.selection_index, None);
        assert_eq!(r.resolved_date, NaiveDate::from_ymd_opt(2026, 10, 19));
    }

    #[test]
    fn greeting_and_confirmation() {
        let ex = KeywordExtractor::new();
        assert_eq!(ex.parse("Oi!", &context()).intent, Intent::Greeting);
        assert_eq!(ex.parse("boa tarde", &context()).intent, Intent::Greeting);
        assert_eq!(ex.parse("Sim", &context()).affirmative, Some(true));
        assert_eq!(ex.parse("não", &context()).affirmative, Some(false));
    }

    #[test]
    fn cancel_and_list_intents() {
        let ex = KeywordExtractor::new();
        assert_eq!(ex.parse("quero cancelar minha consulta", &context()).intent, Intent::Cancel);
        assert_eq!(ex.parse("desmarcar", &context()).intent, Intent::Cancel);
        assert_eq!(ex.parse("ver minhas consultas", &context()).intent, Intent::List);
        assert_eq!(ex.parse("qual o telefone?", &context()).intent, Intent::Info);
    }

    #[test]
    fn schedule_keywords_stand_alone() {
        let ex = KeywordExtractor::new();
        assert_eq!(ex.parse("quero um medico", &context()).intent, Intent::Schedule);
        assert_eq!(ex.parse("preciso marcar", &context()).intent, Intent::Schedule);
        assert_eq!(ex.parse("consulta", &context()).intent, Intent::Schedule);
        // "quero" alone says nothing about booking
        assert_eq!(ex.parse("quero", &context()).intent, Intent::Unknown);
        assert_eq!(ex.parse("medico", &context()).intent, Intent::Unknown);
    }

    #[test]
    fn health_plan_card_or_private_care() {
        let ctx = context().expecting(ExpectedInput::HealthPlan);
        let ex = KeywordExtractor::new();

        let r = ex.parse("Particular", &ctx);
        assert!(r.private_care);
        assert_eq!(r.health_plan_card, None);
        assert!(ex.parse("sem plano", &ctx).private_care);

        let r = ex.parse("0012.3456-78", &ctx);
        assert!(!r.private_care);
        assert_eq!(r.health_plan_card.as_deref(), Some("0012345678"));
        assert_eq!(r.national_id, None);
        assert_eq!(r.intent, Intent::ProvideField);
    }

    #[test]
    fn location_named_in_sentence() {
        let ctx = context().with_locations(vec!["Unidade Centro".to_string(), "Campinas".to_string()]);
        let ex = KeywordExtractor::new();
        let r = ex.parse("cardiologia na unidade centro amanha", &ctx);
        assert_eq!(r.location_name.as_deref(), Some("Unidade Centro"));
        assert_eq!(r.specialty_name.as_deref(), Some("Cardiologia"));
        assert_eq!(ex.parse("cardiologia", &ctx).location_name, None);
    }

    #[test]
    fn synonyms_and_doctor_reference() {
        let r = KeywordExtractor::new().parse("problema no coração, com a dra. Ana", &context());
        assert_eq!(r.specialty_name.as_deref(), Some("Cardiologia"));
        assert_eq!(r.doctor_reference.as_deref(), Some("ana"));
    }

    #[test]
    fn email_can_be_skipped() {
        let ctx = context().expecting(ExpectedInput::Email);
        let ex = KeywordExtractor::new();
        assert!(ex.parse("pular", &ctx).email_skipped);
        assert_eq!(
            ex.parse("Maria.Silva@Example.com", &ctx).email.as_deref(),
            Some("maria.silva@example.com")
        );
    }

    #[test]
    fn gibberish_is_unknown() {
        let r = KeywordExtractor::new().parse("asdfgh", &context());
        assert!(r.is_unknown());
        assert_eq!(r.original_text, "asdfgh");
    }
}
