use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use intent_cell::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, ExpectedInput, ExtractionContext, ExtractionError,
    ExtractionSource, GeminiExtractor, Intent, IntentExtractor, ResilientExtractor,
};
use shared_config::AppConfig;

const GENERATE_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

fn config(server: &MockServer) -> AppConfig {
    AppConfig {
        gemini_api_key: "test-gemini-key".to_string(),
        gemini_base_url: server.uri(),
        ..AppConfig::default()
    }
}

fn context() -> ExtractionContext {
    ExtractionContext::new(
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(),
        NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
    )
    .with_specialties(vec!["Cardiologia".to_string()])
}

fn model_reply(text: &str) -> serde_json::Value {
    json!({
        "candidates": [
            { "content": { "role": "model", "parts": [ { "text": text } ] } }
        ]
    })
}

fn resilient(server: &MockServer, threshold: u64) -> ResilientExtractor {
    let primary: Arc<dyn IntentExtractor> = Arc::new(GeminiExtractor::new(&config(server)));
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: threshold,
        recovery_timeout: Duration::from_secs(60),
        success_threshold: 1,
        timeout: Duration::from_millis(300),
    });
    ResilientExtractor::new(Some(primary), breaker)
}

#[tokio::test]
async fn gemini_fields_are_mapped() {
    let server = MockServer::start().await;

    let fields = json!({
        "intent": "schedule",
        "specialty_name": "Cardiologia",
        "date_phrase": "amanhã",
        "date": "2026-10-15",
        "time_phrase": "às 15h",
        "time": "15:00",
        "national_id": "529.982.247-25"
    });
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-gemini-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(model_reply(&fields.to_string())))
        .mount(&server)
        .await;

    let extractor = GeminiExtractor::new(&config(&server));
    let result = extractor
        .extract("quero agendar cardiologia para amanhã às 15h", &context())
        .await
        .unwrap();

    assert_eq!(result.intent, Intent::Schedule);
    assert_eq!(result.source, ExtractionSource::LanguageModel);
    assert_eq!(result.resolved_date, NaiveDate::from_ymd_opt(2026, 10, 15));
    assert_eq!(result.resolved_time, NaiveTime::from_hms_opt(15, 0, 0));
    assert_eq!(result.national_id.as_deref(), Some("52998224725"));
}

#[tokio::test]
async fn gemini_health_plan_and_location_are_mapped() {
    let server = MockServer::start().await;

    let fields = json!({
        "intent": "provide_field",
        "health_plan_card": "ABC-123.456",
        "private_care": false,
        "location_name": "Unidade Centro"
    });
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(model_reply(&fields.to_string())))
        .mount(&server)
        .await;

    let extractor = GeminiExtractor::new(&config(&server));
    let ctx = context().expecting(ExpectedInput::HealthPlan);
    let result = extractor.extract("ABC-123.456 na unidade centro", &ctx).await.unwrap();

    assert_eq!(result.health_plan_card.as_deref(), Some("ABC123456"));
    assert!(!result.private_care);
    assert_eq!(result.location_name.as_deref(), Some("Unidade Centro"));
}

#[tokio::test]
async fn unresolved_phrase_is_resolved_locally() {
    let server = MockServer::start().await;

    let fields = json!({ "intent": "schedule", "date_phrase": "depois de amanhã", "date": null });
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(model_reply(&fields.to_string())))
        .mount(&server)
        .await;

    let result = GeminiExtractor::new(&config(&server))
        .extract("depois de amanhã", &context())
        .await
        .unwrap();
    assert_eq!(result.resolved_date, NaiveDate::from_ymd_opt(2026, 10, 16));
}

#[tokio::test]
async fn malformed_output_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(model_reply("claro! vou agendar")))
        .mount(&server)
        .await;

    let result = GeminiExtractor::new(&config(&server)).extract("oi", &context()).await;
    assert_matches!(result, Err(ExtractionError::Malformed(_)));
}

#[tokio::test]
async fn resilient_falls_back_on_server_error_and_opens_circuit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let extractor = resilient(&server, 2);

    for _ in 0..3 {
        let result = extractor
            .extract("quero agendar cardiologia amanhã às 15h", &context())
            .await
            .unwrap();
        assert_eq!(result.source, ExtractionSource::Keyword);
        assert_eq!(result.intent, Intent::Schedule);
        assert_eq!(result.resolved_time, NaiveTime::from_hms_opt(15, 0, 0));
    }

    // third call never reached the server
    assert_eq!(extractor.breaker().state().await, CircuitBreakerState::Open);
}

#[tokio::test]
async fn resilient_falls_back_on_slow_model() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(model_reply(&json!({ "intent": "cancel" }).to_string()))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let result = resilient(&server, 5)
        .extract("quero cancelar", &context())
        .await
        .unwrap();

    assert_eq!(result.source, ExtractionSource::Keyword);
    assert_eq!(result.intent, Intent::Cancel);
}

#[tokio::test]
async fn keyword_only_preserves_text_of_unknown_input() {
    let result = ResilientExtractor::keyword_only()
        .extract("xyzzy", &context())
        .await
        .unwrap();
    assert_eq!(result.intent, Intent::Unknown);
    assert_eq!(result.original_text, "xyzzy");
}
