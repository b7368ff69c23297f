use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use shared_config::AppConfig;

use crate::error::ExtractionError;
use crate::models::{ExtractionContext, ExtractionResult};
use crate::services::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use crate::services::gemini::GeminiExtractor;
use crate::services::keyword::KeywordExtractor;
use crate::services::IntentExtractor;

/// Primary extractor guarded by a circuit breaker, with deterministic fallback.
///
/// Any primary failure (timeout, malformed output, unavailable, open circuit)
/// is logged and answered by the fallback; `extract` itself never fails.
pub struct ResilientExtractor {
    primary: Option<Arc<dyn IntentExtractor>>,
    fallback: KeywordExtractor,
    breaker: CircuitBreaker,
}

impl ResilientExtractor {
    pub fn new(primary: Option<Arc<dyn IntentExtractor>>, breaker: CircuitBreaker) -> Self {
        Self {
            primary,
            fallback: KeywordExtractor::new(),
            breaker,
        }
    }

    /// Gemini when an API key is configured, keyword matching only otherwise.
    pub fn from_config(config: &AppConfig) -> Self {
        let primary: Option<Arc<dyn IntentExtractor>> = if config.is_language_model_configured() {
            Some(Arc::new(GeminiExtractor::new(config)))
        } else {
            None
        };
        Self::new(primary, CircuitBreaker::new(CircuitBreakerConfig::from_app_config(config)))
    }

    pub fn keyword_only() -> Self {
        Self::new(None, CircuitBreaker::new(CircuitBreakerConfig::default()))
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn try_primary(
        &self,
        primary: &dyn IntentExtractor,
        utterance: &str,
        context: &ExtractionContext,
    ) -> Result<ExtractionResult, ExtractionError> {
        match self.breaker.execute(primary.extract(utterance, context)).await {
            Ok(result) => Ok(result),
            Err(CircuitBreakerError::CircuitOpen) => Err(ExtractionError::CircuitOpen),
            Err(CircuitBreakerError::Timeout) => {
                Err(ExtractionError::Timeout(self.breaker.timeout().as_millis() as u64))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
        }
    }
}

#[async_trait]
impl IntentExtractor for ResilientExtractor {
    #[instrument(skip(self, utterance, context))]
    async fn extract(&self, utterance: &str, context: &ExtractionContext) -> Result<ExtractionResult, ExtractionError> {
        if let Some(primary) = self.primary.as_deref() {
            match self.try_primary(primary, utterance, context).await {
                Ok(result) if !result.is_unknown() => return Ok(result),
                Ok(_) => debug!("{} extractor understood nothing, trying keywords", primary.name()),
                Err(ExtractionError::CircuitOpen) => debug!("Extractor circuit open, using keywords"),
                Err(e) => warn!("{} extractor failed, using keywords: {}", primary.name(), e),
            }
        }

        Ok(self.fallback.parse(utterance, context))
    }

    fn name(&self) -> &'static str {
        "resilient"
    }
}
