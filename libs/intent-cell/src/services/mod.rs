pub mod circuit_breaker;
pub mod gemini;
pub mod keyword;
pub mod resilient;

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::models::{ExtractionContext, ExtractionResult};

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerState};
pub use gemini::GeminiExtractor;
pub use keyword::KeywordExtractor;
pub use resilient::ResilientExtractor;

/// Turns one utterance into structured fields.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(&self, utterance: &str, context: &ExtractionContext) -> Result<ExtractionResult, ExtractionError>;

    fn name(&self) -> &'static str;
}
