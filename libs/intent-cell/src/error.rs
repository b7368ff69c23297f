use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    #[error("Extractor timed out after {0} ms")]
    Timeout(u64),

    #[error("Malformed extractor response: {0}")]
    Malformed(String),

    #[error("Extractor unavailable: {0}")]
    Unavailable(String),

    #[error("Extractor circuit is open")]
    CircuitOpen,
}
