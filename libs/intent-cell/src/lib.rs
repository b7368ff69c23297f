pub mod dates;
pub mod error;
pub mod models;
pub mod services;

pub use error::ExtractionError;
pub use models::*;
pub use services::*;
