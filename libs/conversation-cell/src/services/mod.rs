pub mod engine;

pub use engine::{options_for, ConversationEngine, MAX_MESSAGE_CHARS};
