pub mod directory;
pub mod matching;

pub use directory::DirectoryService;
pub use matching::{match_doctor, match_location, match_specialty};
