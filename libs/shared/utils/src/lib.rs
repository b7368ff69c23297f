pub mod clock;
pub mod synonyms;
pub mod test_utils;
pub mod text;

pub use clock::{Clock, FixedClock, SystemClock};
