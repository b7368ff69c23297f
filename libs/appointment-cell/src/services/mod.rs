pub mod allocation;
pub mod slots;

pub use allocation::SlotAllocationService;
