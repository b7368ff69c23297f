pub mod contact;
pub mod identity;
pub mod national_id;

pub use identity::IdentityResolver;
