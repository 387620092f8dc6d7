pub mod profiles;
pub mod subscribers;
pub mod usage;
