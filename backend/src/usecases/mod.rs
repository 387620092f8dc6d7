pub mod billing;
pub mod entitlement;
pub mod generation;
pub mod prompts;
