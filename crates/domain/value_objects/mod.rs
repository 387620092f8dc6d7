pub mod entitlement;
pub mod enums;
pub mod month_key;
