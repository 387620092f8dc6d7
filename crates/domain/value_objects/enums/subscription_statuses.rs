use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionStatus {
    #[default]
    Free,
    Pro,
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            SubscriptionStatus::Free => "free",
            SubscriptionStatus::Pro => "pro",
        };
        write!(f, "{}", status)
    }
}

impl SubscriptionStatus {
    /// Unknown strings degrade to `Free` so a malformed row can never grant
    /// unlimited generations.
    pub fn from_str(value: &str) -> Self {
        match value {
            "pro" => SubscriptionStatus::Pro,
            _ => SubscriptionStatus::Free,
        }
    }
}
