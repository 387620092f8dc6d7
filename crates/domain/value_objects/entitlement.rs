use serde::Serialize;

use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

/// Monthly generation allowance for the free tier. Pro users are unmetered.
pub const FREE_MONTHLY_LIMIT: i32 = 15;

/// Whether one more AI generation is allowed this month.
///
/// The check is strict `<`: a count of `FREE_MONTHLY_LIMIT` is already at the
/// limit, so the 15th generation is admitted and the 16th refused. Evaluated
/// by every generation endpoint; the client-side copy of this predicate is
/// advisory only.
pub fn can_use_ai(status: SubscriptionStatus, usage_count: i32) -> bool {
    status == SubscriptionStatus::Pro || usage_count < FREE_MONTHLY_LIMIT
}

/// Snapshot handed to the UI so it can gate optimistically and show the
/// remaining allowance.
#[derive(Debug, Clone, Serialize)]
pub struct Entitlement {
    pub subscription_status: String,
    pub usage_count: i32,
    pub monthly_limit: i32,
    pub can_generate: bool,
    pub remaining: i32,
}

impl Entitlement {
    pub fn new(status: SubscriptionStatus, usage_count: i32) -> Self {
        let can_generate = can_use_ai(status, usage_count);
        let remaining = match status {
            SubscriptionStatus::Pro => i32::MAX,
            SubscriptionStatus::Free => (FREE_MONTHLY_LIMIT - usage_count).max(0),
        };

        Self {
            subscription_status: status.to_string(),
            usage_count,
            monthly_limit: FREE_MONTHLY_LIMIT,
            can_generate,
            remaining,
        }
    }
}
