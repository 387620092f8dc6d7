use crates::domain::{
    repositories::{profiles::ProfileRepository, usage::UsageRepository},
    value_objects::{
        entitlement::Entitlement, enums::subscription_statuses::SubscriptionStatus,
        month_key::MonthKey,
    },
};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Resolves "may this user run one more generation this month" from the
/// profile row and the current-month usage counter.
///
/// Reads degrade instead of failing: a missing or unreadable profile counts
/// as free tier and missing usage counts as zero, so a store hiccup can deny
/// nothing it shouldn't and never grants pro.
pub struct EntitlementResolver<P, U>
where
    P: ProfileRepository + Send + Sync + 'static,
    U: UsageRepository + Send + Sync + 'static,
{
    profile_repo: Arc<P>,
    usage_repo: Arc<U>,
}

impl<P, U> EntitlementResolver<P, U>
where
    P: ProfileRepository + Send + Sync + 'static,
    U: UsageRepository + Send + Sync + 'static,
{
    pub fn new(profile_repo: Arc<P>, usage_repo: Arc<U>) -> Self {
        Self {
            profile_repo,
            usage_repo,
        }
    }

    pub async fn resolve(&self, user_id: Uuid) -> Entitlement {
        let status = self.resolve_status(user_id).await;

        let usage_count = match status {
            // Pro callers are never metered, skip the counter read.
            SubscriptionStatus::Pro => 0,
            SubscriptionStatus::Free => self.resolve_usage(user_id).await,
        };

        Entitlement::new(status, usage_count)
    }

    pub async fn resolve_status(&self, user_id: Uuid) -> SubscriptionStatus {
        match self.profile_repo.find_by_user_id(user_id).await {
            Ok(Some(profile)) => SubscriptionStatus::from_str(&profile.subscription_status),
            Ok(None) => {
                debug!(%user_id, "entitlement: no profile row, defaulting to free tier");
                SubscriptionStatus::Free
            }
            Err(err) => {
                error!(
                    %user_id,
                    db_error = ?err,
                    "entitlement: profile read failed, degrading to free tier"
                );
                SubscriptionStatus::Free
            }
        }
    }

    pub async fn resolve_usage(&self, user_id: Uuid) -> i32 {
        let month_key = MonthKey::current();
        match self.usage_repo.get_usage(user_id, &month_key).await {
            Ok(count) => count,
            Err(err) => {
                error!(
                    %user_id,
                    month_key = %month_key,
                    db_error = ?err,
                    "entitlement: usage read failed, degrading to zero"
                );
                0
            }
        }
    }
}
