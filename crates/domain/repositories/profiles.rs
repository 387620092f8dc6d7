use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::profiles::ProfileEntity;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

#[automock]
#[async_trait]
pub trait ProfileRepository {
    /// Absence of a row is not an error; callers treat it as free tier.
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<ProfileEntity>>;

    /// Marks the user pro and stores the Stripe identifiers. Upsert keyed by
    /// user id, so webhook replays converge on the same row.
    async fn mark_pro(
        &self,
        user_id: Uuid,
        stripe_customer_id: String,
        stripe_subscription_id: String,
    ) -> Result<()>;

    /// Downgrades whichever profile holds this subscription id and clears the
    /// stored id. Returns the number of affected rows; zero is a valid
    /// outcome (already downgraded, or the subscription was never recorded).
    async fn clear_subscription(&self, stripe_subscription_id: &str) -> Result<usize>;

    /// Overwrites the status from the refresh path, leaving any stored
    /// Stripe identifiers untouched.
    async fn set_status(&self, user_id: Uuid, status: SubscriptionStatus) -> Result<()>;
}
