use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::subscribers::SubscriberView;

#[automock]
#[async_trait]
pub trait SubscriberRepository {
    async fn find_view(&self, user_id: Uuid) -> Result<Option<SubscriberView>>;

    /// Overwrites the denormalized view with whatever the refresh path
    /// derived from Stripe.
    async fn upsert_view(&self, user_id: Uuid, view: SubscriberView) -> Result<()>;
}
