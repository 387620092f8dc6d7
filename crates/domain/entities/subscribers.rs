use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::infra::db::postgres::schema::subscribers;

/// Denormalized billing view, overwritten by the refresh path and treated as
/// eventually consistent with Stripe.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = subscribers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SubscriberEntity {
    pub user_id: Uuid,
    pub subscribed: bool,
    pub subscription_tier: Option<String>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriberView {
    pub subscribed: bool,
    pub subscription_tier: Option<String>,
    pub subscription_end: Option<DateTime<Utc>>,
}

impl From<SubscriberEntity> for SubscriberView {
    fn from(entity: SubscriberEntity) -> Self {
        Self {
            subscribed: entity.subscribed,
            subscription_tier: entity.subscription_tier,
            subscription_end: entity.subscription_end,
        }
    }
}
