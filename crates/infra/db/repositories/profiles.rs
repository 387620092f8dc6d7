use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::profiles},
};
use domain::{
    entities::profiles::{ProfileEntity, UpsertProfileEntity},
    repositories::profiles::ProfileRepository,
    value_objects::enums::subscription_statuses::SubscriptionStatus,
};

pub struct ProfilePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ProfilePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ProfileRepository for ProfilePostgres {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<ProfileEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = profiles::table
            .filter(profiles::user_id.eq(user_id))
            .select(ProfileEntity::as_select())
            .first::<ProfileEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn mark_pro(
        &self,
        user_id: Uuid,
        stripe_customer_id: String,
        stripe_subscription_id: String,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        let upsert_entity = UpsertProfileEntity {
            user_id,
            subscription_status: SubscriptionStatus::Pro.to_string(),
            stripe_customer_id: Some(stripe_customer_id),
            stripe_subscription_id: Some(stripe_subscription_id),
            updated_at: now,
        };

        insert_into(profiles::table)
            .values(&upsert_entity)
            .on_conflict(profiles::user_id)
            .do_update()
            .set((
                profiles::subscription_status.eq(&upsert_entity.subscription_status),
                profiles::stripe_customer_id.eq(&upsert_entity.stripe_customer_id),
                profiles::stripe_subscription_id.eq(&upsert_entity.stripe_subscription_id),
                profiles::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn clear_subscription(&self, stripe_subscription_id: &str) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let affected = update(profiles::table)
            .filter(profiles::stripe_subscription_id.eq(stripe_subscription_id))
            .set((
                profiles::subscription_status.eq(SubscriptionStatus::Free.to_string()),
                profiles::stripe_subscription_id.eq(None::<String>),
                profiles::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(affected)
    }

    async fn set_status(&self, user_id: Uuid, status: SubscriptionStatus) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        let upsert_entity = UpsertProfileEntity {
            user_id,
            subscription_status: status.to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            updated_at: now,
        };

        // Only the status is overwritten on conflict; stored Stripe ids stay.
        insert_into(profiles::table)
            .values(&upsert_entity)
            .on_conflict(profiles::user_id)
            .do_update()
            .set((
                profiles::subscription_status.eq(status.to_string()),
                profiles::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
