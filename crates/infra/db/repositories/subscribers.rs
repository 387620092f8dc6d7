use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::subscribers::{SubscriberEntity, SubscriberView},
        repositories::subscribers::SubscriberRepository,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscribers},
};

pub struct SubscriberPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriberPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriberRepository for SubscriberPostgres {
    async fn find_view(&self, user_id: Uuid) -> Result<Option<SubscriberView>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = subscribers::table
            .filter(subscribers::user_id.eq(user_id))
            .select(SubscriberEntity::as_select())
            .first::<SubscriberEntity>(&mut conn)
            .optional()?;

        Ok(result.map(SubscriberView::from))
    }

    async fn upsert_view(&self, user_id: Uuid, view: SubscriberView) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        insert_into(subscribers::table)
            .values((
                subscribers::user_id.eq(user_id),
                subscribers::subscribed.eq(view.subscribed),
                subscribers::subscription_tier.eq(&view.subscription_tier),
                subscribers::subscription_end.eq(view.subscription_end),
                subscribers::updated_at.eq(now),
            ))
            .on_conflict(subscribers::user_id)
            .do_update()
            .set((
                subscribers::subscribed.eq(view.subscribed),
                subscribers::subscription_tier.eq(&view.subscription_tier),
                subscribers::subscription_end.eq(view.subscription_end),
                subscribers::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
