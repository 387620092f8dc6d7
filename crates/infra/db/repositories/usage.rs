use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{repositories::usage::UsageRepository, value_objects::month_key::MonthKey},
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::usage_records},
};

pub struct UsagePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UsagePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UsageRepository for UsagePostgres {
    async fn get_usage(&self, user_id: Uuid, month_key: &MonthKey) -> Result<i32> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let count = usage_records::table
            .filter(usage_records::user_id.eq(user_id))
            .filter(usage_records::month_key.eq(month_key.as_str()))
            .select(usage_records::usage_count)
            .first::<i32>(&mut conn)
            .optional()?;

        Ok(count.unwrap_or(0))
    }

    async fn increment_usage(&self, user_id: Uuid, month_key: &MonthKey) -> Result<i32> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // Single upsert-and-add statement so two concurrent increments for
        // the same (user, month) both land.
        let new_count = insert_into(usage_records::table)
            .values((
                usage_records::user_id.eq(user_id),
                usage_records::month_key.eq(month_key.as_str()),
                usage_records::usage_count.eq(1),
            ))
            .on_conflict((usage_records::user_id, usage_records::month_key))
            .do_update()
            .set(usage_records::usage_count.eq(usage_records::usage_count + 1))
            .returning(usage_records::usage_count)
            .get_result::<i32>(&mut conn)?;

        Ok(new_count)
    }
}
