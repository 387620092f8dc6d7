use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::usage_records;

/// Per-user, per-month generation counter. Created lazily by the first
/// increment of a month; `usage_count` never decreases within a month.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = usage_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UsageRecordEntity {
    pub user_id: Uuid,
    pub month_key: String,
    pub usage_count: i32,
}
