use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::value_objects::month_key::MonthKey;

#[automock]
#[async_trait]
pub trait UsageRepository {
    /// Current-month count; a missing record reads as zero.
    async fn get_usage(&self, user_id: Uuid, month_key: &MonthKey) -> Result<i32>;

    /// Atomic server-side upsert-and-add, returning the new count.
    ///
    /// Concurrent increments for the same (user, month) must both land; the
    /// implementation is a single `INSERT .. ON CONFLICT .. DO UPDATE`, never
    /// a read-modify-write.
    async fn increment_usage(&self, user_id: Uuid, month_key: &MonthKey) -> Result<i32>;
}
