use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use stocktrace_consumption::{ConsumptionRecord, DisposalRecord, RecordStore};
use stocktrace_core::DomainResult;

use super::{block_on, map_sqlx_error};

/// Append-only consumption and disposal records.
///
/// Both tables are keyed on the item, so a second terminal record for the
/// same item surfaces as `Conflict`.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Arc<PgPool>,
}

impl PgRecordStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn append_consumption_async(&self, record: ConsumptionRecord) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO consumption_records (item_id, location_id, actor_id, occurred_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::from(record.item_id))
        .bind(Uuid::from(record.location_id))
        .bind(Uuid::from(record.actor_id))
        .bind(record.occurred_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_consumption", e))?;
        Ok(())
    }

    pub async fn append_disposal_async(&self, record: DisposalRecord) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO disposal_records (item_id, location_id, actor_id, reason, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::from(record.item_id))
        .bind(Uuid::from(record.location_id))
        .bind(Uuid::from(record.actor_id))
        .bind(record.reason.as_deref())
        .bind(record.occurred_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_disposal", e))?;
        Ok(())
    }
}

impl RecordStore for PgRecordStore {
    fn append_consumption(&self, record: ConsumptionRecord) -> DomainResult<()> {
        block_on(self.append_consumption_async(record))?
    }

    fn append_disposal(&self, record: DisposalRecord) -> DomainResult<()> {
        block_on(self.append_disposal_async(record))?
    }
}
