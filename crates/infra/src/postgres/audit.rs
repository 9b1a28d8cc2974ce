use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use stocktrace_audit::{AuditError, AuditEvent, AuditSink};

use super::block_on;

/// Append-only audit trail in `audit_events`.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: Arc<PgPool>,
}

impl PgAuditSink {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn record_async(&self, event: AuditEvent) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (
                id, actor_id, location_id, action, item_id,
                origin_id, destination_id, details, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::from(event.id))
        .bind(event.actor_id.map(Uuid::from))
        .bind(event.location_id.map(Uuid::from))
        .bind(event.tag())
        .bind(event.item_id.map(Uuid::from))
        .bind(event.origin_id.map(Uuid::from))
        .bind(event.destination_id.map(Uuid::from))
        .bind(&event.details)
        .bind(event.occurred_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| AuditError::Write(format!("insert audit event: {e}")))?;
        Ok(())
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        block_on(self.record_async(event))
            .map_err(|e| AuditError::Unavailable(e.to_string()))?
    }
}
