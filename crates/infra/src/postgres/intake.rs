use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use stocktrace_core::{
    DomainResult, LocationId, ProductId, ProductionRunId, PurchaseBatchId, UserId,
};
use stocktrace_intake::{IntakeStore, ProductionRun, PurchaseBatch};

use super::{block_on, map_sqlx_error};

/// Purchase batches and production runs, written once.
#[derive(Clone)]
pub struct PgIntakeStore {
    pool: Arc<PgPool>,
}

impl PgIntakeStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn insert_batch_async(&self, batch: PurchaseBatch) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_batches (
                id, product_id, quantity, unit_cost, supplier, supplier_lot,
                location_id, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::from(batch.id))
        .bind(Uuid::from(batch.product_id))
        .bind(batch.quantity)
        .bind(batch.unit_cost)
        .bind(batch.supplier.as_deref())
        .bind(batch.supplier_lot.as_deref())
        .bind(Uuid::from(batch.location_id))
        .bind(batch.created_by.map(Uuid::from))
        .bind(batch.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_purchase_batch", e))?;
        Ok(())
    }

    pub async fn insert_run_async(&self, run: ProductionRun) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO production_runs (
                id, product_id, quantity, location_id, responsible, notes, produced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::from(run.id))
        .bind(Uuid::from(run.product_id))
        .bind(run.quantity)
        .bind(Uuid::from(run.location_id))
        .bind(Uuid::from(run.responsible))
        .bind(run.notes.as_deref())
        .bind(run.produced_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_production_run", e))?;
        Ok(())
    }

    pub async fn batch_async(&self, id: PurchaseBatchId) -> DomainResult<Option<PurchaseBatch>> {
        let row: Option<BatchRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, quantity, unit_cost, supplier, supplier_lot,
                   location_id, created_by, created_at
            FROM purchase_batches
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_purchase_batch", e))?;
        Ok(row.map(PurchaseBatch::from))
    }

    pub async fn run_async(&self, id: ProductionRunId) -> DomainResult<Option<ProductionRun>> {
        let row: Option<RunRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, quantity, location_id, responsible, notes, produced_at
            FROM production_runs
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_production_run", e))?;
        Ok(row.map(ProductionRun::from))
    }
}

impl IntakeStore for PgIntakeStore {
    fn insert_batch(&self, batch: PurchaseBatch) -> DomainResult<()> {
        block_on(self.insert_batch_async(batch))?
    }

    fn insert_run(&self, run: ProductionRun) -> DomainResult<()> {
        block_on(self.insert_run_async(run))?
    }

    fn batch(&self, id: PurchaseBatchId) -> DomainResult<Option<PurchaseBatch>> {
        block_on(self.batch_async(id))?
    }

    fn run(&self, id: ProductionRunId) -> DomainResult<Option<ProductionRun>> {
        block_on(self.run_async(id))?
    }
}

#[derive(Debug)]
struct BatchRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i64,
    unit_cost: Decimal,
    supplier: Option<String>,
    supplier_lot: Option<String>,
    location_id: Uuid,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for BatchRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            unit_cost: row.try_get("unit_cost")?,
            supplier: row.try_get("supplier")?,
            supplier_lot: row.try_get("supplier_lot")?,
            location_id: row.try_get("location_id")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<BatchRow> for PurchaseBatch {
    fn from(row: BatchRow) -> Self {
        PurchaseBatch {
            id: PurchaseBatchId::from(row.id),
            product_id: ProductId::from(row.product_id),
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            supplier: row.supplier,
            supplier_lot: row.supplier_lot,
            location_id: LocationId::from(row.location_id),
            created_by: row.created_by.map(UserId::from),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct RunRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i64,
    location_id: Uuid,
    responsible: Uuid,
    notes: Option<String>,
    produced_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for RunRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            location_id: row.try_get("location_id")?,
            responsible: row.try_get("responsible")?,
            notes: row.try_get("notes")?,
            produced_at: row.try_get("produced_at")?,
        })
    }
}

impl From<RunRow> for ProductionRun {
    fn from(row: RunRow) -> Self {
        ProductionRun {
            id: ProductionRunId::from(row.id),
            product_id: ProductId::from(row.product_id),
            quantity: row.quantity,
            location_id: LocationId::from(row.location_id),
            responsible: UserId::from(row.responsible),
            notes: row.notes,
            produced_at: row.produced_at,
        }
    }
}
