use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use stocktrace_core::{
    DomainError, DomainResult, ItemId, LocationId, ProductId, ProductionRunId, PurchaseBatchId,
};
use stocktrace_ledger::{Item, ItemFilter, ItemLedger, ItemState, Token};

use super::{block_on, map_sqlx_error};

const ITEM_COLUMNS: &str = "id, scan_token, short_token, product_id, purchase_batch_id, \
     production_run_id, location_id, state, expires_at, produced_at, created_at";

/// Item ledger backed by the `items` table.
///
/// The guarded transition is a single conditional `UPDATE ... WHERE state = $expected`;
/// Postgres row locking decides concurrent races.
#[derive(Clone)]
pub struct PgItemLedger {
    pool: Arc<PgPool>,
}

impl PgItemLedger {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn insert_items_async(&self, items: Vec<Item>) -> DomainResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_items", e))?;

        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO items (
                    id, scan_token, short_token, product_id, purchase_batch_id,
                    production_run_id, location_id, state, expires_at, produced_at, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(Uuid::from(item.id))
            .bind(item.scan_token.as_str())
            .bind(item.short_token.as_ref().map(Token::as_str))
            .bind(Uuid::from(item.product_id))
            .bind(item.purchase_batch_id.map(Uuid::from))
            .bind(item.production_run_id.map(Uuid::from))
            .bind(item.location_id.map(Uuid::from))
            .bind(item.state.as_str())
            .bind(item.expires_at)
            .bind(item.produced_at)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_items", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_items", e))?;
        Ok(())
    }

    pub async fn get_async(&self, id: ItemId) -> DomainResult<Option<Item>> {
        let row: Option<ItemRow> =
            sqlx::query_as(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
                .bind(Uuid::from(id))
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_item", e))?;
        row.map(Item::try_from).transpose()
    }

    /// Exact lookup on a unique token column.
    async fn find_by(&self, column: TokenColumn, value: &str) -> DomainResult<Option<Item>> {
        let row: Option<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE {} = $1",
            column.name()
        ))
        .bind(value)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_item_by_token", e))?;
        row.map(Item::try_from).transpose()
    }

    #[instrument(skip(self), fields(item_id = %id, %expected, %next), err)]
    pub async fn transition_async(
        &self,
        id: ItemId,
        expected: ItemState,
        next: ItemState,
        location_id: Option<LocationId>,
    ) -> DomainResult<Item> {
        if !expected.can_transition_to(next) {
            return Err(DomainError::invalid_transition(format!(
                "{expected} -> {next} is not a legal item transition"
            )));
        }

        let updated: Option<ItemRow> = sqlx::query_as(&format!(
            r#"
            UPDATE items
            SET state = $3, location_id = COALESCE($4, location_id)
            WHERE id = $1 AND state = $2
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(Uuid::from(id))
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(location_id.map(Uuid::from))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transition_item", e))?;

        if let Some(row) = updated {
            return Item::try_from(row);
        }

        // Zero rows: either the item does not exist or someone else moved it.
        match self.get_async(id).await? {
            None => Err(DomainError::item_not_available(id, "unknown item")),
            Some(current) => {
                tracing::debug!(actual = %current.state, "item compare-and-set missed");
                Err(DomainError::invalid_transition(format!(
                    "item {id} is {}, expected {expected}",
                    current.state
                )))
            }
        }
    }

    /// Guarded transition that also requires the item to sit at `at`.
    ///
    /// State and location are both part of the `WHERE` clause, so a move that
    /// lands between the caller's read and this write misses the update.
    #[instrument(skip(self), fields(item_id = %id, location_id = %at, %expected, %next), err)]
    pub async fn transition_at_async(
        &self,
        id: ItemId,
        at: LocationId,
        expected: ItemState,
        next: ItemState,
    ) -> DomainResult<Item> {
        if !expected.can_transition_to(next) {
            return Err(DomainError::invalid_transition(format!(
                "{expected} -> {next} is not a legal item transition"
            )));
        }

        let updated: Option<ItemRow> = sqlx::query_as(&format!(
            r#"
            UPDATE items
            SET state = $3
            WHERE id = $1 AND state = $2 AND location_id = $4
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(Uuid::from(id))
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(Uuid::from(at))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transition_item_at", e))?;

        if let Some(row) = updated {
            return Item::try_from(row);
        }

        let current = self.get_async(id).await?;
        Err(located_miss(id, at, expected, current.as_ref()))
    }

    pub async fn list_async(&self, filter: &ItemFilter) -> DomainResult<Vec<Item>> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM items
            WHERE ($1::uuid IS NULL OR location_id = $1)
              AND ($2::text IS NULL OR state = $2)
              AND ($3::uuid IS NULL OR product_id = $3)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(filter.location_id.map(Uuid::from))
        .bind(filter.state.map(ItemState::as_str))
        .bind(filter.product_id.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.into_iter().map(Item::try_from).collect()
    }
}

impl ItemLedger for PgItemLedger {
    fn insert_items(&self, items: Vec<Item>) -> DomainResult<()> {
        block_on(self.insert_items_async(items))?
    }

    fn get(&self, id: ItemId) -> DomainResult<Option<Item>> {
        block_on(self.get_async(id))?
    }

    fn find_by_token(&self, token: &str) -> DomainResult<Option<Item>> {
        block_on(self.find_by(TokenColumn::Scan, token))?
    }

    fn find_by_short_token(&self, code: &str) -> DomainResult<Option<Item>> {
        block_on(self.find_by(TokenColumn::Short, code))?
    }

    fn transition(
        &self,
        id: ItemId,
        expected: ItemState,
        next: ItemState,
        location_id: Option<LocationId>,
    ) -> DomainResult<Item> {
        block_on(self.transition_async(id, expected, next, location_id))?
    }

    fn transition_at(
        &self,
        id: ItemId,
        at: LocationId,
        expected: ItemState,
        next: ItemState,
    ) -> DomainResult<Item> {
        block_on(self.transition_at_async(id, at, expected, next))?
    }

    fn list(&self, filter: &ItemFilter) -> DomainResult<Vec<Item>> {
        block_on(self.list_async(filter))?
    }
}

/// Explains why a location-guarded update touched no rows.
fn located_miss(
    id: ItemId,
    at: LocationId,
    expected: ItemState,
    current: Option<&Item>,
) -> DomainError {
    match current {
        None => DomainError::item_not_available(id, "unknown item"),
        Some(item) if item.state != expected => DomainError::invalid_transition(format!(
            "item {id} is {}, expected {expected}",
            item.state
        )),
        Some(item) => DomainError::LocationMismatch {
            item_id: id,
            expected: at,
            actual: item.location_id,
        },
    }
}

#[derive(Debug, Clone, Copy)]
enum TokenColumn {
    Scan,
    Short,
}

impl TokenColumn {
    fn name(self) -> &'static str {
        match self {
            TokenColumn::Scan => "scan_token",
            TokenColumn::Short => "short_token",
        }
    }
}

/// Raw `items` row.
#[derive(Debug)]
struct ItemRow {
    id: Uuid,
    scan_token: String,
    short_token: Option<String>,
    product_id: Uuid,
    purchase_batch_id: Option<Uuid>,
    production_run_id: Option<Uuid>,
    location_id: Option<Uuid>,
    state: String,
    expires_at: Option<DateTime<Utc>>,
    produced_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            scan_token: row.try_get("scan_token")?,
            short_token: row.try_get("short_token")?,
            product_id: row.try_get("product_id")?,
            purchase_batch_id: row.try_get("purchase_batch_id")?,
            production_run_id: row.try_get("production_run_id")?,
            location_id: row.try_get("location_id")?,
            state: row.try_get("state")?,
            expires_at: row.try_get("expires_at")?,
            produced_at: row.try_get("produced_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = DomainError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let state = ItemState::from_tag(&row.state).ok_or_else(|| {
            DomainError::storage(format!("item {} has unknown state {:?}", row.id, row.state))
        })?;
        Ok(Item {
            id: ItemId::from(row.id),
            scan_token: Token::from_raw(row.scan_token),
            short_token: row.short_token.map(Token::from_raw),
            product_id: ProductId::from(row.product_id),
            purchase_batch_id: row.purchase_batch_id.map(PurchaseBatchId::from),
            production_run_id: row.production_run_id.map(ProductionRunId::from),
            location_id: row.location_id.map(LocationId::from),
            state,
            expires_at: row.expires_at,
            produced_at: row.produced_at,
            created_at: row.created_at,
        })
    }
}
