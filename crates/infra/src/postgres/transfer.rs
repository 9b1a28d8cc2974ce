use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use stocktrace_core::{
    DivergenceId, DomainError, DomainResult, ItemId, LocationId, TransferId, TripId, UserId,
};
use stocktrace_transfer::{
    Divergence, DivergenceKind, DivergenceStore, Resolution, Transfer, TransferFilter,
    TransferKind, TransferLineItem, TransferStatus, TransferStore, Trip, TripStatus, TripStore,
};

use super::{block_on, map_sqlx_error};

const TRANSFER_COLUMNS: &str = "id, kind, origin_id, destination_id, trip_id, status, \
     created_by, accepted_by, created_at, dispatched_at, received_at";

const TRIP_COLUMNS: &str =
    "id, driver_id, status, created_by, created_at, started_at, completed_at";

const DIVERGENCE_COLUMNS: &str =
    "id, transfer_id, item_id, kind, resolved, resolved_by, resolved_at, created_at";

/// Who/when columns a transfer status change stamps: acceptor, dispatch
/// time, receipt time.
fn transfer_stamps(
    next: TransferStatus,
    actor_id: UserId,
    at: DateTime<Utc>,
) -> (Option<UserId>, Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match next {
        TransferStatus::Accepted => (Some(actor_id), None, None),
        TransferStatus::InTransit => (None, Some(at), None),
        TransferStatus::Delivered | TransferStatus::Divergence => (None, None, Some(at)),
        TransferStatus::AwaitingAccept => (None, None, None),
    }
}

/// Transfers and their manifests in `transfers` / `transfer_lines`.
///
/// Status changes are a conditional `UPDATE ... WHERE status = $expected`, so
/// processes sharing the database race on the row, not on local state.
#[derive(Clone)]
pub struct PgTransferStore {
    pool: Arc<PgPool>,
}

impl PgTransferStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn insert_async(
        &self,
        transfer: Transfer,
        lines: Vec<TransferLineItem>,
    ) -> DomainResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_transfer", e))?;

        sqlx::query(
            r#"
            INSERT INTO transfers (
                id, kind, origin_id, destination_id, trip_id, status,
                created_by, accepted_by, created_at, dispatched_at, received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::from(transfer.id))
        .bind(transfer.kind.as_str())
        .bind(Uuid::from(transfer.origin_id))
        .bind(Uuid::from(transfer.destination_id))
        .bind(transfer.trip_id.map(Uuid::from))
        .bind(transfer.status.as_str())
        .bind(Uuid::from(transfer.created_by))
        .bind(transfer.accepted_by.map(Uuid::from))
        .bind(transfer.created_at)
        .bind(transfer.dispatched_at)
        .bind(transfer.received_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_transfer", e))?;

        for (position, line) in lines.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| DomainError::validation("manifest is too long"))?;
            sqlx::query(
                r#"
                INSERT INTO transfer_lines (transfer_id, item_id, position, received)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::from(transfer.id))
            .bind(Uuid::from(line.item_id))
            .bind(position)
            .bind(line.received)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_transfer_line", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_transfer", e))?;
        Ok(())
    }

    pub async fn get_async(&self, id: TransferId) -> DomainResult<Option<Transfer>> {
        let row: Option<TransferRow> = sqlx::query_as(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_transfer", e))?;
        row.map(Transfer::try_from).transpose()
    }

    pub async fn lines_async(&self, id: TransferId) -> DomainResult<Vec<TransferLineItem>> {
        let rows: Vec<LineRow> = sqlx::query_as(
            r#"
            SELECT transfer_id, item_id, received
            FROM transfer_lines
            WHERE transfer_id = $1
            ORDER BY position
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transfer_lines", e))?;
        Ok(rows.into_iter().map(TransferLineItem::from).collect())
    }

    #[instrument(skip(self, actor_id, at), fields(transfer_id = %id, %expected, %next), err)]
    pub async fn transition_async(
        &self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        actor_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Transfer> {
        if !expected.can_transition_to(next) {
            return Err(DomainError::invalid_transition(format!(
                "{expected} -> {next} is not a legal transfer transition"
            )));
        }

        let (accepted_by, dispatched_at, received_at) = transfer_stamps(next, actor_id, at);
        let updated: Option<TransferRow> = sqlx::query_as(&format!(
            r#"
            UPDATE transfers
            SET status = $3,
                accepted_by = COALESCE($4, accepted_by),
                dispatched_at = COALESCE($5, dispatched_at),
                received_at = COALESCE($6, received_at)
            WHERE id = $1 AND status = $2
            RETURNING {TRANSFER_COLUMNS}
            "#
        ))
        .bind(Uuid::from(id))
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(accepted_by.map(Uuid::from))
        .bind(dispatched_at)
        .bind(received_at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transition_transfer", e))?;

        match updated {
            Some(row) => Transfer::try_from(row),
            None => Err(self.missed(id, expected).await),
        }
    }

    pub async fn mark_received_async(
        &self,
        id: TransferId,
        item_ids: &[ItemId],
    ) -> DomainResult<()> {
        let ids: Vec<Uuid> = item_ids.iter().map(|&i| Uuid::from(i)).collect();
        let result = sqlx::query(
            r#"
            UPDATE transfer_lines
            SET received = TRUE
            WHERE transfer_id = $1 AND item_id = ANY($2)
            "#,
        )
        .bind(Uuid::from(id))
        .bind(ids)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_received", e))?;

        if result.rows_affected() == 0 && self.get_async(id).await?.is_none() {
            return Err(DomainError::not_found(format!("transfer {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(transfer_id = %id, %claimed), err)]
    pub async fn reopen_receipt_async(
        &self,
        id: TransferId,
        claimed: TransferStatus,
    ) -> DomainResult<Transfer> {
        if !claimed.is_settled() {
            return Err(DomainError::invalid_transition(format!(
                "{claimed} is not a receipt status"
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("reopen_receipt", e))?;

        let reopened: Option<TransferRow> = sqlx::query_as(&format!(
            r#"
            UPDATE transfers
            SET status = $3, received_at = NULL
            WHERE id = $1 AND status = $2
            RETURNING {TRANSFER_COLUMNS}
            "#
        ))
        .bind(Uuid::from(id))
        .bind(claimed.as_str())
        .bind(TransferStatus::InTransit.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reopen_receipt", e))?;

        let Some(row) = reopened else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("reopen_receipt", e))?;
            return Err(self.missed(id, claimed).await);
        };

        sqlx::query("UPDATE transfer_lines SET received = FALSE WHERE transfer_id = $1")
            .bind(Uuid::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("reopen_receipt", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("reopen_receipt", e))?;
        Transfer::try_from(row)
    }

    pub async fn list_async(&self, filter: &TransferFilter) -> DomainResult<Vec<Transfer>> {
        let rows: Vec<TransferRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TRANSFER_COLUMNS}
            FROM transfers
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR origin_id = $2)
              AND ($3::uuid IS NULL OR destination_id = $3)
              AND ($4::uuid IS NULL OR trip_id = $4)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(filter.status.map(TransferStatus::as_str))
        .bind(filter.origin_id.map(Uuid::from))
        .bind(filter.destination_id.map(Uuid::from))
        .bind(filter.trip_id.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_transfers", e))?;

        rows.into_iter().map(Transfer::try_from).collect()
    }

    /// Zero rows updated: the transfer is gone or someone else moved it.
    async fn missed(&self, id: TransferId, expected: TransferStatus) -> DomainError {
        match self.get_async(id).await {
            Ok(None) => DomainError::not_found(format!("transfer {id}")),
            Ok(Some(current)) => {
                tracing::debug!(actual = %current.status, "transfer compare-and-set missed");
                DomainError::invalid_transition(format!(
                    "transfer {id} is {}, expected {expected}",
                    current.status
                ))
            }
            Err(err) => err,
        }
    }
}

impl TransferStore for PgTransferStore {
    fn insert(&self, transfer: Transfer, lines: Vec<TransferLineItem>) -> DomainResult<()> {
        block_on(self.insert_async(transfer, lines))?
    }

    fn get(&self, id: TransferId) -> DomainResult<Option<Transfer>> {
        block_on(self.get_async(id))?
    }

    fn lines(&self, id: TransferId) -> DomainResult<Vec<TransferLineItem>> {
        block_on(self.lines_async(id))?
    }

    fn transition(
        &self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        actor_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Transfer> {
        block_on(self.transition_async(id, expected, next, actor_id, at))?
    }

    fn mark_received(&self, id: TransferId, item_ids: &[ItemId]) -> DomainResult<()> {
        block_on(self.mark_received_async(id, item_ids))?
    }

    fn reopen_receipt(&self, id: TransferId, claimed: TransferStatus) -> DomainResult<Transfer> {
        block_on(self.reopen_receipt_async(id, claimed))?
    }

    fn list(&self, filter: &TransferFilter) -> DomainResult<Vec<Transfer>> {
        block_on(self.list_async(filter))?
    }
}

/// Trips in `trips`.
#[derive(Clone)]
pub struct PgTripStore {
    pool: Arc<PgPool>,
}

impl PgTripStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn insert_async(&self, trip: Trip) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trips (
                id, driver_id, status, created_by, created_at, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::from(trip.id))
        .bind(trip.driver_id.map(Uuid::from))
        .bind(trip.status.as_str())
        .bind(Uuid::from(trip.created_by))
        .bind(trip.created_at)
        .bind(trip.started_at)
        .bind(trip.completed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_trip", e))?;
        Ok(())
    }

    pub async fn get_async(&self, id: TripId) -> DomainResult<Option<Trip>> {
        let row: Option<TripRow> =
            sqlx::query_as(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1"))
                .bind(Uuid::from(id))
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_trip", e))?;
        row.map(Trip::try_from).transpose()
    }

    #[instrument(skip(self, driver_id, at), fields(trip_id = %id, %expected, %next), err)]
    pub async fn transition_async(
        &self,
        id: TripId,
        expected: TripStatus,
        next: TripStatus,
        driver_id: Option<UserId>,
        at: DateTime<Utc>,
    ) -> DomainResult<Trip> {
        if !expected.can_transition_to(next) {
            return Err(DomainError::invalid_transition(format!(
                "{expected} -> {next} is not a legal trip transition"
            )));
        }

        let driver_id = driver_id.filter(|_| next == TripStatus::Accepted);
        let started_at = (next == TripStatus::InTransit).then_some(at);
        let completed_at = (next == TripStatus::Completed).then_some(at);
        let updated: Option<TripRow> = sqlx::query_as(&format!(
            r#"
            UPDATE trips
            SET status = $3,
                driver_id = COALESCE($4, driver_id),
                started_at = COALESCE($5, started_at),
                completed_at = COALESCE($6, completed_at)
            WHERE id = $1 AND status = $2
            RETURNING {TRIP_COLUMNS}
            "#
        ))
        .bind(Uuid::from(id))
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(driver_id.map(Uuid::from))
        .bind(started_at)
        .bind(completed_at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transition_trip", e))?;

        if let Some(row) = updated {
            return Trip::try_from(row);
        }
        match self.get_async(id).await? {
            None => Err(DomainError::not_found(format!("trip {id}"))),
            Some(current) => Err(DomainError::invalid_transition(format!(
                "trip {id} is {}, expected {expected}",
                current.status
            ))),
        }
    }

    pub async fn list_async(&self, status: Option<TripStatus>) -> DomainResult<Vec<Trip>> {
        let rows: Vec<TripRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TRIP_COLUMNS}
            FROM trips
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(status.map(TripStatus::as_str))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_trips", e))?;

        rows.into_iter().map(Trip::try_from).collect()
    }
}

impl TripStore for PgTripStore {
    fn insert(&self, trip: Trip) -> DomainResult<()> {
        block_on(self.insert_async(trip))?
    }

    fn get(&self, id: TripId) -> DomainResult<Option<Trip>> {
        block_on(self.get_async(id))?
    }

    fn transition(
        &self,
        id: TripId,
        expected: TripStatus,
        next: TripStatus,
        driver_id: Option<UserId>,
        at: DateTime<Utc>,
    ) -> DomainResult<Trip> {
        block_on(self.transition_async(id, expected, next, driver_id, at))?
    }

    fn list(&self, status: Option<TripStatus>) -> DomainResult<Vec<Trip>> {
        block_on(self.list_async(status))?
    }
}

/// Receipt divergences in `divergences`.
#[derive(Clone)]
pub struct PgDivergenceStore {
    pool: Arc<PgPool>,
}

impl PgDivergenceStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn insert_many_async(&self, divergences: Vec<Divergence>) -> DomainResult<()> {
        if divergences.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_divergences", e))?;

        for divergence in &divergences {
            sqlx::query(
                r#"
                INSERT INTO divergences (
                    id, transfer_id, item_id, kind, resolved, resolved_by, resolved_at, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::from(divergence.id))
            .bind(Uuid::from(divergence.transfer_id))
            .bind(Uuid::from(divergence.item_id))
            .bind(divergence.kind.as_str())
            .bind(divergence.resolved)
            .bind(divergence.resolved_by.map(Uuid::from))
            .bind(divergence.resolved_at)
            .bind(divergence.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_divergences", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_divergences", e))?;
        Ok(())
    }

    pub async fn get_async(&self, id: DivergenceId) -> DomainResult<Option<Divergence>> {
        let row: Option<DivergenceRow> = sqlx::query_as(&format!(
            "SELECT {DIVERGENCE_COLUMNS} FROM divergences WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_divergence", e))?;
        row.map(Divergence::try_from).transpose()
    }

    /// First resolver wins: the update only matches an open row.
    #[instrument(skip(self, resolver_id, at), fields(divergence_id = %id), err)]
    pub async fn resolve_async(
        &self,
        id: DivergenceId,
        resolver_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Resolution> {
        let updated: Option<DivergenceRow> = sqlx::query_as(&format!(
            r#"
            UPDATE divergences
            SET resolved = TRUE, resolved_by = $2, resolved_at = $3
            WHERE id = $1 AND NOT resolved
            RETURNING {DIVERGENCE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(id))
        .bind(Uuid::from(resolver_id))
        .bind(at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("resolve_divergence", e))?;

        if let Some(row) = updated {
            return Divergence::try_from(row).map(Resolution::Resolved);
        }
        self.get_async(id)
            .await?
            .map(Resolution::AlreadyResolved)
            .ok_or_else(|| DomainError::not_found(format!("divergence {id}")))
    }

    pub async fn for_transfer_async(
        &self,
        transfer_id: TransferId,
    ) -> DomainResult<Vec<Divergence>> {
        let rows: Vec<DivergenceRow> = sqlx::query_as(&format!(
            "SELECT {DIVERGENCE_COLUMNS} FROM divergences WHERE transfer_id = $1 ORDER BY id"
        ))
        .bind(Uuid::from(transfer_id))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transfer_divergences", e))?;

        rows.into_iter().map(Divergence::try_from).collect()
    }

    pub async fn list_async(&self, open_only: bool) -> DomainResult<Vec<Divergence>> {
        let rows: Vec<DivergenceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {DIVERGENCE_COLUMNS}
            FROM divergences
            WHERE NOT ($1 AND resolved)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(open_only)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_divergences", e))?;

        rows.into_iter().map(Divergence::try_from).collect()
    }
}

impl DivergenceStore for PgDivergenceStore {
    fn insert_many(&self, divergences: Vec<Divergence>) -> DomainResult<()> {
        block_on(self.insert_many_async(divergences))?
    }

    fn get(&self, id: DivergenceId) -> DomainResult<Option<Divergence>> {
        block_on(self.get_async(id))?
    }

    fn resolve(
        &self,
        id: DivergenceId,
        resolver_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Resolution> {
        block_on(self.resolve_async(id, resolver_id, at))?
    }

    fn for_transfer(&self, transfer_id: TransferId) -> DomainResult<Vec<Divergence>> {
        block_on(self.for_transfer_async(transfer_id))?
    }

    fn list(&self, open_only: bool) -> DomainResult<Vec<Divergence>> {
        block_on(self.list_async(open_only))?
    }
}

/// Raw `transfers` row.
#[derive(Debug)]
struct TransferRow {
    id: Uuid,
    kind: String,
    origin_id: Uuid,
    destination_id: Uuid,
    trip_id: Option<Uuid>,
    status: String,
    created_by: Uuid,
    accepted_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    dispatched_at: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for TransferRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            origin_id: row.try_get("origin_id")?,
            destination_id: row.try_get("destination_id")?,
            trip_id: row.try_get("trip_id")?,
            status: row.try_get("status")?,
            created_by: row.try_get("created_by")?,
            accepted_by: row.try_get("accepted_by")?,
            created_at: row.try_get("created_at")?,
            dispatched_at: row.try_get("dispatched_at")?,
            received_at: row.try_get("received_at")?,
        })
    }
}

impl TryFrom<TransferRow> for Transfer {
    type Error = DomainError;

    fn try_from(row: TransferRow) -> Result<Self, Self::Error> {
        let kind = TransferKind::from_tag(&row.kind).ok_or_else(|| {
            DomainError::storage(format!("transfer {} has unknown kind {:?}", row.id, row.kind))
        })?;
        let status = TransferStatus::from_tag(&row.status).ok_or_else(|| {
            DomainError::storage(format!(
                "transfer {} has unknown status {:?}",
                row.id, row.status
            ))
        })?;
        Ok(Transfer {
            id: TransferId::from(row.id),
            kind,
            origin_id: LocationId::from(row.origin_id),
            destination_id: LocationId::from(row.destination_id),
            trip_id: row.trip_id.map(TripId::from),
            status,
            created_by: UserId::from(row.created_by),
            accepted_by: row.accepted_by.map(UserId::from),
            created_at: row.created_at,
            dispatched_at: row.dispatched_at,
            received_at: row.received_at,
        })
    }
}

/// Raw `transfer_lines` row.
#[derive(Debug)]
struct LineRow {
    transfer_id: Uuid,
    item_id: Uuid,
    received: bool,
}

impl<'r> sqlx::FromRow<'r, PgRow> for LineRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            transfer_id: row.try_get("transfer_id")?,
            item_id: row.try_get("item_id")?,
            received: row.try_get("received")?,
        })
    }
}

impl From<LineRow> for TransferLineItem {
    fn from(row: LineRow) -> Self {
        TransferLineItem {
            transfer_id: TransferId::from(row.transfer_id),
            item_id: ItemId::from(row.item_id),
            received: row.received,
        }
    }
}

/// Raw `trips` row.
#[derive(Debug)]
struct TripRow {
    id: Uuid,
    driver_id: Option<Uuid>,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for TripRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            driver_id: row.try_get("driver_id")?,
            status: row.try_get("status")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl TryFrom<TripRow> for Trip {
    type Error = DomainError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        let status = TripStatus::from_tag(&row.status).ok_or_else(|| {
            DomainError::storage(format!("trip {} has unknown status {:?}", row.id, row.status))
        })?;
        Ok(Trip {
            id: TripId::from(row.id),
            driver_id: row.driver_id.map(UserId::from),
            status,
            created_by: UserId::from(row.created_by),
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Raw `divergences` row.
#[derive(Debug)]
struct DivergenceRow {
    id: Uuid,
    transfer_id: Uuid,
    item_id: Uuid,
    kind: String,
    resolved: bool,
    resolved_by: Option<Uuid>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for DivergenceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            transfer_id: row.try_get("transfer_id")?,
            item_id: row.try_get("item_id")?,
            kind: row.try_get("kind")?,
            resolved: row.try_get("resolved")?,
            resolved_by: row.try_get("resolved_by")?,
            resolved_at: row.try_get("resolved_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<DivergenceRow> for Divergence {
    type Error = DomainError;

    fn try_from(row: DivergenceRow) -> Result<Self, Self::Error> {
        let kind = DivergenceKind::from_tag(&row.kind).ok_or_else(|| {
            DomainError::storage(format!(
                "divergence {} has unknown kind {:?}",
                row.id, row.kind
            ))
        })?;
        Ok(Divergence {
            id: DivergenceId::from(row.id),
            transfer_id: TransferId::from(row.transfer_id),
            item_id: ItemId::from(row.item_id),
            kind,
            resolved: row.resolved,
            resolved_by: row.resolved_by.map(UserId::from),
            resolved_at: row.resolved_at,
            created_at: row.created_at,
        })
    }
}
