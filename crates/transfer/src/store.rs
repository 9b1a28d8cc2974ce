//! Persistence contracts for transfers, trips and divergences.
//!
//! Status changes are compare-and-set: implementations apply them atomically
//! against the stored status, and a missing record is `NotFound`.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use stocktrace_core::{DivergenceId, DomainResult, ItemId, TransferId, TripId, UserId};

use crate::divergence::Divergence;
use crate::transfer::{Transfer, TransferFilter, TransferLineItem, TransferStatus};
use crate::trip::{Trip, TripStatus};

pub trait TransferStore: Send + Sync {
    /// Insert a transfer with its manifest, atomically.
    fn insert(&self, transfer: Transfer, lines: Vec<TransferLineItem>) -> DomainResult<()>;

    fn get(&self, id: TransferId) -> DomainResult<Option<Transfer>>;

    /// Manifest of a transfer; empty for an unknown id.
    fn lines(&self, id: TransferId) -> DomainResult<Vec<TransferLineItem>>;

    fn transition(
        &self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        actor_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Transfer>;

    /// Flag the given manifest lines as received. Ids not on the manifest are ignored.
    fn mark_received(&self, id: TransferId, item_ids: &[ItemId]) -> DomainResult<()>;

    /// Compensate a receipt: `claimed -> IN_TRANSIT`, clearing the receipt
    /// time and every line's received flag. Guarded like `transition`.
    fn reopen_receipt(&self, id: TransferId, claimed: TransferStatus) -> DomainResult<Transfer>;

    /// Newest first.
    fn list(&self, filter: &TransferFilter) -> DomainResult<Vec<Transfer>>;
}

pub trait TripStore: Send + Sync {
    fn insert(&self, trip: Trip) -> DomainResult<()>;

    fn get(&self, id: TripId) -> DomainResult<Option<Trip>>;

    fn transition(
        &self,
        id: TripId,
        expected: TripStatus,
        next: TripStatus,
        driver_id: Option<UserId>,
        at: DateTime<Utc>,
    ) -> DomainResult<Trip>;

    /// Newest first, optionally restricted to one status.
    fn list(&self, status: Option<TripStatus>) -> DomainResult<Vec<Trip>>;
}

/// Outcome of a resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// This call resolved it.
    Resolved(Divergence),
    /// It was resolved before; returned unchanged.
    AlreadyResolved(Divergence),
}

pub trait DivergenceStore: Send + Sync {
    fn insert_many(&self, divergences: Vec<Divergence>) -> DomainResult<()>;

    fn get(&self, id: DivergenceId) -> DomainResult<Option<Divergence>>;

    /// Resolve once. The first resolver wins and is never overwritten.
    fn resolve(
        &self,
        id: DivergenceId,
        resolver_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Resolution>;

    fn for_transfer(&self, transfer_id: TransferId) -> DomainResult<Vec<Divergence>>;

    /// Newest first.
    fn list(&self, open_only: bool) -> DomainResult<Vec<Divergence>>;
}

impl<S> TransferStore for Arc<S>
where
    S: TransferStore + ?Sized,
{
    fn insert(&self, transfer: Transfer, lines: Vec<TransferLineItem>) -> DomainResult<()> {
        (**self).insert(transfer, lines)
    }

    fn get(&self, id: TransferId) -> DomainResult<Option<Transfer>> {
        (**self).get(id)
    }

    fn lines(&self, id: TransferId) -> DomainResult<Vec<TransferLineItem>> {
        (**self).lines(id)
    }

    fn transition(
        &self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        actor_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Transfer> {
        (**self).transition(id, expected, next, actor_id, at)
    }

    fn mark_received(&self, id: TransferId, item_ids: &[ItemId]) -> DomainResult<()> {
        (**self).mark_received(id, item_ids)
    }

    fn reopen_receipt(&self, id: TransferId, claimed: TransferStatus) -> DomainResult<Transfer> {
        (**self).reopen_receipt(id, claimed)
    }

    fn list(&self, filter: &TransferFilter) -> DomainResult<Vec<Transfer>> {
        (**self).list(filter)
    }
}

impl<S> TripStore for Arc<S>
where
    S: TripStore + ?Sized,
{
    fn insert(&self, trip: Trip) -> DomainResult<()> {
        (**self).insert(trip)
    }

    fn get(&self, id: TripId) -> DomainResult<Option<Trip>> {
        (**self).get(id)
    }

    fn transition(
        &self,
        id: TripId,
        expected: TripStatus,
        next: TripStatus,
        driver_id: Option<UserId>,
        at: DateTime<Utc>,
    ) -> DomainResult<Trip> {
        (**self).transition(id, expected, next, driver_id, at)
    }

    fn list(&self, status: Option<TripStatus>) -> DomainResult<Vec<Trip>> {
        (**self).list(status)
    }
}

impl<S> DivergenceStore for Arc<S>
where
    S: DivergenceStore + ?Sized,
{
    fn insert_many(&self, divergences: Vec<Divergence>) -> DomainResult<()> {
        (**self).insert_many(divergences)
    }

    fn get(&self, id: DivergenceId) -> DomainResult<Option<Divergence>> {
        (**self).get(id)
    }

    fn resolve(
        &self,
        id: DivergenceId,
        resolver_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Resolution> {
        (**self).resolve(id, resolver_id, at)
    }

    fn for_transfer(&self, transfer_id: TransferId) -> DomainResult<Vec<Divergence>> {
        (**self).for_transfer(transfer_id)
    }

    fn list(&self, open_only: bool) -> DomainResult<Vec<Divergence>> {
        (**self).list(open_only)
    }
}
