//! In-memory stores for tests/dev, built on [`InMemoryTable`]'s guarded update.

use chrono::{DateTime, Utc};

use stocktrace_core::{
    DivergenceId, DomainError, DomainResult, Entity, InMemoryTable, ItemId, TransferId, TripId,
    UserId,
};

use crate::divergence::Divergence;
use crate::store::{DivergenceStore, Resolution, TransferStore, TripStore};
use crate::transfer::{Transfer, TransferFilter, TransferLineItem, TransferStatus};
use crate::trip::{Trip, TripStatus};

/// A transfer stored together with its manifest.
#[derive(Debug, Clone)]
struct TransferRecord {
    transfer: Transfer,
    lines: Vec<TransferLineItem>,
}

impl Entity for TransferRecord {
    type Id = TransferId;

    fn id(&self) -> &TransferId {
        &self.transfer.id
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTransferStore {
    records: InMemoryTable<TransferRecord>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransferStore for InMemoryTransferStore {
    fn insert(&self, transfer: Transfer, lines: Vec<TransferLineItem>) -> DomainResult<()> {
        self.records.insert(TransferRecord { transfer, lines })
    }

    fn get(&self, id: TransferId) -> DomainResult<Option<Transfer>> {
        Ok(self.records.get(&id)?.map(|r| r.transfer))
    }

    fn lines(&self, id: TransferId) -> DomainResult<Vec<TransferLineItem>> {
        Ok(self.records.get(&id)?.map(|r| r.lines).unwrap_or_default())
    }

    fn transition(
        &self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        actor_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Transfer> {
        self.records
            .update(&id, |record| {
                record.transfer.apply_status(expected, next, actor_id, at)
            })?
            .map(|r| r.transfer)
            .ok_or_else(|| DomainError::not_found(format!("transfer {id}")))
    }

    fn mark_received(&self, id: TransferId, item_ids: &[ItemId]) -> DomainResult<()> {
        self.records
            .update(&id, |record| {
                for line in &mut record.lines {
                    if item_ids.contains(&line.item_id) {
                        line.received = true;
                    }
                }
                Ok(())
            })?
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found(format!("transfer {id}")))
    }

    fn reopen_receipt(&self, id: TransferId, claimed: TransferStatus) -> DomainResult<Transfer> {
        self.records
            .update(&id, |record| {
                record.transfer.reopen_receipt(claimed)?;
                for line in &mut record.lines {
                    line.received = false;
                }
                Ok(())
            })?
            .map(|r| r.transfer)
            .ok_or_else(|| DomainError::not_found(format!("transfer {id}")))
    }

    fn list(&self, filter: &TransferFilter) -> DomainResult<Vec<Transfer>> {
        let mut transfers: Vec<Transfer> = self
            .records
            .filter(|r| filter.matches(&r.transfer))?
            .into_iter()
            .map(|r| r.transfer)
            .collect();
        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(transfers)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTripStore {
    trips: InMemoryTable<Trip>,
}

impl InMemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TripStore for InMemoryTripStore {
    fn insert(&self, trip: Trip) -> DomainResult<()> {
        self.trips.insert(trip)
    }

    fn get(&self, id: TripId) -> DomainResult<Option<Trip>> {
        self.trips.get(&id)
    }

    fn transition(
        &self,
        id: TripId,
        expected: TripStatus,
        next: TripStatus,
        driver_id: Option<UserId>,
        at: DateTime<Utc>,
    ) -> DomainResult<Trip> {
        self.trips
            .update(&id, |trip| trip.apply_status(expected, next, driver_id, at))?
            .ok_or_else(|| DomainError::not_found(format!("trip {id}")))
    }

    fn list(&self, status: Option<TripStatus>) -> DomainResult<Vec<Trip>> {
        let mut trips = self
            .trips
            .filter(|t| status.is_none_or(|s| t.status == s))?;
        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(trips)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDivergenceStore {
    divergences: InMemoryTable<Divergence>,
}

impl InMemoryDivergenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DivergenceStore for InMemoryDivergenceStore {
    fn insert_many(&self, divergences: Vec<Divergence>) -> DomainResult<()> {
        self.divergences.insert_many(divergences)
    }

    fn get(&self, id: DivergenceId) -> DomainResult<Option<Divergence>> {
        self.divergences.get(&id)
    }

    fn resolve(
        &self,
        id: DivergenceId,
        resolver_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Resolution> {
        let updated = self.divergences.update(&id, |d| {
            if d.resolved {
                return Err(DomainError::invalid_transition(format!(
                    "divergence {id} already resolved"
                )));
            }
            d.resolved = true;
            d.resolved_by = Some(resolver_id);
            d.resolved_at = Some(at);
            Ok(())
        });

        match updated {
            Ok(Some(d)) => Ok(Resolution::Resolved(d)),
            Ok(None) => Err(DomainError::not_found(format!("divergence {id}"))),
            Err(err) if err.is_lost_race() => self
                .divergences
                .get(&id)?
                .map(Resolution::AlreadyResolved)
                .ok_or_else(|| DomainError::not_found(format!("divergence {id}"))),
            Err(err) => Err(err),
        }
    }

    fn for_transfer(&self, transfer_id: TransferId) -> DomainResult<Vec<Divergence>> {
        let mut found = self.divergences.filter(|d| d.transfer_id == transfer_id)?;
        found.sort_by_key(|d| d.id);
        Ok(found)
    }

    fn list(&self, open_only: bool) -> DomainResult<Vec<Divergence>> {
        let mut found = self.divergences.filter(|d| !open_only || !d.resolved)?;
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::divergence::DivergenceKind;
    use crate::transfer::TransferKind;
    use stocktrace_core::LocationId;

    fn test_transfer() -> Transfer {
        Transfer {
            id: TransferId::new(),
            kind: TransferKind::StoreToStore,
            origin_id: LocationId::new(),
            destination_id: LocationId::new(),
            trip_id: None,
            status: TransferStatus::AwaitingAccept,
            created_by: UserId::new(),
            accepted_by: None,
            created_at: Utc::now(),
            dispatched_at: None,
            received_at: None,
        }
    }

    #[test]
    fn transfer_transition_is_compare_and_set() {
        let store = InMemoryTransferStore::new();
        let transfer = test_transfer();
        store.insert(transfer.clone(), vec![]).unwrap();

        let accept = |id: TransferId, user: UserId| {
            store.transition(
                id,
                TransferStatus::AwaitingAccept,
                TransferStatus::Accepted,
                user,
                Utc::now(),
            )
        };

        let user = UserId::new();
        accept(transfer.id, user).unwrap();
        let err = accept(transfer.id, UserId::new()).unwrap_err();
        assert!(err.is_lost_race());
        assert_eq!(store.get(transfer.id).unwrap().unwrap().accepted_by, Some(user));

        let err = accept(TransferId::new(), user).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn mark_received_flags_only_manifest_lines() {
        let store = InMemoryTransferStore::new();
        let transfer = test_transfer();
        let (a, b) = (ItemId::new(), ItemId::new());
        let lines = [a, b]
            .iter()
            .map(|&item_id| TransferLineItem {
                transfer_id: transfer.id,
                item_id,
                received: false,
            })
            .collect();
        store.insert(transfer.clone(), lines).unwrap();

        store.mark_received(transfer.id, &[a, ItemId::new()]).unwrap();
        let lines = store.lines(transfer.id).unwrap();
        assert!(lines.iter().find(|l| l.item_id == a).unwrap().received);
        assert!(!lines.iter().find(|l| l.item_id == b).unwrap().received);
    }

    #[test]
    fn reopen_receipt_clears_received_lines() {
        let store = InMemoryTransferStore::new();
        let mut transfer = test_transfer();
        transfer.status = TransferStatus::InTransit;
        let item_id = ItemId::new();
        let line = TransferLineItem {
            transfer_id: transfer.id,
            item_id,
            received: false,
        };
        store.insert(transfer.clone(), vec![line]).unwrap();

        let (in_transit, delivered) = (TransferStatus::InTransit, TransferStatus::Delivered);
        store
            .transition(transfer.id, in_transit, delivered, UserId::new(), Utc::now())
            .unwrap();
        store.mark_received(transfer.id, &[item_id]).unwrap();

        let reopened = store
            .reopen_receipt(transfer.id, TransferStatus::Delivered)
            .unwrap();
        assert_eq!(reopened.status, TransferStatus::InTransit);
        assert!(reopened.received_at.is_none());
        assert!(store.lines(transfer.id).unwrap().iter().all(|l| !l.received));

        let err = store
            .reopen_receipt(transfer.id, TransferStatus::Delivered)
            .unwrap_err();
        assert!(err.is_lost_race());
    }

    #[test]
    fn resolve_keeps_first_resolver() {
        let store = InMemoryDivergenceStore::new();
        let divergence = Divergence::open(
            TransferId::new(),
            ItemId::new(),
            DivergenceKind::Missing,
            Utc::now(),
        );
        store.insert_many(vec![divergence.clone()]).unwrap();

        let first = UserId::new();
        let resolved = store.resolve(divergence.id, first, Utc::now()).unwrap();
        assert!(matches!(resolved, Resolution::Resolved(_)));

        let again = store.resolve(divergence.id, UserId::new(), Utc::now()).unwrap();
        match again {
            Resolution::AlreadyResolved(d) => assert_eq!(d.resolved_by, Some(first)),
            other => panic!("expected already resolved, got {other:?}"),
        }
        assert!(store.list(true).unwrap().is_empty());
        assert_eq!(store.list(false).unwrap().len(), 1);
    }

    #[test]
    fn resolve_unknown_is_not_found() {
        let store = InMemoryDivergenceStore::new();
        let err = store
            .resolve(DivergenceId::new(), UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
