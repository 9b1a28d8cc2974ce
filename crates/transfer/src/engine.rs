use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use stocktrace_audit::{AuditAction, AuditEvent, AuditSink, record_best_effort};
use stocktrace_catalog::{LocationRegistry, require_location};
use stocktrace_core::{
    DivergenceId, DomainError, DomainResult, ItemId, LocationId, TransferId, UserId,
};
use stocktrace_ledger::{ItemLedger, ItemState};

use crate::divergence::{Divergence, reconcile};
use crate::store::{DivergenceStore, Resolution, TransferStore, TripStore};
use crate::transfer::{CreateTransfer, Transfer, TransferFilter, TransferLineItem, TransferStatus};

/// A transfer with its manifest and receipt divergences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferView {
    pub transfer: Transfer,
    pub lines: Vec<TransferLineItem>,
    pub divergences: Vec<Divergence>,
}

/// Result of a best-effort dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub transfer: Transfer,
    /// Items now `IN_TRANSFER`.
    pub dispatched: Vec<ItemId>,
    /// Items whose transition failed (no longer `IN_STOCK`, or gone).
    pub skipped: Vec<ItemId>,
}

/// Command: ReceiveTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveTransfer {
    pub transfer_id: TransferId,
    pub received_item_ids: Vec<ItemId>,
    pub destination_id: LocationId,
    pub actor_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptOutcome {
    pub transfer: Transfer,
    pub divergences: Vec<Divergence>,
    /// Matched items now `IN_STOCK` at the destination.
    pub moved: Vec<ItemId>,
    /// Matched items whose transition failed.
    pub not_moved: Vec<ItemId>,
}

/// Drives transfers through their lifecycle.
pub struct TransferEngine {
    locations: Arc<dyn LocationRegistry>,
    ledger: Arc<dyn ItemLedger>,
    transfers: Arc<dyn TransferStore>,
    divergences: Arc<dyn DivergenceStore>,
    trips: Arc<dyn TripStore>,
    audit: Arc<dyn AuditSink>,
}

impl TransferEngine {
    pub fn new(
        locations: Arc<dyn LocationRegistry>,
        ledger: Arc<dyn ItemLedger>,
        transfers: Arc<dyn TransferStore>,
        divergences: Arc<dyn DivergenceStore>,
        trips: Arc<dyn TripStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            locations,
            ledger,
            transfers,
            divergences,
            trips,
            audit,
        }
    }

    /// Create a transfer in `AWAITING_ACCEPT`.
    ///
    /// Every item must be `IN_STOCK` at the origin; the first one that is not
    /// rejects the whole call and nothing is written. Items are not reserved:
    /// their state is claimed at dispatch.
    #[instrument(
        skip(self, cmd),
        fields(
            origin_id = %cmd.origin_id,
            destination_id = %cmd.destination_id,
            items = cmd.item_ids.len()
        ),
        err
    )]
    pub fn create(&self, cmd: CreateTransfer) -> DomainResult<Transfer> {
        if cmd.item_ids.is_empty() {
            return Err(DomainError::validation("a transfer needs at least one item"));
        }
        let mut seen = HashSet::with_capacity(cmd.item_ids.len());
        if let Some(dup) = cmd.item_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(DomainError::validation(format!("item {dup} listed twice")));
        }
        if cmd.origin_id == cmd.destination_id {
            return Err(DomainError::validation("origin and destination must differ"));
        }

        let (origin_kind, destination_kind) = cmd.kind.endpoints();
        require_location(self.locations.as_ref(), cmd.origin_id, origin_kind)?;
        require_location(self.locations.as_ref(), cmd.destination_id, destination_kind)?;

        if let Some(trip_id) = cmd.trip_id {
            let trip = self
                .trips
                .get(trip_id)?
                .ok_or_else(|| DomainError::validation(format!("unknown trip {trip_id}")))?;
            if !trip.is_open_for_transfers() {
                return Err(DomainError::validation(format!(
                    "trip {trip_id} is {}, no longer open for transfers",
                    trip.status
                )));
            }
        }

        for &item_id in &cmd.item_ids {
            let item = self
                .ledger
                .get(item_id)?
                .ok_or_else(|| DomainError::item_not_available(item_id, "unknown item"))?;
            if item.state != ItemState::InStock {
                return Err(DomainError::item_not_available(
                    item_id,
                    format!("item is {}", item.state),
                ));
            }
            if !item.is_at(cmd.origin_id) {
                return Err(DomainError::item_not_available(
                    item_id,
                    format!("item is not at origin {}", cmd.origin_id),
                ));
            }
        }

        let transfer = Transfer {
            id: TransferId::new(),
            kind: cmd.kind,
            origin_id: cmd.origin_id,
            destination_id: cmd.destination_id,
            trip_id: cmd.trip_id,
            status: TransferStatus::AwaitingAccept,
            created_by: cmd.actor_id,
            accepted_by: None,
            created_at: cmd.occurred_at,
            dispatched_at: None,
            received_at: None,
        };
        let lines = cmd
            .item_ids
            .iter()
            .map(|&item_id| TransferLineItem {
                transfer_id: transfer.id,
                item_id,
                received: false,
            })
            .collect();
        self.transfers.insert(transfer.clone(), lines)?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::TransferCreated, Some(cmd.actor_id))
                .at_location(cmd.origin_id)
                .route(cmd.origin_id, cmd.destination_id)
                .details(json!({
                    "transfer_id": transfer.id,
                    "kind": transfer.kind,
                    "trip_id": transfer.trip_id,
                    "items": cmd.item_ids.len(),
                })),
        );

        tracing::info!(transfer_id = %transfer.id, "transfer created");
        Ok(transfer)
    }

    /// `AWAITING_ACCEPT -> ACCEPTED`, recording the acceptor.
    #[instrument(skip(self), fields(transfer_id = %transfer_id), err)]
    pub fn accept(&self, transfer_id: TransferId, acceptor_id: UserId) -> DomainResult<Transfer> {
        let transfer = self.transfers.transition(
            transfer_id,
            TransferStatus::AwaitingAccept,
            TransferStatus::Accepted,
            acceptor_id,
            Utc::now(),
        )?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::TransferAccepted, Some(acceptor_id))
                .route(transfer.origin_id, transfer.destination_id)
                .details(json!({ "transfer_id": transfer.id })),
        );

        tracing::info!("transfer accepted");
        Ok(transfer)
    }

    /// `ACCEPTED -> IN_TRANSIT`, moving manifested items `IN_STOCK -> IN_TRANSFER`.
    ///
    /// The status change is claimed first, so concurrent dispatches cannot both
    /// proceed. Item moves are best-effort: an item that is no longer
    /// `IN_STOCK` is skipped and the rest still ship.
    #[instrument(skip(self), fields(transfer_id = %transfer_id), err)]
    pub fn dispatch(
        &self,
        transfer_id: TransferId,
        actor_id: UserId,
    ) -> DomainResult<DispatchOutcome> {
        let transfer = self.transfers.transition(
            transfer_id,
            TransferStatus::Accepted,
            TransferStatus::InTransit,
            actor_id,
            Utc::now(),
        )?;

        let mut dispatched = Vec::new();
        let mut skipped = Vec::new();
        for line in self.transfers.lines(transfer_id)? {
            match self.ledger.transition(
                line.item_id,
                ItemState::InStock,
                ItemState::InTransfer,
                None,
            ) {
                Ok(_) => dispatched.push(line.item_id),
                Err(err) => {
                    tracing::warn!(item_id = %line.item_id, error = %err, "item not dispatched");
                    skipped.push(line.item_id);
                }
            }
        }

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::TransferDispatched, Some(actor_id))
                .at_location(transfer.origin_id)
                .route(transfer.origin_id, transfer.destination_id)
                .details(json!({
                    "transfer_id": transfer.id,
                    "trip_id": transfer.trip_id,
                    "dispatched": dispatched.len(),
                    "skipped": skipped,
                })),
        );

        tracing::info!(
            dispatched = dispatched.len(),
            skipped = skipped.len(),
            "transfer dispatched"
        );
        Ok(DispatchOutcome {
            transfer,
            dispatched,
            skipped,
        })
    }

    /// Reconcile what arrived against the manifest.
    ///
    /// Legal once, from `IN_TRANSIT`, and only at the transfer's own
    /// destination. The status change to `DELIVERED` or `DIVERGENCE` is
    /// claimed first, so a repeated call fails with `InvalidStateTransition`
    /// and creates no divergences. Receipt records are written before any item
    /// moves; if they cannot be written the claim is undone and the transfer
    /// stays `IN_TRANSIT` for a retry.
    #[instrument(
        skip(self, cmd),
        fields(transfer_id = %cmd.transfer_id, received = cmd.received_item_ids.len()),
        err
    )]
    pub fn receive(&self, cmd: ReceiveTransfer) -> DomainResult<ReceiptOutcome> {
        let current = self
            .transfers
            .get(cmd.transfer_id)?
            .ok_or_else(|| DomainError::not_found(format!("transfer {}", cmd.transfer_id)))?;
        if current.destination_id != cmd.destination_id {
            return Err(DomainError::validation(format!(
                "transfer {} is bound for {}, not {}",
                current.id, current.destination_id, cmd.destination_id
            )));
        }

        let manifest: Vec<ItemId> = self
            .transfers
            .lines(cmd.transfer_id)?
            .into_iter()
            .map(|line| line.item_id)
            .collect();
        let reconciliation = reconcile(&manifest, &cmd.received_item_ids);
        let next = if reconciliation.is_clean() {
            TransferStatus::Delivered
        } else {
            TransferStatus::Divergence
        };

        let now = Utc::now();
        let transfer = self.transfers.transition(
            cmd.transfer_id,
            TransferStatus::InTransit,
            next,
            cmd.actor_id,
            now,
        )?;

        let divergences = reconciliation.divergences(transfer.id, now);
        if let Err(err) = self.write_receipt(&transfer, &reconciliation.matched, &divergences) {
            tracing::warn!(error = %err, "receipt not recorded; reopening transfer");
            if let Err(reopen) = self.transfers.reopen_receipt(transfer.id, next) {
                tracing::error!(error = %reopen, "transfer left {next} without receipt records");
            }
            return Err(err);
        }

        let mut moved = Vec::new();
        let mut not_moved = Vec::new();
        for &item_id in &reconciliation.matched {
            match self.ledger.transition(
                item_id,
                ItemState::InTransfer,
                ItemState::InStock,
                Some(transfer.destination_id),
            ) {
                Ok(_) => moved.push(item_id),
                Err(err) => {
                    tracing::warn!(item_id = %item_id, error = %err, "received item not moved");
                    not_moved.push(item_id);
                }
            }
        }

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::TransferReceived, Some(cmd.actor_id))
                .at_location(transfer.destination_id)
                .route(transfer.origin_id, transfer.destination_id)
                .details(json!({
                    "transfer_id": transfer.id,
                    "status": transfer.status,
                    "received": cmd.received_item_ids.len(),
                    "divergences": divergences.len(),
                    "moved": moved.len(),
                })),
        );

        tracing::info!(
            status = %transfer.status,
            moved = moved.len(),
            missing = reconciliation.missing.len(),
            surplus = reconciliation.surplus.len(),
            "transfer received"
        );
        Ok(ReceiptOutcome {
            transfer,
            divergences,
            moved,
            not_moved,
        })
    }

    fn write_receipt(
        &self,
        transfer: &Transfer,
        matched: &[ItemId],
        divergences: &[Divergence],
    ) -> DomainResult<()> {
        self.transfers.mark_received(transfer.id, matched)?;
        if !divergences.is_empty() {
            self.divergences.insert_many(divergences.to_vec())?;
        }
        Ok(())
    }

    /// Mark a divergence resolved. Item state is untouched.
    ///
    /// Resolving twice returns the record unchanged and writes nothing.
    #[instrument(skip(self), fields(divergence_id = %divergence_id), err)]
    pub fn resolve_divergence(
        &self,
        divergence_id: DivergenceId,
        actor_id: UserId,
    ) -> DomainResult<Divergence> {
        match self.divergences.resolve(divergence_id, actor_id, Utc::now())? {
            Resolution::Resolved(divergence) => {
                record_best_effort(
                    self.audit.as_ref(),
                    AuditEvent::new(AuditAction::DivergenceResolved, Some(actor_id))
                        .for_item(divergence.item_id)
                        .details(json!({
                            "divergence_id": divergence.id,
                            "transfer_id": divergence.transfer_id,
                            "kind": divergence.kind,
                        })),
                );
                tracing::info!("divergence resolved");
                Ok(divergence)
            }
            Resolution::AlreadyResolved(divergence) => {
                tracing::debug!("divergence already resolved");
                Ok(divergence)
            }
        }
    }

    pub fn get(&self, transfer_id: TransferId) -> DomainResult<Option<TransferView>> {
        let Some(transfer) = self.transfers.get(transfer_id)? else {
            return Ok(None);
        };
        Ok(Some(TransferView {
            lines: self.transfers.lines(transfer_id)?,
            divergences: self.divergences.for_transfer(transfer_id)?,
            transfer,
        }))
    }

    pub fn list_transfers(&self, filter: &TransferFilter) -> DomainResult<Vec<Transfer>> {
        self.transfers.list(filter)
    }

    pub fn list_divergences(&self, open_only: bool) -> DomainResult<Vec<Divergence>> {
        self.divergences.list(open_only)
    }
}
