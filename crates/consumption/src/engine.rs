use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use stocktrace_audit::{AuditAction, AuditEvent, AuditSink, record_best_effort};
use stocktrace_core::{DomainError, DomainResult, ItemId, LocationId, UserId};
use stocktrace_ledger::{Item, ItemLedger, ItemState};

use crate::record::{ConsumptionRecord, DisposalRecord, RecordStore};

/// Command: ConsumeItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeItem {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub actor_id: UserId,
}

/// Command: DisposeItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisposeItem {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub actor_id: UserId,
    pub reason: Option<String>,
}

pub struct ConsumptionEngine {
    ledger: Arc<dyn ItemLedger>,
    records: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditSink>,
}

impl ConsumptionEngine {
    pub fn new(
        ledger: Arc<dyn ItemLedger>,
        records: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            ledger,
            records,
            audit,
        }
    }

    /// `IN_STOCK -> CONSUMED` for an item held at `location_id`.
    ///
    /// The location is checked again inside the guarded transition, so an item
    /// that moved after the first read is never consumed at the wrong place.
    #[instrument(
        skip(self, cmd),
        fields(item_id = %cmd.item_id, location_id = %cmd.location_id),
        err
    )]
    pub fn consume(&self, cmd: ConsumeItem) -> DomainResult<Item> {
        let item = self.in_stock(cmd.item_id)?;
        if !item.is_at(cmd.location_id) {
            return Err(DomainError::LocationMismatch {
                item_id: item.id,
                expected: cmd.location_id,
                actual: item.location_id,
            });
        }

        let item = self.ledger.transition_at(
            item.id,
            cmd.location_id,
            ItemState::InStock,
            ItemState::Consumed,
        )?;
        let occurred_at = Utc::now();
        self.records.append_consumption(ConsumptionRecord {
            item_id: item.id,
            location_id: cmd.location_id,
            actor_id: cmd.actor_id,
            occurred_at,
        })?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::ItemConsumed, Some(cmd.actor_id))
                .at_location(cmd.location_id)
                .for_item(item.id)
                .details(json!({
                    "product_id": item.product_id,
                    "scan_token": item.scan_token,
                })),
        );

        tracing::info!("item consumed");
        Ok(item)
    }

    /// `IN_STOCK -> DISPOSED`.
    ///
    /// The item is not required to be at `location_id`; a mismatch is logged
    /// and the reporting location is what the record keeps.
    #[instrument(
        skip(self, cmd),
        fields(item_id = %cmd.item_id, location_id = %cmd.location_id),
        err
    )]
    pub fn dispose(&self, cmd: DisposeItem) -> DomainResult<Item> {
        let item = self.in_stock(cmd.item_id)?;
        if !item.is_at(cmd.location_id) {
            tracing::warn!(
                recorded_at = ?item.location_id,
                "disposing item away from its recorded location"
            );
        }

        let item = self
            .ledger
            .transition(item.id, ItemState::InStock, ItemState::Disposed, None)?;
        self.records.append_disposal(DisposalRecord {
            item_id: item.id,
            location_id: cmd.location_id,
            actor_id: cmd.actor_id,
            reason: cmd.reason.clone(),
            occurred_at: Utc::now(),
        })?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::ItemDisposed, Some(cmd.actor_id))
                .at_location(cmd.location_id)
                .for_item(item.id)
                .details(json!({
                    "product_id": item.product_id,
                    "reason": cmd.reason,
                    "item_location_id": item.location_id,
                })),
        );

        tracing::info!("item disposed");
        Ok(item)
    }

    fn in_stock(&self, item_id: ItemId) -> DomainResult<Item> {
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
        Ok(item)
    }
}
