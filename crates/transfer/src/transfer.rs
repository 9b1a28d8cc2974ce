use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktrace_catalog::LocationKind;
use stocktrace_core::{DomainError, DomainResult, ItemId, LocationId, TransferId, TripId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    WarehouseToStore,
    StoreToStore,
}

impl TransferKind {
    pub const ALL: [TransferKind; 2] = [TransferKind::WarehouseToStore, TransferKind::StoreToStore];

    /// Required (origin, destination) location kinds.
    pub fn endpoints(self) -> (LocationKind, LocationKind) {
        match self {
            TransferKind::WarehouseToStore => (LocationKind::Warehouse, LocationKind::Store),
            TransferKind::StoreToStore => (LocationKind::Store, LocationKind::Store),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferKind::WarehouseToStore => "warehouse_to_store",
            TransferKind::StoreToStore => "store_to_store",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    AwaitingAccept,
    Accepted,
    InTransit,
    Delivered,
    /// Cleared only by resolving the underlying divergence records; the
    /// transfer itself never returns to `Delivered`.
    Divergence,
}

impl TransferStatus {
    pub const ALL: [TransferStatus; 5] = [
        TransferStatus::AwaitingAccept,
        TransferStatus::Accepted,
        TransferStatus::InTransit,
        TransferStatus::Delivered,
        TransferStatus::Divergence,
    ];

    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (AwaitingAccept, Accepted)
                | (Accepted, InTransit)
                | (InTransit, Delivered)
                | (InTransit, Divergence)
        )
    }

    /// Receipt has happened (with or without divergences).
    pub fn is_settled(self) -> bool {
        matches!(self, TransferStatus::Delivered | TransferStatus::Divergence)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::AwaitingAccept => "AWAITING_ACCEPT",
            TransferStatus::Accepted => "ACCEPTED",
            TransferStatus::InTransit => "IN_TRANSIT",
            TransferStatus::Delivered => "DELIVERED",
            TransferStatus::Divergence => "DIVERGENCE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == tag)
    }
}

impl core::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub kind: TransferKind,
    pub origin_id: LocationId,
    pub destination_id: LocationId,
    pub trip_id: Option<TripId>,
    pub status: TransferStatus,
    pub created_by: UserId,
    pub accepted_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Guarded status change, stamping who/when on the way.
    pub fn apply_status(
        &mut self,
        expected: TransferStatus,
        next: TransferStatus,
        actor_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !expected.can_transition_to(next) {
            return Err(DomainError::invalid_transition(format!(
                "{expected} -> {next} is not a legal transfer transition"
            )));
        }
        if self.status != expected {
            return Err(DomainError::invalid_transition(format!(
                "transfer {} is {}, expected {expected}",
                self.id, self.status
            )));
        }

        self.status = next;
        match next {
            TransferStatus::Accepted => self.accepted_by = Some(actor_id),
            TransferStatus::InTransit => self.dispatched_at = Some(at),
            TransferStatus::Delivered | TransferStatus::Divergence => self.received_at = Some(at),
            TransferStatus::AwaitingAccept => {}
        }
        Ok(())
    }

    /// Undo a receipt claimed as `claimed` whose records could not be
    /// written, putting the transfer back `IN_TRANSIT`.
    pub fn reopen_receipt(&mut self, claimed: TransferStatus) -> DomainResult<()> {
        if !claimed.is_settled() {
            return Err(DomainError::invalid_transition(format!(
                "{claimed} is not a receipt status"
            )));
        }
        if self.status != claimed {
            return Err(DomainError::invalid_transition(format!(
                "transfer {} is {}, expected {claimed}",
                self.id, self.status
            )));
        }
        self.status = TransferStatus::InTransit;
        self.received_at = None;
        Ok(())
    }
}

/// One manifest line: an item expected to arrive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLineItem {
    pub transfer_id: TransferId,
    pub item_id: ItemId,
    pub received: bool,
}

/// Command: CreateTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub kind: TransferKind,
    pub origin_id: LocationId,
    pub destination_id: LocationId,
    pub trip_id: Option<TripId>,
    pub item_ids: Vec<ItemId>,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl CreateTransfer {
    pub fn new(
        kind: TransferKind,
        origin_id: LocationId,
        destination_id: LocationId,
        item_ids: Vec<ItemId>,
        actor_id: UserId,
    ) -> Self {
        Self {
            kind,
            origin_id,
            destination_id,
            trip_id: None,
            item_ids,
            actor_id,
            occurred_at: Utc::now(),
        }
    }

    pub fn on_trip(mut self, trip_id: TripId) -> Self {
        self.trip_id = Some(trip_id);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFilter {
    pub status: Option<TransferStatus>,
    pub origin_id: Option<LocationId>,
    pub destination_id: Option<LocationId>,
    pub trip_id: Option<TripId>,
}

impl TransferFilter {
    pub fn on_trip(trip_id: TripId) -> Self {
        Self {
            trip_id: Some(trip_id),
            ..Self::default()
        }
    }

    pub fn in_status(mut self, status: TransferStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, transfer: &Transfer) -> bool {
        self.status.is_none_or(|s| transfer.status == s)
            && self.origin_id.is_none_or(|o| transfer.origin_id == o)
            && self.destination_id.is_none_or(|d| transfer.destination_id == d)
            && self.trip_id.is_none_or(|t| transfer.trip_id == Some(t))
    }
}
