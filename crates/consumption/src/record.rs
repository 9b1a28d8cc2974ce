use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktrace_core::{DomainError, DomainResult, ItemId, LocationId, UserId};

/// An item used up at a store. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// An item written off (loss, damage, expiry). Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisposalRecord {
    pub item_id: ItemId,
    /// Where the disposal was reported, which may differ from the item's
    /// last known location.
    pub location_id: LocationId,
    pub actor_id: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

pub trait RecordStore: Send + Sync {
    fn append_consumption(&self, record: ConsumptionRecord) -> DomainResult<()>;
    fn append_disposal(&self, record: DisposalRecord) -> DomainResult<()>;
}

impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    fn append_consumption(&self, record: ConsumptionRecord) -> DomainResult<()> {
        (**self).append_consumption(record)
    }

    fn append_disposal(&self, record: DisposalRecord) -> DomainResult<()> {
        (**self).append_disposal(record)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    consumptions: Mutex<Vec<ConsumptionRecord>>,
    disposals: Mutex<Vec<DisposalRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consumptions(&self) -> Vec<ConsumptionRecord> {
        self.consumptions
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn disposals(&self) -> Vec<DisposalRecord> {
        self.disposals.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn append_consumption(&self, record: ConsumptionRecord) -> DomainResult<()> {
        self.consumptions
            .lock()
            .map_err(|_| DomainError::storage("lock poisoned"))?
            .push(record);
        Ok(())
    }

    fn append_disposal(&self, record: DisposalRecord) -> DomainResult<()> {
        self.disposals
            .lock()
            .map_err(|_| DomainError::storage("lock poisoned"))?
            .push(record);
        Ok(())
    }
}
