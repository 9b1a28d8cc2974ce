//! Terminal item transitions: consumption ("baixa") and disposal.

pub mod engine;
pub mod record;

pub use engine::{ConsumeItem, ConsumptionEngine, DisposeItem};
pub use record::{ConsumptionRecord, DisposalRecord, InMemoryRecordStore, RecordStore};
