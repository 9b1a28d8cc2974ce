//! `stocktrace-core`: domain foundation building blocks.
//!
//! Identifiers, the error model and the keyed in-memory table shared by every
//! store adapter used in tests and development.

pub mod entity;
pub mod error;
pub mod id;
pub mod table;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    AuditEventId, DivergenceId, ItemId, LocationId, ProductId, ProductionRunId, PurchaseBatchId,
    TransferId, TripId, UserId,
};
pub use table::InMemoryTable;
