//! Transfer state machine and trip aggregation.
//!
//! A transfer moves a manifest of items between two locations:
//! `AWAITING_ACCEPT -> ACCEPTED -> IN_TRANSIT -> DELIVERED | DIVERGENCE`.
//! A trip groups transfers for one driver; starting it dispatches every
//! accepted child transfer.
//!
//! Item state only changes through the ledger's guarded transition. Status
//! changes of transfers, trips and divergences are compare-and-set operations
//! on their stores, so concurrent callers get exactly one winner.

pub mod aggregator;
pub mod divergence;
pub mod engine;
pub mod in_memory;
pub mod store;
pub mod transfer;
pub mod trip;

pub use aggregator::{TripAggregator, TripStart};
pub use divergence::{Divergence, DivergenceKind, Reconciliation, reconcile};
pub use engine::{DispatchOutcome, ReceiptOutcome, ReceiveTransfer, TransferEngine, TransferView};
pub use in_memory::{InMemoryDivergenceStore, InMemoryTransferStore, InMemoryTripStore};
pub use store::{DivergenceStore, Resolution, TransferStore, TripStore};
pub use transfer::{
    CreateTransfer, Transfer, TransferFilter, TransferKind, TransferLineItem, TransferStatus,
};
pub use trip::{Trip, TripStatus};
