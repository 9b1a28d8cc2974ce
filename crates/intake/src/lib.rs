//! Intake: turns a purchase batch or a production run into individually
//! tracked items.
//!
//! Each call validates before touching anything, issues N items through the
//! ledger after its parent record, and writes one audit event.

pub mod engine;
pub mod record;
pub mod store;

pub use engine::{IntakeEngine, MAX_INTAKE_QUANTITY, ProductionIntake, PurchaseIntake};
pub use record::{ProductionRun, PurchaseBatch, ReceivePurchase, RecordProduction};
pub use store::{InMemoryIntakeStore, IntakeStore};
