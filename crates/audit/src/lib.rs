//! Audit trail: append-only record of every mutating operation.

pub mod action;
pub mod event;
pub mod in_memory;
pub mod sink;

pub use action::AuditAction;
pub use event::AuditEvent;
pub use in_memory::InMemoryAuditSink;
pub use sink::{AuditError, AuditSink, record_best_effort};
