//! Append-only audit sink abstraction.
//!
//! The core writes to the trail and never reads it back; tracing readers
//! ("rastreio", reports) are external collaborators.
//!
//! ## Failure policy
//!
//! A failed audit write must not roll back the business mutation it
//! describes. Engines therefore go through [`record_best_effort`], which logs
//! the failure and carries on. This can leave gaps in the trail; the warning
//! is the only signal.

use std::sync::Arc;

use thiserror::Error;

use crate::event::AuditEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// The sink is unusable (e.g. lock poisoning).
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the write.
    #[error("audit write failed: {0}")]
    Write(String),
}

/// Append-only write target for audit events.
///
/// Implementations must be safe for unordered concurrent appends; no ordering
/// is promised beyond each event's `occurred_at`.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        (**self).record(event)
    }
}

/// Record an audit event, logging instead of failing.
///
/// Returns `true` if the event was written.
pub fn record_best_effort(sink: &dyn AuditSink, event: AuditEvent) -> bool {
    let action = event.action;
    let event_id = event.id;
    match sink.record(event) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%action, %event_id, error = %err, "audit write failed; continuing");
            false
        }
    }
}
