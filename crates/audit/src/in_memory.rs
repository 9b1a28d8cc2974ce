//! In-memory audit sink for tests/dev.

use std::sync::Mutex;

use stocktrace_core::ItemId;

use crate::action::AuditAction;
use crate::event::AuditEvent;
use crate::sink::{AuditError, AuditSink};

/// Append-only in-memory trail.
///
/// Also offers the read helpers tests need; production readers query the
/// persistent trail directly.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event, in append order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn with_action(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.filtered(|e| e.action == action)
    }

    /// Trail of one item (events that reference it directly).
    pub fn for_item(&self, item_id: ItemId) -> Vec<AuditEvent> {
        self.filtered(|e| e.item_id == Some(item_id))
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn filtered(&self, predicate: impl Fn(&AuditEvent) -> bool) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.iter().filter(|e| predicate(e)).cloned().collect(),
            Err(_) => vec![],
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| AuditError::Unavailable("lock poisoned".to_string()))?;
        events.push(event);
        Ok(())
    }
}
