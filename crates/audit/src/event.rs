use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stocktrace_core::{AuditEventId, ItemId, LocationId, UserId};

use crate::action::AuditAction;

/// One entry of the audit trail.
///
/// Audit events are facts: they are appended once and never mutated. Every
/// reference is optional because different actions touch different entities
/// (a trip acceptance has no item, a consumption has no route).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub actor_id: Option<UserId>,
    pub location_id: Option<LocationId>,
    pub action: AuditAction,
    pub item_id: Option<ItemId>,
    pub origin_id: Option<LocationId>,
    pub destination_id: Option<LocationId>,
    /// Free-form structured detail (quantities, related record ids, ...).
    pub details: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, actor_id: Option<UserId>) -> Self {
        Self {
            id: AuditEventId::new(),
            actor_id,
            location_id: None,
            action,
            item_id: None,
            origin_id: None,
            destination_id: None,
            details: JsonValue::Null,
            occurred_at: Utc::now(),
        }
    }

    pub fn at_location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn for_item(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn route(mut self, origin_id: LocationId, destination_id: LocationId) -> Self {
        self.origin_id = Some(origin_id);
        self.destination_id = Some(destination_id);
        self
    }

    pub fn details(mut self, details: JsonValue) -> Self {
        self.details = details;
        self
    }

    pub fn tag(&self) -> &'static str {
        self.action.tag()
    }
}
