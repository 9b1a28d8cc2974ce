use serde::{Deserialize, Serialize};

/// What a mutating operation did.
///
/// Closed set; the stable string form (see [`AuditAction::tag`]) is what
/// external trail readers filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "intake.purchase_received")]
    PurchaseReceived,
    #[serde(rename = "intake.production_recorded")]
    ProductionRecorded,
    #[serde(rename = "transfer.created")]
    TransferCreated,
    #[serde(rename = "transfer.accepted")]
    TransferAccepted,
    #[serde(rename = "transfer.dispatched")]
    TransferDispatched,
    #[serde(rename = "transfer.received")]
    TransferReceived,
    #[serde(rename = "divergence.resolved")]
    DivergenceResolved,
    #[serde(rename = "trip.created")]
    TripCreated,
    #[serde(rename = "trip.accepted")]
    TripAccepted,
    #[serde(rename = "trip.started")]
    TripStarted,
    #[serde(rename = "trip.completed")]
    TripCompleted,
    #[serde(rename = "item.consumed")]
    ItemConsumed,
    #[serde(rename = "item.disposed")]
    ItemDisposed,
}

impl AuditAction {
    /// Stable action tag (e.g. "transfer.received").
    pub fn tag(&self) -> &'static str {
        match self {
            AuditAction::PurchaseReceived => "intake.purchase_received",
            AuditAction::ProductionRecorded => "intake.production_recorded",
            AuditAction::TransferCreated => "transfer.created",
            AuditAction::TransferAccepted => "transfer.accepted",
            AuditAction::TransferDispatched => "transfer.dispatched",
            AuditAction::TransferReceived => "transfer.received",
            AuditAction::DivergenceResolved => "divergence.resolved",
            AuditAction::TripCreated => "trip.created",
            AuditAction::TripAccepted => "trip.accepted",
            AuditAction::TripStarted => "trip.started",
            AuditAction::TripCompleted => "trip.completed",
            AuditAction::ItemConsumed => "item.consumed",
            AuditAction::ItemDisposed => "item.disposed",
        }
    }

    /// Inverse of [`AuditAction::tag`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        ALL.iter().copied().find(|a| a.tag() == tag)
    }
}

const ALL: [AuditAction; 13] = [
    AuditAction::PurchaseReceived,
    AuditAction::ProductionRecorded,
    AuditAction::TransferCreated,
    AuditAction::TransferAccepted,
    AuditAction::TransferDispatched,
    AuditAction::TransferReceived,
    AuditAction::DivergenceResolved,
    AuditAction::TripCreated,
    AuditAction::TripAccepted,
    AuditAction::TripStarted,
    AuditAction::TripCompleted,
    AuditAction::ItemConsumed,
    AuditAction::ItemDisposed,
];

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_form_matches_tag() {
        for action in ALL {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, serde_json::Value::String(action.tag().to_string()));
            assert_eq!(AuditAction::from_tag(action.tag()), Some(action));
        }
    }

    #[test]
    fn unknown_tag_is_none() {
        assert_eq!(AuditAction::from_tag("inventory.item.created"), None);
    }
}
