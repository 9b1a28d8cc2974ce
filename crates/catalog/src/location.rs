use serde::{Deserialize, Serialize};

use stocktrace_core::{Entity, LocationId};

/// Location class; decides which operations a location permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationKind {
    /// Receives purchases and production, ships to stores.
    Warehouse,
    /// Consumes stock; may lend to other stores.
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub kind: LocationKind,
    pub active: bool,
}

impl Location {
    pub fn warehouse(name: impl Into<String>) -> Self {
        Self::new(name, LocationKind::Warehouse)
    }

    pub fn store(name: impl Into<String>) -> Self {
        Self::new(name, LocationKind::Store)
    }

    fn new(name: impl Into<String>, kind: LocationKind) -> Self {
        Self {
            id: LocationId::new(),
            name: name.into(),
            kind,
            active: true,
        }
    }

    pub fn is_warehouse(&self) -> bool {
        self.kind == LocationKind::Warehouse
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> &LocationId {
        &self.id
    }
}
