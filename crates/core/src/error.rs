//! Domain error model.

use thiserror::Error;

use crate::id::{ItemId, LocationId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every mutating operation either succeeds or fails with exactly one of these.
/// Read-only lookups report absence as `Ok(None)`, never as an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, rejected before anything is mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The item is absent or not in the state the operation requires.
    #[error("item {item_id} not available: {reason}")]
    ItemNotAvailable { item_id: ItemId, reason: String },

    /// The item exists but is recorded at a different location.
    #[error("item {item_id} is at {actual:?}, not at {expected}")]
    LocationMismatch {
        item_id: ItemId,
        expected: LocationId,
        actual: Option<LocationId>,
    },

    /// A guarded compare-and-set found a different current state.
    ///
    /// Callers must treat this as "someone else already moved it" and must not
    /// blindly retry the same transition.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A record targeted by a mutating operation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated (e.g. a token collision).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn item_not_available(item_id: ItemId, reason: impl Into<String>) -> Self {
        Self::ItemNotAvailable {
            item_id,
            reason: reason.into(),
        }
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// True for the canonical concurrency-conflict signal.
    pub fn is_lost_race(&self) -> bool {
        matches!(self, Self::InvalidStateTransition(_))
    }
}
