use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktrace_core::{DomainError, DomainResult, Entity, TripId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Pending,
    Accepted,
    InTransit,
    Completed,
}

impl TripStatus {
    pub const ALL: [TripStatus; 4] = [
        TripStatus::Pending,
        TripStatus::Accepted,
        TripStatus::InTransit,
        TripStatus::Completed,
    ];

    /// `PENDING -> ACCEPTED -> IN_TRANSIT`, and completion from any open status.
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        use TripStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Accepted, InTransit)
                | (Pending | Accepted | InTransit, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Pending => "PENDING",
            TripStatus::Accepted => "ACCEPTED",
            TripStatus::InTransit => "IN_TRANSIT",
            TripStatus::Completed => "COMPLETED",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == tag)
    }
}

impl core::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A driver run grouping one or more transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub driver_id: Option<UserId>,
    pub status: TripStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Trip {
    pub fn new(created_by: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: TripId::new(),
            driver_id: None,
            status: TripStatus::Pending,
            created_by,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Trips still accepting new transfers.
    pub fn is_open_for_transfers(&self) -> bool {
        matches!(self.status, TripStatus::Pending | TripStatus::Accepted)
    }

    pub fn apply_status(
        &mut self,
        expected: TripStatus,
        next: TripStatus,
        driver_id: Option<UserId>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !expected.can_transition_to(next) {
            return Err(DomainError::invalid_transition(format!(
                "{expected} -> {next} is not a legal trip transition"
            )));
        }
        if self.status != expected {
            return Err(DomainError::invalid_transition(format!(
                "trip {} is {}, expected {expected}",
                self.id, self.status
            )));
        }

        self.status = next;
        match next {
            TripStatus::Accepted => self.driver_id = driver_id.or(self.driver_id),
            TripStatus::InTransit => self.started_at = Some(at),
            TripStatus::Completed => self.completed_at = Some(at),
            TripStatus::Pending => {}
        }
        Ok(())
    }
}

impl Entity for Trip {
    type Id = TripId;

    fn id(&self) -> &TripId {
        &self.id
    }
}
