use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use stocktrace_audit::{AuditAction, AuditEvent, AuditSink, record_best_effort};
use stocktrace_core::{DomainError, DomainResult, TransferId, TripId, UserId};

use crate::engine::{DispatchOutcome, TransferEngine};
use crate::store::TripStore;
use crate::transfer::{Transfer, TransferFilter, TransferStatus};
use crate::trip::{Trip, TripStatus};

/// Result of starting a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripStart {
    pub trip: Trip,
    pub dispatched: Vec<DispatchOutcome>,
    /// Child transfers that could not be dispatched (moved on concurrently).
    pub skipped: Vec<TransferId>,
}

/// Groups transfers under one driver run.
pub struct TripAggregator {
    trips: Arc<dyn TripStore>,
    transfers: Arc<TransferEngine>,
    audit: Arc<dyn AuditSink>,
}

impl TripAggregator {
    pub fn new(
        trips: Arc<dyn TripStore>,
        transfers: Arc<TransferEngine>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            trips,
            transfers,
            audit,
        }
    }

    #[instrument(skip(self), err)]
    pub fn create_trip(&self, actor_id: UserId) -> DomainResult<Trip> {
        let trip = Trip::new(actor_id, Utc::now());
        self.trips.insert(trip.clone())?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::TripCreated, Some(actor_id))
                .details(json!({ "trip_id": trip.id })),
        );
        tracing::info!(trip_id = %trip.id, "trip created");
        Ok(trip)
    }

    /// `PENDING -> ACCEPTED`, assigning the driver.
    #[instrument(skip(self), fields(trip_id = %trip_id), err)]
    pub fn accept_trip(&self, trip_id: TripId, driver_id: UserId) -> DomainResult<Trip> {
        let trip = self.trips.transition(
            trip_id,
            TripStatus::Pending,
            TripStatus::Accepted,
            Some(driver_id),
            Utc::now(),
        )?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::TripAccepted, Some(driver_id))
                .details(json!({ "trip_id": trip.id })),
        );
        tracing::info!("trip accepted");
        Ok(trip)
    }

    /// `ACCEPTED -> IN_TRANSIT`, dispatching every child transfer in `ACCEPTED`.
    ///
    /// The trip's own status is claimed first; children already past
    /// `ACCEPTED` are left alone, and a child that moves on concurrently is
    /// skipped. A trip without eligible children still starts.
    #[instrument(skip(self), fields(trip_id = %trip_id), err)]
    pub fn start_trip(&self, trip_id: TripId, actor_id: UserId) -> DomainResult<TripStart> {
        let trip = self.trips.transition(
            trip_id,
            TripStatus::Accepted,
            TripStatus::InTransit,
            None,
            Utc::now(),
        )?;

        let eligible = self
            .transfers
            .list_transfers(&TransferFilter::on_trip(trip_id).in_status(TransferStatus::Accepted))?;

        let mut dispatched = Vec::with_capacity(eligible.len());
        let mut skipped = Vec::new();
        for transfer in eligible {
            match self.transfers.dispatch(transfer.id, actor_id) {
                Ok(outcome) => dispatched.push(outcome),
                Err(err) => {
                    tracing::warn!(
                        transfer_id = %transfer.id,
                        error = %err,
                        "child transfer not dispatched"
                    );
                    skipped.push(transfer.id);
                }
            }
        }

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::TripStarted, Some(actor_id)).details(json!({
                "trip_id": trip.id,
                "dispatched": dispatched.iter().map(|d| d.transfer.id).collect::<Vec<_>>(),
                "skipped": skipped,
            })),
        );
        tracing::info!(dispatched = dispatched.len(), skipped = skipped.len(), "trip started");
        Ok(TripStart {
            trip,
            dispatched,
            skipped,
        })
    }

    /// Close a trip from any open status.
    ///
    /// Child transfers are not required to be settled; unsettled ones are
    /// logged. Completing a completed trip returns it unchanged.
    #[instrument(skip(self), fields(trip_id = %trip_id), err)]
    pub fn complete_trip(&self, trip_id: TripId, actor_id: UserId) -> DomainResult<Trip> {
        // Statuses only move forward, so this settles within a few rounds.
        let trip = loop {
            let current = self
                .trips
                .get(trip_id)?
                .ok_or_else(|| DomainError::not_found(format!("trip {trip_id}")))?;
            if current.status == TripStatus::Completed {
                tracing::debug!("trip already completed");
                return Ok(current);
            }
            match self.trips.transition(
                trip_id,
                current.status,
                TripStatus::Completed,
                None,
                Utc::now(),
            ) {
                Ok(trip) => break trip,
                Err(err) if err.is_lost_race() => continue,
                Err(err) => return Err(err),
            }
        };

        let unsettled: Vec<TransferId> = self
            .transfers_of(trip_id)?
            .into_iter()
            .filter(|t| !t.status.is_settled())
            .map(|t| t.id)
            .collect();
        if !unsettled.is_empty() {
            tracing::warn!(?unsettled, "trip completed with unsettled transfers");
        }

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::TripCompleted, Some(actor_id)).details(json!({
                "trip_id": trip.id,
                "unsettled_transfers": unsettled,
            })),
        );
        tracing::info!("trip completed");
        Ok(trip)
    }

    pub fn get(&self, trip_id: TripId) -> DomainResult<Option<Trip>> {
        self.trips.get(trip_id)
    }

    pub fn list_trips(&self, status: Option<TripStatus>) -> DomainResult<Vec<Trip>> {
        self.trips.list(status)
    }

    pub fn transfers_of(&self, trip_id: TripId) -> DomainResult<Vec<Transfer>> {
        self.transfers.list_transfers(&TransferFilter::on_trip(trip_id))
    }
}
