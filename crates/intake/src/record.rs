use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stocktrace_core::{Entity, LocationId, ProductId, ProductionRunId, PurchaseBatchId, UserId};

/// Parent record of a purchase intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseBatch {
    pub id: PurchaseBatchId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub supplier: Option<String>,
    pub supplier_lot: Option<String>,
    pub location_id: LocationId,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Entity for PurchaseBatch {
    type Id = PurchaseBatchId;

    fn id(&self) -> &PurchaseBatchId {
        &self.id
    }
}

/// Parent record of a production intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRun {
    pub id: ProductionRunId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub location_id: LocationId,
    /// The acting identity is recorded as the one responsible for the run.
    pub responsible: UserId,
    pub notes: Option<String>,
    pub produced_at: DateTime<Utc>,
}

impl Entity for ProductionRun {
    type Id = ProductionRunId;

    fn id(&self) -> &ProductionRunId {
        &self.id
    }
}

/// Command: ReceivePurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivePurchase {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub supplier: Option<String>,
    pub supplier_lot: Option<String>,
    pub location_id: LocationId,
    /// Overrides the product's expiry policy.
    pub expires_at: Option<DateTime<Utc>>,
    pub actor_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

impl ReceivePurchase {
    pub fn new(
        product_id: ProductId,
        quantity: i64,
        unit_cost: Decimal,
        location_id: LocationId,
        actor_id: Option<UserId>,
    ) -> Self {
        Self {
            product_id,
            quantity,
            unit_cost,
            supplier: None,
            supplier_lot: None,
            location_id,
            expires_at: None,
            actor_id,
            occurred_at: Utc::now(),
        }
    }
}

/// Command: RecordProduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordProduction {
    pub product_id: ProductId,
    pub quantity: i64,
    pub location_id: LocationId,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl RecordProduction {
    pub fn new(
        product_id: ProductId,
        quantity: i64,
        location_id: LocationId,
        actor_id: UserId,
    ) -> Self {
        Self {
            product_id,
            quantity,
            location_id,
            expires_at: None,
            notes: None,
            actor_id,
            occurred_at: Utc::now(),
        }
    }
}
