use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use stocktrace_audit::{AuditAction, AuditEvent, AuditSink, record_best_effort};
use stocktrace_catalog::{
    LocationKind, LocationRegistry, ProductCatalog, require_location, require_product,
};
use stocktrace_core::{DomainError, DomainResult, ProductionRunId, PurchaseBatchId};
use stocktrace_ledger::{Item, ItemLedger, ItemSpec, TokenGenerator, create_items};

use crate::record::{ProductionRun, PurchaseBatch, ReceivePurchase, RecordProduction};
use crate::store::IntakeStore;

/// Largest number of units a single intake may issue.
pub const MAX_INTAKE_QUANTITY: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseIntake {
    pub batch: PurchaseBatch,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionIntake {
    pub run: ProductionRun,
    pub items: Vec<Item>,
}

pub struct IntakeEngine {
    catalog: Arc<dyn ProductCatalog>,
    locations: Arc<dyn LocationRegistry>,
    ledger: Arc<dyn ItemLedger>,
    store: Arc<dyn IntakeStore>,
    audit: Arc<dyn AuditSink>,
    tokens: TokenGenerator,
}

impl IntakeEngine {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        locations: Arc<dyn LocationRegistry>,
        ledger: Arc<dyn ItemLedger>,
        store: Arc<dyn IntakeStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            catalog,
            locations,
            ledger,
            store,
            audit,
            tokens: TokenGenerator::default(),
        }
    }

    pub fn with_tokens(mut self, tokens: TokenGenerator) -> Self {
        self.tokens = tokens;
        self
    }

    /// Receive `quantity` purchased units of a product at a warehouse.
    ///
    /// The batch record is written before its items, so no item ever
    /// references a batch that was not stored.
    #[instrument(
        skip(self, cmd),
        fields(
            product_id = %cmd.product_id,
            location_id = %cmd.location_id,
            quantity = cmd.quantity
        ),
        err
    )]
    pub fn receive_purchase(&self, cmd: ReceivePurchase) -> DomainResult<PurchaseIntake> {
        let count = positive_quantity(cmd.quantity)?;
        if cmd.unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }
        require_location(self.locations.as_ref(), cmd.location_id, LocationKind::Warehouse)?;
        let product = require_product(self.catalog.as_ref(), cmd.product_id)?;

        let batch = PurchaseBatch {
            id: PurchaseBatchId::new(),
            product_id: product.id,
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            supplier: cmd.supplier,
            supplier_lot: cmd.supplier_lot,
            location_id: cmd.location_id,
            created_by: cmd.actor_id,
            created_at: cmd.occurred_at,
        };

        let spec = ItemSpec::new(&product, cmd.location_id, cmd.occurred_at)
            .with_explicit_expiry(cmd.expires_at)
            .from_purchase(batch.id);
        self.store.insert_batch(batch.clone())?;
        let items = create_items(self.ledger.as_ref(), &self.tokens, &spec, count)?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::PurchaseReceived, cmd.actor_id)
                .at_location(cmd.location_id)
                .details(json!({
                    "batch_id": batch.id,
                    "product_id": product.id,
                    "product": product.name,
                    "quantity": batch.quantity,
                    "unit_cost": batch.unit_cost,
                    "supplier": batch.supplier,
                })),
        );

        tracing::info!(batch_id = %batch.id, items = items.len(), "purchase received");
        Ok(PurchaseIntake { batch, items })
    }

    /// Record `quantity` produced units of a product at a warehouse.
    #[instrument(
        skip(self, cmd),
        fields(
            product_id = %cmd.product_id,
            location_id = %cmd.location_id,
            quantity = cmd.quantity
        ),
        err
    )]
    pub fn record_production(&self, cmd: RecordProduction) -> DomainResult<ProductionIntake> {
        let count = positive_quantity(cmd.quantity)?;
        require_location(self.locations.as_ref(), cmd.location_id, LocationKind::Warehouse)?;
        let product = require_product(self.catalog.as_ref(), cmd.product_id)?;

        let run = ProductionRun {
            id: ProductionRunId::new(),
            product_id: product.id,
            quantity: cmd.quantity,
            location_id: cmd.location_id,
            responsible: cmd.actor_id,
            notes: cmd.notes,
            produced_at: cmd.occurred_at,
        };

        let spec = ItemSpec::new(&product, cmd.location_id, cmd.occurred_at)
            .with_explicit_expiry(cmd.expires_at)
            .from_production(run.id);
        self.store.insert_run(run.clone())?;
        let items = create_items(self.ledger.as_ref(), &self.tokens, &spec, count)?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::ProductionRecorded, Some(cmd.actor_id))
                .at_location(cmd.location_id)
                .details(json!({
                    "run_id": run.id,
                    "product_id": product.id,
                    "product": product.name,
                    "quantity": run.quantity,
                })),
        );

        tracing::info!(run_id = %run.id, items = items.len(), "production recorded");
        Ok(ProductionIntake { run, items })
    }
}

fn positive_quantity(quantity: i64) -> DomainResult<usize> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    if quantity > MAX_INTAKE_QUANTITY {
        return Err(DomainError::validation(format!(
            "quantity {quantity} exceeds the intake limit of {MAX_INTAKE_QUANTITY}"
        )));
    }
    usize::try_from(quantity).map_err(|_| DomainError::validation("quantity is too large"))
}
