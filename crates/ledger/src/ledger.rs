//! The item ledger contract and item issuance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktrace_catalog::Product;
use stocktrace_core::{
    DomainError, DomainResult, ItemId, LocationId, ProductId, ProductionRunId, PurchaseBatchId,
};

use crate::item::{Item, ItemState};
use crate::token::TokenGenerator;

/// Attempts at issuing a batch before a token collision is surfaced.
pub const MAX_TOKEN_ATTEMPTS: usize = 5;

/// Largest batch [`create_items`] will build in one call.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Authoritative store of item state.
///
/// `transition` is the single choke point for state changes. Implementations
/// must perform it as one atomic compare-and-set keyed on id and expected
/// state, never as a read followed by a separate write.
pub trait ItemLedger: Send + Sync {
    /// Insert a batch atomically. A duplicate id, scan token or short token
    /// fails the whole batch with `Conflict`.
    fn insert_items(&self, items: Vec<Item>) -> DomainResult<()>;

    fn get(&self, id: ItemId) -> DomainResult<Option<Item>>;

    /// Exact match on the long scan token.
    fn find_by_token(&self, token: &str) -> DomainResult<Option<Item>>;

    /// Exact match on the short manual-entry code.
    fn find_by_short_token(&self, code: &str) -> DomainResult<Option<Item>>;

    /// Guarded transition: `expected -> next`, moving to `location_id` if given.
    ///
    /// Unknown items fail with `ItemNotAvailable`; a stored state other than
    /// `expected` fails with `InvalidStateTransition`.
    fn transition(
        &self,
        id: ItemId,
        expected: ItemState,
        next: ItemState,
        location_id: Option<LocationId>,
    ) -> DomainResult<Item>;

    /// Like [`ItemLedger::transition`], but the compare-and-set also requires
    /// the item to be recorded at `at`. A different location fails with
    /// `LocationMismatch` and leaves the item untouched.
    fn transition_at(
        &self,
        id: ItemId,
        at: LocationId,
        expected: ItemState,
        next: ItemState,
    ) -> DomainResult<Item>;

    /// Items matching `filter`, newest first.
    fn list(&self, filter: &ItemFilter) -> DomainResult<Vec<Item>>;
}

impl<S> ItemLedger for Arc<S>
where
    S: ItemLedger + ?Sized,
{
    fn insert_items(&self, items: Vec<Item>) -> DomainResult<()> {
        (**self).insert_items(items)
    }

    fn get(&self, id: ItemId) -> DomainResult<Option<Item>> {
        (**self).get(id)
    }

    fn find_by_token(&self, token: &str) -> DomainResult<Option<Item>> {
        (**self).find_by_token(token)
    }

    fn find_by_short_token(&self, code: &str) -> DomainResult<Option<Item>> {
        (**self).find_by_short_token(code)
    }

    fn transition(
        &self,
        id: ItemId,
        expected: ItemState,
        next: ItemState,
        location_id: Option<LocationId>,
    ) -> DomainResult<Item> {
        (**self).transition(id, expected, next, location_id)
    }

    fn transition_at(
        &self,
        id: ItemId,
        at: LocationId,
        expected: ItemState,
        next: ItemState,
    ) -> DomainResult<Item> {
        (**self).transition_at(id, at, expected, next)
    }

    fn list(&self, filter: &ItemFilter) -> DomainResult<Vec<Item>> {
        (**self).list(filter)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    pub location_id: Option<LocationId>,
    pub state: Option<ItemState>,
    pub product_id: Option<ProductId>,
}

impl ItemFilter {
    pub fn at(location_id: LocationId) -> Self {
        Self {
            location_id: Some(location_id),
            ..Self::default()
        }
    }

    pub fn in_state(mut self, state: ItemState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn of_product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.location_id.is_none_or(|loc| item.location_id == Some(loc))
            && self.state.is_none_or(|state| item.state == state)
            && self.product_id.is_none_or(|product| item.product_id == product)
    }
}

/// Shared attributes of a batch of newly issued items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSpec {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub purchase_batch_id: Option<PurchaseBatchId>,
    pub production_run_id: Option<ProductionRunId>,
    pub expires_at: Option<DateTime<Utc>>,
    pub produced_at: DateTime<Utc>,
}

impl ItemSpec {
    /// Items of `product` at `location_id`, expiring per the product policy.
    pub fn new(product: &Product, location_id: LocationId, now: DateTime<Utc>) -> Self {
        Self {
            product_id: product.id,
            location_id,
            purchase_batch_id: None,
            production_run_id: None,
            expires_at: product.expiry.expires_at(now),
            produced_at: now,
        }
    }

    /// Override the policy-derived expiry when one is given.
    pub fn with_explicit_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        if expires_at.is_some() {
            self.expires_at = expires_at;
        }
        self
    }

    pub fn from_purchase(mut self, batch_id: PurchaseBatchId) -> Self {
        self.purchase_batch_id = Some(batch_id);
        self
    }

    pub fn from_production(mut self, run_id: ProductionRunId) -> Self {
        self.production_run_id = Some(run_id);
        self
    }

    fn build(&self, tokens: &TokenGenerator, created_at: DateTime<Utc>) -> Item {
        Item {
            id: ItemId::new(),
            scan_token: tokens.scan_token(),
            short_token: Some(tokens.short_token()),
            product_id: self.product_id,
            purchase_batch_id: self.purchase_batch_id,
            production_run_id: self.production_run_id,
            location_id: Some(self.location_id),
            state: ItemState::InStock,
            expires_at: self.expires_at,
            produced_at: self.produced_at,
            created_at,
        }
    }
}

/// Issue `count` new `IN_STOCK` items described by `spec`.
///
/// The batch is inserted atomically. On a token collision the whole batch is
/// regenerated, up to [`MAX_TOKEN_ATTEMPTS`] times.
pub fn create_items(
    ledger: &dyn ItemLedger,
    tokens: &TokenGenerator,
    spec: &ItemSpec,
    count: usize,
) -> DomainResult<Vec<Item>> {
    if count == 0 {
        return Err(DomainError::validation("item count must be positive"));
    }
    if count > MAX_BATCH_SIZE {
        return Err(DomainError::validation(format!(
            "cannot issue {count} items at once (limit {MAX_BATCH_SIZE})"
        )));
    }

    let mut last_conflict = None;
    for attempt in 1..=MAX_TOKEN_ATTEMPTS {
        let created_at = Utc::now();
        let items: Vec<Item> = (0..count).map(|_| spec.build(tokens, created_at)).collect();

        match ledger.insert_items(items.clone()) {
            Ok(()) => return Ok(items),
            Err(DomainError::Conflict(msg)) => {
                tracing::debug!(
                    attempt,
                    count,
                    conflict = %msg,
                    "token collision; regenerating batch"
                );
                last_conflict = Some(msg);
            }
            Err(other) => return Err(other),
        }
    }

    tracing::warn!(count, attempts = MAX_TOKEN_ATTEMPTS, "giving up issuing items");
    Err(DomainError::conflict(last_conflict.unwrap_or_else(|| {
        "could not issue unique tokens".to_string()
    })))
}
