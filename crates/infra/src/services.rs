//! Service wiring.
//!
//! Engines are built over either all in-memory stores or, when persistence is
//! configured, one Postgres adapter per store.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use stocktrace_audit::{AuditSink, InMemoryAuditSink};
use stocktrace_catalog::{LocationRegistry, ProductCatalog};
use stocktrace_consumption::{ConsumptionEngine, InMemoryRecordStore, RecordStore};
use stocktrace_intake::{InMemoryIntakeStore, IntakeEngine, IntakeStore};
use stocktrace_ledger::{InMemoryItemLedger, ItemLedger, TokenGenerator};
use stocktrace_transfer::{
    DivergenceStore, InMemoryDivergenceStore, InMemoryTransferStore, InMemoryTripStore,
    TransferEngine, TransferStore, TripAggregator, TripStore,
};

use crate::config::InfraConfig;
use crate::postgres::{
    self, PgAuditSink, PgDivergenceStore, PgIntakeStore, PgItemLedger, PgRecordStore,
    PgTransferStore, PgTripStore,
};

/// Every store the engines write to.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn ItemLedger>,
    pub audit: Arc<dyn AuditSink>,
    pub intake: Arc<dyn IntakeStore>,
    pub transfers: Arc<dyn TransferStore>,
    pub divergences: Arc<dyn DivergenceStore>,
    pub trips: Arc<dyn TripStore>,
    pub records: Arc<dyn RecordStore>,
}

impl Stores {
    /// In-memory record stores around an explicit ledger and audit sink.
    pub fn in_memory(ledger: Arc<dyn ItemLedger>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            ledger,
            audit,
            intake: Arc::new(InMemoryIntakeStore::new()),
            transfers: Arc::new(InMemoryTransferStore::new()),
            divergences: Arc::new(InMemoryDivergenceStore::new()),
            trips: Arc::new(InMemoryTripStore::new()),
            records: Arc::new(InMemoryRecordStore::new()),
        }
    }

    pub fn postgres(pool: Arc<PgPool>) -> Self {
        Self {
            ledger: Arc::new(PgItemLedger::new(pool.clone())),
            audit: Arc::new(PgAuditSink::new(pool.clone())),
            intake: Arc::new(PgIntakeStore::new(pool.clone())),
            transfers: Arc::new(PgTransferStore::new(pool.clone())),
            divergences: Arc::new(PgDivergenceStore::new(pool.clone())),
            trips: Arc::new(PgTripStore::new(pool.clone())),
            records: Arc::new(PgRecordStore::new(pool)),
        }
    }
}

/// Fully wired engines sharing one ledger and one audit sink.
#[derive(Clone)]
pub struct Services {
    pub ledger: Arc<dyn ItemLedger>,
    pub audit: Arc<dyn AuditSink>,
    pub intake: Arc<IntakeEngine>,
    pub transfers: Arc<TransferEngine>,
    pub trips: Arc<TripAggregator>,
    pub consumption: Arc<ConsumptionEngine>,
}

impl Services {
    pub fn in_memory(
        products: Arc<dyn ProductCatalog>,
        locations: Arc<dyn LocationRegistry>,
        tokens: TokenGenerator,
    ) -> Self {
        Self::from_parts(
            Arc::new(InMemoryItemLedger::new()),
            Arc::new(InMemoryAuditSink::new()),
            products,
            locations,
            tokens,
        )
    }

    /// Every store backed by Postgres.
    pub fn persistent(
        pool: Arc<PgPool>,
        products: Arc<dyn ProductCatalog>,
        locations: Arc<dyn LocationRegistry>,
        tokens: TokenGenerator,
    ) -> Self {
        Self::from_stores(Stores::postgres(pool), products, locations, tokens)
    }

    /// Wire engines over an explicit ledger and audit sink, keeping the
    /// remaining records in memory.
    pub fn from_parts(
        ledger: Arc<dyn ItemLedger>,
        audit: Arc<dyn AuditSink>,
        products: Arc<dyn ProductCatalog>,
        locations: Arc<dyn LocationRegistry>,
        tokens: TokenGenerator,
    ) -> Self {
        Self::from_stores(Stores::in_memory(ledger, audit), products, locations, tokens)
    }

    pub fn from_stores(
        stores: Stores,
        products: Arc<dyn ProductCatalog>,
        locations: Arc<dyn LocationRegistry>,
        tokens: TokenGenerator,
    ) -> Self {
        let Stores {
            ledger,
            audit,
            intake,
            transfers,
            divergences,
            trips,
            records,
        } = stores;

        let intake = IntakeEngine::new(
            products,
            locations.clone(),
            ledger.clone(),
            intake,
            audit.clone(),
        )
        .with_tokens(tokens);

        let transfers = Arc::new(TransferEngine::new(
            locations,
            ledger.clone(),
            transfers,
            divergences,
            trips.clone(),
            audit.clone(),
        ));
        let trips = TripAggregator::new(trips, transfers.clone(), audit.clone());
        let consumption = ConsumptionEngine::new(ledger.clone(), records, audit.clone());

        Self {
            ledger,
            audit,
            intake: Arc::new(intake),
            transfers,
            trips: Arc::new(trips),
            consumption: Arc::new(consumption),
        }
    }
}

/// Initialize logging, read configuration from the environment and build
/// the services it asks for.
pub async fn bootstrap(
    products: Arc<dyn ProductCatalog>,
    locations: Arc<dyn LocationRegistry>,
) -> anyhow::Result<Services> {
    stocktrace_observability::init();

    let config = InfraConfig::from_env().context("reading configuration")?;
    build(&config, products, locations).await
}

/// Build services for an explicit configuration.
pub async fn build(
    config: &InfraConfig,
    products: Arc<dyn ProductCatalog>,
    locations: Arc<dyn LocationRegistry>,
) -> anyhow::Result<Services> {
    let tokens = TokenGenerator::new(config.scan_token_prefix.clone());

    let Some(database) = &config.database else {
        tracing::info!("using in-memory stores");
        return Ok(Services::in_memory(products, locations, tokens));
    };

    let pool = postgres::connect(database)
        .await
        .context("connecting to postgres")?;
    postgres::migrate(&pool)
        .await
        .context("applying database schema")?;
    tracing::info!(
        max_connections = database.max_connections,
        "using postgres stores"
    );
    Ok(Services::persistent(
        Arc::new(pool),
        products,
        locations,
        tokens,
    ))
}
