use std::sync::Arc;

use stocktrace_core::{DomainResult, InMemoryTable, ProductionRunId, PurchaseBatchId};

use crate::record::{ProductionRun, PurchaseBatch};

/// Persistence for intake parent records. Records are written once.
pub trait IntakeStore: Send + Sync {
    fn insert_batch(&self, batch: PurchaseBatch) -> DomainResult<()>;
    fn insert_run(&self, run: ProductionRun) -> DomainResult<()>;
    fn batch(&self, id: PurchaseBatchId) -> DomainResult<Option<PurchaseBatch>>;
    fn run(&self, id: ProductionRunId) -> DomainResult<Option<ProductionRun>>;
}

impl<S> IntakeStore for Arc<S>
where
    S: IntakeStore + ?Sized,
{
    fn insert_batch(&self, batch: PurchaseBatch) -> DomainResult<()> {
        (**self).insert_batch(batch)
    }

    fn insert_run(&self, run: ProductionRun) -> DomainResult<()> {
        (**self).insert_run(run)
    }

    fn batch(&self, id: PurchaseBatchId) -> DomainResult<Option<PurchaseBatch>> {
        (**self).batch(id)
    }

    fn run(&self, id: ProductionRunId) -> DomainResult<Option<ProductionRun>> {
        (**self).run(id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryIntakeStore {
    batches: InMemoryTable<PurchaseBatch>,
    runs: InMemoryTable<ProductionRun>,
}

impl InMemoryIntakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }
}

impl IntakeStore for InMemoryIntakeStore {
    fn insert_batch(&self, batch: PurchaseBatch) -> DomainResult<()> {
        self.batches.insert(batch)
    }

    fn insert_run(&self, run: ProductionRun) -> DomainResult<()> {
        self.runs.insert(run)
    }

    fn batch(&self, id: PurchaseBatchId) -> DomainResult<Option<PurchaseBatch>> {
        self.batches.get(&id)
    }

    fn run(&self, id: ProductionRunId) -> DomainResult<Option<ProductionRun>> {
        self.runs.get(&id)
    }
}
