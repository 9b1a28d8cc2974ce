//! Postgres adapters.
//!
//! The domain traits are synchronous; these adapters expose async inherent
//! methods and bridge them onto the surrounding tokio runtime. The bridge
//! needs a multi-threaded runtime, since it parks the calling worker with
//! `block_in_place` while the query runs.

mod audit;
mod intake;
mod ledger;
mod records;
mod transfer;

use std::future::Future;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::runtime::{Handle, RuntimeFlavor};

use stocktrace_core::{DomainError, DomainResult};

use crate::config::DatabaseConfig;

pub use audit::PgAuditSink;
pub use intake::PgIntakeStore;
pub use ledger::PgItemLedger;
pub use records::PgRecordStore;
pub use transfer::{PgDivergenceStore, PgTransferStore, PgTripStore};

/// Schema files, applied in order. Each one is idempotent.
const MIGRATIONS: [(&str, &str); 2] = [
    (
        "0001_items_and_audit",
        include_str!("../../migrations/0001_items_and_audit.sql"),
    ),
    (
        "0002_transfers_trips_and_records",
        include_str!("../../migrations/0002_transfers_trips_and_records.sql"),
    ),
];

/// Open a pool sized per `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

/// Create every table that does not exist yet.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    for (name, sql) in MIGRATIONS {
        sqlx::raw_sql(sql).execute(pool).await?;
        tracing::debug!(migration = name, "schema applied");
    }
    tracing::info!(migrations = MIGRATIONS.len(), "database schema ready");
    Ok(())
}

/// Run `fut` to completion from synchronous code.
pub(crate) fn block_on<F: Future>(fut: F) -> DomainResult<F::Output> {
    let handle = Handle::try_current().map_err(|_| {
        DomainError::storage("postgres adapters require a tokio runtime context")
    })?;
    match handle.runtime_flavor() {
        RuntimeFlavor::CurrentThread => Err(DomainError::storage(
            "postgres adapters require a multi-threaded tokio runtime",
        )),
        _ => Ok(tokio::task::block_in_place(|| handle.block_on(fut))),
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => DomainError::Conflict(msg),
                _ => DomainError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            DomainError::storage(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            DomainError::storage(format!("connection pool timed out in {}", operation))
        }
        other => DomainError::storage(format!("{} failed: {}", operation, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_map_to_storage() {
        match map_sqlx_error("insert_items", sqlx::Error::PoolClosed) {
            DomainError::Storage(msg) => assert!(msg.contains("insert_items")),
            other => panic!("expected Storage, got {other:?}"),
        }
    }

    #[test]
    fn migrations_are_ordered_and_idempotent() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        for (name, sql) in MIGRATIONS {
            for statement in sql.split(';').map(str::trim).filter(|s| s.contains("CREATE")) {
                assert!(statement.contains("IF NOT EXISTS"), "{name}: {statement}");
            }
        }
    }

    #[test]
    fn block_on_without_runtime_is_a_storage_error() {
        let err = block_on(async { 1 }).unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)));
    }

    #[test]
    fn block_on_rejects_current_thread_runtime() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let _guard = rt.enter();
        assert!(matches!(block_on(async { 1 }), Err(DomainError::Storage(_))));
    }

    #[test]
    fn block_on_runs_inside_multi_thread_runtime() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let value = rt.block_on(async {
            tokio::spawn(async { block_on(async { 41 + 1 }) })
                .await
                .unwrap()
        });
        assert_eq!(value.unwrap(), 42);
    }
}
