//! In-memory keyed table for tests/dev.
//!
//! Every row-level mutation happens under the write lock, so a guard checked
//! inside [`InMemoryTable::update`] and the write it protects are one atomic
//! step. Store adapters build their compare-and-set operations on top of it.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};

/// RwLock-guarded map from entity id to entity.
#[derive(Debug)]
pub struct InMemoryTable<E: Entity> {
    rows: RwLock<HashMap<E::Id, E>>,
}

impl<E: Entity> Default for InMemoryTable<E> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<E> InMemoryTable<E>
where
    E: Entity + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one row; fails with `Conflict` if the id is already present.
    pub fn insert(&self, row: E) -> DomainResult<()> {
        self.insert_many(vec![row])
    }

    /// Insert a batch of rows atomically (all or nothing).
    pub fn insert_many(&self, rows: Vec<E>) -> DomainResult<()> {
        let mut map = self.write()?;
        for (idx, row) in rows.iter().enumerate() {
            if map.contains_key(row.id()) {
                return Err(DomainError::conflict(format!(
                    "row {:?} already exists (index {idx})",
                    row.id()
                )));
            }
        }
        for row in rows {
            map.insert(row.id().clone(), row);
        }
        Ok(())
    }

    pub fn get(&self, id: &E::Id) -> DomainResult<Option<E>> {
        let map = self.read()?;
        Ok(map.get(id).cloned())
    }

    /// Rows matching `predicate`, in no particular order.
    pub fn filter(&self, predicate: impl Fn(&E) -> bool) -> DomainResult<Vec<E>> {
        let map = self.read()?;
        Ok(map.values().filter(|row| predicate(row)).cloned().collect())
    }

    /// Guarded update.
    ///
    /// `change` runs against a copy of the stored row while the write lock is
    /// held; the copy replaces the stored row only if `change` returns `Ok`.
    /// Returns `Ok(None)` when the id is unknown.
    pub fn update(
        &self,
        id: &E::Id,
        change: impl FnOnce(&mut E) -> DomainResult<()>,
    ) -> DomainResult<Option<E>> {
        let mut map = self.write()?;
        let Some(current) = map.get(id) else {
            return Ok(None);
        };

        let mut next = current.clone();
        if let Err(err) = change(&mut next) {
            tracing::debug!(id = ?id, error = %err, "guarded update rejected");
            return Err(err);
        }

        map.insert(id.clone(), next.clone());
        Ok(Some(next))
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> DomainResult<std::sync::RwLockReadGuard<'_, HashMap<E::Id, E>>> {
        self.rows
            .read()
            .map_err(|_| DomainError::storage("lock poisoned"))
    }

    fn write(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, HashMap<E::Id, E>>> {
        self.rows
            .write()
            .map_err(|_| DomainError::storage("lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Row {
        id: u32,
        value: &'static str,
    }

    impl Entity for Row {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }
    }

    #[test]
    fn insert_many_is_all_or_nothing() {
        let table = InMemoryTable::new();
        table.insert(Row { id: 1, value: "a" }).unwrap();

        let err = table
            .insert_many(vec![Row { id: 2, value: "b" }, Row { id: 1, value: "c" }])
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(table.len(), 1);
        assert!(table.get(&2).unwrap().is_none());
    }

    #[test]
    fn rejected_update_leaves_row_untouched() {
        let table = InMemoryTable::new();
        table.insert(Row { id: 7, value: "old" }).unwrap();

        let err = table
            .update(&7, |row| {
                row.value = "half-written";
                Err(DomainError::invalid_transition("nope"))
            })
            .unwrap_err();
        assert!(err.is_lost_race());
        assert_eq!(table.get(&7).unwrap().unwrap().value, "old");
    }

    #[test]
    fn update_of_unknown_id_is_none() {
        let table: InMemoryTable<Row> = InMemoryTable::new();
        assert!(table.update(&3, |_| Ok(())).unwrap().is_none());
    }
}
