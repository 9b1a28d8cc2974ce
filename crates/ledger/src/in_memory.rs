use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use stocktrace_core::{DomainError, DomainResult, ItemId, LocationId};

use crate::item::{Item, ItemState, check_transition};
use crate::ledger::{ItemFilter, ItemLedger};

#[derive(Debug, Default)]
struct Rows {
    items: HashMap<ItemId, Item>,
    by_scan_token: HashMap<String, ItemId>,
    by_short_token: HashMap<String, ItemId>,
}

/// In-memory item ledger for tests/dev.
///
/// Items and both token indexes sit behind one lock, so uniqueness checks and
/// the guarded transition are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct InMemoryItemLedger {
    rows: RwLock<Rows>,
}

impl InMemoryItemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> DomainResult<RwLockReadGuard<'_, Rows>> {
        self.rows
            .read()
            .map_err(|_| DomainError::storage("lock poisoned"))
    }

    fn write(&self) -> DomainResult<RwLockWriteGuard<'_, Rows>> {
        self.rows
            .write()
            .map_err(|_| DomainError::storage("lock poisoned"))
    }
}

impl ItemLedger for InMemoryItemLedger {
    fn insert_items(&self, items: Vec<Item>) -> DomainResult<()> {
        let mut rows = self.write()?;

        let mut scan_seen = std::collections::HashSet::new();
        let mut short_seen = std::collections::HashSet::new();
        for item in &items {
            if rows.items.contains_key(&item.id) {
                return Err(DomainError::conflict(format!("item {} already exists", item.id)));
            }
            let scan = item.scan_token.as_str();
            if rows.by_scan_token.contains_key(scan) || !scan_seen.insert(scan) {
                return Err(DomainError::conflict(format!("scan token {scan} already issued")));
            }
            if let Some(short) = &item.short_token {
                let short = short.as_str();
                if rows.by_short_token.contains_key(short) || !short_seen.insert(short) {
                    return Err(DomainError::conflict(format!(
                        "short token {short} already issued"
                    )));
                }
            }
        }

        for item in items {
            rows.by_scan_token
                .insert(item.scan_token.as_str().to_string(), item.id);
            if let Some(short) = &item.short_token {
                rows.by_short_token.insert(short.as_str().to_string(), item.id);
            }
            rows.items.insert(item.id, item);
        }
        Ok(())
    }

    fn get(&self, id: ItemId) -> DomainResult<Option<Item>> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    fn find_by_token(&self, token: &str) -> DomainResult<Option<Item>> {
        let rows = self.read()?;
        Ok(rows
            .by_scan_token
            .get(token)
            .and_then(|id| rows.items.get(id))
            .cloned())
    }

    fn find_by_short_token(&self, code: &str) -> DomainResult<Option<Item>> {
        let rows = self.read()?;
        Ok(rows
            .by_short_token
            .get(code)
            .and_then(|id| rows.items.get(id))
            .cloned())
    }

    fn transition(
        &self,
        id: ItemId,
        expected: ItemState,
        next: ItemState,
        location_id: Option<LocationId>,
    ) -> DomainResult<Item> {
        let mut rows = self.write()?;
        let item = rows
            .items
            .get_mut(&id)
            .ok_or_else(|| DomainError::item_not_available(id, "unknown item"))?;

        if let Err(err) = item.apply_transition(expected, next, location_id) {
            tracing::debug!(
                item_id = %id,
                %expected,
                %next,
                actual = %item.state,
                "item compare-and-set missed"
            );
            return Err(err);
        }
        Ok(item.clone())
    }

    fn transition_at(
        &self,
        id: ItemId,
        at: LocationId,
        expected: ItemState,
        next: ItemState,
    ) -> DomainResult<Item> {
        let mut rows = self.write()?;
        let item = rows
            .items
            .get_mut(&id)
            .ok_or_else(|| DomainError::item_not_available(id, "unknown item"))?;

        check_transition(item, expected, next)?;
        if !item.is_at(at) {
            return Err(DomainError::LocationMismatch {
                item_id: id,
                expected: at,
                actual: item.location_id,
            });
        }
        item.apply_transition(expected, next, None)?;
        Ok(item.clone())
    }

    fn list(&self, filter: &ItemFilter) -> DomainResult<Vec<Item>> {
        let rows = self.read()?;
        let mut items: Vec<Item> = rows
            .items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::Utc;
    use stocktrace_core::ProductId;

    use super::*;
    use crate::token::{Token, TokenGenerator};

    fn test_item(location: LocationId) -> Item {
        let tokens = TokenGenerator::default();
        let now = Utc::now();
        Item {
            id: ItemId::new(),
            scan_token: tokens.scan_token(),
            short_token: Some(tokens.short_token()),
            product_id: ProductId::new(),
            purchase_batch_id: None,
            production_run_id: None,
            location_id: Some(location),
            state: ItemState::InStock,
            expires_at: None,
            produced_at: now,
            created_at: now,
        }
    }

    #[test]
    fn lookups_by_both_tokens() {
        let ledger = InMemoryItemLedger::new();
        let item = test_item(LocationId::new());
        ledger.insert_items(vec![item.clone()]).unwrap();

        let short = item.short_token.clone().unwrap();
        assert_eq!(ledger.find_by_token(item.scan_token.as_str()).unwrap(), Some(item.clone()));
        assert_eq!(ledger.find_by_short_token(short.as_str()).unwrap(), Some(item));
        assert_eq!(ledger.find_by_token("QR-NOPE-AAAAAA").unwrap(), None);
    }

    #[test]
    fn duplicate_short_token_rejects_whole_batch() {
        let ledger = InMemoryItemLedger::new();
        let first = test_item(LocationId::new());
        ledger.insert_items(vec![first.clone()]).unwrap();

        let fresh = test_item(LocationId::new());
        let mut clash = test_item(LocationId::new());
        clash.short_token = first.short_token.clone();

        let err = ledger.insert_items(vec![fresh.clone(), clash]).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get(fresh.id).unwrap().is_none());
    }

    #[test]
    fn duplicate_scan_token_within_batch_is_rejected() {
        let ledger = InMemoryItemLedger::new();
        let a = test_item(LocationId::new());
        let mut b = test_item(LocationId::new());
        b.scan_token = Token::from_raw(a.scan_token.as_str());

        assert!(ledger.insert_items(vec![a, b]).is_err());
        assert!(ledger.is_empty());
    }

    #[test]
    fn transition_of_unknown_item_is_not_available() {
        let ledger = InMemoryItemLedger::new();
        let err = ledger
            .transition(ItemId::new(), ItemState::InStock, ItemState::Consumed, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::ItemNotAvailable { .. }));
    }

    #[test]
    fn transition_at_checks_location_under_the_same_lock() {
        let ledger = InMemoryItemLedger::new();
        let (here, there) = (LocationId::new(), LocationId::new());
        let item = test_item(there);
        ledger.insert_items(vec![item.clone()]).unwrap();

        match ledger.transition_at(item.id, here, ItemState::InStock, ItemState::Consumed) {
            Err(DomainError::LocationMismatch { actual, .. }) => assert_eq!(actual, Some(there)),
            other => panic!("expected LocationMismatch, got {other:?}"),
        }
        assert_eq!(ledger.get(item.id).unwrap().unwrap().state, ItemState::InStock);

        let consumed = ledger
            .transition_at(item.id, there, ItemState::InStock, ItemState::Consumed)
            .unwrap();
        assert_eq!(consumed.state, ItemState::Consumed);
        assert!(consumed.is_at(there));

        let err = ledger
            .transition_at(item.id, there, ItemState::InStock, ItemState::Consumed)
            .unwrap_err();
        assert!(err.is_lost_race());
    }

    #[test]
    fn list_filters_and_orders_newest_first() {
        let ledger = InMemoryItemLedger::new();
        let here = LocationId::new();
        let older = test_item(here);
        let mut newer = test_item(here);
        newer.created_at = older.created_at + chrono::Duration::seconds(1);
        let elsewhere = test_item(LocationId::new());
        ledger
            .insert_items(vec![older.clone(), elsewhere, newer.clone()])
            .unwrap();
        ledger
            .transition(older.id, ItemState::InStock, ItemState::Disposed, None)
            .unwrap();

        let listed = ledger.list(&ItemFilter::at(here)).unwrap();
        assert_eq!(
            listed.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![newer.id, older.id]
        );

        let in_stock = ledger
            .list(&ItemFilter::at(here).in_state(ItemState::InStock))
            .unwrap();
        assert_eq!(in_stock.len(), 1);
        assert_eq!(in_stock[0].id, newer.id);
    }

    #[test]
    fn concurrent_transitions_have_exactly_one_winner() {
        let ledger = Arc::new(InMemoryItemLedger::new());
        let item = test_item(LocationId::new());
        ledger.insert_items(vec![item.clone()]).unwrap();

        let contenders = 8;
        let barrier = Arc::new(Barrier::new(contenders));
        let handles: Vec<_> = (0..contenders)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                let next = if i % 2 == 0 {
                    ItemState::InTransfer
                } else {
                    ItemState::Disposed
                };
                thread::spawn(move || {
                    barrier.wait();
                    ledger.transition(item.id, ItemState::InStock, next, None)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for result in results.iter().filter(|r| r.is_err()) {
            assert!(result.as_ref().unwrap_err().is_lost_race());
        }
    }
}
