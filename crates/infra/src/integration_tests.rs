//! End-to-end flows over fully wired in-memory services.
//!
//! These exercise the engines together through `Services`, the same wiring
//! `bootstrap` hands to callers.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use rust_decimal::Decimal;

    use stocktrace_audit::{AuditAction, AuditError, AuditEvent, AuditSink, InMemoryAuditSink};
    use stocktrace_catalog::{ExpiryPolicy, InMemoryCatalog, Location, Product};
    use stocktrace_consumption::{ConsumeItem, ConsumptionEngine, DisposeItem, InMemoryRecordStore};
    use stocktrace_core::{DomainError, ItemId, UserId};
    use stocktrace_intake::ReceivePurchase;
    use stocktrace_ledger::{
        InMemoryItemLedger, ItemFilter, ItemLedger, ItemSpec, ItemState, TokenGenerator,
        create_items,
    };
    use stocktrace_transfer::{
        CreateTransfer, DivergenceKind, ReceiveTransfer, Transfer, TransferKind, TransferStatus,
        TripStatus,
    };

    use crate::services::Services;

    struct World {
        services: Services,
        audit: Arc<InMemoryAuditSink>,
        warehouse: Location,
        store: Location,
        product: Product,
        user: UserId,
    }

    fn setup() -> World {
        let catalog = Arc::new(InMemoryCatalog::new());
        let warehouse = Location::warehouse("W1");
        let store = Location::store("S1");
        let product = Product::new("Tomato sauce", ExpiryPolicy::new(3, 0, 0));
        catalog.add_location(warehouse.clone()).unwrap();
        catalog.add_location(store.clone()).unwrap();
        catalog.add_product(product.clone()).unwrap();

        let audit = Arc::new(InMemoryAuditSink::new());
        let services = Services::from_parts(
            Arc::new(InMemoryItemLedger::new()),
            audit.clone(),
            catalog.clone(),
            catalog,
            TokenGenerator::default(),
        );

        World {
            services,
            audit,
            warehouse,
            store,
            product,
            user: UserId::new(),
        }
    }

    impl World {
        fn purchase(&self, quantity: i64) -> Vec<ItemId> {
            self.services
                .intake
                .receive_purchase(ReceivePurchase::new(
                    self.product.id,
                    quantity,
                    Decimal::new(100, 1),
                    self.warehouse.id,
                    Some(self.user),
                ))
                .unwrap()
                .items
                .into_iter()
                .map(|item| item.id)
                .collect()
        }

        fn state_of(&self, id: ItemId) -> ItemState {
            self.services.ledger.get(id).unwrap().unwrap().state
        }

        fn ship(&self, items: Vec<ItemId>) -> Transfer {
            let transfers = &self.services.transfers;
            let transfer = transfers
                .create(CreateTransfer::new(
                    TransferKind::WarehouseToStore,
                    self.warehouse.id,
                    self.store.id,
                    items,
                    self.user,
                ))
                .unwrap();
            transfers.accept(transfer.id, self.user).unwrap();
            transfers.dispatch(transfer.id, self.user).unwrap().transfer
        }
    }

    #[test]
    fn purchase_creates_individually_tracked_items() {
        let w = setup();
        let items = w.purchase(5);

        assert_eq!(items.len(), 5);
        let stocked = w
            .services
            .ledger
            .list(&ItemFilter::at(w.warehouse.id).in_state(ItemState::InStock))
            .unwrap();
        assert_eq!(stocked.len(), 5);

        let events = w.audit.with_action(AuditAction::PurchaseReceived);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details["quantity"], 5);
    }

    #[test]
    fn full_transfer_is_delivered_without_divergences() {
        let w = setup();
        let items = w.purchase(3);
        let transfer = w
            .services
            .transfers
            .create(CreateTransfer::new(
                TransferKind::WarehouseToStore,
                w.warehouse.id,
                w.store.id,
                items.clone(),
                w.user,
            ))
            .unwrap();
        assert_eq!(transfer.status, TransferStatus::AwaitingAccept);

        let accepted = w.services.transfers.accept(transfer.id, w.user).unwrap();
        assert_eq!(accepted.status, TransferStatus::Accepted);

        let dispatched = w.services.transfers.dispatch(transfer.id, w.user).unwrap();
        assert_eq!(dispatched.transfer.status, TransferStatus::InTransit);
        assert!(items.iter().all(|i| w.state_of(*i) == ItemState::InTransfer));

        let receipt = w
            .services
            .transfers
            .receive(ReceiveTransfer {
                transfer_id: transfer.id,
                received_item_ids: items.clone(),
                destination_id: w.store.id,
                actor_id: w.user,
            })
            .unwrap();

        assert_eq!(receipt.transfer.status, TransferStatus::Delivered);
        assert!(receipt.divergences.is_empty());
        for id in &items {
            let item = w.services.ledger.get(*id).unwrap().unwrap();
            assert_eq!(item.state, ItemState::InStock);
            assert!(item.is_at(w.store.id));
        }
    }

    #[test]
    fn partial_receipt_opens_missing_and_surplus_divergences() {
        let w = setup();
        let items = w.purchase(3);
        let transfer = w.ship(items.clone());
        let stranger = ItemId::new();

        let receipt = w
            .services
            .transfers
            .receive(ReceiveTransfer {
                transfer_id: transfer.id,
                received_item_ids: vec![items[0], items[1], stranger],
                destination_id: w.store.id,
                actor_id: w.user,
            })
            .unwrap();

        assert_eq!(receipt.transfer.status, TransferStatus::Divergence);
        let missing: Vec<_> = receipt
            .divergences
            .iter()
            .filter(|d| d.kind == DivergenceKind::Missing)
            .collect();
        let surplus: Vec<_> = receipt
            .divergences
            .iter()
            .filter(|d| d.kind == DivergenceKind::Surplus)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].item_id, items[2]);
        assert_eq!(surplus.len(), 1);
        assert_eq!(surplus[0].item_id, stranger);

        assert_eq!(w.state_of(items[0]), ItemState::InStock);
        assert_eq!(w.state_of(items[1]), ItemState::InStock);
        assert_eq!(w.state_of(items[2]), ItemState::InTransfer);

        // A second receipt is rejected and adds no divergences.
        let err = w
            .services
            .transfers
            .receive(ReceiveTransfer {
                transfer_id: transfer.id,
                received_item_ids: vec![items[2]],
                destination_id: w.store.id,
                actor_id: w.user,
            })
            .unwrap_err();
        assert!(err.is_lost_race());
        assert_eq!(w.services.transfers.list_divergences(true).unwrap().len(), 2);
    }

    #[test]
    fn consuming_an_item_in_transfer_changes_nothing() {
        let w = setup();
        let items = w.purchase(1);
        w.ship(items.clone());

        let err = w
            .services
            .consumption
            .consume(ConsumeItem {
                item_id: items[0],
                location_id: w.store.id,
                actor_id: w.user,
            })
            .unwrap_err();

        assert!(matches!(err, DomainError::ItemNotAvailable { .. }));
        assert_eq!(w.state_of(items[0]), ItemState::InTransfer);
    }

    #[test]
    fn start_trip_dispatches_only_accepted_children() {
        let w = setup();
        let trips = &w.services.trips;
        let transfers = &w.services.transfers;
        let trip = trips.create_trip(w.user).unwrap();

        let ready_items = w.purchase(2);
        let ready = transfers
            .create(
                CreateTransfer::new(
                    TransferKind::WarehouseToStore,
                    w.warehouse.id,
                    w.store.id,
                    ready_items.clone(),
                    w.user,
                )
                .on_trip(trip.id),
            )
            .unwrap();
        transfers.accept(ready.id, w.user).unwrap();

        let early_items = w.purchase(1);
        let early = transfers
            .create(
                CreateTransfer::new(
                    TransferKind::WarehouseToStore,
                    w.warehouse.id,
                    w.store.id,
                    early_items.clone(),
                    w.user,
                )
                .on_trip(trip.id),
            )
            .unwrap();
        transfers.accept(early.id, w.user).unwrap();
        transfers.dispatch(early.id, w.user).unwrap();
        let dispatches_before = w.audit.with_action(AuditAction::TransferDispatched).len();

        trips.accept_trip(trip.id, w.user).unwrap();
        let started = trips.start_trip(trip.id, w.user).unwrap();

        assert_eq!(started.trip.status, TripStatus::InTransit);
        assert_eq!(started.dispatched.len(), 1);
        assert_eq!(started.dispatched[0].transfer.id, ready.id);
        assert!(started.skipped.is_empty());
        assert!(ready_items.iter().all(|i| w.state_of(*i) == ItemState::InTransfer));
        assert_eq!(
            w.audit.with_action(AuditAction::TransferDispatched).len(),
            dispatches_before + 1
        );
        assert_eq!(
            transfers.get(early.id).unwrap().unwrap().transfer.status,
            TransferStatus::InTransit
        );
    }

    #[test]
    fn trip_runs_from_creation_to_completion() {
        let w = setup();
        let trips = &w.services.trips;
        let transfers = &w.services.transfers;
        let driver = UserId::new();

        let trip = trips.create_trip(w.user).unwrap();
        let items = w.purchase(2);
        let transfer = transfers
            .create(
                CreateTransfer::new(
                    TransferKind::WarehouseToStore,
                    w.warehouse.id,
                    w.store.id,
                    items.clone(),
                    w.user,
                )
                .on_trip(trip.id),
            )
            .unwrap();
        transfers.accept(transfer.id, driver).unwrap();
        trips.accept_trip(trip.id, driver).unwrap();
        trips.start_trip(trip.id, driver).unwrap();

        transfers
            .receive(ReceiveTransfer {
                transfer_id: transfer.id,
                received_item_ids: items.clone(),
                destination_id: w.store.id,
                actor_id: w.user,
            })
            .unwrap();
        let completed = trips.complete_trip(trip.id, driver).unwrap();
        assert_eq!(completed.status, TripStatus::Completed);

        let event = &w.audit.with_action(AuditAction::TripCompleted)[0];
        assert!(event.details["unsettled_transfers"].as_array().unwrap().is_empty());

        let consumed = w
            .services
            .consumption
            .consume(ConsumeItem {
                item_id: items[0],
                location_id: w.store.id,
                actor_id: w.user,
            })
            .unwrap();
        assert_eq!(consumed.state, ItemState::Consumed);
        assert_eq!(w.audit.for_item(items[0]).len(), 1);
    }

    #[test]
    fn scan_and_short_tokens_resolve_to_the_same_item() {
        let w = setup();
        let id = w.purchase(1)[0];
        let item = w.services.ledger.get(id).unwrap().unwrap();

        let by_scan = w
            .services
            .ledger
            .find_by_token(item.scan_token.as_str())
            .unwrap()
            .unwrap();
        let short = item.short_token.clone().unwrap();
        let by_short = w
            .services
            .ledger
            .find_by_short_token(short.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(by_scan.id, id);
        assert_eq!(by_short.id, id);
    }

    #[test]
    fn concurrent_consume_and_dispose_have_one_winner() {
        let ledger = Arc::new(InMemoryItemLedger::new());
        let records = Arc::new(InMemoryRecordStore::new());
        let engine = Arc::new(ConsumptionEngine::new(
            ledger.clone(),
            records.clone(),
            Arc::new(InMemoryAuditSink::new()),
        ));
        let store = Location::store("S1");
        let product = Product::new("Bread", ExpiryPolicy::new(1, 0, 0));
        let spec = ItemSpec::new(&product, store.id, chrono::Utc::now());
        let item = create_items(ledger.as_ref(), &TokenGenerator::default(), &spec, 1)
            .unwrap()
            .remove(0);

        let (item_id, store_id) = (item.id, store.id);

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|n| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let actor_id = UserId::new();
                    if n % 2 == 0 {
                        engine
                            .consume(ConsumeItem {
                                item_id,
                                location_id: store_id,
                                actor_id,
                            })
                            .is_ok()
                    } else {
                        engine
                            .dispose(DisposeItem {
                                item_id,
                                location_id: store_id,
                                actor_id,
                                reason: None,
                            })
                            .is_ok()
                    }
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(records.consumptions().len() + records.disposals().len(), 1);
        assert!(ledger.get(item_id).unwrap().unwrap().state.is_terminal());
    }

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::Write("disk full".to_string()))
        }
    }

    #[test]
    fn audit_outage_does_not_block_stock_movements() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let warehouse = Location::warehouse("W2");
        let product = Product::new("Flour", ExpiryPolicy::new(0, 0, 0));
        catalog.add_location(warehouse.clone()).unwrap();
        catalog.add_product(product.clone()).unwrap();
        let services = Services::from_parts(
            Arc::new(InMemoryItemLedger::new()),
            Arc::new(BrokenSink),
            catalog.clone(),
            catalog,
            TokenGenerator::default(),
        );

        let intake = services
            .intake
            .receive_purchase(ReceivePurchase::new(
                product.id,
                2,
                Decimal::ONE,
                warehouse.id,
                None,
            ))
            .unwrap();
        assert_eq!(intake.items.len(), 2);
        assert!(intake.items.iter().all(|i| i.expires_at.is_none()));
        assert_eq!(
            services
                .ledger
                .list(&ItemFilter::at(warehouse.id))
                .unwrap()
                .len(),
            2
        );
    }
}
