use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use rust_decimal::Decimal;
use stocktrace_catalog::{ExpiryPolicy, InMemoryCatalog, Location, Product};
use stocktrace_core::UserId;
use stocktrace_infra::services::Services;
use stocktrace_intake::ReceivePurchase;
use stocktrace_ledger::{
    InMemoryItemLedger, ItemLedger, ItemSpec, ItemState, TokenGenerator, create_items,
};
use stocktrace_transfer::{CreateTransfer, ReceiveTransfer, TransferKind};
use std::sync::Arc;

fn seeded_ledger(count: usize) -> (InMemoryItemLedger, Vec<stocktrace_core::ItemId>) {
    let ledger = InMemoryItemLedger::new();
    let product = Product::new("Bench item", ExpiryPolicy::new(1, 0, 0));
    let spec = ItemSpec::new(&product, stocktrace_core::LocationId::new(), Utc::now());
    let ids = create_items(&ledger, &TokenGenerator::default(), &spec, count)
        .expect("seed items")
        .into_iter()
        .map(|item| item.id)
        .collect();
    (ledger, ids)
}

/// Guarded compare-and-set: one winning edge and one lost race per round.
fn bench_guarded_transition(c: &mut Criterion) {
    let mut group = c.benchmark_group("guarded_transition");

    group.bench_function("win_then_miss", |b| {
        let (ledger, ids) = seeded_ledger(1);
        let id = ids[0];
        b.iter(|| {
            ledger
                .transition(id, ItemState::InStock, ItemState::InTransfer, None)
                .expect("win");
            let lost = ledger.transition(id, ItemState::InStock, ItemState::InTransfer, None);
            black_box(lost.is_err());
            ledger
                .transition(id, ItemState::InTransfer, ItemState::InStock, None)
                .expect("return");
        });
    });

    group.finish();
}

fn bench_item_issuance(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_items");
    let product = Product::new("Bench item", ExpiryPolicy::new(0, 12, 0));
    let tokens = TokenGenerator::default();

    for count in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let ledger = InMemoryItemLedger::new();
            let spec = ItemSpec::new(&product, stocktrace_core::LocationId::new(), Utc::now());
            b.iter(|| black_box(create_items(&ledger, &tokens, &spec, count).expect("issue")));
        });
    }

    group.finish();
}

/// Purchase, ship and receive a manifest end to end.
fn bench_transfer_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_round_trip");

    for size in [1usize, 25] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let catalog = Arc::new(InMemoryCatalog::new());
            let warehouse = Location::warehouse("W1");
            let store = Location::store("S1");
            let product = Product::new("Bench item", ExpiryPolicy::new(0, 0, 0));
            catalog.add_location(warehouse.clone()).expect("warehouse");
            catalog.add_location(store.clone()).expect("store");
            catalog.add_product(product.clone()).expect("product");
            let services =
                Services::in_memory(catalog.clone(), catalog, TokenGenerator::default());
            let user = UserId::new();

            b.iter(|| {
                let items: Vec<_> = services
                    .intake
                    .receive_purchase(ReceivePurchase::new(
                        product.id,
                        size as i64,
                        Decimal::ONE,
                        warehouse.id,
                        Some(user),
                    ))
                    .expect("purchase")
                    .items
                    .into_iter()
                    .map(|item| item.id)
                    .collect();
                let transfer = services
                    .transfers
                    .create(CreateTransfer::new(
                        TransferKind::WarehouseToStore,
                        warehouse.id,
                        store.id,
                        items.clone(),
                        user,
                    ))
                    .expect("create");
                services.transfers.accept(transfer.id, user).expect("accept");
                services.transfers.dispatch(transfer.id, user).expect("dispatch");
                black_box(
                    services
                        .transfers
                        .receive(ReceiveTransfer {
                            transfer_id: transfer.id,
                            received_item_ids: items,
                            destination_id: store.id,
                            actor_id: user,
                        })
                        .expect("receive"),
                );
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_guarded_transition,
    bench_item_issuance,
    bench_transfer_round_trip
);
criterion_main!(benches);
