use checkout::{CheckoutConfig, CheckoutService, NewOrder};
use common::UserId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Money, PaymentMethod, PaymentOutcome, SellableItem};
use store::InMemoryStore;

fn bench_config() -> CheckoutConfig {
    CheckoutConfig {
        reservation_ttl_secs: 900,
        reconcile_retry_limit: 3,
        sweep_batch_limit: 100,
        log_filter: "info".into(),
    }
}

fn new_service() -> CheckoutService<InMemoryStore> {
    CheckoutService::with_config(InMemoryStore::new(), bench_config())
}

async fn seed_item(service: &CheckoutService<InMemoryStore>, stock: u32) -> SellableItem {
    let item = SellableItem::product("Bench Widget", Money::from_cents(1_000), stock);
    service.add_item(&item).await.unwrap();
    item
}

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkout/create_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service = new_service();
                let item = seed_item(&service, 100).await;
                let request = NewOrder::new(UserId::new(), PaymentMethod::Cod, "1 Bench Lane")
                    .line(item.id, 2);
                service.create_order(request).await.unwrap();
            });
        });
    });
}

fn bench_cod_checkout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkout/cod_checkout", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service = new_service();
                let item = seed_item(&service, 100).await;
                let request = NewOrder::new(UserId::new(), PaymentMethod::Cod, "1 Bench Lane")
                    .line(item.id, 2);
                let (order, _) = service.create_order(request).await.unwrap();
                service.initiate_payment(order.id).await.unwrap();
            });
        });
    });
}

fn bench_online_checkout_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkout/online_checkout_cycle", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service = new_service();
                let item = seed_item(&service, 100).await;
                let request = NewOrder::new(UserId::new(), PaymentMethod::Online, "1 Bench Lane")
                    .line(item.id, 2);
                let (order, _) = service.create_order(request).await.unwrap();
                let payment = service.initiate_payment(order.id).await.unwrap();
                let reference = payment.transaction_id.unwrap();
                service
                    .reconcile_payment(&reference, PaymentOutcome::Success, None)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reconcile_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = new_service();

    // One settled payment; every iteration replays its callback.
    let reference = rt.block_on(async {
        let item = seed_item(&service, 100).await;
        let request =
            NewOrder::new(UserId::new(), PaymentMethod::Online, "1 Bench Lane").line(item.id, 2);
        let (order, _) = service.create_order(request).await.unwrap();
        let payment = service.initiate_payment(order.id).await.unwrap();
        let reference = payment.transaction_id.unwrap();
        service
            .reconcile_payment(&reference, PaymentOutcome::Success, None)
            .await
            .unwrap();
        reference
    });

    c.bench_function("checkout/reconcile_replay", |b| {
        b.iter(|| {
            rt.block_on(async {
                let report = service
                    .reconcile_payment(&reference, PaymentOutcome::Success, None)
                    .await
                    .unwrap();
                assert!(!report.applied);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_order,
    bench_cod_checkout,
    bench_online_checkout_cycle,
    bench_reconcile_replay,
);
criterion_main!(benches);
