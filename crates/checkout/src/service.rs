//! One front door for the checkout core.

use std::sync::Arc;

use common::{ItemId, OrderId, TransactionId, UserId};
use domain::{Order, OrderItem, OrderStatus, Payment, PaymentOutcome, SellableItem};
use serde_json::Value;
use store::{CheckoutStore, CheckoutStoreExt};

use crate::builder::{NewOrder, OrderBuilder};
use crate::config::CheckoutConfig;
use crate::error::Result;
use crate::ledger::InventoryLedger;
use crate::payments::{PaymentCoordinator, ReconcileReport};
use crate::sweeper::{ReservationSweeper, SweepReport};
use crate::sync::OrderStatusSynchronizer;

/// The checkout core behind one handle: catalog upkeep, order
/// placement, payment, reconciliation, fulfilment, and sweeping.
///
/// The service is generic over the store so tests run against the
/// in-memory implementation and deployments against Postgres. All
/// coordination happens through the store's conditional updates;
/// several service instances may point at the same database.
pub struct CheckoutService<S: CheckoutStore> {
    store: Arc<S>,
    ledger: InventoryLedger<S>,
    builder: OrderBuilder<S>,
    payments: PaymentCoordinator<S>,
    sync: OrderStatusSynchronizer<S>,
    sweeper: ReservationSweeper<S>,
}

impl<S: CheckoutStore> CheckoutService<S> {
    /// Builds a service configured from the environment.
    pub fn new(store: S) -> Self {
        Self::with_config(store, CheckoutConfig::default())
    }

    pub fn with_config(store: S, config: CheckoutConfig) -> Self {
        let store = Arc::new(store);
        Self {
            ledger: InventoryLedger::new(store.clone()),
            builder: OrderBuilder::new(store.clone()),
            payments: PaymentCoordinator::new(store.clone(), config.reconcile_retry_limit),
            sync: OrderStatusSynchronizer::new(store.clone(), config.reconcile_retry_limit),
            sweeper: ReservationSweeper::new(store.clone(), &config),
            store,
        }
    }

    /// Direct access to the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers or replaces a catalog item.
    pub async fn add_item(&self, item: &SellableItem) -> Result<()> {
        self.ledger.add_item(item).await
    }

    /// Adjusts an item's free stock by a signed amount.
    pub async fn restock(&self, item_id: ItemId, delta: i64) -> Result<()> {
        self.ledger.restock(item_id, delta).await
    }

    pub async fn get_item(&self, item_id: ItemId) -> Result<Option<SellableItem>> {
        Ok(self.store.get_item(item_id).await?)
    }

    /// Places an order: validates the cart, holds stock, snapshots
    /// prices, persists.
    pub async fn create_order(&self, request: NewOrder) -> Result<(Order, Vec<OrderItem>)> {
        self.builder.create_order(request).await
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.store.require_order(order_id).await?)
    }

    pub async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self.store.get_order_items(order_id).await?)
    }

    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_user(user_id).await?)
    }

    /// Starts payment for an order. Cash on delivery settles before
    /// this returns; online payments stay pending until reconciled.
    pub async fn initiate_payment(&self, order_id: OrderId) -> Result<Payment> {
        self.payments.initiate(order_id).await
    }

    /// Records a provider verdict for a transaction reference.
    pub async fn reconcile_payment(
        &self,
        transaction_id: &TransactionId,
        outcome: PaymentOutcome,
        payload: Option<Value>,
    ) -> Result<ReconcileReport> {
        self.payments.reconcile(transaction_id, outcome, payload).await
    }

    pub async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        Ok(self.store.payments_for_order(order_id).await?)
    }

    /// Moves a paid order one step along the fulfilment path.
    pub async fn advance_order(&self, order_id: OrderId, to: OrderStatus) -> Result<Order> {
        self.sync.advance(order_id, to).await
    }

    /// Cancels an order whose payment has not resolved yet.
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        self.sync.cancel(order_id).await
    }

    /// Runs one sweep over reservations older than the timeout.
    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        self.sweeper.sweep().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, OrderStatus, PaymentMethod, PaymentStatus};
    use store::InMemoryStore;

    fn service() -> CheckoutService<InMemoryStore> {
        CheckoutService::with_config(
            InMemoryStore::new(),
            CheckoutConfig {
                reservation_ttl_secs: 900,
                reconcile_retry_limit: 3,
                sweep_batch_limit: 100,
                log_filter: "info".into(),
            },
        )
    }

    #[tokio::test]
    async fn full_cod_checkout_through_the_facade() {
        let checkout = service();
        let item = SellableItem::product("Wall Clock", Money::from_cents(5_600), 4);
        checkout.add_item(&item).await.unwrap();

        let user_id = UserId::new();
        let request =
            NewOrder::new(user_id, PaymentMethod::Cod, "7 Harbour Way").line(item.id, 2);
        let (order, items) = checkout.create_order(request).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(order.total, Money::from_cents(11_200));

        checkout.initiate_payment(order.id).await.unwrap();
        checkout
            .advance_order(order.id, OrderStatus::Shipped)
            .await
            .unwrap();
        let delivered = checkout
            .advance_order(order.id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert_eq!(delivered.payment_status, PaymentStatus::Success);

        let history = checkout.orders_for_user(user_id).await.unwrap();
        assert_eq!(history.len(), 1);
        let payments = checkout.payments_for_order(order.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn restock_raises_and_lowers_free_stock() {
        let checkout = service();
        let item = SellableItem::product("Plant Pot", Money::from_cents(900), 5);
        checkout.add_item(&item).await.unwrap();

        checkout.restock(item.id, 7).await.unwrap();
        assert_eq!(
            checkout.get_item(item.id).await.unwrap().unwrap().stock,
            12
        );

        checkout.restock(item.id, -2).await.unwrap();
        assert_eq!(
            checkout.get_item(item.id).await.unwrap().unwrap().stock,
            10
        );

        let err = checkout.restock(item.id, -100).await.unwrap_err();
        assert_eq!(err.code(), "PERSISTENCE");
    }
}
