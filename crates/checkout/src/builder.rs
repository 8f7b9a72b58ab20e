//! Order placement: validate the cart, hold stock, persist the order.

use std::sync::Arc;

use common::{ItemId, OrderId, UserId};
use domain::{
    CartLine, Order, OrderItem, PaymentMethod, SellableItem, merge_lines, order_total,
};
use serde::{Deserialize, Serialize};
use store::CheckoutStore;

use crate::error::{CheckoutError, Result};
use crate::ledger::InventoryLedger;

/// Everything needed to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
    pub lines: Vec<CartLine>,
}

impl NewOrder {
    pub fn new(
        user_id: UserId,
        payment_method: PaymentMethod,
        shipping_address: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            payment_method,
            shipping_address: shipping_address.into(),
            lines: Vec::new(),
        }
    }

    /// Adds a cart line.
    pub fn line(mut self, item_id: ItemId, quantity: u32) -> Self {
        self.lines.push(CartLine::new(item_id, quantity));
        self
    }
}

/// Turns a validated cart into a persisted order with stock held for
/// every line.
pub struct OrderBuilder<S> {
    store: Arc<S>,
    ledger: InventoryLedger<S>,
}

impl<S: CheckoutStore> OrderBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
        }
    }

    /// Places an order.
    ///
    /// Prices and names are snapshotted from the catalog as it stands
    /// right now; later catalog edits never change what this order
    /// charges. If persisting fails after stock was held, the hold is
    /// released before the error is returned.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_order(&self, request: NewOrder) -> Result<(Order, Vec<OrderItem>)> {
        let started = std::time::Instant::now();

        if request.lines.is_empty() {
            return Err(CheckoutError::validation("order has no lines"));
        }
        if request.lines.iter().any(|line| line.quantity == 0) {
            return Err(CheckoutError::validation("line quantity must be positive"));
        }
        if request.shipping_address.trim().is_empty() {
            return Err(CheckoutError::validation("shipping address is required"));
        }

        let lines = merge_lines(&request.lines);
        let mut catalog = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = self.require_orderable(line.item_id).await?;
            catalog.push(item);
        }

        let order_id = OrderId::new();
        let reservation = self.ledger.reserve(order_id, lines.clone()).await?;

        let items: Vec<OrderItem> = catalog
            .iter()
            .zip(&lines)
            .map(|(item, line)| OrderItem::snapshot(order_id, item, line.quantity))
            .collect();
        let total = order_total(&items);
        let order = Order::new(
            order_id,
            request.user_id,
            request.payment_method,
            request.shipping_address,
            total,
        );

        if let Err(err) = self.store.insert_order(&order, &items).await {
            // Give the held stock back before reporting the failure.
            // The sweeper reclaims the hold later if this release fails.
            if let Err(release_err) = self.ledger.release(reservation.id).await {
                tracing::error!(
                    reservation_id = %reservation.id,
                    error = %release_err,
                    "failed to release reservation after persist failure"
                );
            }
            return Err(err.into());
        }

        metrics::counter!("checkout_orders_created_total").increment(1);
        metrics::histogram!("checkout_create_order_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(order_id = %order.id, total = %order.total, "order placed");
        Ok((order, items))
    }

    async fn require_orderable(&self, item_id: ItemId) -> Result<SellableItem> {
        self.store
            .get_item(item_id)
            .await?
            .filter(SellableItem::is_orderable)
            .ok_or_else(|| {
                CheckoutError::validation(format!("item {item_id} is not available for ordering"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, OrderStatus, PaymentStatus, ReservationState};
    use store::InMemoryStore;

    async fn setup() -> (OrderBuilder<InMemoryStore>, Arc<InMemoryStore>, SellableItem) {
        let store = Arc::new(InMemoryStore::new());
        let item = SellableItem::product("Desk Lamp", Money::from_cents(4_250), 10);
        store.upsert_item(&item).await.unwrap();
        (OrderBuilder::new(store.clone()), store, item)
    }

    fn request(item_id: ItemId, quantity: u32) -> NewOrder {
        NewOrder::new(UserId::new(), PaymentMethod::Cod, "12 Main Street").line(item_id, quantity)
    }

    #[tokio::test]
    async fn creates_order_with_snapshot_and_held_stock() {
        let (builder, store, item) = setup().await;
        let (order, items) = builder.create_order(request(item.id, 3)).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.total, Money::from_cents(12_750));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_name, "Desk Lamp");
        assert_eq!(items[0].unit_price, Money::from_cents(4_250));

        let stored = store.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 7);
        let reservation = store.reservation_for_order(order.id).await.unwrap().unwrap();
        assert_eq!(reservation.state, ReservationState::Held);
        assert_eq!(reservation.quantity_for(item.id), 3);
    }

    #[tokio::test]
    async fn price_edits_after_placement_do_not_change_the_order() {
        let (builder, store, mut item) = setup().await;
        let (order, items) = builder.create_order(request(item.id, 1)).await.unwrap();

        item.price = Money::from_cents(9_999);
        item.stock = 7;
        store.upsert_item(&item).await.unwrap();

        let stored_items = store.get_order_items(order.id).await.unwrap();
        assert_eq!(stored_items[0].unit_price, Money::from_cents(4_250));
        assert_eq!(items[0].unit_price, Money::from_cents(4_250));
    }

    #[tokio::test]
    async fn rejects_empty_carts_zero_quantities_and_blank_addresses() {
        let (builder, _, item) = setup().await;

        let empty = NewOrder::new(UserId::new(), PaymentMethod::Cod, "12 Main Street");
        assert_eq!(
            builder.create_order(empty).await.unwrap_err().code(),
            "VALIDATION"
        );

        assert_eq!(
            builder
                .create_order(request(item.id, 0))
                .await
                .unwrap_err()
                .code(),
            "VALIDATION"
        );

        let blank = NewOrder::new(UserId::new(), PaymentMethod::Cod, "   ").line(item.id, 1);
        assert_eq!(
            builder.create_order(blank).await.unwrap_err().code(),
            "VALIDATION"
        );
    }

    #[tokio::test]
    async fn rejects_unknown_and_inactive_items() {
        let (builder, store, mut item) = setup().await;

        let unknown = builder
            .create_order(request(ItemId::new(), 1))
            .await
            .unwrap_err();
        assert_eq!(unknown.code(), "VALIDATION");

        item.is_active = false;
        store.upsert_item(&item).await.unwrap();
        let inactive = builder.create_order(request(item.id, 1)).await.unwrap_err();
        assert_eq!(inactive.code(), "VALIDATION");
    }

    #[tokio::test]
    async fn shortfall_on_any_line_leaves_all_stock_untouched() {
        let (builder, store, item) = setup().await;
        let scarce = SellableItem::product("Limited Print", Money::from_cents(30_000), 1);
        store.upsert_item(&scarce).await.unwrap();

        let request = NewOrder::new(UserId::new(), PaymentMethod::Cod, "12 Main Street")
            .line(item.id, 2)
            .line(scarce.id, 2);
        let err = builder.create_order(request).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::OutOfStock { item_id } if item_id == scarce.id
        ));

        assert_eq!(store.get_item(item.id).await.unwrap().unwrap().stock, 10);
        assert_eq!(store.get_item(scarce.id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn persist_failure_releases_the_hold() {
        let (builder, store, item) = setup().await;
        store.set_fail_insert_order(true).await;

        let err = builder.create_order(request(item.id, 4)).await.unwrap_err();
        assert_eq!(err.code(), "PERSISTENCE");

        let stored = store.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 10);
    }

    #[tokio::test]
    async fn duplicate_lines_merge_into_one_snapshot() {
        let (builder, _, item) = setup().await;
        let request = NewOrder::new(UserId::new(), PaymentMethod::Cod, "12 Main Street")
            .line(item.id, 1)
            .line(item.id, 2);
        let (order, items) = builder.create_order(request).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(order.total, Money::from_cents(12_750));
    }
}
