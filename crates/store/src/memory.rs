use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use common::{ItemId, OrderId, PaymentId, ReservationId, TransactionId, UserId};
use domain::{
    Order, OrderItem, OrderStatus, Payment, PaymentOutcome, PaymentStatus, Reservation,
    ReservationResolution, SellableItem,
};

use crate::{
    Result, StoreError,
    store::{CheckoutStore, ResolveOutcome},
};

#[derive(Default)]
struct InnerState {
    items: HashMap<ItemId, SellableItem>,
    reservations: HashMap<ReservationId, Reservation>,
    orders: HashMap<OrderId, Order>,
    order_items: HashMap<OrderId, Vec<OrderItem>>,
    payments: HashMap<PaymentId, Payment>,
    fail_insert_order: bool,
}

/// In-memory checkout store implementation for testing.
///
/// A single writer lock stands in for the row-level atomicity the
/// PostgreSQL implementation gets from transactions, so the
/// all-or-nothing and compare-and-set contracts hold here too.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InnerState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all stored data.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = InnerState::default();
    }

    /// Makes the next calls to `insert_order` fail as if the backend
    /// were unreachable. Used to exercise compensation paths.
    pub async fn set_fail_insert_order(&self, fail: bool) {
        self.state.write().await.fail_insert_order = fail;
    }

    /// Shifts a reservation's creation time into the past so expiry
    /// can be tested without waiting.
    pub async fn backdate_reservation(&self, id: ReservationId, by: Duration) {
        let mut state = self.state.write().await;
        if let Some(reservation) = state.reservations.get_mut(&id) {
            reservation.created_at -= by;
        }
    }
}

#[async_trait]
impl CheckoutStore for InMemoryStore {
    async fn upsert_item(&self, item: &SellableItem) -> Result<()> {
        let mut state = self.state.write().await;
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<SellableItem>> {
        let state = self.state.read().await;
        Ok(state.items.get(&item_id).cloned())
    }

    async fn adjust_stock(&self, item_id: ItemId, delta: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or_else(|| StoreError::not_found("item", item_id))?;

        let adjusted = item.stock as i64 + delta;
        if adjusted < 0 {
            return Err(StoreError::Constraint {
                constraint: "items_stock_check".to_string(),
            });
        }
        item.stock = adjusted as u32;
        Ok(())
    }

    async fn reserve_stock(&self, reservation: &Reservation) -> Result<()> {
        let mut state = self.state.write().await;

        // Check every line before touching any stock so a failure on
        // the last line leaves the earlier ones unchanged. Totals are
        // kept per item so repeated lines cannot slip past the stock
        // check one line at a time.
        let mut required: HashMap<ItemId, u64> = HashMap::new();
        for line in &reservation.lines {
            let item = state
                .items
                .get(&line.item_id)
                .ok_or(StoreError::ItemUnavailable {
                    item_id: line.item_id,
                })?;
            if !item.is_active {
                return Err(StoreError::ItemUnavailable {
                    item_id: line.item_id,
                });
            }
            let total = required.entry(line.item_id).or_insert(0);
            *total += u64::from(line.quantity);
            if *total > u64::from(item.stock) {
                return Err(StoreError::InsufficientStock {
                    item_id: line.item_id,
                });
            }
        }

        for (item_id, quantity) in required {
            if let Some(item) = state.items.get_mut(&item_id) {
                item.stock -= quantity as u32;
            }
        }

        state.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let state = self.state.read().await;
        Ok(state.reservations.get(&id).cloned())
    }

    async fn reservation_for_order(&self, order_id: OrderId) -> Result<Option<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .reservations
            .values()
            .find(|r| r.order_id == order_id)
            .cloned())
    }

    async fn resolve_reservation(
        &self,
        id: ReservationId,
        resolution: ReservationResolution,
    ) -> Result<ResolveOutcome> {
        let mut state = self.state.write().await;

        let current = match state.reservations.get(&id) {
            Some(reservation) => reservation.clone(),
            None => return Ok(ResolveOutcome::NotFound),
        };
        if current.state.is_resolved() {
            return Ok(ResolveOutcome::AlreadyResolved(current.state));
        }

        if resolution == ReservationResolution::Release {
            for line in &current.lines {
                if let Some(item) = state.items.get_mut(&line.item_id) {
                    item.stock += line.quantity;
                }
            }
        }

        if let Some(reservation) = state.reservations.get_mut(&id) {
            reservation.state = resolution.target_state();
            reservation.resolved_at = Some(Utc::now());
        }
        Ok(ResolveOutcome::Applied)
    }

    async fn expired_reservations(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut expired: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.is_open() && r.created_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.created_at);
        expired.truncate(limit.max(0) as usize);
        Ok(expired)
    }

    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_insert_order {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Constraint {
                constraint: "orders_pkey".to_string(),
            });
        }

        state.orders.insert(order.id, order.clone());
        state.order_items.insert(order.id, items.to_vec());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id).cloned())
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let state = self.state.read().await;
        Ok(state.order_items.get(&order_id).cloned().unwrap_or_default())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: (OrderStatus, PaymentStatus),
        next: (OrderStatus, PaymentStatus),
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;

        if (order.status, order.payment_status) != expected {
            return Ok(false);
        }
        order.status = next.0;
        order.payment_status = next.1;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.id) {
            return Err(StoreError::Constraint {
                constraint: "payments_pkey".to_string(),
            });
        }
        if let Some(ref txn) = payment.transaction_id
            && state
                .payments
                .values()
                .any(|p| p.transaction_id.as_ref() == Some(txn))
        {
            return Err(StoreError::Constraint {
                constraint: "unique_payment_transaction".to_string(),
            });
        }
        if payment.status == PaymentStatus::Pending
            && state
                .payments
                .values()
                .any(|p| p.order_id == payment.order_id && p.status == PaymentStatus::Pending)
        {
            return Err(StoreError::Constraint {
                constraint: "unique_open_payment".to_string(),
            });
        }
        if payment.status == PaymentStatus::Success
            && state
                .payments
                .values()
                .any(|p| p.order_id == payment.order_id && p.status == PaymentStatus::Success)
        {
            return Err(StoreError::Constraint {
                constraint: "unique_successful_payment".to_string(),
            });
        }

        state.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.payments.get(&id).cloned())
    }

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.transaction_id.as_ref() == Some(transaction_id))
            .cloned())
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn update_payment_status(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        next: PaymentStatus,
        payment_data: Option<&Value>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get(&id)
            .ok_or_else(|| StoreError::not_found("payment", id))?;

        if payment.status != expected {
            return Ok(false);
        }
        if next == PaymentStatus::Success {
            let order_id = payment.order_id;
            if state
                .payments
                .values()
                .any(|p| p.id != id && p.order_id == order_id && p.status == PaymentStatus::Success)
            {
                return Err(StoreError::Constraint {
                    constraint: "unique_successful_payment".to_string(),
                });
            }
        }

        let payment = state
            .payments
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("payment", id))?;
        payment.status = next;
        if let Some(data) = payment_data {
            payment.payment_data = Some(data.clone());
        }
        payment.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_outcome_applied(&self, id: PaymentId, outcome: PaymentOutcome) -> Result<()> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("payment", id))?;

        payment.applied_outcome = Some(outcome);
        payment.updated_at = Utc::now();
        Ok(())
    }

    async fn fail_pending_payments(&self, order_id: OrderId) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut moved = 0;
        for payment in state.payments.values_mut() {
            if payment.order_id == order_id && payment.status == PaymentStatus::Pending {
                payment.status = PaymentStatus::Failed;
                payment.applied_outcome = Some(PaymentOutcome::Failed);
                payment.updated_at = Utc::now();
                moved += 1;
            }
        }
        Ok(moved)
    }
}
