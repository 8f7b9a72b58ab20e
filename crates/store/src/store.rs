use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use common::{ItemId, OrderId, PaymentId, ReservationId, TransactionId, UserId};
use domain::{
    Order, OrderItem, OrderStatus, Payment, PaymentOutcome, PaymentStatus, Reservation,
    ReservationResolution, ReservationState, SellableItem,
};

use crate::{Result, StoreError};

/// Result of attempting to close a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The reservation moved from held to the requested final state.
    Applied,
    /// The reservation had already been closed; carries the state it is in.
    AlreadyResolved(ReservationState),
    /// No reservation with that ID exists.
    NotFound,
}

/// Core trait for checkout store implementations.
///
/// The store is the single synchronization point of the system: every
/// stock movement and every status change goes through one of the
/// compare-and-set or conditional-update operations below, and two
/// callers racing on the same row are ordered by the store, not by
/// in-process locks. All implementations must be thread-safe
/// (Send + Sync).
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    // --- catalog ---

    /// Inserts a catalog item, or replaces it if the ID already exists.
    async fn upsert_item(&self, item: &SellableItem) -> Result<()>;

    /// Fetches a catalog item by ID.
    async fn get_item(&self, item_id: ItemId) -> Result<Option<SellableItem>>;

    /// Adds `delta` units to an item's stock (negative to remove).
    ///
    /// Fails with `Constraint` if the adjustment would take stock below
    /// zero, leaving the count unchanged.
    async fn adjust_stock(&self, item_id: ItemId, delta: i64) -> Result<()>;

    // --- reservations ---

    /// Atomically holds stock for every line of the reservation.
    ///
    /// Either all lines are decremented and the reservation row is
    /// persisted in `Held` state, or nothing changes at all. Repeated
    /// lines for the same item count against that item in aggregate.
    /// Fails with `InsufficientStock` when an item's requested total
    /// exceeds the units on hand and `ItemUnavailable` when any line
    /// names a missing or inactive item.
    async fn reserve_stock(&self, reservation: &Reservation) -> Result<()>;

    /// Fetches a reservation by ID.
    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Fetches the reservation backing an order, if one exists.
    async fn reservation_for_order(&self, order_id: OrderId) -> Result<Option<Reservation>>;

    /// Closes a reservation exactly once.
    ///
    /// Only a `Held` reservation is touched; releasing restores every
    /// held unit to stock in the same atomic step. A reservation that
    /// was already closed reports `AlreadyResolved` with its final
    /// state and is not modified again, so repeated release or commit
    /// calls can never double-restock or double-consume.
    async fn resolve_reservation(
        &self,
        id: ReservationId,
        resolution: ReservationResolution,
    ) -> Result<ResolveOutcome>;

    /// Lists held reservations created before `cutoff`, oldest first.
    async fn expired_reservations(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reservation>>;

    // --- orders ---

    /// Persists an order together with all of its lines atomically.
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()>;

    /// Fetches an order by ID.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Fetches the lines of an order.
    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Lists a user's orders, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Moves an order's status pair with a compare-and-set.
    ///
    /// The row is updated only while it still carries `expected`;
    /// returns false if another writer got there first. The caller
    /// re-reads and re-decides on false rather than overwriting.
    async fn update_order_status(
        &self,
        id: OrderId,
        expected: (OrderStatus, PaymentStatus),
        next: (OrderStatus, PaymentStatus),
    ) -> Result<bool>;

    // --- payments ---

    /// Persists a new payment row.
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    /// Fetches a payment by ID.
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    /// Fetches a payment by its provider transaction reference.
    async fn get_payment_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>>;

    /// Lists the payments recorded against an order, oldest first.
    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>>;

    /// Moves a payment's status with a compare-and-set, optionally
    /// storing the provider payload alongside it.
    ///
    /// Returns false if the payment no longer carries `expected`; the
    /// caller re-reads and re-decides. A `None` payload leaves any
    /// previously stored payload in place.
    async fn update_payment_status(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        next: PaymentStatus,
        payment_data: Option<&Value>,
    ) -> Result<bool>;

    /// Records that the downstream effects of `outcome` have completed.
    ///
    /// Read back through `Payment::applied_outcome`; a replayed report
    /// whose marker is already set skips its side effects.
    async fn mark_outcome_applied(&self, id: PaymentId, outcome: PaymentOutcome) -> Result<()>;

    /// Marks every still-pending payment of an order as failed.
    ///
    /// Returns the number of rows moved. The rows also get their
    /// failed-outcome marker set, so a late provider callback for one
    /// of them reconciles against a settled row whose downstream
    /// effects are already accounted for, instead of quietly capturing
    /// funds or cancelling the order. Used when an order is taken off
    /// the table (cancellation, reservation timeout) and when a fresh
    /// payment attempt supersedes an open one.
    async fn fail_pending_payments(&self, order_id: OrderId) -> Result<u64>;
}

/// Extension trait providing convenience methods for checkout stores.
#[async_trait]
pub trait CheckoutStoreExt: CheckoutStore {
    /// Fetches an order, failing with `NotFound` if it does not exist.
    async fn require_order(&self, id: OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    /// Fetches a payment, failing with `NotFound` if it does not exist.
    async fn require_payment(&self, id: PaymentId) -> Result<Payment> {
        self.get_payment(id)
            .await?
            .ok_or_else(|| StoreError::not_found("payment", id))
    }

    /// Fetches a catalog item, failing with `NotFound` if it does not
    /// exist.
    async fn require_item(&self, id: ItemId) -> Result<SellableItem> {
        self.get_item(id)
            .await?
            .ok_or_else(|| StoreError::not_found("item", id))
    }
}

impl<S: CheckoutStore + ?Sized> CheckoutStoreExt for S {}
