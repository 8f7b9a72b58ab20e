//! Keeps order status, payment status, and the stock reservation in
//! step with settled payment outcomes, and hosts the manual fulfilment
//! transitions.
//!
//! Every write goes through the store's conditional status update, so
//! concurrent workers applying the same outcome converge on one state
//! and the loser of a race re-reads before deciding again. The methods
//! here are safe to replay; callers retrying after a crash land on the
//! state the first attempt produced.

use std::sync::Arc;

use common::OrderId;
use domain::{
    InvalidTransition, Order, OrderStatus, PaymentOutcome, PaymentStatus, ReservationResolution,
};
use store::{CheckoutStore, CheckoutStoreExt};

use crate::error::{CheckoutError, Result};
use crate::ledger::InventoryLedger;

/// Applies payment outcomes and manual transitions to orders.
pub struct OrderStatusSynchronizer<S> {
    store: Arc<S>,
    ledger: InventoryLedger<S>,
    retry_limit: u32,
}

impl<S: CheckoutStore> OrderStatusSynchronizer<S> {
    pub fn new(store: Arc<S>, retry_limit: u32) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
            retry_limit,
        }
    }

    /// Applies a settled payment outcome to the order that owns the
    /// payment: moves the status pair, then commits or releases the
    /// stock reservation. Replaying the same outcome is harmless.
    #[tracing::instrument(skip(self))]
    pub async fn apply(&self, order_id: OrderId, outcome: PaymentOutcome) -> Result<()> {
        self.shift_status(order_id, |order| {
            Ok(outcome.order_effect(order.status, order.payment_status))
        })
        .await?;
        if let Some(resolution) = outcome.reservation_effect() {
            self.resolve_reservation(order_id, resolution).await?;
        }
        Ok(())
    }

    /// Walks the order one step along the fulfilment path:
    /// processing to shipped, shipped to delivered. Anything else is
    /// rejected, including skips and backward moves.
    #[tracing::instrument(skip(self))]
    pub async fn advance(&self, order_id: OrderId, to: OrderStatus) -> Result<Order> {
        self.shift_status(order_id, |order| {
            let next = order.status.advance_to(to)?;
            Ok((next, order.payment_status))
        })
        .await
    }

    /// Cancels an order whose payment has not resolved yet. The held
    /// stock goes back, and any pending payment rows are failed so a
    /// late provider callback reconciles against a settled failure
    /// instead of quietly succeeding.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<Order> {
        let order = self
            .shift_status(order_id, |order| {
                if !order.can_cancel() {
                    return Err(
                        InvalidTransition::order(order.status, OrderStatus::Cancelled).into()
                    );
                }
                Ok((OrderStatus::Cancelled, PaymentStatus::Failed))
            })
            .await?;
        self.store.fail_pending_payments(order_id).await?;
        self.resolve_reservation(order_id, ReservationResolution::Release)
            .await?;
        tracing::info!(order_id = %order_id, "order cancelled");
        Ok(order)
    }

    /// Compare-and-set loop over the order's status pair. `decide`
    /// sees the current row and names the pair to write; returning the
    /// current pair means the work is already done.
    async fn shift_status<F>(&self, order_id: OrderId, decide: F) -> Result<Order>
    where
        F: Fn(&Order) -> Result<(OrderStatus, PaymentStatus)>,
    {
        for _ in 0..self.retry_limit {
            let order = self.store.require_order(order_id).await?;
            let current = (order.status, order.payment_status);
            let target = decide(&order)?;
            if current == target {
                return Ok(order);
            }
            if self
                .store
                .update_order_status(order_id, current, target)
                .await?
            {
                return Ok(self.store.require_order(order_id).await?);
            }
            // lost a race; re-read and decide again
        }
        Err(CheckoutError::Contention {
            entity: "order",
            id: order_id.to_string(),
        })
    }

    /// Resolves the order's reservation, tolerating resolutions that a
    /// concurrent cancel or sweep already applied.
    async fn resolve_reservation(
        &self,
        order_id: OrderId,
        resolution: ReservationResolution,
    ) -> Result<()> {
        let Some(reservation) = self.store.reservation_for_order(order_id).await? else {
            tracing::warn!(order_id = %order_id, "order has no reservation to resolve");
            return Ok(());
        };
        let result = match resolution {
            ReservationResolution::Commit => self.ledger.commit(reservation.id).await,
            ReservationResolution::Release => self.ledger.release(reservation.id).await,
        };
        match result {
            Err(CheckoutError::InvalidTransition(err)) => {
                // A timed-out sweep and a late settlement can cross;
                // the resolution that landed first stands.
                tracing::warn!(
                    order_id = %order_id,
                    error = %err,
                    "reservation was already resolved the other way"
                );
                Ok(())
            }
            other => other,
        }
    }
}
