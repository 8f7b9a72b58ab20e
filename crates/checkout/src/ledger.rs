//! Stock accounting: reservations and the adjustments around them.
//!
//! All mutations go through the store's conditional updates, so two
//! ledgers working against the same database never oversell. Releasing
//! or committing an already-resolved reservation is a no-op when the
//! resolution matches and an error when it does not; that is what lets
//! retrying callers stay idempotent while cross-purpose callers fail
//! loudly.

use std::sync::Arc;

use common::{ItemId, OrderId, ReservationId};
use domain::{
    CartLine, InvalidTransition, Reservation, ReservationResolution, SellableItem, merge_lines,
};
use store::{CheckoutStore, ResolveOutcome};

use crate::error::{CheckoutError, Result};

/// Guarded access to item stock.
pub struct InventoryLedger<S> {
    store: Arc<S>,
}

impl<S: CheckoutStore> InventoryLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Holds stock for every line of an order, or for none of them.
    ///
    /// Duplicate lines for the same item are merged before the hold is
    /// taken. On success the returned reservation is already persisted
    /// in the `held` state.
    #[tracing::instrument(skip(self, lines), fields(order_id = %order_id))]
    pub async fn reserve(&self, order_id: OrderId, lines: Vec<CartLine>) -> Result<Reservation> {
        if lines.is_empty() {
            return Err(CheckoutError::validation("reservation has no lines"));
        }
        if lines.iter().any(|line| line.quantity == 0) {
            return Err(CheckoutError::validation("line quantity must be positive"));
        }
        let reservation = Reservation::new(order_id, merge_lines(&lines));
        match self.store.reserve_stock(&reservation).await {
            Ok(()) => {
                tracing::debug!(reservation_id = %reservation.id, "stock held");
                Ok(reservation)
            }
            Err(err) => {
                let err = CheckoutError::from(err);
                if matches!(err, CheckoutError::OutOfStock { .. }) {
                    metrics::counter!("checkout_out_of_stock_total").increment(1);
                }
                Err(err)
            }
        }
    }

    /// Returns held units to stock. Releasing twice is fine; releasing
    /// a committed reservation is not.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, id: ReservationId) -> Result<()> {
        self.resolve(id, ReservationResolution::Release).await
    }

    /// Makes the hold permanent. Committing twice is fine; committing
    /// a released reservation is not.
    #[tracing::instrument(skip(self))]
    pub async fn commit(&self, id: ReservationId) -> Result<()> {
        self.resolve(id, ReservationResolution::Commit).await
    }

    /// Registers or replaces a sellable item.
    pub async fn add_item(&self, item: &SellableItem) -> Result<()> {
        self.store.upsert_item(item).await?;
        Ok(())
    }

    /// Adds to (or subtracts from) an item's free stock. The store
    /// rejects adjustments that would push stock below zero.
    #[tracing::instrument(skip(self))]
    pub async fn restock(&self, item_id: ItemId, delta: i64) -> Result<()> {
        self.store.adjust_stock(item_id, delta).await?;
        Ok(())
    }

    async fn resolve(&self, id: ReservationId, resolution: ReservationResolution) -> Result<()> {
        match self.store.resolve_reservation(id, resolution).await? {
            ResolveOutcome::Applied => Ok(()),
            ResolveOutcome::AlreadyResolved(state) if state == resolution.target_state() => Ok(()),
            ResolveOutcome::AlreadyResolved(state) => {
                Err(InvalidTransition::reservation(state, resolution.target_state()).into())
            }
            ResolveOutcome::NotFound => Err(CheckoutError::not_found("reservation", id)),
        }
    }
}
