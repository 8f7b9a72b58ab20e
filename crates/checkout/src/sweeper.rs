//! Reclaims stock from orders abandoned before payment.
//!
//! A reservation that sits in `held` past the configured timeout means
//! the customer walked away or the provider never answered. The sweep
//! claims the order through the same conditional status update the
//! settlement path uses, so the two can never both win: either the
//! sweep cancels the order and frees the stock, or a settlement got
//! there first and the sweep leaves the reservation alone.

use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::{OrderStatus, PaymentStatus, Reservation};
use serde::{Deserialize, Serialize};
use store::{CheckoutStore, StoreError};

use crate::config::CheckoutConfig;
use crate::error::Result;
use crate::ledger::InventoryLedger;

/// Counters from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Expired reservations the pass looked at.
    pub scanned: usize,
    /// Orders cancelled with their holds released.
    pub cancelled: usize,
    /// Reservations left alone, either because their payment settled
    /// first or because handling them failed.
    pub skipped: usize,
}

/// Cancels orders whose reservations outlived the payment window.
pub struct ReservationSweeper<S> {
    store: Arc<S>,
    ledger: InventoryLedger<S>,
    ttl: Duration,
    batch_limit: i64,
}

impl<S: CheckoutStore> ReservationSweeper<S> {
    pub fn new(store: Arc<S>, config: &CheckoutConfig) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
            ttl: config.reservation_ttl(),
            batch_limit: config.sweep_batch_limit,
        }
    }

    /// One pass over expired holds, oldest first. Reservations are
    /// handled independently; one failure does not stop the batch.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let cutoff = Utc::now() - self.ttl;
        let expired = self
            .store
            .expired_reservations(cutoff, self.batch_limit)
            .await?;
        let mut report = SweepReport {
            scanned: expired.len(),
            ..SweepReport::default()
        };
        for reservation in &expired {
            match self.sweep_one(reservation).await {
                Ok(true) => report.cancelled += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    tracing::error!(
                        reservation_id = %reservation.id,
                        error = %err,
                        "sweep failed for reservation"
                    );
                    report.skipped += 1;
                }
            }
        }
        if report.cancelled > 0 {
            metrics::counter!("reservations_swept_total").increment(report.cancelled as u64);
        }
        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                cancelled = report.cancelled,
                skipped = report.skipped,
                "sweep pass finished"
            );
        }
        Ok(report)
    }

    /// Handles one expired hold. Claiming the order decides ownership:
    /// pending payment rows are failed before the stock goes back, so
    /// a provider callback arriving later reconciles against a settled
    /// failure instead of capturing money for a cancelled order.
    async fn sweep_one(&self, reservation: &Reservation) -> Result<bool> {
        let claim = self
            .store
            .update_order_status(
                reservation.order_id,
                (OrderStatus::Pending, PaymentStatus::Pending),
                (OrderStatus::Cancelled, PaymentStatus::Failed),
            )
            .await;
        match claim {
            Ok(true) => {
                self.store
                    .fail_pending_payments(reservation.order_id)
                    .await?;
                self.ledger.release(reservation.id).await?;
                tracing::info!(
                    order_id = %reservation.order_id,
                    reservation_id = %reservation.id,
                    "expired reservation cancelled its order"
                );
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(StoreError::NotFound { .. }) => {
                // The order was never persisted; just free the hold.
                self.ledger.release(reservation.id).await?;
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }
}
