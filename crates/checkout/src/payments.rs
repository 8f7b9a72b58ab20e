//! Payment lifecycle: initiation and provider reconciliation.
//!
//! Reconciliation is driven by the provider's transaction reference
//! and must hold up under replays, races, and contradictory verdicts.
//! The payment row's conditional status update is the linearization
//! point; whoever wins it owns the downstream effects, and a persisted
//! marker records that those effects ran so replays skip them.

use std::sync::Arc;

use common::{OrderId, TransactionId};
use domain::{
    InvalidTransition, OrderStatus, Payment, PaymentMethod, PaymentOutcome, PaymentStatus,
    ReconcileDecision,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use store::{CheckoutStore, CheckoutStoreExt};
use uuid::Uuid;

use crate::error::{CheckoutError, Result};
use crate::sync::OrderStatusSynchronizer;

/// What a reconciliation call did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// The payment row after the call.
    pub payment: Payment,
    /// True when this call recorded the outcome. False for a replay of
    /// an outcome that was already recorded.
    pub applied: bool,
}

/// Drives payments from initiation through settlement.
pub struct PaymentCoordinator<S> {
    store: Arc<S>,
    sync: OrderStatusSynchronizer<S>,
    retry_limit: u32,
}

impl<S: CheckoutStore> PaymentCoordinator<S> {
    pub fn new(store: Arc<S>, retry_limit: u32) -> Self {
        Self {
            sync: OrderStatusSynchronizer::new(store.clone(), retry_limit),
            store,
            retry_limit,
        }
    }

    /// Starts payment for an order that is awaiting one.
    ///
    /// Cash on delivery settles on the spot: the returned payment is
    /// already successful and the order has moved to processing.
    /// Online payments stay pending, carrying a minted transaction
    /// reference for the provider to quote back in its callback.
    /// Initiating again fails any still-open earlier attempt first, so
    /// only the newest attempt can capture.
    #[tracing::instrument(skip(self))]
    pub async fn initiate(&self, order_id: OrderId) -> Result<Payment> {
        let order = self.store.require_order(order_id).await?;
        if order.status != OrderStatus::Pending || order.payment_status != PaymentStatus::Pending {
            return Err(CheckoutError::validation(format!(
                "order {order_id} is not awaiting payment"
            )));
        }

        let superseded = self.store.fail_pending_payments(order_id).await?;
        if superseded > 0 {
            metrics::counter!("payments_superseded_total").increment(superseded);
            tracing::info!(
                order_id = %order_id,
                count = superseded,
                "superseded open payment attempts"
            );
        }

        let transaction_id = match order.payment_method {
            PaymentMethod::Online => {
                Some(TransactionId::new(format!("txn_{}", Uuid::new_v4().simple())))
            }
            PaymentMethod::Cod => None,
        };
        let payment = Payment::new(
            order.id,
            order.user_id,
            order.total,
            order.payment_method,
            transaction_id,
        );
        self.store.insert_payment(&payment).await?;
        metrics::counter!("payments_initiated_total", "method" => order.payment_method.as_str())
            .increment(1);
        tracing::info!(payment_id = %payment.id, method = %payment.method, "payment initiated");

        if order.payment_method.settles_immediately() {
            let report = self
                .apply_outcome(payment, PaymentOutcome::Success, None)
                .await?;
            return Ok(report.payment);
        }
        Ok(payment)
    }

    /// Records the provider's verdict for a transaction reference.
    ///
    /// Replaying a verdict that is already recorded returns the stored
    /// row with `applied` false and changes nothing. A terminal verdict
    /// that contradicts the recorded one is rejected and the payment
    /// and its order keep their state.
    #[tracing::instrument(skip(self, payload))]
    pub async fn reconcile(
        &self,
        transaction_id: &TransactionId,
        outcome: PaymentOutcome,
        payload: Option<Value>,
    ) -> Result<ReconcileReport> {
        metrics::counter!("payment_reconciliations_total", "outcome" => outcome.as_str())
            .increment(1);
        let payment = self
            .store
            .get_payment_by_transaction(transaction_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("payment", transaction_id))?;
        self.apply_outcome(payment, outcome, payload).await
    }

    /// Decides what the outcome means for the payment's current state
    /// and applies it through the conditional status update. Losing the
    /// update to a concurrent writer re-reads and decides again.
    async fn apply_outcome(
        &self,
        mut payment: Payment,
        outcome: PaymentOutcome,
        payload: Option<Value>,
    ) -> Result<ReconcileReport> {
        for _ in 0..self.retry_limit {
            match payment.status.on_outcome(outcome) {
                ReconcileDecision::Apply(next) => {
                    let moved = self
                        .store
                        .update_payment_status(payment.id, payment.status, next, payload.as_ref())
                        .await?;
                    if !moved {
                        payment = self.store.require_payment(payment.id).await?;
                        continue;
                    }
                    self.run_downstream(&payment, outcome).await?;
                    let payment = self.store.require_payment(payment.id).await?;
                    tracing::info!(
                        payment_id = %payment.id,
                        outcome = %outcome,
                        "payment outcome applied"
                    );
                    return Ok(ReconcileReport {
                        payment,
                        applied: true,
                    });
                }
                ReconcileDecision::Duplicate => {
                    // A true replay, or a worker that recorded the
                    // status and crashed before the downstream marker.
                    if !payment.outcome_applied(outcome) {
                        self.run_downstream(&payment, outcome).await?;
                        payment = self.store.require_payment(payment.id).await?;
                    }
                    return Ok(ReconcileReport {
                        payment,
                        applied: false,
                    });
                }
                ReconcileDecision::Conflict => {
                    metrics::counter!("payment_conflicts_total").increment(1);
                    return Err(CheckoutError::ConflictingOutcome {
                        payment_id: payment.id,
                        stored: payment.status,
                        reported: outcome,
                    });
                }
                ReconcileDecision::Invalid => {
                    return Err(InvalidTransition::payment(
                        payment.status,
                        outcome.target_status(),
                    )
                    .into());
                }
            }
        }
        Err(CheckoutError::Contention {
            entity: "payment",
            id: payment.id.to_string(),
        })
    }

    /// Runs the order-side effects of a settled outcome, then records
    /// the marker that lets replays skip them. The effects themselves
    /// are idempotent, so a crash between the two steps heals on the
    /// next replay.
    async fn run_downstream(&self, payment: &Payment, outcome: PaymentOutcome) -> Result<()> {
        if payment.outcome_applied(outcome) {
            return Ok(());
        }
        self.sync.apply(payment.order_id, outcome).await?;
        self.store.mark_outcome_applied(payment.id, outcome).await?;
        Ok(())
    }
}
