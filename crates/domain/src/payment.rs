//! Payment records and their reconciliation bookkeeping.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::status::{PaymentMethod, PaymentOutcome, PaymentStatus};

/// A payment attempt against an order.
///
/// `applied_outcome` records the last outcome whose downstream effects
/// (order status sync, reservation resolution) have finished. Comparing
/// it against an incoming outcome is what keeps replayed provider
/// callbacks from running those effects twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Provider-facing reference; absent for cash on delivery.
    pub transaction_id: Option<TransactionId>,
    /// Raw provider payload captured at reconciliation time.
    pub payment_data: Option<serde_json::Value>,
    /// Last outcome whose downstream effects completed.
    pub applied_outcome: Option<PaymentOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a pending payment for an order.
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        amount: Money,
        method: PaymentMethod,
        transaction_id: Option<TransactionId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id,
            user_id,
            amount,
            method,
            status: PaymentStatus::Pending,
            transaction_id,
            payment_data: None,
            applied_outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if this outcome's downstream effects already ran.
    pub fn outcome_applied(&self, outcome: PaymentOutcome) -> bool {
        self.applied_outcome == Some(outcome)
    }
}
