//! Status enums and the transition rules between them.
//!
//! Order fulfilment and payment settlement run as two coupled state
//! machines. The transition tables live here so every caller (service
//! layer, stores, tests) agrees on which moves are legal; nothing in
//! this module performs IO.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reservation::{ReservationResolution, ReservationState};

/// Error returned when a caller requests a state change the transition
/// table does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid {entity} transition: {from} -> {to}")]
pub struct InvalidTransition {
    /// Which state machine rejected the move.
    pub entity: &'static str,
    /// The state the entity was in.
    pub from: &'static str,
    /// The state the caller asked for.
    pub to: &'static str,
}

impl InvalidTransition {
    pub fn order(from: OrderStatus, to: OrderStatus) -> Self {
        Self {
            entity: "order",
            from: from.as_str(),
            to: to.as_str(),
        }
    }

    pub fn payment(from: PaymentStatus, to: PaymentStatus) -> Self {
        Self {
            entity: "payment",
            from: from.as_str(),
            to: to.as_str(),
        }
    }

    pub fn reservation(from: ReservationState, to: ReservationState) -> Self {
        Self {
            entity: "reservation",
            from: from.as_str(),
            to: to.as_str(),
        }
    }
}

/// Fulfilment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed but payment not yet resolved.
    #[default]
    Pending,
    /// Payment settled; the order is being prepared.
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Received by the customer.
    Delivered,
    /// Abandoned, failed, or cancelled by the user.
    Cancelled,
}

impl OrderStatus {
    /// Returns true if no further fulfilment transition is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Applies a manual fulfilment step.
    ///
    /// Operators may only walk the order forward one step at a time:
    /// `Processing -> Shipped -> Delivered`. Entering `Processing` or
    /// `Cancelled` happens through payment settlement and cancellation,
    /// never through this method.
    pub fn advance_to(self, to: OrderStatus) -> Result<OrderStatus, InvalidTransition> {
        match (self, to) {
            (OrderStatus::Processing, OrderStatus::Shipped) => Ok(OrderStatus::Shipped),
            (OrderStatus::Shipped, OrderStatus::Delivered) => Ok(OrderStatus::Delivered),
            _ => Err(InvalidTransition::order(self, to)),
        }
    }

    /// Returns the status as a lowercase string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settlement state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting confirmation from the provider.
    #[default]
    Pending,
    /// Funds captured.
    Success,
    /// Declined, errored, or timed out.
    Failed,
    /// Captured funds returned to the customer.
    Refunded,
}

impl PaymentStatus {
    /// Returns true once the provider has answered, in any direction.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Returns true if no further settlement transition exists.
    ///
    /// `Success` is resolved but not terminal: a refund may still move
    /// it to `Refunded`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }

    /// Decides what a freshly reported outcome means for this payment.
    ///
    /// The decision is pure bookkeeping; the caller is responsible for
    /// persisting an `Apply` atomically and for surfacing `Conflict`
    /// and `Invalid` as errors.
    pub fn on_outcome(self, outcome: PaymentOutcome) -> ReconcileDecision {
        match (self, outcome) {
            (PaymentStatus::Pending, PaymentOutcome::Success) => {
                ReconcileDecision::Apply(PaymentStatus::Success)
            }
            (PaymentStatus::Pending, PaymentOutcome::Failed) => {
                ReconcileDecision::Apply(PaymentStatus::Failed)
            }
            // A refund can only follow a capture.
            (PaymentStatus::Pending, PaymentOutcome::Refunded) => ReconcileDecision::Invalid,
            (PaymentStatus::Success, PaymentOutcome::Refunded) => {
                ReconcileDecision::Apply(PaymentStatus::Refunded)
            }
            (PaymentStatus::Success, PaymentOutcome::Success)
            | (PaymentStatus::Failed, PaymentOutcome::Failed)
            | (PaymentStatus::Refunded, PaymentOutcome::Refunded) => ReconcileDecision::Duplicate,
            _ => ReconcileDecision::Conflict,
        }
    }

    /// Returns the status as a lowercase string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "success" => Some(PaymentStatus::Success),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a provider callback or manual reconciliation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Failed,
    Refunded,
}

impl PaymentOutcome {
    /// The payment status this outcome settles into.
    pub fn target_status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Success => PaymentStatus::Success,
            PaymentOutcome::Failed => PaymentStatus::Failed,
            PaymentOutcome::Refunded => PaymentStatus::Refunded,
        }
    }

    /// Computes the order-side effect of this outcome.
    ///
    /// Returns the `(order_status, payment_status)` pair the order
    /// should move to. A capture promotes a pending order to
    /// processing; a failure cancels the order only while it is still
    /// awaiting payment; a refund touches only the payment column.
    pub fn order_effect(
        &self,
        status: OrderStatus,
        payment: PaymentStatus,
    ) -> (OrderStatus, PaymentStatus) {
        match self {
            PaymentOutcome::Success => {
                let next = if status == OrderStatus::Pending {
                    OrderStatus::Processing
                } else {
                    status
                };
                (next, PaymentStatus::Success)
            }
            PaymentOutcome::Failed => {
                // A failed superseded attempt must not cancel an
                // order whose payment already resolved.
                if payment != PaymentStatus::Pending {
                    return (status, payment);
                }
                let next = if status.is_terminal() {
                    status
                } else {
                    OrderStatus::Cancelled
                };
                (next, PaymentStatus::Failed)
            }
            PaymentOutcome::Refunded => (status, PaymentStatus::Refunded),
        }
    }

    /// How the order's stock reservation should be resolved, if at all.
    ///
    /// Refunds deliberately leave the reservation alone: the goods have
    /// shipped or are in dispute, and restocking is a manual decision.
    pub fn reservation_effect(&self) -> Option<ReservationResolution> {
        match self {
            PaymentOutcome::Success => Some(ReservationResolution::Commit),
            PaymentOutcome::Failed => Some(ReservationResolution::Release),
            PaymentOutcome::Refunded => None,
        }
    }

    /// Returns the outcome as a lowercase string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Success => "success",
            PaymentOutcome::Failed => "failed",
            PaymentOutcome::Refunded => "refunded",
        }
    }

    /// Parses a stored outcome string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(PaymentOutcome::Success),
            "failed" => Some(PaymentOutcome::Failed),
            "refunded" => Some(PaymentOutcome::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The verdict on a reported outcome against the payment's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileDecision {
    /// The outcome is new; move the payment to this status.
    Apply(PaymentStatus),
    /// The payment already reflects this outcome; report the stored row.
    Duplicate,
    /// The payment settled differently; the report needs human review.
    Conflict,
    /// The outcome is not reachable from the current state at all.
    Invalid,
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash on delivery.
    Cod,
    /// An external payment provider confirms asynchronously.
    Online,
}

impl PaymentMethod {
    /// Returns true if payment settles at order time with no provider
    /// round-trip.
    pub fn settles_immediately(&self) -> bool {
        matches!(self, PaymentMethod::Cod)
    }

    /// Returns the method as a lowercase string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Online => "online",
        }
    }

    /// Parses a stored method string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cod" => Some(PaymentMethod::Cod),
            "online" => Some(PaymentMethod::Online),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_order_manual_advance_allows_forward_steps() {
        assert_eq!(
            OrderStatus::Processing.advance_to(OrderStatus::Shipped),
            Ok(OrderStatus::Shipped)
        );
        assert_eq!(
            OrderStatus::Shipped.advance_to(OrderStatus::Delivered),
            Ok(OrderStatus::Delivered)
        );
    }

    #[test]
    fn test_order_manual_advance_rejects_everything_else() {
        // Backward, skipping, self, and terminal moves all fail.
        let rejected = [
            (OrderStatus::Pending, OrderStatus::Shipped),
            (OrderStatus::Pending, OrderStatus::Processing),
            (OrderStatus::Processing, OrderStatus::Delivered),
            (OrderStatus::Shipped, OrderStatus::Processing),
            (OrderStatus::Delivered, OrderStatus::Shipped),
            (OrderStatus::Delivered, OrderStatus::Delivered),
            (OrderStatus::Cancelled, OrderStatus::Processing),
            (OrderStatus::Processing, OrderStatus::Cancelled),
        ];
        for (from, to) in rejected {
            let err = from.advance_to(to).unwrap_err();
            assert_eq!(err.entity, "order");
            assert_eq!(err.from, from.as_str());
            assert_eq!(err.to, to.as_str());
        }
    }

    #[test]
    fn test_payment_status_predicates() {
        assert!(!PaymentStatus::Pending.is_resolved());
        assert!(PaymentStatus::Success.is_resolved());
        assert!(PaymentStatus::Failed.is_resolved());
        assert!(PaymentStatus::Refunded.is_resolved());

        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Success.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
    }

    #[test]
    fn test_reconcile_pending_accepts_success_and_failure() {
        assert_eq!(
            PaymentStatus::Pending.on_outcome(PaymentOutcome::Success),
            ReconcileDecision::Apply(PaymentStatus::Success)
        );
        assert_eq!(
            PaymentStatus::Pending.on_outcome(PaymentOutcome::Failed),
            ReconcileDecision::Apply(PaymentStatus::Failed)
        );
    }

    #[test]
    fn test_reconcile_refund_requires_capture() {
        assert_eq!(
            PaymentStatus::Pending.on_outcome(PaymentOutcome::Refunded),
            ReconcileDecision::Invalid
        );
        assert_eq!(
            PaymentStatus::Success.on_outcome(PaymentOutcome::Refunded),
            ReconcileDecision::Apply(PaymentStatus::Refunded)
        );
    }

    #[test]
    fn test_reconcile_repeated_outcome_is_duplicate() {
        assert_eq!(
            PaymentStatus::Success.on_outcome(PaymentOutcome::Success),
            ReconcileDecision::Duplicate
        );
        assert_eq!(
            PaymentStatus::Failed.on_outcome(PaymentOutcome::Failed),
            ReconcileDecision::Duplicate
        );
        assert_eq!(
            PaymentStatus::Refunded.on_outcome(PaymentOutcome::Refunded),
            ReconcileDecision::Duplicate
        );
    }

    #[test]
    fn test_reconcile_mismatched_settlement_is_conflict() {
        assert_eq!(
            PaymentStatus::Success.on_outcome(PaymentOutcome::Failed),
            ReconcileDecision::Conflict
        );
        assert_eq!(
            PaymentStatus::Failed.on_outcome(PaymentOutcome::Success),
            ReconcileDecision::Conflict
        );
        assert_eq!(
            PaymentStatus::Failed.on_outcome(PaymentOutcome::Refunded),
            ReconcileDecision::Conflict
        );
        assert_eq!(
            PaymentStatus::Refunded.on_outcome(PaymentOutcome::Success),
            ReconcileDecision::Conflict
        );
        assert_eq!(
            PaymentStatus::Refunded.on_outcome(PaymentOutcome::Failed),
            ReconcileDecision::Conflict
        );
    }

    #[test]
    fn test_success_outcome_promotes_pending_order() {
        let (status, payment) =
            PaymentOutcome::Success.order_effect(OrderStatus::Pending, PaymentStatus::Pending);
        assert_eq!(status, OrderStatus::Processing);
        assert_eq!(payment, PaymentStatus::Success);
    }

    #[test]
    fn test_success_outcome_leaves_advanced_order_alone() {
        let (status, payment) =
            PaymentOutcome::Success.order_effect(OrderStatus::Shipped, PaymentStatus::Success);
        assert_eq!(status, OrderStatus::Shipped);
        assert_eq!(payment, PaymentStatus::Success);
    }

    #[test]
    fn test_failed_outcome_cancels_awaiting_order() {
        let (status, payment) =
            PaymentOutcome::Failed.order_effect(OrderStatus::Pending, PaymentStatus::Pending);
        assert_eq!(status, OrderStatus::Cancelled);
        assert_eq!(payment, PaymentStatus::Failed);
    }

    #[test]
    fn test_failed_outcome_leaves_settled_orders_alone() {
        let (status, payment) =
            PaymentOutcome::Failed.order_effect(OrderStatus::Processing, PaymentStatus::Success);
        assert_eq!(status, OrderStatus::Processing);
        assert_eq!(payment, PaymentStatus::Success);

        let (status, payment) =
            PaymentOutcome::Failed.order_effect(OrderStatus::Shipped, PaymentStatus::Success);
        assert_eq!(status, OrderStatus::Shipped);
        assert_eq!(payment, PaymentStatus::Success);

        let (status, payment) =
            PaymentOutcome::Failed.order_effect(OrderStatus::Processing, PaymentStatus::Refunded);
        assert_eq!(status, OrderStatus::Processing);
        assert_eq!(payment, PaymentStatus::Refunded);
    }

    #[test]
    fn test_refund_outcome_only_touches_payment() {
        let (status, payment) =
            PaymentOutcome::Refunded.order_effect(OrderStatus::Delivered, PaymentStatus::Success);
        assert_eq!(status, OrderStatus::Delivered);
        assert_eq!(payment, PaymentStatus::Refunded);
    }

    #[test]
    fn test_reservation_effects_per_outcome() {
        assert_eq!(
            PaymentOutcome::Success.reservation_effect(),
            Some(ReservationResolution::Commit)
        );
        assert_eq!(
            PaymentOutcome::Failed.reservation_effect(),
            Some(ReservationResolution::Release)
        );
        assert_eq!(PaymentOutcome::Refunded.reservation_effect(), None);
    }

    #[test]
    fn test_payment_method_settlement() {
        assert!(PaymentMethod::Cod.settles_immediately());
        assert!(!PaymentMethod::Online.settles_immediately());
    }

    #[test]
    fn test_status_string_roundtrips() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Success,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        for method in [PaymentMethod::Cod, PaymentMethod::Online] {
            assert_eq!(PaymentMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(OrderStatus::parse("unknown"), None);
        assert_eq!(PaymentStatus::parse(""), None);
    }

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let back: PaymentStatus = serde_json::from_str("\"refunded\"").unwrap();
        assert_eq!(back, PaymentStatus::Refunded);
    }
}
