//! Error taxonomy for the checkout services.
//!
//! Every fallible operation in this crate reports one of the variants
//! below. `code` gives each failure class a stable machine-readable
//! name so embedding applications can map errors onto API responses
//! without matching on display strings.

use common::{ItemId, PaymentId};
use domain::{InvalidTransition, PaymentOutcome, PaymentStatus};
use store::StoreError;
use thiserror::Error;

/// Failures surfaced by the checkout services.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request itself is malformed or refers to something that
    /// cannot be ordered.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// Stock could not cover the requested quantity. The whole
    /// reservation was rolled back; no partial holds remain.
    #[error("item {item_id} is out of stock")]
    OutOfStock { item_id: ItemId },

    /// The referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The requested state change is not allowed by the transition
    /// tables.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// A reconciliation reported a terminal outcome that disagrees
    /// with the outcome already recorded for the payment.
    #[error("payment {payment_id} already settled as {stored}, cannot apply {reported}")]
    ConflictingOutcome {
        payment_id: PaymentId,
        stored: PaymentStatus,
        reported: PaymentOutcome,
    },

    /// A conditional update kept losing to concurrent writers and the
    /// retry budget ran out. Safe to retry.
    #[error("{entity} {id} is under contention, retry the operation")]
    Contention { entity: &'static str, id: String },

    /// The backing store failed.
    #[error("persistence failure: {0}")]
    Persistence(#[source] StoreError),
}

impl CheckoutError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable code identifying the failure class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::OutOfStock { .. } => "OUT_OF_STOCK",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::ConflictingOutcome { .. } => "CONFLICTING_OUTCOME",
            Self::Contention { .. } | Self::Persistence(_) => "PERSISTENCE",
        }
    }

    /// Whether retrying the same call can succeed. Only infrastructure
    /// failures qualify; the other variants fail the same way every
    /// time until the underlying state changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention { .. } | Self::Persistence(_))
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientStock { item_id } => Self::OutOfStock { item_id },
            StoreError::ItemUnavailable { item_id } => Self::Validation {
                reason: format!("item {item_id} is not available for ordering"),
            },
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Persistence(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
