//! Shared identifier types for the storefront checkout core.
//!
//! Every entity the core persists gets its own newtype so an `OrderId`
//! can never be passed where a `PaymentId` is expected.

pub mod ids;

pub use ids::{ItemId, OrderId, OrderItemId, PaymentId, ReservationId, TransactionId, UserId};
