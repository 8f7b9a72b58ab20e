//! Domain types for the storefront checkout core.
//!
//! Pure data and transition rules: catalog items, orders, payments,
//! stock reservations, and the state machines tying them together.
//! Persistence and orchestration live in the `store` and `checkout`
//! crates; nothing here performs IO.

pub mod catalog;
pub mod money;
pub mod order;
pub mod payment;
pub mod reservation;
pub mod status;

pub use catalog::{CartLine, ItemKind, SellableItem, merge_lines};
pub use money::Money;
pub use order::{Order, OrderItem, order_total};
pub use payment::Payment;
pub use reservation::{Reservation, ReservationResolution, ReservationState};
pub use status::{
    InvalidTransition, OrderStatus, PaymentMethod, PaymentOutcome, PaymentStatus,
    ReconcileDecision,
};
