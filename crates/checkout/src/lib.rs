//! Checkout services for the storefront: order placement, payment
//! reconciliation, fulfilment, and reservation sweeping.
//!
//! The crate is organised around four collaborators that all talk to
//! the same [`store::CheckoutStore`]:
//!
//! - [`InventoryLedger`] holds and resolves stock reservations
//! - [`OrderBuilder`] turns carts into persisted orders
//! - [`PaymentCoordinator`] settles payments and absorbs provider
//!   callbacks
//! - [`OrderStatusSynchronizer`] keeps orders in step with payment
//!   outcomes and hosts the manual fulfilment moves
//!
//! [`CheckoutService`] wires them together behind one handle, and
//! [`ReservationSweeper`] reclaims stock from abandoned checkouts.

pub mod builder;
pub mod config;
pub mod error;
pub mod ledger;
pub mod payments;
pub mod service;
pub mod sweeper;
pub mod sync;
pub mod telemetry;

pub use builder::{NewOrder, OrderBuilder};
pub use config::CheckoutConfig;
pub use error::{CheckoutError, Result};
pub use ledger::InventoryLedger;
pub use payments::{PaymentCoordinator, ReconcileReport};
pub use service::CheckoutService;
pub use sweeper::{ReservationSweeper, SweepReport};
pub use sync::OrderStatusSynchronizer;
