//! Persistence layer for the storefront checkout core.
//!
//! Defines the [`CheckoutStore`] trait plus two implementations: an
//! in-memory store for tests and a PostgreSQL store for production.
//! Every conditional update the checkout flow relies on (stock holds,
//! status compare-and-sets, one-shot reservation resolution) is part
//! of the trait contract, so the two implementations are
//! interchangeable.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{CheckoutStore, CheckoutStoreExt, ResolveOutcome};
