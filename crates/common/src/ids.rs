//! Newtype identifiers.
//!
//! UUID-backed newtypes for everything this system mints itself, and a
//! string-backed newtype for the provider-facing transaction reference.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a UUID-backed identifier newtype.
macro_rules! define_uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_uuid_id!(
    /// Unique identifier for an order.
    OrderId
);

define_uuid_id!(
    /// Unique identifier for a single line within an order.
    OrderItemId
);

define_uuid_id!(
    /// Unique identifier for the user who placed an order.
    ///
    /// Supplied already authenticated by the surrounding application;
    /// the core trusts it.
    UserId
);

define_uuid_id!(
    /// Unique identifier for a sellable catalog item (product or package).
    ItemId
);

define_uuid_id!(
    /// Unique identifier for a payment attempt.
    PaymentId
);

define_uuid_id!(
    /// Unique identifier for an inventory reservation.
    ReservationId
);

/// Provider-facing payment transaction reference.
///
/// Unique across all payments when present; cash-on-delivery payments
/// carry none. Opaque to the core beyond equality and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Creates a transaction reference from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TransactionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
