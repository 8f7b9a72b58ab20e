//! Stock reservations held against an order until payment resolves.

use chrono::{DateTime, Utc};
use common::{ItemId, OrderId, ReservationId};
use serde::{Deserialize, Serialize};

use crate::catalog::CartLine;

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// Stock is held; the outcome of the order is still open.
    #[default]
    Held,
    /// The sale went through; the held units are permanently consumed.
    Committed,
    /// The hold was dropped and the units returned to stock.
    Released,
}

impl ReservationState {
    /// Returns true once the reservation has reached a final state.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ReservationState::Held)
    }

    /// Returns the state as a lowercase string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Held => "held",
            ReservationState::Committed => "committed",
            ReservationState::Released => "released",
        }
    }

    /// Parses a stored state string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "held" => Some(ReservationState::Held),
            "committed" => Some(ReservationState::Committed),
            "released" => Some(ReservationState::Released),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The two ways an open reservation can be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationResolution {
    /// Consume the held units for good.
    Commit,
    /// Return the held units to stock.
    Release,
}

impl ReservationResolution {
    /// The final state this resolution moves the reservation to.
    pub fn target_state(&self) -> ReservationState {
        match self {
            ReservationResolution::Commit => ReservationState::Committed,
            ReservationResolution::Release => ReservationState::Released,
        }
    }
}

/// A hold on stock, taken when an order is placed and resolved exactly
/// once when its payment settles or the hold times out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    /// The held quantities, one line per distinct item.
    pub lines: Vec<CartLine>,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    /// Set when the reservation leaves `Held`.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Creates an open reservation for the given order.
    pub fn new(order_id: OrderId, lines: Vec<CartLine>) -> Self {
        Self {
            id: ReservationId::new(),
            order_id,
            lines,
            state: ReservationState::Held,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Returns true while the reservation still holds stock.
    pub fn is_open(&self) -> bool {
        !self.state.is_resolved()
    }

    /// Units of `item_id` held by this reservation.
    pub fn quantity_for(&self, item_id: ItemId) -> u32 {
        self.lines
            .iter()
            .filter(|line| line.item_id == item_id)
            .map(|line| line.quantity)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reservation_is_open() {
        let order_id = OrderId::new();
        let reservation = Reservation::new(order_id, vec![CartLine::new(ItemId::new(), 2)]);

        assert_eq!(reservation.order_id, order_id);
        assert_eq!(reservation.state, ReservationState::Held);
        assert!(reservation.is_open());
        assert!(reservation.resolved_at.is_none());
    }

    #[test]
    fn test_quantity_for_item() {
        let mug = ItemId::new();
        let print = ItemId::new();
        let reservation = Reservation::new(
            OrderId::new(),
            vec![CartLine::new(mug, 3), CartLine::new(print, 1)],
        );

        assert_eq!(reservation.quantity_for(mug), 3);
        assert_eq!(reservation.quantity_for(print), 1);
        assert_eq!(reservation.quantity_for(ItemId::new()), 0);
    }

    #[test]
    fn test_resolution_target_states() {
        assert_eq!(
            ReservationResolution::Commit.target_state(),
            ReservationState::Committed
        );
        assert_eq!(
            ReservationResolution::Release.target_state(),
            ReservationState::Released
        );
    }

    #[test]
    fn test_resolved_states() {
        assert!(!ReservationState::Held.is_resolved());
        assert!(ReservationState::Committed.is_resolved());
        assert!(ReservationState::Released.is_resolved());
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            ReservationState::Held,
            ReservationState::Committed,
            ReservationState::Released,
        ] {
            assert_eq!(ReservationState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ReservationState::parse("expired"), None);
    }
}
