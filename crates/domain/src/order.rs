//! Order and order line records.

use chrono::{DateTime, Utc};
use common::{ItemId, OrderId, OrderItemId, UserId};
use serde::{Deserialize, Serialize};

use crate::catalog::SellableItem;
use crate::money::Money;
use crate::status::{OrderStatus, PaymentMethod, PaymentStatus};

/// A customer order.
///
/// `status` tracks fulfilment and `payment_status` tracks settlement;
/// the pair only ever changes together through the transition rules in
/// [`crate::status`]. `total` is fixed at creation time from the price
/// snapshots in the order's lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a freshly placed order awaiting payment.
    ///
    /// The ID is supplied by the caller because the stock reservation
    /// taken just before persisting already refers to it.
    pub fn new(
        id: OrderId,
        user_id: UserId,
        payment_method: PaymentMethod,
        shipping_address: impl Into<String>,
        total: Money,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            total,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method,
            shipping_address: shipping_address.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the order may still be cancelled by hand.
    ///
    /// Cancellation is only open while payment is unresolved; once the
    /// provider has answered, the failure path or the refund flow owns
    /// the order.
    pub fn can_cancel(&self) -> bool {
        self.payment_status == PaymentStatus::Pending && !self.status.is_terminal()
    }
}

/// One line of an order, with the item's name and unit price frozen at
/// the moment the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    /// Snapshots a catalog item into an order line.
    ///
    /// Later price or name changes to the catalog entry do not reach
    /// rows created here.
    pub fn snapshot(order_id: OrderId, item: &SellableItem, quantity: u32) -> Self {
        Self {
            id: OrderItemId::new(),
            order_id,
            item_id: item.id,
            item_name: item.name.clone(),
            quantity,
            unit_price: item.price,
        }
    }

    /// Returns the total for this line (quantity * unit_price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Sums the line totals of an order's items.
pub fn order_total(items: &[OrderItem]) -> Money {
    let mut total = Money::zero();
    for item in items {
        total += item.line_total();
    }
    total
}
