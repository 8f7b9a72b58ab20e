//! Sellable catalog entries and incoming cart lines.

use chrono::{DateTime, Utc};
use common::ItemId;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// What kind of catalog entry an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A single physical product.
    Product,
    /// A bundle sold as one unit with one price and one stock count.
    Package,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Product => "product",
            ItemKind::Package => "package",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "product" => Some(ItemKind::Product),
            "package" => Some(ItemKind::Package),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A purchasable catalog entry with live stock.
///
/// `stock` is the on-hand count available for new reservations; units
/// held by open reservations are already subtracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellableItem {
    pub id: ItemId,
    pub name: String,
    pub kind: ItemKind,
    pub price: Money,
    pub stock: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl SellableItem {
    /// Creates a new product with a fresh ID.
    pub fn product(name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self::new(name, ItemKind::Product, price, stock)
    }

    /// Creates a new package with a fresh ID.
    pub fn package(name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self::new(name, ItemKind::Package, price, stock)
    }

    fn new(name: impl Into<String>, kind: ItemKind, price: Money, stock: u32) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            kind,
            price,
            stock,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the item can be placed in a new order.
    pub fn is_orderable(&self) -> bool {
        self.is_active
    }
}

/// One line of an incoming cart: an item and how many of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: ItemId,
    pub quantity: u32,
}

impl CartLine {
    pub fn new(item_id: ItemId, quantity: u32) -> Self {
        Self { item_id, quantity }
    }
}

/// Collapses repeated item IDs into single lines by summing quantities.
///
/// First-seen order is preserved so totals and receipts list items the
/// way the customer entered them.
pub fn merge_lines(lines: &[CartLine]) -> Vec<CartLine> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.item_id == line.item_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(*line),
        }
    }
    merged
}
