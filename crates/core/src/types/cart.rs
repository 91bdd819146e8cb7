//! Cart line items and the cart mutation algebra.
//!
//! A [`Cart`] is an ordered list of [`CartEntry`] values keyed by
//! [`ProductId`]. Insertion order is preserved, product IDs are unique and
//! every exposed quantity is at least 1. The persisted form is a bare JSON
//! array with camelCase field names.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// One product line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEntry {
    /// Unique key within a cart.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Alternate display names (translations, short names). Display only.
    #[serde(default)]
    pub alt_names: Vec<String>,
    /// Price shown at render time.
    pub unit_price: Decimal,
    /// Pre-discount reference price.
    pub label_price: Decimal,
    /// Image reference (URL or asset key).
    #[serde(default)]
    pub image_ref: Option<String>,
    /// Always at least 1.
    pub quantity: u32,
    /// Stock level reported when the entry was last resolved. Not enforced.
    #[serde(default)]
    pub stock_hint: Option<i64>,
}

impl CartEntry {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// `label_price × quantity`.
    #[must_use]
    pub fn line_label_total(&self) -> Decimal {
        self.label_price * Decimal::from(self.quantity)
    }
}

/// Display data used to create a new entry the first time a product is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemTemplate {
    pub name: String,
    #[serde(default)]
    pub alt_names: Vec<String>,
    pub unit_price: Decimal,
    pub label_price: Decimal,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub stock_hint: Option<i64>,
}

impl CartItemTemplate {
    /// Build an entry for `product_id` with the given quantity.
    #[must_use]
    pub fn to_entry(&self, product_id: ProductId, quantity: u32) -> CartEntry {
        CartEntry {
            product_id,
            name: self.name.clone(),
            alt_names: self.alt_names.clone(),
            unit_price: self.unit_price,
            label_price: self.label_price,
            image_ref: self.image_ref.clone(),
            quantity,
            stock_hint: self.stock_hint,
        }
    }
}

/// Outcome of [`Cart::adjust_quantity_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// A new entry was inserted with this quantity.
    Inserted(u32),
    /// An existing entry now has this quantity.
    Updated(u32),
    /// The entry dropped to zero or below and was removed.
    Removed,
    /// Nothing changed (absent product with a non-positive delta or no template).
    Unchanged,
}

impl QuantityChange {
    /// Whether the cart was modified.
    #[must_use]
    pub const fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Cart price summary.
///
/// `discount` is `nominal - actual` and is negative when an entry's unit
/// price exceeds its label price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CartTotals {
    /// Σ label price × quantity.
    pub nominal: Decimal,
    /// Σ unit price × quantity.
    pub actual: Decimal,
    /// `nominal - actual`.
    pub discount: Decimal,
}

/// Ordered collection of cart entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<CartEntry>", into = "Vec<CartEntry>")]
pub struct Cart {
    entries: Vec<CartEntry>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a cart from raw entries, restoring the invariants.
    ///
    /// Entries with quantity 0 are dropped. Duplicate product IDs are folded
    /// into the first occurrence by summing quantities, so a document written
    /// by a misbehaving writer still loads as a valid cart.
    #[must_use]
    pub fn from_entries(entries: Vec<CartEntry>) -> Self {
        let mut cart = Self::new();
        for entry in entries {
            if entry.quantity == 0 {
                continue;
            }
            match cart.position(&entry.product_id) {
                Some(idx) => {
                    if let Some(existing) = cart.entries.get_mut(idx) {
                        existing.quantity = existing.quantity.saturating_add(entry.quantity);
                    }
                }
                None => cart.entries.push(entry),
            }
        }
        cart
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[CartEntry] {
        &self.entries
    }

    /// Consume the cart and return its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<CartEntry> {
        self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up an entry by product.
    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&CartEntry> {
        self.entries.iter().find(|e| &e.product_id == product_id)
    }

    /// Current quantity for a product, 0 when absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.get(product_id).map_or(0, |e| e.quantity)
    }

    fn position(&self, product_id: &ProductId) -> Option<usize> {
        self.entries.iter().position(|e| &e.product_id == product_id)
    }

    /// Add `delta` to a product's quantity.
    ///
    /// - absent and `delta > 0` with a template: inserted with `quantity = delta`
    /// - present: `quantity + delta`, removed when the result is `<= 0`
    /// - otherwise unchanged
    ///
    /// Quantities saturate at `u32::MAX`.
    pub fn adjust_quantity_by(
        &mut self,
        product_id: &ProductId,
        delta: i64,
        template_if_new: Option<&CartItemTemplate>,
    ) -> QuantityChange {
        match self.position(product_id) {
            Some(idx) => {
                let current = self.entries.get(idx).map_or(0, |e| e.quantity);
                let next = i64::from(current).saturating_add(delta);
                if next <= 0 {
                    self.entries.remove(idx);
                    return QuantityChange::Removed;
                }
                let next = u32::try_from(next).unwrap_or(u32::MAX);
                if let Some(entry) = self.entries.get_mut(idx) {
                    entry.quantity = next;
                }
                QuantityChange::Updated(next)
            }
            None => {
                let Some(template) = template_if_new else {
                    return QuantityChange::Unchanged;
                };
                if delta <= 0 {
                    return QuantityChange::Unchanged;
                }
                let quantity = u32::try_from(delta).unwrap_or(u32::MAX);
                self.entries
                    .push(template.to_entry(product_id.clone(), quantity));
                QuantityChange::Inserted(quantity)
            }
        }
    }

    /// Set an absolute quantity, clamped to at least 1.
    ///
    /// Never removes an entry. Returns `false` when the product is absent.
    pub fn set_quantity_to(&mut self, product_id: &ProductId, new_quantity: u32) -> bool {
        match self.entries.iter_mut().find(|e| &e.product_id == product_id) {
            Some(entry) => {
                entry.quantity = new_quantity.max(1);
                true
            }
            None => false,
        }
    }

    /// Remove a product regardless of its quantity. Returns whether it was present.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.product_id != product_id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Nominal, actual and discount totals.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        let (nominal, actual) = self
            .entries
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(nominal, actual), e| {
                (nominal + e.line_label_total(), actual + e.line_total())
            });
        CartTotals {
            nominal,
            actual,
            discount: nominal - actual,
        }
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.quantity)).sum()
    }

    /// Mutable access for display-data refreshes. Product IDs and quantities
    /// must not be changed through this.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut CartEntry> {
        self.entries.iter_mut()
    }
}

impl From<Vec<CartEntry>> for Cart {
    fn from(entries: Vec<CartEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<Cart> for Vec<CartEntry> {
    fn from(cart: Cart) -> Self {
        cart.entries
    }
}
