//! Checkout payload and confirmation types.
//!
//! An [`OrderDraft`] carries only product IDs and quantities. Prices are
//! resolved by the backend from the product ID at submission time, so the
//! client never asserts what it paid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cart::Cart;
use super::id::{OrderId, ProductId};

/// Shipping field validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShippingError {
    /// A required field is empty or whitespace.
    #[error("shipping field `{0}` is required")]
    MissingField(&'static str),
}

/// Shipping details entered at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

impl ShippingInfo {
    /// Check that every field is filled in.
    ///
    /// # Errors
    ///
    /// Returns [`ShippingError::MissingField`] naming the first blank field.
    pub fn validate(&self) -> Result<(), ShippingError> {
        let fields = [
            ("fullName", &self.full_name),
            ("address", &self.address),
            ("city", &self.city),
            ("postalCode", &self.postal_code),
            ("country", &self.country),
            ("phone", &self.phone),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ShippingError::MissingField(name));
            }
        }
        Ok(())
    }
}

/// One `{productId, quantity}` pair in an outbound order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Outbound order body.
///
/// Serializes to `{fullName, address, ..., items: [{productId, quantity}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    #[serde(flatten)]
    pub shipping: ShippingInfo,
    pub items: Vec<OrderLine>,
}

impl OrderDraft {
    /// Map cart entries to order lines, in cart order. No validation.
    #[must_use]
    pub fn from_cart(cart: &Cart, shipping: ShippingInfo) -> Self {
        let items = cart
            .entries()
            .iter()
            .map(|e| OrderLine {
                product_id: e.product_id.clone(),
                quantity: e.quantity,
            })
            .collect();
        Self { shipping, items }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Order status reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

/// Backend response to a successful order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub id: OrderId,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl OrderConfirmation {
    /// Route of the confirmation view for this order.
    #[must_use]
    pub fn confirmation_path(&self) -> String {
        format!("/orders/{}", self.id)
    }
}
