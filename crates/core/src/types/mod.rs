//! Core types for the storefront sync workspace.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod order;
pub mod price;
pub mod session;

pub use cart::{Cart, CartEntry, CartItemTemplate, CartTotals, QuantityChange};
pub use email::{Email, EmailError};
pub use id::*;
pub use order::{
    OrderConfirmation, OrderDraft, OrderLine, OrderStatus, ShippingError, ShippingInfo,
};
pub use price::{CurrencyCode, Price};
pub use session::{SessionToken, User, UserRole};
