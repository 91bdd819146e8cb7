//! Client-side cart and session synchronization for the storefront.
//!
//! One [`Origin`](storage::Origin) holds the persisted `cart`, `token` and
//! `user` keys shared by every rendering context of a site. Each context
//! opens a [`StorefrontContext`] on it, which bundles:
//!
//! - [`CartManager`] - cart mutations persisted on every change
//! - [`SessionPublisher`] - login, logout and session reconciliation
//! - [`CheckoutOrchestrator`] - order drafts and single-attempt submission
//! - [`SignalHub`](signal::SignalHub) - change signals for mounted views
//!
//! Storage failures never surface as errors: corrupt values read as absent
//! and failed writes are logged.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod context;
pub mod error;
pub mod session;
pub mod signal;
pub mod storage;

pub use cart::CartManager;
pub use checkout::{CartSnapshot, CheckoutError, CheckoutOrchestrator, CheckoutSession, MirrorPolicy};
pub use config::{ClientConfig, ConfigError};
pub use context::StorefrontContext;
pub use error::ClientError;
pub use session::{Notice, Reconciled, SessionPublisher, SessionState};
