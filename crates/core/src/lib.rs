//! Storefront Sync Core - Shared types library.
//!
//! This crate provides the value types used across the storefront sync workspace:
//! - `storefront` - Store adapter, cart manager, session publisher and checkout
//! - `cli` - Command-line driver over a file-backed origin
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no storage
//! access, no HTTP clients. The cart mutation algebra lives here so the
//! persisted cart and the checkout stepper's in-memory copy share it.
//!
//! # Modules
//!
//! - [`types`] - IDs, prices, emails, cart entries, session and order types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
