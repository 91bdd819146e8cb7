//! Outbound collaborator APIs.
//!
//! # APIs
//!
//! - [`UserApi`] - `GET users/me` with bearer auth
//! - [`OrderApi`] - `POST orders` with bearer auth
//! - [`CatalogApi`] - `GET products/{id}`, unauthenticated, display data only
//!
//! Every call is single-attempt: no timeout, no backoff, no retry. Callers
//! surface a failure once and the user re-triggers the action.
//!
//! [`HttpApi`] implements all three over `reqwest`. Tests and alternative
//! hosts plug in their own implementations.

mod http;

pub use http::HttpApi;

use std::future::Future;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_sync_core::{
    CartItemTemplate, OrderConfirmation, OrderDraft, ProductId, SessionToken, User,
};

/// Errors that can occur when calling a collaborator API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure (connection refused, DNS, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The bearer token was rejected (401/403).
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource not found (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// Response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Whether the server rejected the credentials.
    #[must_use]
    pub const fn is_credential_expired(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Catalog display data for one product.
///
/// Never used as a checkout price source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub alt_names: Vec<String>,
    /// Current selling price.
    pub price: Decimal,
    /// Reference price before discounts; the selling price when absent.
    #[serde(default)]
    pub label_price: Option<Decimal>,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
}

impl From<&CatalogProduct> for CartItemTemplate {
    fn from(product: &CatalogProduct) -> Self {
        Self {
            name: product.name.clone(),
            alt_names: product.alt_names.clone(),
            unit_price: product.price,
            label_price: product.label_price.unwrap_or(product.price),
            image_ref: product.image_ref.clone(),
            stock_hint: product.stock,
        }
    }
}

/// `GET current-user`.
pub trait UserApi: Send + Sync {
    /// Fetch the user the token belongs to.
    fn current_user(
        &self,
        token: &SessionToken,
    ) -> impl Future<Output = Result<User, ApiError>> + Send;
}

/// `POST order`.
pub trait OrderApi: Send + Sync {
    /// Submit an order draft. The server prices it from product IDs.
    fn submit_order(
        &self,
        token: &SessionToken,
        draft: &OrderDraft,
    ) -> impl Future<Output = Result<OrderConfirmation, ApiError>> + Send;
}

/// `GET product catalog`.
pub trait CatalogApi: Send + Sync {
    /// Resolve display data for a product.
    fn product(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<CatalogProduct, ApiError>> + Send;
}
