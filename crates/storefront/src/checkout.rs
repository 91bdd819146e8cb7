//! Checkout orchestration.
//!
//! A checkout attempt works from a [`CartSnapshot`]. The orchestrator turns
//! it into an [`OrderDraft`] of product IDs and quantities only, submits it
//! once, and clears the persisted cart on success. On failure the persisted
//! cart is left exactly as it was.
//!
//! The checkout stepper ([`CheckoutSession`]) edits an in-memory copy of the
//! cart with the same primitives the cart manager uses. Whether each edit is
//! written through immediately or only on [`CheckoutSession::commit`] is set
//! by [`MirrorPolicy`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use storefront_sync_core::{
    Cart, CartItemTemplate, CartTotals, OrderConfirmation, OrderDraft, ProductId, ShippingError,
    ShippingInfo,
};

use crate::api::{ApiError, OrderApi};
use crate::cart::CartManager;
use crate::error::add_breadcrumb;
use crate::session::stored_token;
use crate::storage::Store;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Nothing to order.
    #[error("Cart is empty")]
    EmptyCart,

    /// Shipping details incomplete.
    #[error("Invalid shipping details: {0}")]
    Shipping(#[from] ShippingError),

    /// No bearer token is stored.
    #[error("Not signed in")]
    NotAuthenticated,

    /// The backend rejected the bearer token.
    #[error("Session expired")]
    CredentialExpired,

    /// The order could not be submitted.
    #[error("Order submission failed: {0}")]
    Submission(#[source] ApiError),
}

impl CheckoutError {
    /// Whether the failure was caught locally before any network call.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyCart | Self::Shipping(_))
    }

    /// Whether the user can simply try again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Submission(_))
    }
}

impl From<ApiError> for CheckoutError {
    fn from(err: ApiError) -> Self {
        if err.is_credential_expired() {
            Self::CredentialExpired
        } else {
            Self::Submission(err)
        }
    }
}

/// How checkout stepper edits reach the persisted cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirrorPolicy {
    /// Re-persist the whole in-memory cart after every edit.
    #[default]
    Immediate,
    /// Persist only on [`CheckoutSession::commit`].
    OnCommit,
}

impl FromStr for MirrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "on_commit" | "on-commit" => Ok(Self::OnCommit),
            other => Err(format!(
                "unknown mirror policy '{other}', expected 'immediate' or 'on_commit'"
            )),
        }
    }
}

impl fmt::Display for MirrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("immediate"),
            Self::OnCommit => f.write_str("on_commit"),
        }
    }
}

/// Immutable copy of the cart for one checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    cart: Cart,
    taken_at: DateTime<Utc>,
}

impl CartSnapshot {
    #[must_use]
    pub fn new(cart: Cart) -> Self {
        Self {
            cart,
            taken_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    #[must_use]
    pub const fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        self.cart.totals()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cart.is_empty()
    }
}

/// Turns cart snapshots into submitted orders.
#[derive(Clone)]
pub struct CheckoutOrchestrator<A> {
    cart: CartManager,
    store: Store,
    api: A,
    mirror: MirrorPolicy,
}

impl<A: OrderApi> CheckoutOrchestrator<A> {
    #[must_use]
    pub const fn new(cart: CartManager, store: Store, api: A, mirror: MirrorPolicy) -> Self {
        Self {
            cart,
            store,
            api,
            mirror,
        }
    }

    #[must_use]
    pub const fn mirror_policy(&self) -> MirrorPolicy {
        self.mirror
    }

    /// Copy the current persisted cart.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot::new(self.cart.get_cart())
    }

    /// Build the outbound order for `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::EmptyCart`] for an empty snapshot and
    /// [`CheckoutError::Shipping`] when a shipping field is blank.
    pub fn build_order_draft(
        &self,
        snapshot: &CartSnapshot,
        shipping: ShippingInfo,
    ) -> Result<OrderDraft, CheckoutError> {
        build_order_draft(snapshot, shipping)
    }

    /// Submit `draft` once with the stored bearer token.
    ///
    /// On success the persisted cart is cleared and the confirmation is
    /// returned. On any failure the persisted cart is not touched.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::EmptyCart`] / [`CheckoutError::Shipping`] if the
    ///   draft is invalid (no request is made)
    /// - [`CheckoutError::NotAuthenticated`] if no token is stored
    /// - [`CheckoutError::CredentialExpired`] if the backend rejects the token
    /// - [`CheckoutError::Submission`] for any other failure
    #[instrument(skip_all, fields(items = draft.items.len()))]
    pub async fn submit(&self, draft: &OrderDraft) -> Result<OrderConfirmation, CheckoutError> {
        if draft.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        draft.shipping.validate()?;

        let token = stored_token(&self.store).ok_or(CheckoutError::NotAuthenticated)?;

        add_breadcrumb("checkout", "Submitting order", None);

        match self.api.submit_order(&token, draft).await {
            Ok(confirmation) => {
                if !self.cart.clear() {
                    warn!(order_id = %confirmation.id, "order placed but cart could not be cleared");
                }
                info!(order_id = %confirmation.id, "order submitted");
                add_breadcrumb(
                    "checkout",
                    "Order submitted",
                    Some(&[("order_id", confirmation.id.as_str())]),
                );
                Ok(confirmation)
            }
            Err(e) => {
                let err = CheckoutError::from(e);
                let event_id = sentry::capture_error(&err);
                error!(
                    error = %err,
                    sentry_event_id = %event_id,
                    "order submission failed, cart left unchanged"
                );
                Err(err)
            }
        }
    }

    /// Start a checkout stepper over a fresh snapshot.
    #[must_use]
    pub fn begin(&self) -> CheckoutSession {
        CheckoutSession {
            cart: self.cart.get_cart(),
            manager: self.cart.clone(),
            mirror: self.mirror,
            dirty: false,
        }
    }
}

fn build_order_draft(
    snapshot: &CartSnapshot,
    shipping: ShippingInfo,
) -> Result<OrderDraft, CheckoutError> {
    if snapshot.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    shipping.validate()?;
    Ok(OrderDraft::from_cart(snapshot.cart(), shipping))
}

/// In-memory cart copy edited during checkout.
#[derive(Debug)]
pub struct CheckoutSession {
    cart: Cart,
    manager: CartManager,
    mirror: MirrorPolicy,
    dirty: bool,
}

impl CheckoutSession {
    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        self.cart.totals()
    }

    /// Whether edits are waiting for [`CheckoutSession::commit`].
    #[must_use]
    pub const fn has_pending_changes(&self) -> bool {
        self.dirty
    }

    pub fn adjust_quantity_by(
        &mut self,
        product_id: &ProductId,
        delta: i64,
        template_if_new: Option<&CartItemTemplate>,
    ) -> &Cart {
        let changed = self
            .cart
            .adjust_quantity_by(product_id, delta, template_if_new)
            .is_change();
        self.edited(changed)
    }

    pub fn set_quantity_to(&mut self, product_id: &ProductId, new_quantity: u32) -> &Cart {
        let changed = self.cart.set_quantity_to(product_id, new_quantity);
        self.edited(changed)
    }

    pub fn remove(&mut self, product_id: &ProductId) -> &Cart {
        let changed = self.cart.remove(product_id);
        self.edited(changed)
    }

    /// Write pending edits to the persisted cart. Returns whether anything
    /// was written; edits stay pending when the write fails.
    pub fn commit(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        if !self.manager.replace(&self.cart) {
            warn!("checkout edits not persisted, keeping them pending");
            return false;
        }
        self.dirty = false;
        true
    }

    /// Freeze the edited cart for submission.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot::new(self.cart.clone())
    }

    fn edited(&mut self, changed: bool) -> &Cart {
        if changed {
            match self.mirror {
                MirrorPolicy::Immediate => {
                    // Left for the next commit if storage refused it
                    self.dirty = !self.manager.replace(&self.cart);
                }
                MirrorPolicy::OnCommit => self.dirty = true,
            }
        }
        &self.cart
    }
}
