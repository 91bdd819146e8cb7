//! Per-context handle bundling the store, signal hub and managers.

use std::sync::{Arc, Mutex, PoisonError};

use storefront_sync_core::Cart;

use crate::api::{CatalogApi, HttpApi, OrderApi, UserApi};
use crate::cart::CartManager;
use crate::catalog;
use crate::checkout::{CheckoutOrchestrator, MirrorPolicy};
use crate::session::SessionPublisher;
use crate::signal::{BridgeHandle, Signal, SignalHub, Subscription};
use crate::storage::{Origin, Store};

/// Everything one rendering context needs.
///
/// Cheaply cloneable via `Arc`. Every consumer receives its dependencies
/// from here rather than reaching for globals.
pub struct StorefrontContext<A = HttpApi> {
    inner: Arc<ContextInner<A>>,
}

struct ContextInner<A> {
    store: Store,
    hub: SignalHub,
    cart: CartManager,
    session: SessionPublisher<A>,
    checkout: CheckoutOrchestrator<A>,
    api: A,
    bridge: Mutex<Option<BridgeHandle>>,
}

impl<A> Clone for StorefrontContext<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> StorefrontContext<A>
where
    A: UserApi + OrderApi + CatalogApi + Clone,
{
    /// Open a new context on `origin`.
    #[must_use]
    pub fn open(origin: &Origin, api: A, mirror: MirrorPolicy) -> Self {
        let store = origin.open_context();
        let hub = SignalHub::new();
        let cart = CartManager::new(store.clone(), hub.clone());
        let session = SessionPublisher::new(store.clone(), hub.clone(), api.clone());
        let checkout = CheckoutOrchestrator::new(cart.clone(), store.clone(), api.clone(), mirror);

        Self {
            inner: Arc::new(ContextInner {
                store,
                hub,
                cart,
                session,
                checkout,
                api,
                bridge: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    #[must_use]
    pub fn hub(&self) -> &SignalHub {
        &self.inner.hub
    }

    #[must_use]
    pub fn cart(&self) -> &CartManager {
        &self.inner.cart
    }

    #[must_use]
    pub fn session(&self) -> &SessionPublisher<A> {
        &self.inner.session
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutOrchestrator<A> {
        &self.inner.checkout
    }

    #[must_use]
    pub fn api(&self) -> &A {
        &self.inner.api
    }

    /// Register a view callback for change and reset signals.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        self.inner.hub.subscribe(callback)
    }

    /// Start forwarding other contexts' storage changes as signals.
    ///
    /// Must be called from within a Tokio runtime. Calling it again while
    /// the bridge is running does nothing.
    pub fn start_sync(&self) {
        let mut bridge = self
            .inner
            .bridge
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if bridge.as_ref().is_some_and(|b| !b.is_finished()) {
            return;
        }
        *bridge = Some(self.inner.hub.bridge(&self.inner.store));
    }

    /// Stop forwarding storage changes.
    pub fn stop_sync(&self) {
        self.inner
            .bridge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Refresh cart display data from the catalog.
    pub async fn refresh_cart_display(&self) -> Cart {
        catalog::refresh_display(&self.inner.cart, &self.inner.api).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use storefront_sync_core::{CartItemTemplate, ProductId};
    use tokio::sync::mpsc;
    use url::Url;

    use super::*;
    use crate::signal::SignalSource;

    fn open(origin: &Origin) -> StorefrontContext {
        let api = HttpApi::new(
            Url::parse("http://127.0.0.1:9/").unwrap(),
            Duration::from_secs(60),
        );
        StorefrontContext::open(origin, api, MirrorPolicy::Immediate)
    }

    fn template() -> CartItemTemplate {
        CartItemTemplate {
            name: "Mug".to_string(),
            alt_names: vec![],
            unit_price: Decimal::from(12),
            label_price: Decimal::from(12),
            image_ref: None,
            stock_hint: None,
        }
    }

    #[test]
    fn test_contexts_share_origin_data() {
        let origin = Origin::in_memory();
        let tab_a = open(&origin);
        let tab_b = open(&origin);

        tab_a
            .cart()
            .adjust_quantity_by(&ProductId::new("mug"), 1, Some(&template()));
        assert_eq!(tab_b.cart().item_count(), 1);
        assert_ne!(tab_a.store().context_id(), tab_b.store().context_id());
    }

    #[tokio::test]
    async fn test_start_sync_delivers_other_tabs_changes() {
        let origin = Origin::in_memory();
        let tab_a = open(&origin);
        let tab_b = open(&origin);

        let _ = tab_a.cart().get_cart();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = tab_b.subscribe(move |s| {
            let _ = tx.send(s.clone());
        });
        tab_b.start_sync();
        tab_b.start_sync();

        tab_a
            .cart()
            .adjust_quantity_by(&ProductId::new("mug"), 1, Some(&template()));

        let signal = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(signal.source, SignalSource::External { .. }));

        // Exactly one bridge is running
        let extra = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(extra.is_err());
    }
}
