//! Persisted cart operations for one rendering context.
//!
//! [`CartManager`] applies the [`Cart`] algebra to the document stored under
//! the `cart` key. Every mutation reads the current document, applies one
//! primitive, rewrites the whole document, publishes a change signal and
//! returns the new snapshot. Nothing on this path awaits.

use tracing::{debug, instrument};

use storefront_sync_core::{Cart, CartItemTemplate, CartTotals, ProductId, QuantityChange};

use crate::error::add_breadcrumb;
use crate::signal::SignalHub;
use crate::storage::{Store, keys};

/// Cart mutation and query operations backed by a [`Store`].
///
/// Cheap to clone; clones share the store and signal hub.
#[derive(Clone, Debug)]
pub struct CartManager {
    store: Store,
    hub: SignalHub,
}

impl CartManager {
    #[must_use]
    pub const fn new(store: Store, hub: SignalHub) -> Self {
        Self { store, hub }
    }

    /// The current cart.
    ///
    /// A missing or corrupt document is replaced with an empty cart on the
    /// spot, so subsequent reads are well-defined.
    #[must_use]
    pub fn get_cart(&self) -> Cart {
        if let Some(cart) = self.store.read::<Cart>(keys::CART) {
            return cart;
        }
        let cart = Cart::new();
        if self.store.write(keys::CART, &cart) {
            debug!("initialized empty cart");
        }
        cart
    }

    /// Add `delta` to a product's quantity, inserting it from `template_if_new`
    /// when absent and removing it when the quantity drops to zero or below.
    #[instrument(skip(self, template_if_new), fields(product_id = %product_id))]
    pub fn adjust_quantity_by(
        &self,
        product_id: &ProductId,
        delta: i64,
        template_if_new: Option<&CartItemTemplate>,
    ) -> Cart {
        let mut cart = self.get_cart();
        let change = cart.adjust_quantity_by(product_id, delta, template_if_new);
        match change {
            QuantityChange::Unchanged => {
                debug!(delta, "adjustment left cart unchanged");
                cart
            }
            QuantityChange::Inserted(q) | QuantityChange::Updated(q) => {
                self.commit(cart, "adjust", product_id, Some(q))
            }
            QuantityChange::Removed => self.commit(cart, "adjust", product_id, None),
        }
    }

    /// Set an absolute quantity, clamped to at least 1. Never removes.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn set_quantity_to(&self, product_id: &ProductId, new_quantity: u32) -> Cart {
        let mut cart = self.get_cart();
        if cart.set_quantity_to(product_id, new_quantity) {
            let quantity = cart.quantity_of(product_id);
            self.commit(cart, "set_quantity", product_id, Some(quantity))
        } else {
            cart
        }
    }

    /// Remove a product regardless of quantity.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn remove(&self, product_id: &ProductId) -> Cart {
        let mut cart = self.get_cart();
        if cart.remove(product_id) {
            self.commit(cart, "remove", product_id, None)
        } else {
            cart
        }
    }

    /// Empty the cart. Returns whether the empty cart was persisted.
    pub fn clear(&self) -> bool {
        if !self.store.write(keys::CART, &Cart::new()) {
            return false;
        }
        add_breadcrumb("cart", "Cleared cart", None);
        self.hub.notify_changed();
        true
    }

    /// Overwrite the persisted cart with `cart`. Returns whether it was
    /// persisted; nothing is published otherwise.
    ///
    /// Used to mirror an edited in-memory copy back to storage.
    pub fn replace(&self, cart: &Cart) -> bool {
        if !self.store.write(keys::CART, cart) {
            return false;
        }
        self.hub.notify_changed();
        true
    }

    /// Nominal, actual and discount totals of the current cart.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        self.get_cart().totals()
    }

    /// Units across all lines, for cart badges.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.get_cart().item_count()
    }

    fn commit(
        &self,
        cart: Cart,
        action: &str,
        product_id: &ProductId,
        quantity: Option<u32>,
    ) -> Cart {
        self.store.write(keys::CART, &cart);

        let quantity = quantity.map_or_else(|| "removed".to_string(), |q| q.to_string());
        add_breadcrumb(
            "cart",
            action,
            Some(&[
                ("product_id", product_id.as_str()),
                ("quantity", quantity.as_str()),
            ]),
        );

        self.hub.notify_changed();
        cart
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;

    use super::*;
    use crate::storage::Origin;

    fn manager() -> CartManager {
        CartManager::new(Origin::in_memory().open_context(), SignalHub::new())
    }

    fn template(unit: i64, label: i64) -> CartItemTemplate {
        CartItemTemplate {
            name: "Dried Pineapple".to_string(),
            alt_names: vec![],
            unit_price: Decimal::from(unit),
            label_price: Decimal::from(label),
            image_ref: None,
            stock_hint: None,
        }
    }

    fn pid(s: &str) -> ProductId {
        ProductId::new(s)
    }

    #[test]
    fn test_get_cart_initializes_and_persists_empty() {
        let cart = manager();
        assert!(cart.store.read_raw(keys::CART).is_none());
        assert!(cart.get_cart().is_empty());
        assert_eq!(cart.store.read_raw(keys::CART).as_deref(), Some("[]"));
    }

    #[test]
    fn test_truncated_cart_recovers_to_empty() {
        let cart = manager();
        cart.store.write_raw_unchecked(keys::CART, "[{\"productId\":\"p1\",\"qua");
        assert!(cart.store.read::<Cart>(keys::CART).is_none());
        assert!(cart.get_cart().is_empty());
        assert_eq!(cart.store.read_raw(keys::CART).as_deref(), Some("[]"));
    }

    #[test]
    fn test_adjust_accumulates_and_persists() {
        let cart = manager();
        let t = template(80, 100);
        cart.adjust_quantity_by(&pid("p1"), 1, Some(&t));
        cart.adjust_quantity_by(&pid("p1"), 2, Some(&t));
        let snapshot = cart.adjust_quantity_by(&pid("p1"), 4, Some(&t));
        assert_eq!(snapshot.quantity_of(&pid("p1")), 7);

        let reloaded: Cart = cart.store.read(keys::CART).unwrap();
        assert_eq!(reloaded, snapshot);
    }

    #[test]
    fn test_adjust_below_zero_removes() {
        let cart = manager();
        cart.adjust_quantity_by(&pid("p1"), 2, Some(&template(1, 1)));
        let snapshot = cart.adjust_quantity_by(&pid("p1"), -2, None);
        assert!(snapshot.get(&pid("p1")).is_none());
        assert!(cart.get_cart().entries().iter().all(|e| e.quantity >= 1));
    }

    #[test]
    fn test_set_quantity_never_removes() {
        let cart = manager();
        cart.adjust_quantity_by(&pid("p1"), 3, Some(&template(1, 1)));
        let snapshot = cart.set_quantity_to(&pid("p1"), 0);
        assert_eq!(snapshot.quantity_of(&pid("p1")), 1);
    }

    #[test]
    fn test_remove_regardless_of_quantity() {
        let cart = manager();
        cart.adjust_quantity_by(&pid("p1"), 99, Some(&template(1, 1)));
        cart.remove(&pid("p1"));
        assert!(cart.get_cart().get(&pid("p1")).is_none());
    }

    #[test]
    fn test_totals() {
        let cart = manager();
        assert_eq!(cart.totals(), CartTotals::default());
        cart.adjust_quantity_by(&pid("p1"), 2, Some(&template(80, 100)));
        let totals = cart.totals();
        assert_eq!(totals.nominal, Decimal::from(200));
        assert_eq!(totals.actual, Decimal::from(160));
        assert_eq!(totals.discount, Decimal::from(40));
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_mutations_publish_but_noops_do_not() {
        let cart = manager();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = cart.hub.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cart.adjust_quantity_by(&pid("ghost"), -1, None);
        cart.set_quantity_to(&pid("ghost"), 3);
        cart.remove(&pid("ghost"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        cart.adjust_quantity_by(&pid("p1"), 1, Some(&template(1, 1)));
        cart.set_quantity_to(&pid("p1"), 5);
        cart.remove(&pid("p1"));
        cart.clear();
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_failed_write_still_returns_snapshot() {
        let store = Origin::new(crate::storage::MemoryBackend::with_quota(16)).open_context();
        let cart = CartManager::new(store, SignalHub::new());
        let snapshot = cart.adjust_quantity_by(&pid("p1"), 1, Some(&template(1, 1)));
        // In-memory result is still returned; persistence failure is logged
        assert_eq!(snapshot.quantity_of(&pid("p1")), 1);
        assert!(cart.get_cart().is_empty());
    }

    #[test]
    fn test_failed_replace_and_clear_report_and_stay_silent() {
        let mut one = Cart::new();
        one.adjust_quantity_by(&pid("p1"), 1, Some(&template(1, 1)));
        let room = keys::CART.len() + serde_json::to_string(&one).unwrap().len() + 8;
        let store = Origin::new(crate::storage::MemoryBackend::with_quota(room)).open_context();
        let cart = CartManager::new(store, SignalHub::new());
        assert!(cart.replace(&one));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = cart.hub.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut big = cart.get_cart();
        big.adjust_quantity_by(&pid("p2-with-a-long-identifier"), 1, Some(&template(1, 1)));
        assert!(!cart.replace(&big));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(cart.get_cart().len(), 1);

        assert!(cart.clear());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(cart.get_cart().is_empty());
    }
}
