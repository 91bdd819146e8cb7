//! Refresh cart display data from the product catalog.

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use storefront_sync_core::{Cart, CartEntry, ProductId};

use crate::api::{CatalogApi, CatalogProduct};
use crate::cart::CartManager;

/// Re-resolve name, prices, image and stock of every cart entry.
///
/// Lookups run concurrently. Entries whose lookup fails keep their current
/// data. Quantities are never touched, and entries removed while lookups
/// were in flight stay removed. The cart is persisted once, and only when
/// something changed.
#[instrument(skip_all)]
pub async fn refresh_display<C: CatalogApi>(cart: &CartManager, catalog: &C) -> Cart {
    let ids: Vec<ProductId> = cart
        .get_cart()
        .entries()
        .iter()
        .map(|e| e.product_id.clone())
        .collect();
    if ids.is_empty() {
        return cart.get_cart();
    }

    let lookups = join_all(ids.iter().map(|id| catalog.product(id))).await;

    let mut products = Vec::with_capacity(ids.len());
    for (id, result) in ids.iter().zip(lookups) {
        match result {
            Ok(product) => products.push(product),
            Err(e) => warn!(product_id = %id, error = %e, "catalog lookup failed, keeping cart data"),
        }
    }

    // Re-read: the cart may have changed while lookups were in flight
    let mut current = cart.get_cart();
    let mut changed = false;
    for entry in current.entries_mut() {
        if let Some(product) = products.iter().find(|p| p.id == entry.product_id) {
            changed |= apply_display(entry, product);
        }
    }

    if changed {
        if cart.replace(&current) {
            debug!(products = products.len(), "cart display data refreshed");
        } else {
            warn!("refreshed display data not persisted");
        }
    }
    current
}

/// Copy display fields from `product`. Returns whether anything changed.
fn apply_display(entry: &mut CartEntry, product: &CatalogProduct) -> bool {
    let label_price = product.label_price.unwrap_or(product.price);
    let changed = entry.name != product.name
        || entry.alt_names != product.alt_names
        || entry.unit_price != product.price
        || entry.label_price != label_price
        || entry.image_ref != product.image_ref
        || entry.stock_hint != product.stock;

    if changed {
        entry.name.clone_from(&product.name);
        entry.alt_names.clone_from(&product.alt_names);
        entry.unit_price = product.price;
        entry.label_price = label_price;
        entry.image_ref.clone_from(&product.image_ref);
        entry.stock_hint = product.stock;
    }
    changed
}
