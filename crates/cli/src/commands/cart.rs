//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! storefront-cart cart add tee-black -q 2
//! storefront-cart cart adjust tee-black -1
//! storefront-cart cart set tee-black 3
//! storefront-cart cart remove tee-black
//! storefront-cart cart show
//! ```

use rust_decimal::Decimal;
use storefront_sync::StorefrontContext;
use storefront_sync::api::CatalogApi;
use storefront_sync_core::{Cart, CartItemTemplate, CartTotals, CurrencyCode, Price, ProductId};

use super::CommandError;

fn money(amount: Decimal) -> Price {
    Price::new(amount, CurrencyCode::default())
}

fn log_totals(totals: &CartTotals) {
    tracing::info!(
        "Subtotal {} | You pay {} | You save {}",
        money(totals.nominal),
        money(totals.actual),
        money(totals.discount)
    );
}

fn log_cart(cart: &Cart) {
    if cart.is_empty() {
        tracing::info!("Cart is empty");
        return;
    }
    for entry in cart.entries() {
        tracing::info!(
            "{:>4} x {} ({}) @ {} = {}",
            entry.quantity,
            entry.name,
            entry.product_id,
            money(entry.unit_price),
            money(entry.line_total())
        );
    }
    tracing::info!("{} item(s)", cart.item_count());
    log_totals(&cart.totals());
}

pub fn show(ctx: &StorefrontContext) {
    log_cart(&ctx.cart().get_cart());
}

/// Add `quantity` units, looking up display data when the product is new.
pub async fn add(
    ctx: &StorefrontContext,
    product_id: &str,
    quantity: u32,
) -> Result<(), CommandError> {
    let product_id = ProductId::new(product_id);

    let template = if ctx.cart().get_cart().get(&product_id).is_some() {
        None
    } else {
        let product = ctx.api().product(&product_id).await?;
        Some(CartItemTemplate::from(&product))
    };

    let cart = ctx
        .cart()
        .adjust_quantity_by(&product_id, i64::from(quantity), template.as_ref());
    tracing::info!(
        "{} now has quantity {}",
        product_id,
        cart.quantity_of(&product_id)
    );
    Ok(())
}

pub fn adjust(ctx: &StorefrontContext, product_id: &str, delta: i64) {
    let product_id = ProductId::new(product_id);
    let cart = ctx.cart().adjust_quantity_by(&product_id, delta, None);
    match cart.get(&product_id) {
        Some(entry) => tracing::info!("{} now has quantity {}", product_id, entry.quantity),
        None => tracing::info!("{} is not in the cart", product_id),
    }
}

pub fn set(ctx: &StorefrontContext, product_id: &str, quantity: u32) {
    let product_id = ProductId::new(product_id);
    let cart = ctx.cart().set_quantity_to(&product_id, quantity);
    match cart.get(&product_id) {
        Some(entry) => tracing::info!("{} now has quantity {}", product_id, entry.quantity),
        None => tracing::warn!("{} is not in the cart; use `cart add` first", product_id),
    }
}

pub fn remove(ctx: &StorefrontContext, product_id: &str) {
    let product_id = ProductId::new(product_id);
    ctx.cart().remove(&product_id);
    tracing::info!("Removed {}", product_id);
}

pub fn clear(ctx: &StorefrontContext) {
    if ctx.cart().clear() {
        tracing::info!("Cart cleared");
    } else {
        tracing::warn!("Cart could not be cleared");
    }
}

pub fn totals(ctx: &StorefrontContext) {
    log_totals(&ctx.cart().totals());
}

pub async fn refresh(ctx: &StorefrontContext) {
    let cart = ctx.refresh_cart_display().await;
    log_cart(&cart);
}
