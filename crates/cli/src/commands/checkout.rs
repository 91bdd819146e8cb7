//! Checkout command.

use storefront_sync::{ClientError, StorefrontContext};
use storefront_sync_core::{CurrencyCode, Price, ShippingInfo};

use super::CommandError;

/// Snapshot the cart, build the order and submit it once.
pub async fn submit(ctx: &StorefrontContext, shipping: ShippingInfo) -> Result<(), CommandError> {
    let checkout = ctx.checkout();
    let snapshot = checkout.snapshot();
    let draft = checkout.build_order_draft(&snapshot, shipping)?;

    tracing::info!(
        "Submitting {} line(s), estimated {}",
        draft.items.len(),
        Price::new(snapshot.totals().actual, CurrencyCode::default())
    );

    match checkout.submit(&draft).await {
        Ok(confirmation) => {
            tracing::info!(
                "Order {} placed ({:?}); see {}",
                confirmation.id,
                confirmation.status,
                confirmation.confirmation_path()
            );
            Ok(())
        }
        Err(e) => {
            let err = ClientError::from(e);
            tracing::warn!("{}", err.user_message());
            Err(err.into())
        }
    }
}
