//! Order submission against the fake backend.

#![allow(clippy::unwrap_used)]

use storefront_sync::checkout::{CheckoutError, MirrorPolicy};
use storefront_sync::storage::{Origin, keys};
use storefront_sync::{ClientError, StorefrontContext};
use storefront_sync_core::{OrderStatus, ProductId, SessionToken};
use storefront_sync_integration_tests::{FakeBackend, VALID_TOKEN, shipping, template};

fn fill_cart(ctx: &StorefrontContext) {
    ctx.cart()
        .adjust_quantity_by(&ProductId::new("tee"), 2, Some(&template("Tee", 80, 100)));
    ctx.cart()
        .adjust_quantity_by(&ProductId::new("mug"), 1, Some(&template("Mug", 12, 12)));
}

#[tokio::test]
async fn test_successful_checkout_clears_cart() {
    let backend = FakeBackend::start().await;
    let ctx = backend.context(&Origin::in_memory(), MirrorPolicy::Immediate);
    ctx.session().login(&SessionToken::new(VALID_TOKEN), None);
    fill_cart(&ctx);

    let checkout = ctx.checkout();
    let draft = checkout
        .build_order_draft(&checkout.snapshot(), shipping())
        .unwrap();
    let confirmation = checkout.submit(&draft).await.unwrap();

    assert_eq!(confirmation.id.as_str(), "ord_1");
    assert_eq!(confirmation.status, OrderStatus::Pending);
    assert_eq!(confirmation.confirmation_path(), "/orders/ord_1");
    assert!(ctx.cart().get_cart().is_empty());
    assert_eq!(ctx.store().read_raw(keys::CART).as_deref(), Some("[]"));
}

#[tokio::test]
async fn test_order_payload_carries_no_prices() {
    let backend = FakeBackend::start().await;
    let ctx = backend.context(&Origin::in_memory(), MirrorPolicy::Immediate);
    ctx.session().login(&SessionToken::new(VALID_TOKEN), None);
    fill_cart(&ctx);

    let checkout = ctx.checkout();
    let draft = checkout
        .build_order_draft(&checkout.snapshot(), shipping())
        .unwrap();
    checkout.submit(&draft).await.unwrap();

    let orders = backend.orders();
    assert_eq!(orders.len(), 1);
    let body = &orders[0];
    assert_eq!(
        body["items"],
        serde_json::json!([
            {"productId": "tee", "quantity": 2},
            {"productId": "mug", "quantity": 1}
        ])
    );
    assert_eq!(body["postalCode"], "N1 9GU");
    let raw = body.to_string();
    for field in ["unitPrice", "labelPrice", "price", "name\":\"Tee"] {
        assert!(!raw.contains(field), "payload leaked {field}: {raw}");
    }
}

#[tokio::test]
async fn test_server_failure_leaves_cart_byte_for_byte() {
    let backend = FakeBackend::start().await;
    backend.fail_orders_with(503);
    let ctx = backend.context(&Origin::in_memory(), MirrorPolicy::Immediate);
    ctx.session().login(&SessionToken::new(VALID_TOKEN), None);
    fill_cart(&ctx);
    let before = ctx.store().read_raw(keys::CART).unwrap();

    let checkout = ctx.checkout();
    let draft = checkout
        .build_order_draft(&checkout.snapshot(), shipping())
        .unwrap();
    let err = checkout.submit(&draft).await.unwrap_err();

    assert!(matches!(err, CheckoutError::Submission(_)));
    let err = ClientError::from(err);
    assert!(err.is_retryable());
    assert!(!err.user_message().contains("503"));
    assert_eq!(ctx.store().read_raw(keys::CART).unwrap(), before);
}

#[tokio::test]
async fn test_unreachable_backend_leaves_cart_untouched() {
    let base = storefront_sync_integration_tests::unreachable_base_url().await;
    let api = storefront_sync::api::HttpApi::new(base, std::time::Duration::from_secs(60));
    let ctx = StorefrontContext::open(&Origin::in_memory(), api, MirrorPolicy::Immediate);
    ctx.session().login(&SessionToken::new(VALID_TOKEN), None);
    fill_cart(&ctx);
    let before = ctx.store().read_raw(keys::CART).unwrap();

    let checkout = ctx.checkout();
    let draft = checkout
        .build_order_draft(&checkout.snapshot(), shipping())
        .unwrap();
    let err = checkout.submit(&draft).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(ctx.store().read_raw(keys::CART).unwrap(), before);
}

#[tokio::test]
async fn test_revoked_token_is_credential_expired() {
    let backend = FakeBackend::start().await;
    let ctx = backend.context(&Origin::in_memory(), MirrorPolicy::Immediate);
    ctx.session().login(&SessionToken::new(VALID_TOKEN), None);
    fill_cart(&ctx);
    backend.revoke_tokens();

    let checkout = ctx.checkout();
    let draft = checkout
        .build_order_draft(&checkout.snapshot(), shipping())
        .unwrap();
    let err = checkout.submit(&draft).await.unwrap_err();

    assert!(matches!(err, CheckoutError::CredentialExpired));
    assert_eq!(ctx.cart().get_cart().len(), 2);
    assert!(backend.orders().is_empty());
}

#[tokio::test]
async fn test_validation_blocks_before_network() {
    let backend = FakeBackend::start().await;
    let ctx = backend.context(&Origin::in_memory(), MirrorPolicy::Immediate);
    ctx.session().login(&SessionToken::new(VALID_TOKEN), None);

    let checkout = ctx.checkout();
    let err = checkout
        .build_order_draft(&checkout.snapshot(), shipping())
        .unwrap_err();
    assert!(matches!(err, CheckoutError::EmptyCart));

    fill_cart(&ctx);
    let mut incomplete = shipping();
    incomplete.phone = String::new();
    let err = checkout
        .build_order_draft(&checkout.snapshot(), incomplete)
        .unwrap_err();
    assert!(err.is_validation());
    assert!(backend.orders().is_empty());
}

#[tokio::test]
async fn test_on_commit_stepper_submits_edited_copy() {
    let backend = FakeBackend::start().await;
    let ctx = backend.context(&Origin::in_memory(), MirrorPolicy::OnCommit);
    ctx.session().login(&SessionToken::new(VALID_TOKEN), None);
    fill_cart(&ctx);

    let mut stepper = ctx.checkout().begin();
    stepper.remove(&ProductId::new("mug"));
    // Persisted cart still has both lines until commit
    assert_eq!(ctx.cart().get_cart().len(), 2);

    let draft = ctx
        .checkout()
        .build_order_draft(&stepper.snapshot(), shipping())
        .unwrap();
    assert_eq!(draft.items.len(), 1);

    stepper.commit();
    assert_eq!(ctx.cart().get_cart().len(), 1);
    ctx.checkout().submit(&draft).await.unwrap();
    assert!(ctx.cart().get_cart().is_empty());
}
