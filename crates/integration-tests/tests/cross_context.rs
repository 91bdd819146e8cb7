//! Several rendering contexts sharing one origin.
//!
//! Covers last-write-wins on the `cart` key, external change signals,
//! logout propagating as a reset to every other context, and reconciling
//! views settling instead of waking each other forever.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use storefront_sync::StorefrontContext;
use storefront_sync::checkout::MirrorPolicy;
use storefront_sync::signal::{Signal, SignalKind, SignalSource, Subscription};
use storefront_sync::storage::{Origin, keys};
use storefront_sync_core::{ProductId, SessionToken};
use storefront_sync_integration_tests::{FakeBackend, VALID_TOKEN, template};
use tokio::sync::mpsc;

async fn next_signal(rx: &mut mpsc::UnboundedReceiver<Signal>) -> Signal {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

/// Re-run session reconciliation on every signal `ctx` publishes.
fn reconcile_on_every_signal(ctx: &StorefrontContext) -> Subscription {
    let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();
    let sub = ctx.subscribe(move |s| {
        let _ = tx.send(s.clone());
    });
    let task_ctx = ctx.clone();
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let _ = task_ctx.session().reconcile().await;
        }
    });
    ctx.start_sync();
    sub
}

// =============================================================================
// Shared State
// =============================================================================

#[tokio::test]
async fn test_last_write_wins_for_whole_cart() {
    let backend = FakeBackend::start().await;
    let origin = Origin::in_memory();
    let tab_a = backend.context(&origin, MirrorPolicy::Immediate);
    let tab_b = backend.context(&origin, MirrorPolicy::Immediate);

    let mug = ProductId::new("mug");
    let tee = ProductId::new("tee");

    // Tab B starts a stepper from the cart as it is now
    tab_a
        .cart()
        .adjust_quantity_by(&mug, 1, Some(&template("Mug", 12, 12)));
    let mut stepper = tab_b.checkout().begin();

    // Tab A adds a second product; tab B's stepper has not seen it
    tab_a
        .cart()
        .adjust_quantity_by(&tee, 1, Some(&template("Tee", 20, 25)));

    // Tab B's next edit rewrites the whole document from its copy
    stepper.set_quantity_to(&mug, 4);

    let cart = tab_a.cart().get_cart();
    assert_eq!(cart.quantity_of(&mug), 4);
    assert!(cart.get(&tee).is_none(), "no merge: tab B's write replaces A's");
}

#[tokio::test]
async fn test_external_cart_change_signals_other_tabs() {
    let backend = FakeBackend::start().await;
    let origin = Origin::in_memory();
    let tab_a = backend.context(&origin, MirrorPolicy::Immediate);
    let tab_b = backend.context(&origin, MirrorPolicy::Immediate);
    let _ = tab_a.cart().get_cart();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = tab_b.subscribe(move |s| {
        let _ = tx.send(s.clone());
    });
    tab_b.start_sync();

    tab_a
        .cart()
        .adjust_quantity_by(&ProductId::new("mug"), 2, Some(&template("Mug", 12, 12)));

    let signal = next_signal(&mut rx).await;
    assert_eq!(signal.kind, SignalKind::Changed);
    assert_eq!(
        signal.source,
        SignalSource::External {
            key: Some(keys::CART.to_string())
        }
    );
    // The signal carries nothing; tab B re-reads
    assert_eq!(tab_b.cart().item_count(), 2);
}

#[tokio::test]
async fn test_logout_resets_other_tabs() {
    let backend = FakeBackend::start().await;
    let origin = Origin::in_memory();
    let tab_a = backend.context(&origin, MirrorPolicy::Immediate);
    let tab_b = backend.context(&origin, MirrorPolicy::Immediate);

    tab_a.session().login(&SessionToken::new(VALID_TOKEN), None);
    assert!(tab_b.session().reconcile().await.state.is_authenticated());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = tab_b.subscribe(move |s| {
        let _ = tx.send(s.clone());
    });
    tab_b.start_sync();

    tab_a.session().logout();

    // Token removal arrives first; it alone means the other tab logged out
    let signal = next_signal(&mut rx).await;
    assert_eq!(signal.kind, SignalKind::Reset);
    assert!(tab_b.session().token().is_none());
    assert!(
        tab_b
            .session()
            .reconcile()
            .await
            .state
            .user()
            .is_none()
    );
}

#[tokio::test]
async fn test_own_writes_are_not_echoed() {
    let backend = FakeBackend::start().await;
    let origin = Origin::in_memory();
    let tab = backend.context(&origin, MirrorPolicy::Immediate);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = tab.subscribe(move |s| {
        let _ = tx.send(s.clone());
    });
    tab.start_sync();

    tab.cart()
        .adjust_quantity_by(&ProductId::new("mug"), 1, Some(&template("Mug", 12, 12)));

    // Exactly one local signal, nothing from the bridge
    assert_eq!(next_signal(&mut rx).await.source, SignalSource::Local);
    let extra = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(extra.is_err());
}

#[tokio::test]
async fn test_stop_sync_detaches_bridge() {
    let backend = FakeBackend::start().await;
    let origin = Origin::in_memory();
    let tab_a = backend.context(&origin, MirrorPolicy::Immediate);
    let tab_b = backend.context(&origin, MirrorPolicy::Immediate);

    let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();
    let _sub = tab_b.subscribe(move |s| {
        let _ = tx.send(s.clone());
    });
    tab_b.start_sync();
    tab_b.stop_sync();
    tokio::task::yield_now().await;

    assert!(tab_a.cart().clear());

    let outcome = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(outcome.is_err());
}

#[tokio::test]
async fn test_reconciling_views_settle_after_login() {
    let backend = FakeBackend::start().await;
    let origin = Origin::in_memory();
    let tab_a = backend.context(&origin, MirrorPolicy::Immediate);
    let tab_b = backend.context(&origin, MirrorPolicy::Immediate);

    let _sub_a = reconcile_on_every_signal(&tab_a);
    let _sub_b = reconcile_on_every_signal(&tab_b);

    tab_a.session().login(&SessionToken::new(VALID_TOKEN), None);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let settled = backend.user_hits();
    assert!(
        (1..=6).contains(&settled),
        "one login should cost a handful of lookups, got {settled}"
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(backend.user_hits(), settled, "views kept waking each other");
    assert!(tab_b.session().cached_user().is_some());
}
