//! Same-context change signals and the bridge from cross-context storage events.
//!
//! Views register a callback with [`SignalHub::subscribe`] and keep the
//! returned [`Subscription`] alive for as long as they are mounted. A signal
//! carries no state: on every signal a view re-reads the cart and re-runs
//! session reconciliation.
//!
//! Signals come from two places:
//! - explicit publishes in this context (cart mutations, login, logout, refresh)
//! - storage changes made by other contexts, forwarded by [`SignalHub::bridge`]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::storage::{ExternalChange, Store, keys};

/// What subscribers should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Auth or cart state may have changed; re-derive it.
    Changed,
    /// The session ended; drop all view state, then re-derive.
    Reset,
}

/// Where a signal came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalSource {
    /// Published by this context.
    Local,
    /// Forwarded from a storage change in another context. `key` is `None`
    /// when notifications were missed.
    External { key: Option<String> },
}

/// An "auth/cart changed" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub kind: SignalKind,
    pub source: SignalSource,
}

impl Signal {
    #[must_use]
    pub const fn changed() -> Self {
        Self {
            kind: SignalKind::Changed,
            source: SignalSource::Local,
        }
    }

    #[must_use]
    pub const fn reset() -> Self {
        Self {
            kind: SignalKind::Reset,
            source: SignalSource::Local,
        }
    }

    #[must_use]
    pub const fn is_reset(&self) -> bool {
        matches!(self.kind, SignalKind::Reset)
    }
}

type Callback = Arc<dyn Fn(&Signal) + Send + Sync>;

/// Publish/subscribe hub for one rendering context.
///
/// Cheaply cloneable via `Arc`; clones share subscribers.
#[derive(Clone, Default)]
pub struct SignalHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Callback)>>,
}

impl HubInner {
    fn unsubscribe(&self, id: u64) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|(sid, _)| *sid != id);
    }
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl SignalHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for every future signal.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        Subscription {
            hub: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver `signal` to every subscriber, in subscription order.
    ///
    /// Callbacks run outside the subscriber lock, so a callback may itself
    /// subscribe, unsubscribe or publish.
    pub fn publish(&self, signal: &Signal) {
        let callbacks: Vec<Callback> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        trace!(kind = ?signal.kind, subscribers = callbacks.len(), "publishing signal");
        for callback in callbacks {
            callback(signal);
        }
    }

    /// Publish a local [`SignalKind::Changed`].
    pub fn notify_changed(&self) {
        self.publish(&Signal::changed());
    }

    /// Publish a local [`SignalKind::Reset`].
    pub fn notify_reset(&self) {
        self.publish(&Signal::reset());
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Forward queued storage changes from other contexts without waiting.
    ///
    /// For hosts that poll instead of running [`SignalHub::bridge`]. Returns the
    /// number of signals published.
    pub fn pump(&self, store: &Store, feed: &mut crate::storage::ChangeFeed) -> usize {
        let mut published = 0;
        while let Some(change) = feed.try_next() {
            if let Some(signal) = external_signal(store, change) {
                self.publish(&signal);
                published += 1;
            }
        }
        published
    }

    /// Spawn a task that turns storage changes from other contexts into signals.
    ///
    /// Must be called from within a Tokio runtime. The task stops when the
    /// returned handle is dropped.
    #[must_use]
    pub fn bridge(&self, store: &Store) -> BridgeHandle {
        let hub = self.clone();
        let store = store.clone();
        let mut feed = store.subscribe_changes();

        // The task's store keeps the origin's sender alive, so the feed never
        // closes; dropping the handle is the only way out.
        let handle = tokio::spawn(async move {
            while let Some(change) = feed.next().await {
                if let Some(signal) = external_signal(&store, change) {
                    hub.publish(&signal);
                }
            }
        });

        BridgeHandle(handle)
    }
}

/// Map an external storage change onto a signal, ignoring unwatched keys.
///
/// A token that disappeared in another context means that context logged
/// out, so this one resets too.
fn external_signal(store: &Store, change: ExternalChange) -> Option<Signal> {
    if !keys::WATCHED.iter().any(|k| change.affects(k)) {
        return None;
    }

    let logged_out_elsewhere =
        change.affects(keys::TOKEN) && store.read_raw(keys::TOKEN).is_none();
    let kind = if logged_out_elsewhere && change.key.is_some() {
        SignalKind::Reset
    } else {
        SignalKind::Changed
    };

    Some(Signal {
        kind,
        source: SignalSource::External { key: change.key },
    })
}

/// Detaches its callback when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    hub: Weak<HubInner>,
    id: u64,
}

impl Subscription {
    /// Detach now. Equivalent to dropping.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

/// Running storage bridge. Aborts the task on drop.
#[derive(Debug)]
pub struct BridgeHandle(JoinHandle<()>);

impl BridgeHandle {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.0.abort();
        debug!("storage bridge stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::storage::Origin;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let hub = SignalHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h1 = Arc::clone(&hits);
        let h2 = Arc::clone(&hits);
        let _a = hub.subscribe(move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let _b = hub.subscribe(move |_| {
            h2.fetch_add(1, Ordering::SeqCst);
        });

        hub.notify_changed();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_and_drop_detach() {
        let hub = SignalHub::new();
        let a = hub.subscribe(|_| {});
        let b = hub.subscribe(|_| {});
        assert_eq!(hub.subscriber_count(), 2);
        a.unsubscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_publish_reentrantly() {
        let hub = SignalHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner_hub = hub.clone();
        let log = Arc::clone(&seen);
        let _sub = hub.subscribe(move |signal| {
            log.lock().unwrap().push(signal.kind);
            if signal.is_reset() {
                inner_hub.notify_changed();
            }
        });

        hub.notify_reset();
        assert_eq!(
            *seen.lock().unwrap(),
            [SignalKind::Reset, SignalKind::Changed]
        );
    }

    #[test]
    fn test_pump_forwards_watched_keys_only() {
        let origin = Origin::in_memory();
        let tab_a = origin.open_context();
        let tab_b = origin.open_context();
        let hub_b = SignalHub::new();
        let mut feed_b = tab_b.subscribe_changes();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let _sub = hub_b.subscribe(move |s| log.lock().unwrap().push(s.clone()));

        tab_a.write("theme", "dark");
        tab_a.write(keys::CART, &Vec::<u8>::new());

        assert_eq!(hub_b.pump(&tab_b, &mut feed_b), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, SignalKind::Changed);
        assert_eq!(
            seen[0].source,
            SignalSource::External {
                key: Some(keys::CART.to_string())
            }
        );
    }

    #[test]
    fn test_token_removed_elsewhere_resets() {
        let origin = Origin::in_memory();
        let tab_a = origin.open_context();
        let tab_b = origin.open_context();
        tab_a.write(keys::TOKEN, "t");

        let hub_b = SignalHub::new();
        let mut feed_b = tab_b.subscribe_changes();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let _sub = hub_b.subscribe(move |s| log.lock().unwrap().push(s.kind));

        tab_a.remove(keys::TOKEN);
        hub_b.pump(&tab_b, &mut feed_b);

        assert_eq!(*seen.lock().unwrap(), [SignalKind::Reset]);
    }

    #[tokio::test]
    async fn test_bridge_publishes_external_changes() {
        let origin = Origin::in_memory();
        let tab_a = origin.open_context();
        let tab_b = origin.open_context();
        let hub_b = SignalHub::new();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = hub_b.subscribe(move |s| {
            let _ = tx.send(s.clone());
        });
        let _bridge = hub_b.bridge(&tab_b);

        tab_a.write(keys::USER, "{}");

        let signal = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            signal.source,
            SignalSource::External {
                key: Some(keys::USER.to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_bridge_ignores_own_writes() {
        let origin = Origin::in_memory();
        let tab = origin.open_context();
        let hub = SignalHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();
        let _sub = hub.subscribe(move |s| {
            let _ = tx.send(s.clone());
        });
        let _bridge = hub.bridge(&tab);

        tab.write(keys::CART, "[]");

        let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(outcome.is_err(), "own write must not be echoed back");
    }
}
