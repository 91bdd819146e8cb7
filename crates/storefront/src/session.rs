//! Session state publishing and reconciliation.
//!
//! The stored token and cached user are the only persisted session state.
//! [`SessionPublisher::reconcile`] turns them into a [`SessionState`],
//! confirming the token with the backend when one is present.
//!
//! # Outcomes
//!
//! | Stored token | `current-user` result | State                      | Side effects                  |
//! |--------------|-----------------------|----------------------------|-------------------------------|
//! | none         | not called            | `Anonymous`                | cached user removed           |
//! | present      | user                  | `Authenticated`            | user cached                   |
//! | present      | unauthorized          | `Anonymous`                | token and user removed, reset |
//! | present      | any other failure     | `Stale` or `Anonymous`     | one-shot offline notice       |

use tracing::{info, instrument, warn};

use storefront_sync_core::{SessionToken, User};

use crate::api::UserApi;
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::signal::{Signal, SignalHub, Subscription};
use crate::storage::{Store, keys};

/// Derived authentication state for views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    /// Confirmed by the backend just now.
    Authenticated(User),
    /// Backend unreachable; showing the last cached profile.
    Stale(User),
}

impl SessionState {
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) | Self::Stale(user) => Some(user),
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Transient message for the user, shown once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The stored credentials were rejected and have been cleared.
    SessionExpired,
    /// The backend could not be reached.
    Offline { reason: String },
}

impl Notice {
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::SessionExpired => "Your session has expired. Please sign in again.",
            Self::Offline { .. } => "Could not reach the store. Showing saved information.",
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub state: SessionState,
    pub notice: Option<Notice>,
}

impl Reconciled {
    const fn quiet(state: SessionState) -> Self {
        Self {
            state,
            notice: None,
        }
    }
}

/// Read the stored bearer token. Blank or unreadable tokens count as absent.
pub(crate) fn stored_token(store: &Store) -> Option<SessionToken> {
    store
        .read::<SessionToken>(keys::TOKEN)
        .filter(|t| !t.is_blank())
}

/// Owns the `token` and `user` keys and tells subscribers when they change.
#[derive(Clone)]
pub struct SessionPublisher<A> {
    store: Store,
    hub: SignalHub,
    api: A,
}

impl<A: UserApi> SessionPublisher<A> {
    #[must_use]
    pub const fn new(store: Store, hub: SignalHub, api: A) -> Self {
        Self { store, hub, api }
    }

    /// Register a view callback. See [`SignalHub::subscribe`].
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        self.hub.subscribe(callback)
    }

    #[must_use]
    pub fn token(&self) -> Option<SessionToken> {
        stored_token(&self.store)
    }

    /// The cached profile. Not authoritative.
    #[must_use]
    pub fn cached_user(&self) -> Option<User> {
        self.store.read(keys::USER)
    }

    /// Store a freshly issued token, and the user if the login response
    /// carried one, then notify subscribers.
    pub fn login(&self, token: &SessionToken, user: Option<&User>) {
        self.store.write(keys::TOKEN, token);
        match user {
            Some(user) => {
                self.store.write(keys::USER, user);
                set_sentry_user(user);
            }
            None => {
                // A cached profile from a previous login no longer applies
                self.store.remove(keys::USER);
            }
        }
        add_breadcrumb("session", "Logged in", None);
        info!("session token stored");
        self.hub.notify_changed();
    }

    /// Ask subscribers to re-derive state without changing anything.
    pub fn refresh(&self) {
        self.hub.notify_changed();
    }

    /// Remove the token and cached user and reset every view.
    pub fn logout(&self) {
        self.store.remove(keys::TOKEN);
        self.store.remove(keys::USER);
        clear_sentry_user();
        add_breadcrumb("session", "Logged out", None);
        info!("session cleared");
        self.hub.notify_reset();
    }

    /// Derive the current session state, confirming any stored token with
    /// the backend.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Reconciled {
        let Some(token) = self.token() else {
            self.store.remove(keys::USER);
            return Reconciled::quiet(SessionState::Anonymous);
        };

        match self.api.current_user(&token).await {
            Ok(user) => {
                self.store.write(keys::USER, &user);
                set_sentry_user(&user);
                Reconciled::quiet(SessionState::Authenticated(user))
            }
            Err(e) if e.is_credential_expired() => {
                warn!("stored credentials rejected, clearing session");
                self.store.remove(keys::TOKEN);
                self.store.remove(keys::USER);
                clear_sentry_user();
                add_breadcrumb("session", "Session expired", None);
                self.hub.notify_reset();
                Reconciled {
                    state: SessionState::Anonymous,
                    notice: Some(Notice::SessionExpired),
                }
            }
            Err(e) => {
                warn!(error = %e, "could not confirm session, using cached profile");
                let state = self
                    .cached_user()
                    .map_or(SessionState::Anonymous, SessionState::Stale);
                Reconciled {
                    state,
                    notice: Some(Notice::Offline {
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }
}
