//! Store adapter over per-origin persistent key-value storage.
//!
//! # Model
//!
//! - An [`Origin`] owns one [`StorageBackend`] plus the change feed that
//!   every context on the origin listens to.
//! - A [`Store`] is one rendering context's handle on that origin. It reads
//!   and writes JSON values and never returns an error to the caller:
//!   corrupt or unreadable values read as absent, failed writes are logged
//!   and reported as `false`.
//! - Successful writes and removals are announced to every *other* context
//!   on the origin, mirroring the browser's `storage` event. The writing
//!   context is not notified of its own writes.
//!
//! Cross-context writes are last-write-wins at the granularity of one key.

mod backend;

pub use backend::{FileBackend, MemoryBackend, StorageBackend, StorageError};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ClientConfig;

/// Well-known persisted keys.
pub mod keys {
    /// JSON array of cart entries.
    pub const CART: &str = "cart";

    /// Opaque bearer token (JSON string).
    pub const TOKEN: &str = "token";

    /// Cached user profile (JSON object). Not authoritative.
    pub const USER: &str = "user";

    /// Keys whose external changes should trigger view reconciliation.
    pub const WATCHED: [&str; 3] = [CART, TOKEN, USER];
}

/// Buffered change notifications per origin before slow listeners lag.
const CHANGE_FEED_CAPACITY: usize = 256;

/// Identifies one rendering context on an origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A key was written or removed by some context.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StorageEvent {
    key: String,
    source: ContextId,
}

/// A change made by another context, as seen by a listener.
///
/// Carries no value: listeners re-read the store rather than trusting a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalChange {
    /// Changed key, or `None` when notifications were missed and any key may
    /// have changed.
    pub key: Option<String>,
}

impl ExternalChange {
    /// Whether a listener interested in `key` should react.
    #[must_use]
    pub fn affects(&self, key: &str) -> bool {
        self.key.as_deref().is_none_or(|k| k == key)
    }
}

// =============================================================================
// Origin
// =============================================================================

/// Shared storage seen by every context of one site.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct Origin {
    inner: Arc<OriginInner>,
}

struct OriginInner {
    backend: Box<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
}

impl Origin {
    /// Create an origin over any backend.
    #[must_use]
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        let (events, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(OriginInner {
                backend: Box::new(backend),
                events,
            }),
        }
    }

    /// An origin backed by process memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// An origin persisted to a directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn directory(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Ok(Self::new(FileBackend::open(dir)?))
    }

    /// The persistent origin described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the storage directory cannot be created.
    pub fn from_config(config: &ClientConfig) -> Result<Self, StorageError> {
        let mut backend = FileBackend::open(&config.storage_dir)?;
        if let Some(quota) = config.storage_quota_bytes {
            backend = backend.with_quota(quota);
        }
        debug!(dir = %config.storage_dir.display(), "opened storage origin");
        Ok(Self::new(backend))
    }

    /// Open a new rendering context on this origin.
    #[must_use]
    pub fn open_context(&self) -> Store {
        let context = ContextId::new();
        debug!(%context, "opened storage context");
        Store {
            origin: self.clone(),
            context,
        }
    }

    fn announce(&self, key: &str, source: ContextId) {
        // No receivers is not an error: nobody is listening yet
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_owned(),
            source,
        });
    }
}

// =============================================================================
// Store
// =============================================================================

/// One context's fail-open JSON view of an origin.
#[derive(Clone)]
pub struct Store {
    origin: Origin,
    context: ContextId,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Store {
    #[must_use]
    pub const fn context_id(&self) -> ContextId {
        self.context
    }

    /// The origin this context belongs to.
    #[must_use]
    pub const fn origin(&self) -> &Origin {
        &self.origin
    }

    fn backend(&self) -> &dyn StorageBackend {
        self.origin.inner.backend.as_ref()
    }

    /// Raw persisted text, or `None` if absent or unreadable.
    #[must_use]
    pub fn read_raw(&self, key: &str) -> Option<String> {
        match self.backend().get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "storage read failed, treating value as absent");
                None
            }
        }
    }

    /// Parse the JSON value under `key`.
    ///
    /// Returns `None` when the key is absent, unreadable, or does not parse as
    /// `T`. The corrupt value stays in place until the next write replaces it.
    #[must_use]
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    key,
                    error = %e,
                    len = raw.len(),
                    "discarding corrupt stored value"
                );
                None
            }
        }
    }

    /// Serialize `value` and overwrite `key` with it.
    ///
    /// Returns whether the value is persisted. Rewriting the stored value
    /// unchanged touches nothing and announces nothing. Failures are logged,
    /// never propagated.
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize value for storage");
                return false;
            }
        };

        if self.read_raw(key).as_deref() == Some(raw.as_str()) {
            return true;
        }

        match self.backend().set(key, &raw) {
            Ok(()) => {
                self.origin.announce(key, self.context);
                true
            }
            Err(e) => {
                warn!(key, error = %e, "storage write failed");
                false
            }
        }
    }

    /// Delete `key`. Returns whether the store no longer holds it.
    pub fn remove(&self, key: &str) -> bool {
        match self.backend().remove(key) {
            Ok(existed) => {
                if existed {
                    self.origin.announce(key, self.context);
                }
                true
            }
            Err(e) => {
                warn!(key, error = %e, "storage remove failed");
                false
            }
        }
    }

    /// Store `raw` under `key` as-is, bypassing serialization and change
    /// announcements.
    #[cfg(test)]
    #[allow(clippy::unwrap_used)]
    pub(crate) fn write_raw_unchecked(&self, key: &str, raw: &str) {
        self.backend().set(key, raw).unwrap();
    }

    /// Listen for changes made by other contexts on this origin.
    #[must_use]
    pub fn subscribe_changes(&self) -> ChangeFeed {
        ChangeFeed {
            receiver: self.origin.inner.events.subscribe(),
            context: self.context,
        }
    }
}

// =============================================================================
// ChangeFeed
// =============================================================================

/// Stream of [`ExternalChange`]s for one context.
pub struct ChangeFeed {
    receiver: broadcast::Receiver<StorageEvent>,
    context: ContextId,
}

impl ChangeFeed {
    /// Wait for the next change made by another context.
    ///
    /// Returns `None` once the origin has been dropped.
    pub async fn next(&mut self) -> Option<ExternalChange> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.source == self.context => {}
                Ok(event) => return Some(ExternalChange { key: Some(event.key) }),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, context = %self.context, "storage change feed lagged");
                    return Some(ExternalChange { key: None });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next already-queued change without waiting.
    pub fn try_next(&mut self) -> Option<ExternalChange> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.source == self.context => {}
                Ok(event) => return Some(ExternalChange { key: Some(event.key) }),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, context = %self.context, "storage change feed lagged");
                    return Some(ExternalChange { key: None });
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}
