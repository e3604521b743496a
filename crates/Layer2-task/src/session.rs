//! Session affinity store
//!
//! Maps a caller-supplied context key (e.g. `"feishu:chat_123"`) to the last
//! session id the agent reported for it, so a later task in the same
//! conversation can resume that session. Expiry is evaluated at read time
//! against the stored timestamp; no background timer is involved.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub use relay_foundation::DEFAULT_SESSION_EXPIRY_SECS;

/// Default expiry window
pub const DEFAULT_SESSION_EXPIRY: Duration = Duration::from_secs(DEFAULT_SESSION_EXPIRY_SECS);

#[derive(Debug, Clone)]
struct SessionEntry {
    session_id: String,
    last_used: Instant,
}

/// Context key → session id, with per-entry last-write timestamp
#[derive(Debug)]
pub struct SessionStore {
    entries: RwLock<HashMap<String, SessionEntry>>,
    expiry: Duration,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_expiry(DEFAULT_SESSION_EXPIRY)
    }

    pub fn with_expiry(expiry: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            expiry,
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Upsert, stamping the current time
    pub fn set(&self, key: impl Into<String>, session_id: impl Into<String>) {
        let key = key.into();
        let session_id = session_id.into();
        debug!("Session for {} -> {}", key, session_id);
        self.entries.write().insert(
            key,
            SessionEntry {
                session_id,
                last_used: Instant::now(),
            },
        );
    }

    /// Session id for `key` if present and younger than the expiry window.
    ///
    /// Stale entries are reported as absent but left in place for `sweep`.
    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if self.is_expired(entry, Instant::now()) {
            return None;
        }
        Some(entry.session_id.clone())
    }

    /// Remove an entry; returns whether one existed
    pub fn clear(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Swept {} expired sessions", removed);
        }
        removed
    }

    /// Physically stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn is_expired(&self, entry: &SessionEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_used) > self.expiry
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
