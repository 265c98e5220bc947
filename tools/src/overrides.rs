//! Edit-override mailbox.
//!
//! When a human reviewer accepts a modified version of a proposed change, the
//! reviewed content is posted here. The next `write_file` / `edit_file` for the
//! same remote path picks it up (once) and writes it instead of its own content.
//!
//! Slots are keyed by remote path so a pending override for one file is never
//! clobbered by a decision about another. Within a path the mailbox holds a
//! single value: posting again replaces it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use outpost_types::RemotePath;
use tokio::time::Instant;

pub const DEFAULT_OVERRIDE_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct PendingOverride {
    content: String,
    posted_at: Instant,
}

#[derive(Debug)]
pub struct EditOverrides {
    ttl: Duration,
    slots: Mutex<HashMap<RemotePath, PendingOverride>>,
}

impl Default for EditOverrides {
    fn default() -> Self {
        Self::new(DEFAULT_OVERRIDE_TTL)
    }
}

impl EditOverrides {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, path: &RemotePath, content: impl Into<String>) {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = slots.insert(
            path.clone(),
            PendingOverride {
                content: content.into(),
                posted_at: Instant::now(),
            },
        );
        if previous.is_some() {
            tracing::debug!(path = %path, "replaced pending edit override");
        }
    }

    /// Take the override for `path` if one is pending and still fresh.
    ///
    /// A stale override is dropped. Overrides for other paths are untouched.
    pub fn consume(&self, path: &RemotePath) -> Option<String> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let pending = slots.remove(path)?;
        if pending.posted_at.elapsed() > self.ttl {
            tracing::debug!(path = %path, "discarded expired edit override");
            return None;
        }
        Some(pending.content)
    }

    #[must_use]
    pub fn is_pending(&self, path: &RemotePath) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .is_some_and(|pending| pending.posted_at.elapsed() <= self.ttl)
    }

    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}
