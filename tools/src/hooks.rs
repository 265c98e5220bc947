//! Collaborators a host can plug into the bridge: a review gate that approves
//! (and may amend) file changes before they are written, and a notifier told
//! about every committed change.

use std::future::Future;
use std::pin::Pin;

use outpost_types::RemotePath;
use serde_json::Value;
use tokio::sync::mpsc;

/// A proposed file change awaiting review.
#[derive(Debug, Clone, Copy)]
pub struct ReviewRequest<'a> {
    pub tool_name: &'a str,
    pub input: &'a Value,
    pub path: &'a RemotePath,
    /// Current content, or `None` when the file does not exist yet.
    pub old_content: Option<&'a str>,
    pub new_content: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Write `final_content`, which may differ from what was proposed.
    Accepted { final_content: String },
    Rejected { reason: Option<String> },
}

pub type ReviewFut<'a> = Pin<Box<dyn Future<Output = ReviewDecision> + Send + 'a>>;

pub trait ReviewGate: Send + Sync {
    fn review<'a>(&'a self, request: ReviewRequest<'a>) -> ReviewFut<'a>;
}

/// A committed file change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub path: RemotePath,
    pub old_content: Option<String>,
    pub new_content: String,
    pub additions: usize,
    pub deletions: usize,
}

/// Fire-and-forget observer of committed changes. Must not block.
pub trait UpdateNotifier: Send + Sync {
    fn notify(&self, update: FileUpdate);
}

/// Forwards updates over a bounded channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<FileUpdate>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn new(tx: mpsc::Sender<FileUpdate>) -> Self {
        Self { tx }
    }

    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FileUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl UpdateNotifier for ChannelNotifier {
    fn notify(&self, update: FileUpdate) {
        if let Err(e) = self.tx.try_send(update) {
            tracing::warn!("dropped file update notification: {e}");
        }
    }
}
