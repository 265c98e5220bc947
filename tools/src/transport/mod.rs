//! Remote primitives the bridge drives.
//!
//! The bridge never talks to a host directly. It sees two capabilities:
//!
//! - [`RemoteFs`]: read, write and list-by-pattern against remote files
//! - [`ShellChannel`]: one persistent shell that accepts command text and
//!   offers no way to learn when a submitted command finished
//!
//! Concrete implementations live in the submodules.

mod local;
mod memory;
mod ssh;

pub use local::{LocalFs, ProcessShell};
pub use memory::MemoryFs;
pub use ssh::{DEFAULT_MAX_FILE_BYTES, SshFs, SshTarget};

use std::future::Future;
use std::pin::Pin;

use outpost_types::{RemoteLocator, RemotePath};

pub type TransportFut<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("File not found: {locator}")]
    NotFound { locator: String },
    #[error("Remote host unreachable: {message}")]
    Unreachable { message: String },
    #[error("I/O failure on {locator}: {message}")]
    Io { locator: String, message: String },
    #[error("{message}")]
    InvalidPattern { message: String },
}

impl TransportError {
    pub(crate) fn io(locator: &impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        Self::Io {
            locator: locator.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn not_found(locator: &impl std::fmt::Display) -> Self {
        Self::NotFound {
            locator: locator.to_string(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Remote file primitive.
pub trait RemoteFs: Send + Sync {
    /// Full contents of a remote file. A missing file is [`TransportError::NotFound`].
    fn read<'a>(&'a self, locator: &'a RemoteLocator) -> TransportFut<'a, Vec<u8>>;

    /// Create or replace a remote file, creating parent directories as needed.
    fn write<'a>(&'a self, locator: &'a RemoteLocator, content: &'a [u8])
    -> TransportFut<'a, ()>;

    /// Files below `base` whose path relative to `base` matches `pattern`.
    ///
    /// Returns at most `limit` paths in no particular order. `.git`
    /// directories are skipped.
    fn list<'a>(
        &'a self,
        base: &'a RemoteLocator,
        pattern: &'a str,
        limit: usize,
    ) -> TransportFut<'a, Vec<RemotePath>>;
}

/// A single persistent remote shell.
///
/// Text is submitted as if typed at the prompt. Output and completion are not
/// observable through this trait; see [`crate::exec::SentinelExecutor`].
pub trait ShellChannel: Send + Sync {
    fn submit<'a>(&'a self, text: &'a str) -> TransportFut<'a, ()>;
}
