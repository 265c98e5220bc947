//! Core domain types for Outpost.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the bridge.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod text;
pub use text::{TRUNCATION_MARKER, truncate_middle};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Remote Paths
// ============================================================================

/// An absolute, lexically normalized path on the remote host.
///
/// Remote paths are always POSIX-style regardless of the local platform, so
/// this wraps a `String` rather than a `PathBuf`. `.` and `..` components are
/// folded away on construction; `..` never climbs above `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RemotePathError {
    #[error("remote path must not be empty")]
    Empty,
    #[error("remote path must be absolute (got {0})")]
    Relative(String),
}

impl RemotePath {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, RemotePathError> {
        let raw = raw.as_ref();
        if raw.trim().is_empty() {
            return Err(RemotePathError::Empty);
        }
        if !raw.starts_with('/') {
            return Err(RemotePathError::Relative(raw.to_string()));
        }
        Ok(Self(normalize_components(raw.split('/'))))
    }

    /// The filesystem root, `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Join a relative remainder onto this path.
    ///
    /// A remainder that starts with `/` is still treated as relative; callers
    /// that want absolute-path passthrough should check before joining.
    #[must_use]
    pub fn join(&self, remainder: &str) -> Self {
        let base = self.0.split('/');
        let rest = remainder.split(['/', '\\']);
        Self(normalize_components(base.chain(rest)))
    }

    /// Join a relative remainder that may not leave this path.
    ///
    /// Leading `..` components stop at `self`, so the result is always
    /// `self` or something below it.
    #[must_use]
    pub fn join_within(&self, remainder: &str) -> Self {
        let clamped = normalize_components(remainder.split(['/', '\\']));
        self.join(&clamped)
    }

    /// Parent directory, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0 == "/" {
            return None;
        }
        let idx = self.0.rfind('/')?;
        if idx == 0 {
            Some(Self::root())
        } else {
            Some(Self(self.0[..idx].to_string()))
        }
    }

    /// Final path component, or `None` for the root.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.0 == "/" {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Remainder of this path below `base`, compared component-wise.
    ///
    /// Returns `Some("")` when the paths are equal and `None` when `self` is
    /// not under `base` (`/work/app` does not own `/work/application`).
    #[must_use]
    pub fn strip_prefix(&self, base: &RemotePath) -> Option<&str> {
        if base.0 == "/" {
            return Some(self.0.trim_start_matches('/'));
        }
        let rest = self.0.strip_prefix(base.0.as_str())?;
        if rest.is_empty() {
            return Some("");
        }
        rest.strip_prefix('/')
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

fn normalize_components<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in parts {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for part in stack {
        out.push('/');
        out.push_str(part);
    }
    out
}

impl TryFrom<String> for RemotePath {
    type Error = RemotePathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RemotePath> for String {
    fn from(value: RemotePath) -> Self {
        value.0
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A transport-addressable reference to a remote file: host authority plus path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteLocator {
    pub authority: String,
    pub path: RemotePath,
}

impl RemoteLocator {
    pub fn new(authority: impl Into<String>, path: RemotePath) -> Self {
        Self {
            authority: authority.into(),
            path,
        }
    }

    /// Locator for a sibling path on the same host.
    #[must_use]
    pub fn with_path(&self, path: RemotePath) -> Self {
        Self {
            authority: self.authority.clone(),
            path,
        }
    }
}

impl fmt::Display for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.authority.is_empty() {
            return write!(f, "{}", self.path);
        }
        write!(f, "remote://{}{}", self.authority, self.path)
    }
}

// ============================================================================
// Tool Calling Types
// ============================================================================

/// Definition of a tool exposed to the agent.
///
/// This follows the standard function calling schema (name, description,
/// JSON Schema parameters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (function name).
    pub name: String,
    /// A description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// The result of executing a tool call.
///
/// Every failure inside the bridge ends up here with `is_error` set; nothing
/// else crosses the tool-call boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

/// Completed remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
