//! Configuration types used by the tool handlers and executors.
//!
//! The TOML loader lives in `outpost-config`; these are the pieces the tools
//! crate needs without depending on it.

use std::time::Duration;

use serde::Deserialize;

use crate::exec::DEFAULT_EXEC_TIMEOUT;

/// How commands reach the remote host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Sentinel protocol over the persistent shell channel.
    #[default]
    Shell,
    /// A fresh ssh subprocess per command.
    Ssh,
}

/// Secure-shell client configuration.
///
/// ```toml
/// [remote.ssh]
/// binary = "/usr/bin/ssh"
/// args = ["-o", "BatchMode=yes"]
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SshConfig {
    /// Override the ssh binary (default `ssh`).
    pub binary: Option<String>,
    /// Extra arguments placed before the destination.
    pub args: Option<Vec<String>>,
}

impl SshConfig {
    #[must_use]
    pub fn binary(&self) -> &str {
        self.binary.as_deref().unwrap_or("ssh")
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        self.args.as_deref().unwrap_or_default()
    }
}

pub const DEFAULT_READ_MAX_CHARS: usize = 30_000;
pub const DEFAULT_GLOB_LIMIT: usize = 1_000;
pub const DEFAULT_GREP_MAX_RESULTS: usize = 200;
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_REVIEW_TIMEOUT: Duration = Duration::from_secs(300);

/// Limits and knobs for the built-in tools.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Character budget for `read_file` and `grep` output.
    pub read_max_chars: usize,
    /// Maximum paths returned by `glob`.
    pub glob_limit: usize,
    /// Default `max_results` for `grep`.
    pub grep_max_results: usize,
    /// Primary content search binary.
    pub grep_binary: String,
    /// POSIX fallback used when the primary is missing on the host.
    pub grep_fallback_binary: String,
    /// Timeout for `bash` when the call does not give one, and for searches.
    pub default_timeout: Duration,
    /// Upper bound on a caller-supplied `timeout_ms`.
    pub max_timeout: Duration,
    /// How long the review gate may deliberate before the change is rejected.
    pub review_timeout: Duration,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            read_max_chars: DEFAULT_READ_MAX_CHARS,
            glob_limit: DEFAULT_GLOB_LIMIT,
            grep_max_results: DEFAULT_GREP_MAX_RESULTS,
            grep_binary: "rg".to_string(),
            grep_fallback_binary: "grep".to_string(),
            default_timeout: DEFAULT_EXEC_TIMEOUT,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            review_timeout: DEFAULT_REVIEW_TIMEOUT,
        }
    }
}

impl ToolSettings {
    /// Effective timeout for a call that asked for `requested_ms`.
    #[must_use]
    pub fn clamp_timeout(&self, requested_ms: Option<u64>) -> Duration {
        requested_ms
            .map_or(self.default_timeout, Duration::from_millis)
            .min(self.max_timeout)
    }
}
