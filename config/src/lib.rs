//! Configuration loading for Outpost.
//!
//! ```toml
//! [remote]
//! host = "devbox"
//! workspace_root = "/srv/${USER}/project"
//! local_root = "/home/me/project"
//!
//! [remote.ssh]
//! args = ["-o", "BatchMode=yes"]
//!
//! [exec]
//! mode = "shell"            # or "ssh"
//! default_timeout_ms = 120000
//!
//! [cache]
//! ttl_ms = 10000
//! ```
//!
//! String values support `${VAR}` environment expansion.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use outpost_tools::config::DEFAULT_READ_MAX_CHARS;
use outpost_tools::exec::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_POLL_INTERVAL, DEFAULT_SENTINEL_DIR};
use outpost_tools::overrides::DEFAULT_OVERRIDE_TTL;
use outpost_tools::write_cache::DEFAULT_WRITE_CACHE_TTL;
use outpost_tools::{ExecMode, SshConfig, ToolSettings};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OutpostConfig {
    pub remote: Option<RemoteConfig>,
    pub exec: Option<ExecConfig>,
    pub cache: Option<TtlConfig>,
    pub overrides: Option<TtlConfig>,
    pub tools: Option<ToolsConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoteConfig {
    /// ssh destination (`host`, `user@host`, or an ssh config alias).
    pub host: Option<String>,
    /// Absolute workspace path on the remote host. Required.
    pub workspace_root: Option<String>,
    /// Local directory that mirrors the workspace. Defaults to the current directory.
    pub local_root: Option<String>,
    pub ssh: Option<SshConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecConfig {
    pub mode: Option<ExecMode>,
    pub default_timeout_ms: Option<u64>,
    pub max_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub sentinel_dir: Option<String>,
    pub max_output_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TtlConfig {
    pub ttl_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolsConfig {
    pub read_max_chars: Option<usize>,
    pub glob_limit: Option<usize>,
    pub grep_max_results: Option<usize>,
    pub grep_binary: Option<String>,
    pub grep_fallback_binary: Option<String>,
    pub review_timeout_ms: Option<u64>,
}

/// Replace `${VAR}` with the value of `VAR` (empty when unset).
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + end_rel];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + end_rel + 1..];
    }
    out.push_str(rest);
    out
}

fn expanded(value: Option<&String>) -> Option<String> {
    value
        .map(|v| expand_env_vars(v))
        .filter(|v| !v.trim().is_empty())
}

/// `~/.outpost`, the home of the config file and logs.
#[must_use]
pub fn outpost_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".outpost"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    outpost_dir().map(|dir| dir.join("config.toml"))
}

impl OutpostConfig {
    /// Load the default config file. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    #[must_use]
    pub fn host(&self) -> Option<String> {
        expanded(self.remote.as_ref()?.host.as_ref())
    }

    #[must_use]
    pub fn workspace_root(&self) -> Option<String> {
        expanded(self.remote.as_ref()?.workspace_root.as_ref())
    }

    #[must_use]
    pub fn local_root(&self) -> Option<PathBuf> {
        expanded(self.remote.as_ref()?.local_root.as_ref()).map(PathBuf::from)
    }

    /// ssh settings with `${VAR}` expanded in the binary and every argument.
    #[must_use]
    pub fn ssh(&self) -> SshConfig {
        let Some(ssh) = self.remote.as_ref().and_then(|r| r.ssh.as_ref()) else {
            return SshConfig::default();
        };
        SshConfig {
            binary: expanded(ssh.binary.as_ref()),
            args: ssh
                .args
                .as_ref()
                .map(|args| args.iter().map(|a| expand_env_vars(a)).collect()),
        }
    }

    #[must_use]
    pub fn exec_mode(&self) -> ExecMode {
        self.exec.as_ref().and_then(|e| e.mode).unwrap_or_default()
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.exec
            .as_ref()
            .and_then(|e| e.poll_interval_ms)
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis)
    }

    /// Absolute scratch directory for sentinel files on the remote host.
    pub fn sentinel_dir(&self) -> Result<String, ConfigError> {
        let dir = self
            .exec
            .as_ref()
            .and_then(|e| expanded(e.sentinel_dir.as_ref()))
            .unwrap_or_else(|| DEFAULT_SENTINEL_DIR.to_string());
        if !dir.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "exec.sentinel_dir",
                message: format!("must be an absolute path (got {dir})"),
            });
        }
        Ok(dir)
    }

    #[must_use]
    pub fn max_output_bytes(&self) -> usize {
        self.exec
            .as_ref()
            .and_then(|e| e.max_output_bytes)
            .unwrap_or(DEFAULT_MAX_OUTPUT_BYTES)
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache
            .as_ref()
            .and_then(|c| c.ttl_ms)
            .map_or(DEFAULT_WRITE_CACHE_TTL, Duration::from_millis)
    }

    #[must_use]
    pub fn override_ttl(&self) -> Duration {
        self.overrides
            .as_ref()
            .and_then(|c| c.ttl_ms)
            .map_or(DEFAULT_OVERRIDE_TTL, Duration::from_millis)
    }

    /// Tool settings with every unset field at its default.
    pub fn tool_settings(&self) -> Result<ToolSettings, ConfigError> {
        let mut settings = ToolSettings::default();
        if let Some(exec) = &self.exec {
            if let Some(ms) = exec.default_timeout_ms {
                settings.default_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = exec.max_timeout_ms {
                settings.max_timeout = Duration::from_millis(ms);
            }
        }
        if settings.default_timeout > settings.max_timeout {
            return Err(ConfigError::Invalid {
                field: "exec.default_timeout_ms",
                message: format!(
                    "{}ms exceeds exec.max_timeout_ms ({}ms)",
                    settings.default_timeout.as_millis(),
                    settings.max_timeout.as_millis()
                ),
            });
        }
        if let Some(tools) = &self.tools {
            if let Some(chars) = tools.read_max_chars {
                settings.read_max_chars = chars;
            }
            if let Some(limit) = tools.glob_limit {
                settings.glob_limit = limit;
            }
            if let Some(max) = tools.grep_max_results {
                settings.grep_max_results = max;
            }
            if let Some(binary) = expanded(tools.grep_binary.as_ref()) {
                settings.grep_binary = binary;
            }
            if let Some(binary) = expanded(tools.grep_fallback_binary.as_ref()) {
                settings.grep_fallback_binary = binary;
            }
            if let Some(ms) = tools.review_timeout_ms {
                settings.review_timeout = Duration::from_millis(ms);
            }
        }
        if settings.read_max_chars == 0 {
            tracing::warn!("tools.read_max_chars = 0; using {DEFAULT_READ_MAX_CHARS}");
            settings.read_max_chars = DEFAULT_READ_MAX_CHARS;
        }
        Ok(settings)
    }
}
