//! Remote tool-call bridge - core types, helpers, and built-in tool implementations.
//!
//! The bridge answers six agent tool calls (`read_file`, `write_file`,
//! `edit_file`, `glob`, `grep`, `bash`) by driving two remote primitives: a
//! file primitive ([`transport::RemoteFs`]) and a single persistent shell
//! channel ([`transport::ShellChannel`]). See [`bridge::Bridge`] for the entry
//! point.

pub mod bridge;
pub mod builtins;
pub mod config;
pub mod exec;
pub mod glob;
pub mod hooks;
pub mod overrides;
pub mod paths;
pub mod process;
pub mod search;
pub mod transport;
pub mod write_cache;

pub use bridge::{Bridge, BridgeBuilder};
pub use config::{ExecMode, SshConfig, ToolSettings};
pub use exec::{CommandExecutor, SentinelExecutor, SshExecutor};
pub use hooks::{
    ChannelNotifier, FileUpdate, ReviewDecision, ReviewGate, ReviewRequest, UpdateNotifier,
};
pub use overrides::EditOverrides;
pub use paths::{PathResolver, ResolveError};
pub use transport::{RemoteFs, ShellChannel, TransportError};
pub use write_cache::WriteCache;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use outpost_types::{RemotePath, ToolDefinition};
use serde_json::Value;

/// Tool execution future type alias.
pub type ToolFut<'a> = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;

/// Error types for tool execution.
///
/// None of these cross the tool-call boundary: [`Bridge::call`] renders every
/// variant into an error [`outpost_types::ToolCallResult`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Bad tool args: {message}")]
    BadArgs { message: String },
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("Duplicate tool registered: {name}")]
    DuplicateTool { name: String },
    #[error("old_string not found in {path}")]
    NotFound { path: RemotePath },
    #[error(
        "old_string matches {count} locations in {path}; include more surrounding context to make it unique"
    )]
    Ambiguous { path: RemotePath, count: usize },
    #[error("Command timed out after {}ms", .elapsed.as_millis())]
    TimedOut { elapsed: Duration },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Change to {path} rejected{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Rejected {
        path: RemotePath,
        reason: Option<String>,
    },
    #[error("Search tool not available on remote host: {tool}")]
    UnsupportedTool { tool: String },
    #[error("Tool execution failed: {tool}: {message}")]
    ExecutionFailed { tool: String, message: String },
    /// A command ran to completion with a non-zero status. `output` already
    /// carries the exit code for the caller.
    #[error("{output}")]
    CommandFailed { exit_code: i32, output: String },
}

/// A tool the bridge can dispatch to.
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema(&self) -> Value;
    fn is_side_effecting(&self) -> bool;
    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a>;
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::BadArgs {
        message: e.to_string(),
    })
}

/// Tool registry keyed by tool name.
#[derive(Default)]
pub struct ToolRegistry {
    executors: HashMap<String, Box<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn register(&mut self, executor: Box<dyn ToolExecutor>) -> Result<(), ToolError> {
        let name = executor.name().to_string();
        if self.executors.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }
        self.executors.insert(name, executor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn ToolExecutor, ToolError> {
        self.executors
            .get(name)
            .map(std::convert::AsRef::as_ref)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .executors
            .values()
            .map(|exec| ToolDefinition::new(exec.name(), exec.description(), exec.schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

/// Shared state every tool handler runs against.
///
/// One `ToolCtx` lives inside each [`Bridge`]; the write cache and override
/// mailbox are scoped to it rather than to the process.
pub struct ToolCtx {
    pub resolver: PathResolver,
    pub fs: Arc<dyn RemoteFs>,
    pub executor: Arc<dyn CommandExecutor>,
    pub write_cache: WriteCache,
    pub overrides: EditOverrides,
    pub review_gate: Option<Arc<dyn ReviewGate>>,
    pub notifier: Option<Arc<dyn UpdateNotifier>>,
    pub settings: ToolSettings,
}

impl ToolCtx {
    /// Context with default settings, fresh state, and no hooks.
    pub fn new(
        resolver: PathResolver,
        fs: Arc<dyn RemoteFs>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            resolver,
            fs,
            executor,
            write_cache: WriteCache::default(),
            overrides: EditOverrides::default(),
            review_gate: None,
            notifier: None,
            settings: ToolSettings::default(),
        }
    }
}

impl std::fmt::Debug for ToolCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCtx")
            .field("resolver", &self.resolver)
            .field("write_cache", &self.write_cache)
            .field("overrides", &self.overrides)
            .field("review_gate", &self.review_gate.is_some())
            .field("notifier", &self.notifier.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Validate arguments against a JSON schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ToolError::BadArgs {
        message: format!("Invalid tool schema: {e}"),
    })?;
    let result = validator.validate(args);
    if let Err(err) = result {
        return Err(ToolError::BadArgs {
            message: err.to_string(),
        });
    }
    Ok(())
}
