//! Content search on the remote host.
//!
//! Runs ripgrep through the command executor. When the host does not have it
//! the same query is rebuilt once for POSIX `grep`.

use outpost_types::{ExecOutput, RemotePath, truncate_middle};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolCtx, ToolError, ToolExecutor, ToolFut, parse_args};
use crate::exec::shell_quote;

const GREP_TOOL_NAME: &str = "grep";

#[derive(Debug, Deserialize)]
struct GrepArgs {
    pattern: String,
    path: Option<String>,
    include: Option<String>,
    context: Option<usize>,
    max_results: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Ripgrep,
    PosixGrep,
}

/// One search request, independent of the binary that serves it.
#[derive(Debug)]
struct Query<'a> {
    pattern: &'a str,
    root: &'a RemotePath,
    include: Option<&'a str>,
    context: usize,
}

impl Query<'_> {
    fn command(&self, backend: Backend, binary: &str) -> Result<String, ToolError> {
        let mut parts = vec![shell_quote(binary)?];
        match backend {
            Backend::Ripgrep => {
                parts.extend(["-n", "--no-heading", "--color", "never"].map(str::to_string));
                if self.context > 0 {
                    parts.push(format!("-C {}", self.context));
                }
                if let Some(include) = self.include {
                    parts.push(format!("--glob {}", shell_quote(include)?));
                }
            }
            Backend::PosixGrep => {
                parts.extend(["-r", "-n"].map(str::to_string));
                if self.context > 0 {
                    parts.push(format!("-C {}", self.context));
                }
                if let Some(include) = self.include {
                    parts.push(format!("--include={}", shell_quote(include)?));
                }
            }
        }
        parts.push(format!("-e {}", shell_quote(self.pattern)?));
        parts.push("--".to_string());
        parts.push(shell_quote(self.root.as_str())?);
        Ok(parts.join(" "))
    }
}

/// The shell could not find the search binary.
fn binary_missing(output: &ExecOutput) -> bool {
    output.exit_code == 127 || output.stderr.contains("not found")
}

#[derive(Debug, Default)]
pub struct GrepTool;

impl GrepTool {
    async fn run(
        ctx: &ToolCtx,
        query: &Query<'_>,
        backend: Backend,
        binary: &str,
    ) -> Result<ExecOutput, ToolError> {
        let command = query.command(backend, binary)?;
        tracing::debug!(%command, "running content search");
        let output = ctx
            .executor
            .execute(
                &command,
                Some(ctx.resolver.workspace_root()),
                ctx.settings.default_timeout,
            )
            .await?;
        if binary_missing(&output) {
            return Err(ToolError::UnsupportedTool {
                tool: binary.to_string(),
            });
        }
        Ok(output)
    }
}

impl ToolExecutor for GrepTool {
    fn name(&self) -> &'static str {
        GREP_TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Search remote file contents with a regular expression"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression to search for" },
                "path": { "type": "string", "description": "File or directory to search. Defaults to the workspace root." },
                "include": { "type": "string", "description": "Only search files whose name matches this glob (e.g. '*.rs')" },
                "context": { "type": "integer", "minimum": 0, "description": "Lines of context around each match" },
                "max_results": { "type": "integer", "minimum": 1, "description": "Maximum output lines (default 200)" }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    fn is_side_effecting(&self) -> bool {
        false
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: GrepArgs = parse_args(&args)?;
            if typed.pattern.is_empty() {
                return Err(ToolError::BadArgs {
                    message: "pattern must not be empty".to_string(),
                });
            }
            let root = typed.path.as_deref().map_or_else(
                || ctx.resolver.workspace_root().clone(),
                |raw| ctx.resolver.to_remote_path(raw),
            );
            let query = Query {
                pattern: &typed.pattern,
                root: &root,
                include: typed.include.as_deref().filter(|s| !s.trim().is_empty()),
                context: typed.context.unwrap_or(0),
            };

            let settings = &ctx.settings;
            let output =
                match Self::run(ctx, &query, Backend::Ripgrep, &settings.grep_binary).await {
                    Err(ToolError::UnsupportedTool { tool }) => {
                        tracing::info!(
                            missing = %tool,
                            fallback = %settings.grep_fallback_binary,
                            "search binary missing on host; retrying with fallback"
                        );
                        Self::run(ctx, &query, Backend::PosixGrep, &settings.grep_fallback_binary)
                            .await?
                    }
                    other => other?,
                };

            if output.exit_code == 1 && output.stdout.trim().is_empty() {
                return Ok(format!("No matches found for pattern: {}", typed.pattern));
            }
            if output.exit_code > 1 {
                let stderr = output.stderr.trim();
                return Err(ToolError::ExecutionFailed {
                    tool: GREP_TOOL_NAME.to_string(),
                    message: if stderr.is_empty() {
                        format!("exit code {}", output.exit_code)
                    } else {
                        stderr.to_string()
                    },
                });
            }

            let max_results = typed.max_results.unwrap_or(settings.grep_max_results).max(1);
            let lines: Vec<&str> = output.stdout.lines().collect();
            if lines.is_empty() {
                return Ok(format!("No matches found for pattern: {}", typed.pattern));
            }
            let mut out = lines[..lines.len().min(max_results)].join("\n");
            if lines.len() > max_results {
                out.push_str(&format!(
                    "\n\n[truncated at {max_results} of {} lines]",
                    lines.len()
                ));
            }
            Ok(truncate_middle(&out, settings.read_max_chars))
        })
    }
}
