//! Built-in tool implementations: file tools and `bash`. `grep` lives in
//! [`crate::search`].

use outpost_types::{RemotePath, truncate_middle};
use serde::Deserialize;
use serde_json::{Value, json};
use similar::{ChangeTag, TextDiff};

use super::{ToolCtx, ToolError, ToolExecutor, ToolFut, ToolRegistry, parse_args};
use crate::hooks::{FileUpdate, ReviewDecision, ReviewRequest};
use crate::search::GrepTool;
use crate::transport::TransportError;

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
    offset: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct EditFileArgs {
    path: String,
    old_string: String,
    new_string: String,
}

#[derive(Debug, Deserialize)]
struct GlobArgs {
    pattern: String,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BashArgs {
    command: String,
    cwd: Option<String>,
    timeout_ms: Option<u64>,
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::BadArgs {
            message: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

/// Count added and removed lines between two versions of a file.
#[must_use]
pub fn compute_diff_stats(old_text: &str, new_text: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(old_text, new_text);

    let mut additions = 0;
    let mut deletions = 0;

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }

    (additions, deletions)
}

/// Latest known content of `path`: our own recent write if the cache still
/// holds one, otherwise a live read decoded as lossy UTF-8.
pub(crate) async fn read_current(ctx: &ToolCtx, path: &RemotePath) -> Result<String, TransportError> {
    if let Some(content) = ctx.write_cache.get(path) {
        tracing::debug!(%path, "read served from write cache");
        return Ok(content);
    }
    let locator = ctx.resolver.locator_for(path.clone());
    let bytes = ctx.fs.read(&locator).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Prior content for diffs and review. Missing or unreadable reads as `None`.
async fn read_prior(ctx: &ToolCtx, path: &RemotePath) -> Option<String> {
    match read_current(ctx, path).await {
        Ok(content) => Some(content),
        Err(e) => {
            if !e.is_not_found() {
                tracing::debug!(%path, "prior content unavailable: {e}");
            }
            None
        }
    }
}

/// Ask the review gate about a change. Without a gate the proposal stands.
async fn review(
    ctx: &ToolCtx,
    tool_name: &str,
    input: &Value,
    path: &RemotePath,
    old_content: Option<&str>,
    proposed: String,
) -> Result<String, ToolError> {
    let Some(gate) = ctx.review_gate.as_ref() else {
        return Ok(proposed);
    };
    let request = ReviewRequest {
        tool_name,
        input,
        path,
        old_content,
        new_content: &proposed,
    };
    let decision = tokio::time::timeout(ctx.settings.review_timeout, gate.review(request)).await;
    match decision {
        Ok(ReviewDecision::Accepted { final_content }) => Ok(final_content),
        Ok(ReviewDecision::Rejected { reason }) => {
            tracing::info!(%path, tool = tool_name, "change rejected by reviewer");
            Err(ToolError::Rejected {
                path: path.clone(),
                reason,
            })
        }
        Err(_) => {
            tracing::warn!(%path, tool = tool_name, "review timed out");
            Err(ToolError::Rejected {
                path: path.clone(),
                reason: Some("review timed out".to_string()),
            })
        }
    }
}

/// Write `content`, record it for read-after-write visibility, and tell the
/// notifier. Returns the diff stats against `old_content`.
async fn write_and_record(
    ctx: &ToolCtx,
    path: &RemotePath,
    old_content: Option<String>,
    content: String,
) -> Result<(usize, usize), ToolError> {
    let locator = ctx.resolver.locator_for(path.clone());
    ctx.fs.write(&locator, content.as_bytes()).await?;
    ctx.write_cache.record(path, &content);

    let (additions, deletions) = compute_diff_stats(old_content.as_deref().unwrap_or(""), &content);
    tracing::info!(%path, additions, deletions, "file written");
    if let Some(notifier) = ctx.notifier.as_ref() {
        notifier.notify(FileUpdate {
            path: path.clone(),
            old_content,
            new_content: content,
            additions,
            deletions,
        });
    }
    Ok((additions, deletions))
}

/// Commit a pending override for `path` if one is waiting.
async fn apply_override(ctx: &ToolCtx, path: &RemotePath) -> Result<Option<String>, ToolError> {
    let Some(content) = ctx.overrides.consume(path) else {
        return Ok(None);
    };
    tracing::info!(%path, "writing reviewed override");
    let prior = read_prior(ctx, path).await;
    let (additions, deletions) = write_and_record(ctx, path, prior, content).await?;
    Ok(Some(format!(
        "Wrote reviewed content to {path} (+{additions} -{deletions})"
    )))
}

#[derive(Debug, Default)]
pub struct ReadFileTool;

impl ToolExecutor for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file on the remote host, optionally a range of lines"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute path, or path relative to the workspace root" },
                "offset": { "type": "integer", "minimum": 1, "description": "First line to return (1-indexed)" },
                "limit": { "type": "integer", "minimum": 1, "description": "Number of lines to return" }
            },
            "required": ["path"]
        })
    }

    fn is_side_effecting(&self) -> bool {
        false
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: ReadFileArgs = parse_args(&args)?;
            require_non_empty("path", &typed.path)?;
            if typed.offset == Some(0) {
                return Err(ToolError::BadArgs {
                    message: "offset must be >= 1".to_string(),
                });
            }

            let path = ctx.resolver.to_remote_path(&typed.path);
            let content = read_current(ctx, &path).await?;
            if content.is_empty() {
                return Ok("(empty file)".to_string());
            }

            let sliced = if typed.offset.is_none() && typed.limit.is_none() {
                content
            } else {
                let lines: Vec<&str> = content.split_inclusive('\n').collect();
                let start = typed.offset.unwrap_or(1) - 1;
                if start >= lines.len() {
                    return Ok(format!(
                        "offset {} is beyond end of file ({} lines)",
                        start + 1,
                        lines.len()
                    ));
                }
                let end = typed
                    .limit
                    .map_or(lines.len(), |limit| start.saturating_add(limit).min(lines.len()));
                lines[start..end].concat()
            };

            Ok(truncate_middle(&sliced, ctx.settings.read_max_chars))
        })
    }
}

#[derive(Debug, Default)]
pub struct WriteFileTool;

impl ToolExecutor for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Create or overwrite a file on the remote host"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path to write. Parent directories are created automatically." },
                "content": { "type": "string", "description": "Full file content to write." }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    fn is_side_effecting(&self) -> bool {
        true
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: WriteFileArgs = parse_args(&args)?;
            require_non_empty("path", &typed.path)?;
            let path = ctx.resolver.to_remote_path(&typed.path);

            if let Some(confirmation) = apply_override(ctx, &path).await? {
                return Ok(confirmation);
            }

            let prior = read_prior(ctx, &path).await;
            let reviewed = review(
                ctx,
                self.name(),
                &args,
                &path,
                prior.as_deref(),
                typed.content,
            )
            .await?;
            // A reviewer may have posted an override while the gate was open.
            let content = ctx.overrides.consume(&path).unwrap_or(reviewed);

            let existed = prior.is_some();
            let (additions, deletions) = write_and_record(ctx, &path, prior, content).await?;
            let verb = if existed { "Updated" } else { "Created" };
            Ok(format!("{verb} {path} (+{additions} -{deletions})"))
        })
    }
}

#[derive(Debug, Default)]
pub struct EditFileTool;

impl ToolExecutor for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Replace one exact, unique occurrence of old_string with new_string in a remote file"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to edit" },
                "old_string": { "type": "string", "description": "Exact text to replace; must occur exactly once" },
                "new_string": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    fn is_side_effecting(&self) -> bool {
        true
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: EditFileArgs = parse_args(&args)?;
            require_non_empty("path", &typed.path)?;
            let path = ctx.resolver.to_remote_path(&typed.path);

            // Reviewed content wins over whatever this call asked for.
            if let Some(confirmation) = apply_override(ctx, &path).await? {
                return Ok(confirmation);
            }

            if typed.old_string.is_empty() {
                return Err(ToolError::BadArgs {
                    message: "old_string must not be empty".to_string(),
                });
            }
            if typed.old_string == typed.new_string {
                return Err(ToolError::BadArgs {
                    message: "old_string and new_string are identical; nothing to change".to_string(),
                });
            }

            let current = read_current(ctx, &path).await?;
            match current.matches(typed.old_string.as_str()).count() {
                0 => return Err(ToolError::NotFound { path }),
                1 => {}
                count => return Err(ToolError::Ambiguous { path, count }),
            }
            let updated = current.replacen(typed.old_string.as_str(), &typed.new_string, 1);

            let reviewed = review(ctx, self.name(), &args, &path, Some(&current), updated).await?;
            let content = ctx.overrides.consume(&path).unwrap_or(reviewed);

            let (additions, deletions) =
                write_and_record(ctx, &path, Some(current), content).await?;
            Ok(format!("Edited {path} (+{additions} -{deletions})"))
        })
    }
}

#[derive(Debug, Default)]
pub struct GlobTool;

impl ToolExecutor for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn description(&self) -> &'static str {
        "Find remote file paths by glob pattern (names only, not contents)"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern relative to the base directory (e.g., '**/*.rs', 'src/**/*.{ts,tsx}'). Supports brace expansion."
                },
                "path": {
                    "type": "string",
                    "description": "Base directory to search from. Defaults to the workspace root."
                }
            },
            "required": ["pattern"]
        })
    }

    fn is_side_effecting(&self) -> bool {
        false
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: GlobArgs = parse_args(&args)?;
            require_non_empty("pattern", &typed.pattern)?;
            crate::glob::compile(&typed.pattern).map_err(|message| ToolError::BadArgs { message })?;

            let base = typed.path.as_deref().map_or_else(
                || ctx.resolver.workspace_root().clone(),
                |raw| ctx.resolver.to_remote_path(raw),
            );
            let limit = ctx.settings.glob_limit;
            let locator = ctx.resolver.locator_for(base);
            // One extra entry tells us whether the bound was hit.
            let mut files = ctx
                .fs
                .list(&locator, &typed.pattern, limit.saturating_add(1))
                .await?;
            files.sort();
            let truncated = files.len() > limit;
            files.truncate(limit);

            if files.is_empty() {
                return Ok(format!("No files match pattern: {}", typed.pattern));
            }
            let mut out = files
                .iter()
                .map(RemotePath::as_str)
                .collect::<Vec<_>>()
                .join("\n");
            if truncated {
                out.push_str(&format!("\n\n[truncated at {limit} matches]"));
            }
            Ok(out)
        })
    }
}

#[derive(Debug, Default)]
pub struct BashTool;

impl ToolExecutor for BashTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn description(&self) -> &'static str {
        "Run a shell command on the remote host and return its output"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run" },
                "cwd": { "type": "string", "description": "Working directory. Defaults to the workspace root." },
                "timeout_ms": { "type": "integer", "minimum": 1, "description": "Timeout in milliseconds (default 120000)" }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn is_side_effecting(&self) -> bool {
        true
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: BashArgs = parse_args(&args)?;
            require_non_empty("command", &typed.command)?;
            let cwd = typed.cwd.as_deref().map_or_else(
                || ctx.resolver.workspace_root().clone(),
                |raw| ctx.resolver.to_remote_path(raw),
            );
            let timeout = ctx.settings.clamp_timeout(typed.timeout_ms);

            let output = ctx
                .executor
                .execute(&typed.command, Some(&cwd), timeout)
                .await?;

            let mut combined = output.stdout;
            if !output.stderr.is_empty() {
                if !combined.is_empty() && !combined.ends_with('\n') {
                    combined.push('\n');
                }
                combined.push_str(&output.stderr);
            }

            let exit_code = output.exit_code;
            let text = if combined.trim().is_empty() {
                format!("(no output, exit code {exit_code})")
            } else {
                let mut text = truncate_middle(&combined, ctx.settings.read_max_chars);
                if exit_code != 0 {
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text.push_str(&format!("[exit code {exit_code}]"));
                }
                text
            };

            if exit_code == 0 {
                Ok(text)
            } else {
                Err(ToolError::CommandFailed {
                    exit_code,
                    output: text,
                })
            }
        })
    }
}

/// Register the six built-in tools.
pub fn register_builtins(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    registry.register(Box::new(ReadFileTool))?;
    registry.register(Box::new(WriteFileTool))?;
    registry.register(Box::new(EditFileTool))?;
    registry.register(Box::new(GlobTool))?;
    registry.register(Box::new(GrepTool))?;
    registry.register(Box::new(BashTool))?;
    Ok(())
}
