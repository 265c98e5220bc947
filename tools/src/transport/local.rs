//! Local-process transports.
//!
//! `LocalFs` addresses remote paths as paths on this machine, which makes a
//! local directory behave like the remote workspace. `ProcessShell` keeps one
//! long-lived shell process (plain `sh`, or `ssh -T host sh`) and writes
//! submitted text to its stdin.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use ignore::WalkBuilder;
use outpost_types::{RemoteLocator, RemotePath};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;

use super::{RemoteFs, ShellChannel, SshTarget, TransportError, TransportFut};
use crate::glob;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl LocalFs {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn local_path(locator: &RemoteLocator) -> PathBuf {
    PathBuf::from(locator.path.as_str())
}

fn map_io(locator: &RemoteLocator, err: &std::io::Error) -> TransportError {
    if err.kind() == std::io::ErrorKind::NotFound {
        TransportError::not_found(locator)
    } else {
        TransportError::io(locator, err)
    }
}

impl RemoteFs for LocalFs {
    fn read<'a>(&'a self, locator: &'a RemoteLocator) -> TransportFut<'a, Vec<u8>> {
        Box::pin(async move {
            let path = local_path(locator);
            let meta = tokio::fs::metadata(&path)
                .await
                .map_err(|e| map_io(locator, &e))?;
            if meta.is_dir() {
                return Err(TransportError::io(locator, "is a directory"));
            }
            tokio::fs::read(&path).await.map_err(|e| map_io(locator, &e))
        })
    }

    fn write<'a>(
        &'a self,
        locator: &'a RemoteLocator,
        content: &'a [u8],
    ) -> TransportFut<'a, ()> {
        Box::pin(async move {
            let path = local_path(locator);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| TransportError::io(locator, e))?;
            }
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| TransportError::io(locator, e))
        })
    }

    fn list<'a>(
        &'a self,
        base: &'a RemoteLocator,
        pattern: &'a str,
        limit: usize,
    ) -> TransportFut<'a, Vec<RemotePath>> {
        Box::pin(async move {
            let glob_set =
                glob::compile(pattern).map_err(|message| TransportError::InvalidPattern { message })?;
            let root = local_path(base);
            let meta = tokio::fs::metadata(&root)
                .await
                .map_err(|e| map_io(base, &e))?;
            if !meta.is_dir() {
                return Err(TransportError::io(base, "not a directory"));
            }
            let base_path = base.path.clone();
            tokio::task::spawn_blocking(move || walk(&root, &base_path, &glob_set, limit))
                .await
                .map_err(|e| TransportError::io(base, e))
        })
    }
}

fn walk(
    root: &Path,
    base: &RemotePath,
    glob_set: &globset::GlobSet,
    limit: usize,
) -> Vec<RemotePath> {
    // Every file counts, including hidden and ignored ones: the remote side
    // has no notion of our ignore files.
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if !glob_set.is_match(rel) {
            continue;
        }
        files.push(base.join(&rel.to_string_lossy()));
        if files.len() >= limit {
            break;
        }
    }
    files
}

/// A persistent shell process fed through its stdin.
///
/// The shell's stdout is discarded; its stderr is forwarded to `tracing` at
/// debug level. The process is killed when the `ProcessShell` is dropped.
pub struct ProcessShell {
    label: String,
    stdin: Mutex<ChildStdin>,
    _child: Child,
}

impl std::fmt::Debug for ProcessShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessShell")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl ProcessShell {
    /// Spawn `program args...` as the shell. Must be called inside a tokio runtime.
    pub fn spawn<I, S>(program: &str, args: I) -> Result<Self, TransportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = Command::new(program);
        command.args(args);
        Self::spawn_command(program.to_string(), command)
    }

    /// A local `sh`.
    pub fn local() -> Result<Self, TransportError> {
        Self::spawn("sh", std::iter::empty::<&str>())
    }

    /// A remote `sh` behind a persistent ssh session.
    pub fn ssh(target: &SshTarget) -> Result<Self, TransportError> {
        let command = target.command("sh");
        Self::spawn_command(target.label(), command)
    }

    fn spawn_command(label: String, mut command: Command) -> Result<Self, TransportError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(|e| TransportError::Unreachable {
            message: format!("failed to start shell `{label}`: {e}"),
        })?;
        let stdin = child.stdin.take().ok_or_else(|| TransportError::Unreachable {
            message: format!("shell `{label}` has no stdin"),
        })?;
        if let Some(stderr) = child.stderr.take() {
            let label = label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(shell = %label, "{line}");
                }
            });
        }
        tracing::info!(shell = %label, "shell channel started");
        Ok(Self {
            label,
            stdin: Mutex::new(stdin),
            _child: child,
        })
    }
}

impl ShellChannel for ProcessShell {
    fn submit<'a>(&'a self, text: &'a str) -> TransportFut<'a, ()> {
        Box::pin(async move {
            let mut stdin = self.stdin.lock().await;
            let unreachable = |e: std::io::Error| TransportError::Unreachable {
                message: format!("shell `{}` closed: {e}", self.label),
            };
            stdin.write_all(text.as_bytes()).await.map_err(unreachable)?;
            if !text.ends_with('\n') {
                stdin.write_all(b"\n").await.map_err(unreachable)?;
            }
            stdin.flush().await.map_err(unreachable)
        })
    }
}
