//! Request/response execution over a fire-and-forget shell channel.
//!
//! Each command gets a fresh id and three sentinel files in a scratch
//! directory on the remote host: `<id>.out`, `<id>.err` and `<id>.exit`. The
//! submitted text runs the command in the background with its streams
//! redirected to the first two, waits for it, and only then renames the exit
//! status into `<id>.exit`. We poll for that file through the file primitive.
//!
//! The shell is one stateful resource, so a FIFO lock is held for the whole
//! submit, poll, read and cleanup cycle.

use std::sync::Arc;
use std::time::Duration;

use outpost_types::{ExecOutput, RemoteLocator, RemotePath};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{CommandExecutor, ExecFut, scoped_command, shell_quote};
use crate::ToolError;
use crate::transport::{RemoteFs, ShellChannel, TransportError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);
pub const DEFAULT_SENTINEL_DIR: &str = "/tmp/.outpost";
/// Consecutive unreachable polls before the command is given up on.
const MAX_UNREACHABLE_POLLS: u32 = 3;

pub struct SentinelExecutor {
    shell: Arc<dyn ShellChannel>,
    fs: Arc<dyn RemoteFs>,
    authority: String,
    sentinel_dir: RemotePath,
    poll_interval: Duration,
    turn: Mutex<()>,
}

impl std::fmt::Debug for SentinelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentinelExecutor")
            .field("authority", &self.authority)
            .field("sentinel_dir", &self.sentinel_dir)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Sentinel file set for one command.
struct Sentinels {
    id: String,
    out: RemoteLocator,
    err: RemoteLocator,
    exit: RemoteLocator,
    exit_tmp: RemoteLocator,
    pids: RemoteLocator,
}

impl Sentinels {
    fn new(authority: &str, dir: &RemotePath, id: String) -> Self {
        let at = |suffix: &str| RemoteLocator::new(authority, dir.join(&format!("{id}.{suffix}")));
        Self {
            out: at("out"),
            err: at("err"),
            exit: at("exit"),
            exit_tmp: at("exit.tmp"),
            pids: at("pid"),
            id,
        }
    }

    fn quoted(locator: &RemoteLocator) -> Result<String, ToolError> {
        shell_quote(locator.path.as_str())
    }

    /// The text submitted to the shell.
    ///
    /// Runs `scoped` in a background job so the shell stays responsive and
    /// the job can be killed on timeout. Both the waiter's and the command's
    /// pids land in the pid file.
    fn wrap(&self, dir: &RemotePath, scoped: &str) -> Result<String, ToolError> {
        let dir = shell_quote(dir.as_str())?;
        let out = Self::quoted(&self.out)?;
        let err = Self::quoted(&self.err)?;
        let exit = Self::quoted(&self.exit)?;
        let exit_tmp = Self::quoted(&self.exit_tmp)?;
        let pids = Self::quoted(&self.pids)?;
        Ok(format!(
            "mkdir -p {dir} && {{ {{ ( {scoped} ) < /dev/null > {out} 2> {err} & \
             echo $! >> {pids}; wait $!; echo $? > {exit_tmp} && mv -f {exit_tmp} {exit}; }} & \
             echo $! >> {pids}; }}"
        ))
    }

    fn cleanup(&self) -> Result<String, ToolError> {
        Ok(format!(
            "rm -f {} {} {} {} {}",
            Self::quoted(&self.out)?,
            Self::quoted(&self.err)?,
            Self::quoted(&self.exit)?,
            Self::quoted(&self.exit_tmp)?,
            Self::quoted(&self.pids)?,
        ))
    }

    fn abort(&self) -> Result<String, ToolError> {
        Ok(format!(
            "kill $(cat {} 2>/dev/null) 2>/dev/null; {}",
            Self::quoted(&self.pids)?,
            self.cleanup()?
        ))
    }
}

impl SentinelExecutor {
    pub fn new(
        shell: Arc<dyn ShellChannel>,
        fs: Arc<dyn RemoteFs>,
        authority: impl Into<String>,
    ) -> Self {
        Self {
            shell,
            fs,
            authority: authority.into(),
            sentinel_dir: RemotePath::new(DEFAULT_SENTINEL_DIR).unwrap_or_else(|_| RemotePath::root()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            turn: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_sentinel_dir(mut self, dir: RemotePath) -> Self {
        self.sentinel_dir = dir;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn wait_for_exit(&self, sentinels: &Sentinels) -> Result<i32, ToolError> {
        let mut unreachable = 0;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            match self.fs.read(&sentinels.exit).await {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let status = text.trim();
                    // Rename is atomic on POSIX; an empty read means a provider
                    // that surfaced the file before its bytes.
                    if !status.is_empty() {
                        return status.parse::<i32>().map_err(|_| {
                            ToolError::Transport(TransportError::io(
                                &sentinels.exit,
                                format!("malformed exit status {status:?}"),
                            ))
                        });
                    }
                }
                Err(e) if e.is_not_found() => {}
                Err(e @ TransportError::Unreachable { .. }) => {
                    unreachable += 1;
                    tracing::warn!(id = %sentinels.id, attempt = unreachable, "exit sentinel poll failed: {e}");
                    if unreachable >= MAX_UNREACHABLE_POLLS {
                        return Err(e.into());
                    }
                    continue;
                }
                Err(e) => {
                    tracing::debug!(id = %sentinels.id, "exit sentinel poll failed: {e}");
                }
            }
            unreachable = 0;
        }
    }

    async fn read_best_effort(&self, locator: &RemoteLocator) -> String {
        match self.fs.read(locator).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!(%locator, "failed to read command output: {e}");
                }
                String::new()
            }
        }
    }

    async fn submit_best_effort(&self, id: &str, script: Result<String, ToolError>) {
        let result = match script {
            Ok(text) => self.shell.submit(&text).await.map_err(ToolError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(%id, "sentinel cleanup failed: {e}");
        }
    }
}

impl CommandExecutor for SentinelExecutor {
    fn execute<'a>(
        &'a self,
        command: &'a str,
        cwd: Option<&'a RemotePath>,
        timeout: Duration,
    ) -> ExecFut<'a> {
        Box::pin(async move {
            let scoped = scoped_command(command, cwd)?;
            let _turn = self.turn.lock().await;

            let id = uuid::Uuid::new_v4().simple().to_string();
            let sentinels = Sentinels::new(&self.authority, &self.sentinel_dir, id);
            let wrapped = sentinels.wrap(&self.sentinel_dir, &scoped)?;

            tracing::debug!(id = %sentinels.id, "submitting command");
            self.shell.submit(&wrapped).await?;
            let started = Instant::now();

            let exit_code = match tokio::time::timeout(timeout, self.wait_for_exit(&sentinels)).await {
                Ok(Ok(code)) => code,
                Ok(Err(e)) => {
                    self.submit_best_effort(&sentinels.id, sentinels.abort()).await;
                    return Err(e);
                }
                Err(_) => {
                    tracing::warn!(id = %sentinels.id, timeout_ms = timeout.as_millis(), "command timed out");
                    self.submit_best_effort(&sentinels.id, sentinels.abort()).await;
                    return Err(ToolError::TimedOut {
                        elapsed: started.elapsed(),
                    });
                }
            };
            tracing::debug!(id = %sentinels.id, exit_code, elapsed_ms = started.elapsed().as_millis(), "command finished");

            let stdout = self.read_best_effort(&sentinels.out).await;
            let stderr = self.read_best_effort(&sentinels.err).await;
            self.submit_best_effort(&sentinels.id, sentinels.cleanup()).await;

            Ok(ExecOutput {
                stdout,
                stderr,
                exit_code,
            })
        })
    }
}
