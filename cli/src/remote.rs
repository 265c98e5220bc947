//! Wire a [`Bridge`] to its transports from the loaded configuration.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use outpost_config::OutpostConfig;
use outpost_tools::transport::{DEFAULT_MAX_FILE_BYTES, LocalFs, ProcessShell, SshFs, SshTarget};
use outpost_tools::{
    Bridge, ChannelNotifier, CommandExecutor, ExecMode, FileUpdate, PathResolver, RemoteFs,
    SentinelExecutor, SshExecutor, ToolSettings,
};
use outpost_types::RemotePath;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// A ready bridge and the stream of file changes it commits.
pub struct Connection {
    pub bridge: Bridge,
    pub updates: mpsc::Receiver<FileUpdate>,
}

/// Build the bridge. `local` swaps ssh for a local `sh` rooted at that directory.
pub fn connect(config: &OutpostConfig, local: Option<&Path>) -> Result<Connection> {
    let settings = config.tool_settings()?;
    let (resolver, fs, executor) = match local {
        Some(dir) => local_transport(config, dir)?,
        None => ssh_transport(config, &settings)?,
    };

    let (notifier, updates) = ChannelNotifier::channel(UPDATE_CHANNEL_CAPACITY);
    let bridge = Bridge::builder(resolver, fs, executor)
        .settings(settings)
        .notifier(Arc::new(notifier))
        .write_cache_ttl(config.cache_ttl())
        .override_ttl(config.override_ttl())
        .build()?;
    Ok(Connection { bridge, updates })
}

type Transport = (PathResolver, Arc<dyn RemoteFs>, Arc<dyn CommandExecutor>);

fn local_transport(config: &OutpostConfig, dir: &Path) -> Result<Transport> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("--local directory {}", dir.display()))?;
    let root = dir.to_string_lossy().into_owned();
    let local_root = config.local_root().unwrap_or_else(|| dir.clone());
    let resolver = PathResolver::new(local_root, Some(root.as_str()), "")?;

    let fs: Arc<dyn RemoteFs> = Arc::new(LocalFs::new());
    let executor: Arc<dyn CommandExecutor> = match config.exec_mode() {
        ExecMode::Shell => {
            let shell = Arc::new(ProcessShell::local()?);
            Arc::new(
                SentinelExecutor::new(shell, Arc::clone(&fs), "")
                    .with_sentinel_dir(RemotePath::new(config.sentinel_dir()?)?)
                    .with_poll_interval(config.poll_interval()),
            )
        }
        ExecMode::Ssh => Arc::new(
            SshExecutor::new(SshTarget::local_shell())
                .with_max_output_bytes(config.max_output_bytes()),
        ),
    };
    tracing::info!(root = %root, mode = ?config.exec_mode(), "using local workspace");
    Ok((resolver, fs, executor))
}

fn ssh_transport(config: &OutpostConfig, settings: &ToolSettings) -> Result<Transport> {
    let host = config
        .host()
        .context("remote.host is required unless --local is given")?;
    let local_root = match config.local_root() {
        Some(root) => root,
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let resolver = PathResolver::new(local_root, config.workspace_root().as_deref(), &host)
        .context("remote.workspace_root")?;

    let ssh = config.ssh();
    let target = SshTarget::ssh(ssh.binary(), ssh.args(), host.clone());
    let fs: Arc<dyn RemoteFs> = Arc::new(SshFs::new(
        target.clone(),
        settings.default_timeout,
        DEFAULT_MAX_FILE_BYTES,
    ));
    let executor: Arc<dyn CommandExecutor> = match config.exec_mode() {
        ExecMode::Shell => {
            let shell = Arc::new(ProcessShell::ssh(&target)?);
            Arc::new(
                SentinelExecutor::new(shell, Arc::clone(&fs), host.clone())
                    .with_sentinel_dir(RemotePath::new(config.sentinel_dir()?)?)
                    .with_poll_interval(config.poll_interval()),
            )
        }
        ExecMode::Ssh => {
            Arc::new(SshExecutor::new(target).with_max_output_bytes(config.max_output_bytes()))
        }
    };
    tracing::info!(
        host = %host,
        workspace = %resolver.workspace_root(),
        mode = ?config.exec_mode(),
        "connected to remote workspace"
    );
    Ok((resolver, fs, executor))
}

#[cfg(test)]
mod tests {
    use super::connect;
    use outpost_config::OutpostConfig;
    use std::path::Path;

    fn parse(toml: &str) -> OutpostConfig {
        OutpostConfig::parse(toml, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn ssh_mode_requires_a_host() {
        let err = connect(&parse("[remote]\nworkspace_root = \"/srv/app\"\n"), None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("remote.host"));
    }

    #[test]
    fn missing_workspace_root_is_fatal() {
        let err = connect(&parse("[remote]\nhost = \"devbox\"\n"), None)
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("no remote workspace root configured"));
    }

    #[tokio::test]
    async fn local_mode_roots_the_workspace_at_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let connection = connect(&parse("[exec]\nmode = \"ssh\"\n"), Some(dir.path())).unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            connection.bridge.resolver().workspace_root().as_str(),
            expected.to_string_lossy()
        );
    }
}
