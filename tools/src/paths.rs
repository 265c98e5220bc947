//! Mapping between the agent's local view of the tree and remote paths.
//!
//! The agent runs against a local working root that mirrors the remote
//! workspace. Logical paths arrive in one of three shapes:
//!
//! - under the local working root: rebased onto the remote workspace root
//! - any other absolute path: already remote-addressed, passed through
//! - relative: joined onto the remote workspace root
//!
//! The first and last shapes stay inside the workspace: `..` stops at its root.

use std::path::{Path, PathBuf};

use outpost_types::{RemoteLocator, RemotePath, RemotePathError};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no remote workspace root configured")]
    MissingWorkspaceRoot,
    #[error("invalid remote workspace root: {0}")]
    InvalidWorkspaceRoot(#[from] RemotePathError),
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    local_root: PathBuf,
    workspace_root: RemotePath,
    authority: String,
}

impl PathResolver {
    /// Build a resolver.
    ///
    /// A missing workspace root is a configuration error and is reported here,
    /// once, rather than on every call.
    pub fn new(
        local_root: impl Into<PathBuf>,
        workspace_root: Option<&str>,
        authority: impl Into<String>,
    ) -> Result<Self, ResolveError> {
        let raw = workspace_root
            .filter(|root| !root.trim().is_empty())
            .ok_or(ResolveError::MissingWorkspaceRoot)?;
        Ok(Self {
            local_root: local_root.into(),
            workspace_root: RemotePath::new(raw)?,
            authority: authority.into(),
        })
    }

    #[must_use]
    pub fn workspace_root(&self) -> &RemotePath {
        &self.workspace_root
    }

    #[must_use]
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    #[must_use]
    pub fn to_remote_path(&self, logical: &str) -> RemotePath {
        if let Ok(rest) = Path::new(logical).strip_prefix(&self.local_root) {
            let rest: Vec<String> = rest
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            return self.workspace_root.join_within(&rest.join("/"));
        }
        if logical.starts_with('/')
            && let Ok(path) = RemotePath::new(logical)
        {
            return path;
        }
        self.workspace_root.join_within(logical)
    }

    #[must_use]
    pub fn remote_locator(&self, logical: &str) -> RemoteLocator {
        self.locator_for(self.to_remote_path(logical))
    }

    #[must_use]
    pub fn locator_for(&self, path: RemotePath) -> RemoteLocator {
        RemoteLocator::new(self.authority.clone(), path)
    }

    /// Inverse mapping for paths inside the remote workspace.
    #[must_use]
    pub fn to_local_path(&self, remote: &RemotePath) -> Option<PathBuf> {
        let rest = remote.strip_prefix(&self.workspace_root)?;
        if rest.is_empty() {
            return Some(self.local_root.clone());
        }
        Some(self.local_root.join(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::{PathResolver, ResolveError};

    fn resolver() -> PathResolver {
        PathResolver::new("/home/me/project", Some("/srv/project"), "devbox").unwrap()
    }

    #[test]
    fn missing_workspace_root_is_fatal() {
        let err = PathResolver::new("/home/me/project", None, "devbox").unwrap_err();
        assert!(matches!(err, ResolveError::MissingWorkspaceRoot));
        let err = PathResolver::new("/home/me/project", Some("  "), "devbox").unwrap_err();
        assert!(matches!(err, ResolveError::MissingWorkspaceRoot));
    }

    #[test]
    fn relative_workspace_root_is_rejected() {
        let err = PathResolver::new("/home/me", Some("srv/project"), "devbox").unwrap_err();
        assert!(matches!(err, ResolveError::InvalidWorkspaceRoot(_)));
    }

    #[test]
    fn local_root_paths_rebase_onto_workspace() {
        let r = resolver();
        assert_eq!(
            r.to_remote_path("/home/me/project/src/main.rs").as_str(),
            "/srv/project/src/main.rs"
        );
        assert_eq!(r.to_remote_path("/home/me/project").as_str(), "/srv/project");
    }

    #[test]
    fn local_root_and_relative_forms_agree() {
        let r = resolver();
        assert_eq!(
            r.to_remote_path("/home/me/project/lib/a.rs"),
            r.to_remote_path("lib/a.rs")
        );
        assert_eq!(r.to_remote_path("./lib/a.rs"), r.to_remote_path("lib/a.rs"));
    }

    #[test]
    fn other_absolute_paths_pass_through() {
        let r = resolver();
        assert_eq!(r.to_remote_path("/etc/hosts").as_str(), "/etc/hosts");
        assert_eq!(
            r.to_remote_path("/srv/project/README.md").as_str(),
            "/srv/project/README.md"
        );
    }

    #[test]
    fn sibling_of_local_root_is_not_rebased() {
        let r = resolver();
        assert_eq!(
            r.to_remote_path("/home/me/project-old/a.rs").as_str(),
            "/home/me/project-old/a.rs"
        );
    }

    #[test]
    fn parent_dirs_stop_at_the_workspace_root() {
        let r = resolver();
        assert_eq!(
            r.to_remote_path("../../etc/passwd").as_str(),
            "/srv/project/etc/passwd"
        );
        assert_eq!(r.to_remote_path("src/../../..").as_str(), "/srv/project");
        assert_eq!(
            r.to_remote_path("/home/me/project/../../etc/passwd").as_str(),
            "/srv/project/etc/passwd"
        );
        assert_eq!(r.to_remote_path("src/../lib.rs").as_str(), "/srv/project/lib.rs");
    }

    #[test]
    fn empty_path_is_workspace_root() {
        let r = resolver();
        assert_eq!(r.to_remote_path("").as_str(), "/srv/project");
        assert_eq!(r.to_remote_path(".").as_str(), "/srv/project");
    }

    #[test]
    fn locator_carries_authority() {
        let r = resolver();
        let locator = r.remote_locator("src/lib.rs");
        assert_eq!(locator.authority, "devbox");
        assert_eq!(locator.to_string(), "remote://devbox/srv/project/src/lib.rs");
    }

    #[test]
    fn inverse_mapping_round_trips() {
        let r = resolver();
        let remote = r.to_remote_path("src/lib.rs");
        assert_eq!(
            r.to_local_path(&remote).unwrap(),
            std::path::PathBuf::from("/home/me/project/src/lib.rs")
        );
        let outside = r.to_remote_path("/etc/hosts");
        assert!(r.to_local_path(&outside).is_none());
    }
}
