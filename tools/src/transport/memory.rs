//! In-memory file primitive.
//!
//! In lagging mode a write is accepted but stays invisible to reads (and
//! listings) until [`MemoryFs::settle`] is called, which reproduces the
//! read-after-write staleness some remote file providers exhibit.

use std::collections::BTreeMap;
use std::sync::Mutex;

use outpost_types::{RemoteLocator, RemotePath};

use super::{RemoteFs, TransportError, TransportFut};
use crate::glob;

#[derive(Debug, Default)]
struct Files {
    visible: BTreeMap<RemotePath, Vec<u8>>,
    pending: BTreeMap<RemotePath, Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct MemoryFs {
    lagging: bool,
    files: Mutex<Files>,
    writes: Mutex<Vec<RemotePath>>,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes only become visible after [`Self::settle`].
    #[must_use]
    pub fn lagging() -> Self {
        Self {
            lagging: true,
            ..Self::default()
        }
    }

    /// Seed a visible file without recording a write.
    pub fn insert(&self, path: &RemotePath, content: impl Into<Vec<u8>>) {
        self.lock_files().visible.insert(path.clone(), content.into());
    }

    /// Drop a file, visible or pending.
    pub fn remove(&self, path: &RemotePath) {
        let mut files = self.lock_files();
        files.visible.remove(path);
        files.pending.remove(path);
    }

    /// Make every pending write visible.
    pub fn settle(&self) {
        let mut files = self.lock_files();
        let pending = std::mem::take(&mut files.pending);
        files.visible.extend(pending);
    }

    /// Latest bytes written to `path`, visible or not.
    #[must_use]
    pub fn latest(&self, path: &RemotePath) -> Option<Vec<u8>> {
        let files = self.lock_files();
        files
            .pending
            .get(path)
            .or_else(|| files.visible.get(path))
            .cloned()
    }

    /// Paths passed to [`RemoteFs::write`], in call order.
    #[must_use]
    pub fn write_log(&self) -> Vec<RemotePath> {
        self.writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, Files> {
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl RemoteFs for MemoryFs {
    fn read<'a>(&'a self, locator: &'a RemoteLocator) -> TransportFut<'a, Vec<u8>> {
        Box::pin(async move {
            self.lock_files()
                .visible
                .get(&locator.path)
                .cloned()
                .ok_or_else(|| TransportError::not_found(locator))
        })
    }

    fn write<'a>(
        &'a self,
        locator: &'a RemoteLocator,
        content: &'a [u8],
    ) -> TransportFut<'a, ()> {
        Box::pin(async move {
            {
                let mut files = self.lock_files();
                let slot = if self.lagging {
                    &mut files.pending
                } else {
                    &mut files.visible
                };
                slot.insert(locator.path.clone(), content.to_vec());
            }
            self.writes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(locator.path.clone());
            Ok(())
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
            let files = self.lock_files();
            Ok(files
                .visible
                .keys()
                .filter(|path| {
                    path.strip_prefix(&base.path).is_some_and(|rel| {
                        !rel.is_empty()
                            && !rel.split('/').any(|part| part == ".git")
                            && glob_set.is_match(rel)
                    })
                })
                .take(limit)
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryFs;
    use crate::transport::RemoteFs;
    use outpost_types::{RemoteLocator, RemotePath};

    fn loc(raw: &str) -> RemoteLocator {
        RemoteLocator::new("mem", RemotePath::new(raw).unwrap())
    }

    #[tokio::test]
    async fn lagging_writes_are_invisible_until_settled() {
        let fs = MemoryFs::lagging();
        fs.insert(&loc("/a.txt").path, "old");
        fs.write(&loc("/a.txt"), b"new").await.unwrap();
        assert_eq!(fs.read(&loc("/a.txt")).await.unwrap(), b"old");
        assert_eq!(fs.latest(&loc("/a.txt").path).unwrap(), b"new");
        fs.settle();
        assert_eq!(fs.read(&loc("/a.txt")).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn list_filters_by_base_and_pattern() {
        let fs = MemoryFs::new();
        for path in ["/w/a.rs", "/w/src/b.rs", "/w/.git/c.rs", "/other/d.rs", "/w/e.md"] {
            fs.insert(&RemotePath::new(path).unwrap(), "");
        }
        let found = fs.list(&loc("/w"), "**/*.rs", 10).await.unwrap();
        let found: Vec<&str> = found.iter().map(RemotePath::as_str).collect();
        assert_eq!(found, vec!["/w/a.rs", "/w/src/b.rs"]);
    }

    #[tokio::test]
    async fn missing_is_not_found() {
        let err = MemoryFs::new().read(&loc("/x")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
