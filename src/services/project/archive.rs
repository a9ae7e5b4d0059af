//! File-backed storage for project archives.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Suffix of every stored archive name.
pub const ARCHIVE_SUFFIX: &str = "archive.tar.gz";

/// Directory holding one archive per project.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Stored name of a project's archive, e.g. `0000000042.archive.tar.gz`.
    pub fn archive_name(project_id: i64) -> String {
        format!("{:010}.{}", project_id, ARCHIVE_SUFFIX)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Copy `src` into the store as the project's archive, replacing any
    /// previous one. Returns the stored name.
    pub async fn save(&self, project_id: i64, src: &Path) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;

        let name = Self::archive_name(project_id);
        let bytes = tokio::fs::copy(src, self.path(&name)).await?;

        debug!(project_id, bytes, "Stored project archive {}", name);
        Ok(name)
    }

    /// Delete a stored archive. A missing file is not an error.
    pub async fn remove(&self, name: &str) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.path(name)).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_archive_name_is_zero_padded() {
        assert_eq!(ArchiveStore::archive_name(1), "0000000001.archive.tar.gz");
        assert_eq!(
            ArchiveStore::archive_name(1234567890),
            "1234567890.archive.tar.gz"
        );
    }

    #[tokio::test]
    async fn test_save_overwrites_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(dir.path().join("archives"));
        let src = dir.path().join("archive.tar.gz");

        std::fs::write(&src, b"first").unwrap();
        let name = store.save(7, &src).await.unwrap();
        assert_eq!(name, "0000000007.archive.tar.gz");

        std::fs::write(&src, b"second").unwrap();
        store.save(7, &src).await.unwrap();
        assert_eq!(std::fs::read(store.path(&name)).unwrap(), b"second");

        store.remove(&name).await.unwrap();
        assert!(!store.path(&name).exists());
        store.remove(&name).await.unwrap();
    }
}
