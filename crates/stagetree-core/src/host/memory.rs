//! In-memory host and sink.
//!
//! Used for tests and for committing one staged tree into another
//! in-memory target. All data is ephemeral.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{TreeError, TreeResult};
use crate::host::Host;
use crate::path::normalize;
use crate::sink::Sink;

/// In-memory file map.
///
/// Directories are implicit: a file at `/a/b.txt` is all it takes.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filesystem seeded with `files`.
    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: AsRef<Path>,
        C: Into<Vec<u8>>,
    {
        let files = files
            .into_iter()
            .map(|(p, c)| (normalize(p), c.into()))
            .collect();
        Self {
            files: RwLock::new(files),
        }
    }

    /// Put a file in place, replacing anything at that path.
    pub fn insert(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.files.write().insert(normalize(path), content.into());
    }

    /// Current content of one file.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.read().get(&normalize(path)).cloned()
    }

    /// Copy of every file, keyed by normalized path.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        self.files.read().clone()
    }
}

#[async_trait]
impl Host for MemoryBackend {
    async fn read(&self, path: &Path) -> TreeResult<Option<Vec<u8>>> {
        Ok(self.get(path))
    }

    async fn files(&self) -> TreeResult<Vec<PathBuf>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(&normalize(path))
    }
}

#[async_trait]
impl Sink for MemoryBackend {
    async fn file_exists(&self, path: &Path) -> TreeResult<bool> {
        Ok(self.files.read().contains_key(&normalize(path)))
    }

    async fn create_file(&self, path: &Path, content: &[u8]) -> TreeResult<()> {
        let path = normalize(path);
        let mut files = self.files.write();
        if files.contains_key(&path) {
            return Err(TreeError::already_exists(&path));
        }
        files.insert(path, content.to_vec());
        Ok(())
    }

    async fn overwrite_file(&self, path: &Path, content: &[u8]) -> TreeResult<()> {
        let path = normalize(path);
        match self.files.write().get_mut(&path) {
            Some(data) => {
                *data = content.to_vec();
                Ok(())
            }
            None => Err(TreeError::does_not_exist(&path)),
        }
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> TreeResult<()> {
        let from = normalize(from);
        let to = normalize(to);
        let mut files = self.files.write();
        if files.contains_key(&to) {
            return Err(TreeError::already_exists(&to));
        }
        let data = files
            .remove(&from)
            .ok_or_else(|| TreeError::does_not_exist(&from))?;
        files.insert(to, data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> TreeResult<()> {
        let path = normalize(path);
        self.files
            .write()
            .remove(&path)
            .map(|_| ())
            .ok_or_else(|| TreeError::does_not_exist(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_and_read() {
        let fs = MemoryBackend::with_files([("a.txt", "hello")]);
        let data = fs.read(Path::new("/a.txt")).await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"hello"[..]));
        assert!(fs.read(Path::new("/missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_path_normalization() {
        let fs = MemoryBackend::new();
        fs.insert("/a/b/c.txt", "x");

        assert!(Host::exists(&fs, Path::new("a/b/c.txt")).await);
        assert!(Host::exists(&fs, Path::new("/a/./b/c.txt")).await);
        assert!(Host::exists(&fs, Path::new("a/b/../b/c.txt")).await);
    }

    #[tokio::test]
    async fn test_files_sorted() {
        let fs = MemoryBackend::with_files([("/z", ""), ("/a/b", ""), ("/m", "")]);
        let files = fs.files().await.unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("/a/b"), PathBuf::from("/m"), PathBuf::from("/z")]
        );
    }

    #[tokio::test]
    async fn test_sink_create_and_overwrite() {
        let fs = MemoryBackend::new();
        fs.create_file(Path::new("/new.txt"), b"one").await.unwrap();
        assert!(matches!(
            fs.create_file(Path::new("/new.txt"), b"two").await,
            Err(TreeError::PathAlreadyExists(_))
        ));

        fs.overwrite_file(Path::new("/new.txt"), b"two").await.unwrap();
        assert_eq!(fs.get("/new.txt").unwrap(), b"two");

        assert!(matches!(
            fs.overwrite_file(Path::new("/nope"), b"x").await,
            Err(TreeError::PathDoesNotExist(_))
        ));
    }

    #[tokio::test]
    async fn test_sink_rename_and_delete() {
        let fs = MemoryBackend::with_files([("/old.txt", "content"), ("/taken", "")]);

        assert!(fs.rename_file(Path::new("/old.txt"), Path::new("/taken")).await.is_err());
        fs.rename_file(Path::new("/old.txt"), Path::new("/new.txt"))
            .await
            .unwrap();
        assert!(fs.get("/old.txt").is_none());
        assert_eq!(fs.get("/new.txt").unwrap(), b"content");

        fs.delete_file(Path::new("/new.txt")).await.unwrap();
        assert!(!fs.file_exists(Path::new("/new.txt")).await.unwrap());
        assert!(fs.delete_file(Path::new("/new.txt")).await.is_err());
    }
}
