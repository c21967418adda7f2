//! Local filesystem host and sink.
//!
//! Provides access to a real directory, with path security to prevent
//! escaping the root.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::trace;

use crate::error::{TreeError, TreeResult};
use crate::host::Host;
use crate::path::{normalize, relative};
use crate::sink::Sink;

/// Local filesystem backend.
///
/// Tree paths are mapped under `root`: with a root of `/srv/site`, the tree
/// path `/css/main.css` is the file `/srv/site/css/main.css`.
///
/// Path security is enforced: `..` is resolved lexically against the
/// virtual root, and symlinks that lead outside `root` are rejected.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tree path to a location under the root.
    ///
    /// Returns an error if the resolved location escapes the root.
    fn resolve(&self, path: &Path) -> TreeResult<PathBuf> {
        let rel = relative(path);
        if rel.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }
        let full = self.root.join(&rel);

        // Any existing ancestor may be a symlink, so the check runs on the
        // nearest one that exists plus the components still to be created.
        let mut existing = full.as_path();
        let mut missing = Vec::new();
        while std::fs::symlink_metadata(existing).is_err() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name);
                    existing = parent;
                }
                _ => break,
            }
        }
        let mut canonical = dunce::canonicalize(existing).map_err(|e| map_io(path, e))?;
        canonical.extend(missing.iter().rev());

        if !canonical.starts_with(&self.root) {
            return Err(TreeError::path_escapes_root(format!(
                "{} is not under {}",
                canonical.display(),
                self.root.display()
            )));
        }
        Ok(full)
    }

    async fn ensure_parent(full: &Path) -> TreeResult<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// Map an I/O error on `path` to the tree error callers match on.
fn map_io(path: &Path, err: io::Error) -> TreeError {
    match err.kind() {
        io::ErrorKind::NotFound => TreeError::does_not_exist(normalize(path)),
        io::ErrorKind::AlreadyExists => TreeError::already_exists(normalize(path)),
        _ => TreeError::Io(err),
    }
}

#[async_trait]
impl Host for LocalBackend {
    async fn read(&self, path: &Path) -> TreeResult<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            // Directories are not files.
            Err(_) if full.is_dir() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn files(&self) -> TreeResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let full = entry.path();
                if file_type.is_dir() {
                    pending.push(full);
                } else if file_type.is_file() {
                    if let Ok(rel) = full.strip_prefix(&self.root) {
                        files.push(normalize(rel));
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    async fn exists(&self, path: &Path) -> bool {
        match self.resolve(path) {
            Ok(full) => fs::metadata(&full)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Sink for LocalBackend {
    async fn file_exists(&self, path: &Path) -> TreeResult<bool> {
        let full = self.resolve(path)?;
        match fs::metadata(&full).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_file(&self, path: &Path, content: &[u8]) -> TreeResult<()> {
        use tokio::io::AsyncWriteExt;

        let full = self.resolve(path)?;
        Self::ensure_parent(&full).await?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
            .map_err(|e| map_io(path, e))?;
        file.write_all(content).await?;
        file.flush().await?;
        trace!(path = %full.display(), bytes = content.len(), "created");
        Ok(())
    }

    async fn overwrite_file(&self, path: &Path, content: &[u8]) -> TreeResult<()> {
        use tokio::io::AsyncWriteExt;

        let full = self.resolve(path)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&full)
            .await
            .map_err(|e| map_io(path, e))?;
        file.write_all(content).await?;
        file.flush().await?;
        trace!(path = %full.display(), bytes = content.len(), "overwritten");
        Ok(())
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> TreeResult<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        if fs::try_exists(&dst).await? {
            return Err(TreeError::already_exists(normalize(to)));
        }
        Self::ensure_parent(&dst).await?;
        fs::rename(&src, &dst).await.map_err(|e| map_io(from, e))?;
        trace!(from = %src.display(), to = %dst.display(), "renamed");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> TreeResult<()> {
        let full = self.resolve(path)?;
        fs::remove_file(&full).await.map_err(|e| map_io(path, e))?;
        trace!(path = %full.display(), "deleted");
        Ok(())
    }
}
