//! Host filesystems.
//!
//! A [`Host`] is the read-only view a tree is staged over. The concrete
//! backends here are hosts and live [`Sink`](crate::sink::Sink)s at once:
//!
//! - [`MemoryBackend`] - in-memory file map (tests, nested staging)
//! - [`LocalBackend`] - a real directory, with path-escape protection
//!
//! Paths handed to a host are normalized with [`crate::path::normalize`],
//! so `/a/b`, `a/b` and `a/./b` name the same file.

mod local;
mod memory;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::TreeResult;

pub use local::LocalBackend;
pub use memory::MemoryBackend;

/// Read access to the files a tree is staged over.
///
/// Trees only ever read through this trait; writes go through a sink
/// during commit.
#[async_trait]
pub trait Host: Send + Sync {
    /// Read a whole file. `Ok(None)` when the file does not exist.
    async fn read(&self, path: &Path) -> TreeResult<Option<Vec<u8>>>;

    /// Enumerate every file, as normalized absolute paths.
    async fn files(&self) -> TreeResult<Vec<PathBuf>>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> bool {
        matches!(self.read(path).await, Ok(Some(_)))
    }
}
