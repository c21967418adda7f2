//! Staged trees.
//!
//! A tree is split into two capabilities:
//!
//! - [`TreeRead`] - existence checks, reads, enumeration
//! - [`TreeMutate`] - recording mutations into an action log
//!
//! [`VirtualTree`] implements both over a [`Host`](crate::host::Host).
//! [`NullTree`] reads as empty and refuses every mutation.

mod null;
mod recorder;
mod virtual_tree;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::action::Action;
use crate::error::TreeResult;

pub use null::NullTree;
pub use recorder::UpdateRecorder;
pub use virtual_tree::VirtualTree;

/// How `apply` resolves an action that collides with the tree's state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(try_from = "String", into = "String")]
#[strum(serialize_all = "kebab-case")]
pub enum MergeStrategy {
    /// Any collision fails with `MergeConflict`.
    #[default]
    Error,
    /// The incoming action wins.
    Overwrite,
    /// Only a content write onto a missing path is tolerated (it becomes a create).
    ContentOnly,
    /// Colliding actions are dropped.
    Skip,
}

impl TryFrom<String> for MergeStrategy {
    type Error = strum::ParseError;

    fn try_from(s: String) -> Result<Self, strum::ParseError> {
        s.parse()
    }
}

impl From<MergeStrategy> for String {
    fn from(strategy: MergeStrategy) -> String {
        strategy.to_string()
    }
}

/// A file as seen through a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// Read capability of a tree.
#[async_trait]
pub trait TreeRead: Send + Sync {
    /// Check if a file is visible. Never fails.
    async fn exists(&self, path: &Path) -> bool;

    /// Read a visible file. `Ok(None)` when absent.
    async fn read(&self, path: &Path) -> TreeResult<Option<Vec<u8>>>;

    /// Every visible file, sorted.
    async fn files(&self) -> TreeResult<Vec<PathBuf>>;

    /// Read a file together with its normalized path.
    async fn get(&self, path: &Path) -> TreeResult<Option<FileEntry>> {
        let path = crate::path::normalize(path);
        Ok(self
            .read(&path)
            .await?
            .map(|content| FileEntry { path, content }))
    }
}

/// Mutation capability of a tree.
///
/// Every successful call appends to the tree's action log; a failed call
/// leaves the log untouched.
#[async_trait]
pub trait TreeMutate: TreeRead {
    async fn create(&mut self, path: &Path, content: Vec<u8>) -> TreeResult<()>;

    async fn overwrite(&mut self, path: &Path, content: Vec<u8>) -> TreeResult<()>;

    async fn rename(&mut self, path: &Path, to: &Path) -> TreeResult<()>;

    async fn delete(&mut self, path: &Path) -> TreeResult<()>;

    /// Create `to` with the content of `path`.
    async fn copy(&mut self, path: &Path, to: &Path) -> TreeResult<()>;

    /// Open a byte-level edit of `path` against its current content.
    async fn begin_update(&mut self, path: &Path) -> TreeResult<UpdateRecorder>;

    /// Render a recorder and record it as an overwrite.
    async fn commit_update(&mut self, recorder: UpdateRecorder) -> TreeResult<()>;

    /// Replay one foreign action, resolving collisions with `strategy`.
    async fn apply(&mut self, action: &Action, strategy: MergeStrategy) -> TreeResult<()>;

    /// The recorded actions, in log order.
    fn actions(&self) -> &[Action];
}
