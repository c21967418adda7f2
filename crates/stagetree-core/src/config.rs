//! Staging configuration, loaded from RON.
//!
//! ```ron
//! (
//!     root: "./project",
//!     dry_run: false,
//!     merge_strategy: "overwrite",
//!     event_capacity: 256,
//! )
//! ```
//!
//! Every field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};
use crate::sink::DEFAULT_EVENT_CAPACITY;
use crate::tree::MergeStrategy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Directory the staged tree reads from and commits to.
    pub root: PathBuf,
    /// Stop after the dry run.
    pub dry_run: bool,
    /// Let staged actions replace what is already on disk.
    pub force: bool,
    /// How staged actions merge onto the host tree.
    pub merge_strategy: MergeStrategy,
    /// Capacity of the commit event channel.
    pub event_capacity: usize,
    /// Optimize the log before committing.
    pub optimize: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            dry_run: false,
            force: false,
            merge_strategy: MergeStrategy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            optimize: true,
        }
    }
}

impl StageConfig {
    pub fn from_ron(text: &str) -> TreeResult<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> TreeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
            .map_err(|e| TreeError::config(format!("{}: {e}", path.display())))
    }

    /// The merge strategy in effect, with `force` taking precedence.
    pub fn effective_strategy(&self) -> MergeStrategy {
        if self.force {
            MergeStrategy::Overwrite
        } else {
            self.merge_strategy
        }
    }
}
