//! # stagetree-core
//!
//! Transactional staging of file mutations.
//!
//! Producers record changes against a [`VirtualTree`] layered over a
//! read-only [`Host`]. Nothing touches storage until the tree's action log
//! is committed through a [`Sink`]:
//!
//! - [`ByteRangeBuffer`] - byte-level edits anchored to original offsets
//! - [`ActionLog`] - ordered create/overwrite/rename/delete records, with
//!   an optimizer that collapses redundant chains
//! - [`VirtualTree`] / [`NullTree`] - staged views, branching and merging
//! - [`Committer`] - validate, apply and report each action in order
//!
//! ## Example
//!
//! ```ignore
//! let host = Arc::new(MemoryBackend::with_files([("/a.txt", "hello")]));
//! let mut tree = VirtualTree::new(host.clone());
//!
//! let mut rec = tree.begin_update(Path::new("/a.txt")).await?;
//! rec.insert_right(5, " world")?;
//! tree.commit_update(rec).await?;
//!
//! let dry = Committer::new(Arc::new(DryRunSink::new(host.clone())));
//! if !dry.commit(tree.actions()).await?.has_errors() {
//!     Committer::new(host).commit(tree.actions()).await?;
//! }
//! ```

pub mod action;
pub mod buffer;
pub mod config;
pub mod error;
pub mod host;
pub mod path;
pub mod sink;
pub mod tree;

pub use action::{Action, ActionId, ActionIds, ActionKind, ActionLog, ActionRecord};
pub use buffer::ByteRangeBuffer;
pub use config::StageConfig;
pub use error::{TreeError, TreeResult, Violation};
pub use host::{Host, LocalBackend, MemoryBackend};
pub use sink::{
    CommitEvent, CommitSummary, Committer, DryRunSink, Reporter, Sink, ViolationPolicy, validate,
};
pub use tree::{FileEntry, MergeStrategy, NullTree, TreeMutate, TreeRead, UpdateRecorder, VirtualTree};
