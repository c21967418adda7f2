//! Staging error types.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Why an action's precondition failed, as reported in commit error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Violation {
    /// The target path was already present.
    AlreadyExists,
    /// The source path was missing.
    DoesNotExist,
}

/// Staging error type.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Mutating a path that is not visible in virtual or host state.
    #[error("path \"{}\" does not exist", .0.display())]
    PathDoesNotExist(PathBuf),

    /// Creating, or renaming onto, a path that is already visible.
    #[error("path \"{}\" already exists", .0.display())]
    PathAlreadyExists(PathBuf),

    /// The tree cannot hold new files at all.
    #[error("cannot create file \"{}\"", .0.display())]
    CannotCreateFile(PathBuf),

    /// Source content changed between `begin_update` and `commit_update`.
    #[error("content at path \"{}\" has changed between the start and the end of an update", .0.display())]
    ContentHasMutated(PathBuf),

    /// The recorder was not handed out by this tree, or was already committed.
    #[error("invalid update record")]
    InvalidUpdateRecord,

    /// Two trees disagree on a path under a conflict-sensitive merge.
    #[error("a merge conflicted on path \"{}\"", .0.display())]
    MergeConflict(PathBuf),

    /// An action tag outside `c`, `o`, `r`, `d`.
    #[error("unknown action: \"{0}\"")]
    UnknownAction(String),

    /// Byte-buffer edit index outside the original content.
    #[error("index {index} outside of range [{min}, {max}]")]
    IndexOutOfBound { index: usize, min: usize, max: usize },

    /// An edit marked essential would be dropped.
    #[error("tried to remove content that was marked essential")]
    ContentCannotBeRemoved,

    /// Capability not provided by this tree or backend.
    #[error("{0} is unimplemented")]
    Unimplemented(&'static str),

    /// Path escapes a local backend's root.
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Configuration or serialized input is malformed.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TreeError {
    /// Create a PathDoesNotExist error.
    pub fn does_not_exist(path: impl AsRef<Path>) -> Self {
        Self::PathDoesNotExist(path.as_ref().to_path_buf())
    }

    /// Create a PathAlreadyExists error.
    pub fn already_exists(path: impl AsRef<Path>) -> Self {
        Self::PathAlreadyExists(path.as_ref().to_path_buf())
    }

    /// Create a MergeConflict error.
    pub fn merge_conflict(path: impl AsRef<Path>) -> Self {
        Self::MergeConflict(path.as_ref().to_path_buf())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The reportable precondition violation behind this error, if any.
    ///
    /// Returns the offending path alongside the reason.
    pub fn violation(&self) -> Option<(&Path, Violation)> {
        match self {
            TreeError::PathAlreadyExists(p) | TreeError::CannotCreateFile(p) => {
                Some((p, Violation::AlreadyExists))
            }
            TreeError::PathDoesNotExist(p) => Some((p, Violation::DoesNotExist)),
            _ => None,
        }
    }
}

impl From<ron::error::SpannedError> for TreeError {
    fn from(e: ron::error::SpannedError) -> Self {
        TreeError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for TreeError {
    fn from(e: serde_json::Error) -> Self {
        TreeError::Config(e.to_string())
    }
}

/// Staging result type.
pub type TreeResult<T> = Result<T, TreeError>;
