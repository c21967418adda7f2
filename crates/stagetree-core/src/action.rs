//! Action log.
//!
//! Every mutation a tree records becomes an [`Action`]: a monotonic id, a
//! link to the action before it in the same log, and one of four kinds.
//! Ids come from an explicit [`ActionIds`] allocator shared by every tree
//! that may later be merged, so ordering is comparable across logs.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};
use crate::path::normalize;

/// Identity and position of an action. `ActionId(0)` means "no action".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl ActionId {
    pub const NONE: ActionId = ActionId(0);
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared, monotonically increasing action id counter.
///
/// Cloning shares the counter.
#[derive(Debug, Clone)]
pub struct ActionIds(Arc<AtomicU64>);

impl Default for ActionIds {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionIds {
    /// A counter whose first id is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// A counter whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self(Arc::new(AtomicU64::new(first.max(1))))
    }

    /// Allocate the next id.
    pub fn next(&self) -> ActionId {
        ActionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// What an action does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Create { path: PathBuf, content: Vec<u8> },
    Overwrite { path: PathBuf, content: Vec<u8> },
    Rename { path: PathBuf, to: PathBuf },
    Delete { path: PathBuf },
}

impl ActionKind {
    /// The path the action starts from.
    pub fn path(&self) -> &Path {
        match self {
            ActionKind::Create { path, .. }
            | ActionKind::Overwrite { path, .. }
            | ActionKind::Rename { path, .. }
            | ActionKind::Delete { path } => path,
        }
    }

    /// Full content carried by create and overwrite actions.
    pub fn content(&self) -> Option<&[u8]> {
        match self {
            ActionKind::Create { content, .. } | ActionKind::Overwrite { content, .. } => {
                Some(content)
            }
            ActionKind::Rename { .. } | ActionKind::Delete { .. } => None,
        }
    }

    pub fn is_content(&self) -> bool {
        self.content().is_some()
    }

    /// One-letter tag used by the serialized form.
    pub fn tag(&self) -> char {
        match self {
            ActionKind::Create { .. } => 'c',
            ActionKind::Overwrite { .. } => 'o',
            ActionKind::Rename { .. } => 'r',
            ActionKind::Delete { .. } => 'd',
        }
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: ActionId,
    /// The action recorded just before this one in the same log.
    pub parent: ActionId,
    pub kind: ActionKind,
}

impl Action {
    pub fn path(&self) -> &Path {
        self.kind.path()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::Create { path, content } => {
                write!(f, "{} create {} ({} bytes)", self.id, path.display(), content.len())
            }
            ActionKind::Overwrite { path, content } => {
                write!(f, "{} overwrite {} ({} bytes)", self.id, path.display(), content.len())
            }
            ActionKind::Rename { path, to } => {
                write!(f, "{} rename {} => {}", self.id, path.display(), to.display())
            }
            ActionKind::Delete { path } => write!(f, "{} delete {}", self.id, path.display()),
        }
    }
}

/// Serialized form of an action, tagged by kind letter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: u64,
    #[serde(default)]
    pub parent: u64,
    pub kind: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<PathBuf>,
    /// Raw bytes; serialized as a byte array so binary content survives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
}

impl From<&Action> for ActionRecord {
    fn from(action: &Action) -> Self {
        let (to, content) = match &action.kind {
            ActionKind::Create { content, .. } | ActionKind::Overwrite { content, .. } => {
                (None, Some(content.clone()))
            }
            ActionKind::Rename { to, .. } => (Some(to.clone()), None),
            ActionKind::Delete { .. } => (None, None),
        };
        Self {
            id: action.id.0,
            parent: action.parent.0,
            kind: action.kind.tag().to_string(),
            path: action.path().to_path_buf(),
            to,
            content,
        }
    }
}

impl TryFrom<ActionRecord> for Action {
    type Error = TreeError;

    fn try_from(record: ActionRecord) -> TreeResult<Self> {
        let path = normalize(&record.path);
        let missing = |field: &str| {
            TreeError::config(format!(
                "action {} ({}) is missing `{}`",
                record.id, record.kind, field
            ))
        };
        let kind = match record.kind.as_str() {
            "c" => ActionKind::Create {
                content: record.content.clone().ok_or_else(|| missing("content"))?,
                path,
            },
            "o" => ActionKind::Overwrite {
                content: record.content.clone().ok_or_else(|| missing("content"))?,
                path,
            },
            "r" => ActionKind::Rename {
                to: normalize(record.to.as_ref().ok_or_else(|| missing("to"))?),
                path,
            },
            "d" => ActionKind::Delete { path },
            other => return Err(TreeError::UnknownAction(other.to_string())),
        };
        Ok(Action {
            id: ActionId(record.id),
            parent: ActionId(record.parent),
            kind,
        })
    }
}

/// Ordered, append-only list of actions.
#[derive(Debug, Clone)]
pub struct ActionLog {
    ids: ActionIds,
    actions: Vec<Action>,
}

impl ActionLog {
    pub fn new(ids: ActionIds) -> Self {
        Self {
            ids,
            actions: Vec::new(),
        }
    }

    /// The allocator this log draws ids from.
    pub fn ids(&self) -> &ActionIds {
        &self.ids
    }

    fn record(&mut self, kind: ActionKind) -> &Action {
        let parent = self.actions.last().map_or(ActionId::NONE, |a| a.id);
        let id = self.ids.next();
        self.actions.push(Action { id, parent, kind });
        &self.actions[self.actions.len() - 1]
    }

    pub fn create(&mut self, path: impl AsRef<Path>, content: Vec<u8>) -> &Action {
        self.record(ActionKind::Create {
            path: normalize(path),
            content,
        })
    }

    pub fn overwrite(&mut self, path: impl AsRef<Path>, content: Vec<u8>) -> &Action {
        self.record(ActionKind::Overwrite {
            path: normalize(path),
            content,
        })
    }

    pub fn rename(&mut self, path: impl AsRef<Path>, to: impl AsRef<Path>) -> &Action {
        self.record(ActionKind::Rename {
            path: normalize(path),
            to: normalize(to),
        })
    }

    pub fn delete(&mut self, path: impl AsRef<Path>) -> &Action {
        self.record(ActionKind::Delete {
            path: normalize(path),
        })
    }

    /// Append an action recorded elsewhere, keeping its id and parent.
    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Collapse the log to the minimal set of actions with the same net effect.
    ///
    /// Each `create` absorbs every later action on the path it currently
    /// lives at: content replaces, renames move it, and a delete cancels the
    /// whole chain. Absorption stops at a rename onto a path that an action
    /// between the two still uses; that rename stays in the log. Later
    /// actions on a path whose created file was cancelled are dropped.
    pub fn optimize(&mut self) {
        let before = self.actions.len();
        let mut pending: Vec<Option<Action>> =
            std::mem::take(&mut self.actions).into_iter().map(Some).collect();
        let mut deleted: HashSet<PathBuf> = HashSet::new();

        for i in 0..pending.len() {
            let Some(action) = pending[i].take() else {
                continue;
            };

            match action.kind {
                ActionKind::Create { path, content } => {
                    let mut path = path;
                    let mut content = content;
                    let mut cancelled = false;
                    deleted.remove(&path);

                    // Paths used by actions this chain leaves in place.
                    let mut touched: HashSet<PathBuf> = HashSet::new();

                    for slot in pending.iter_mut().skip(i + 1) {
                        let Some(later) = slot.as_ref() else { continue };
                        if later.path() != path.as_path() {
                            touched.insert(later.path().to_path_buf());
                            if let ActionKind::Rename { to, .. } = &later.kind {
                                touched.insert(to.clone());
                            }
                            continue;
                        }
                        // The create is emitted at its own slot, so it cannot
                        // move onto a path something in between still uses.
                        if matches!(&later.kind, ActionKind::Rename { to, .. } if touched.contains(to)) {
                            break;
                        }
                        match slot.take().map(|a| a.kind) {
                            Some(ActionKind::Create { content: c, .. })
                            | Some(ActionKind::Overwrite { content: c, .. }) => content = c,
                            Some(ActionKind::Rename { to, .. }) => path = to,
                            Some(ActionKind::Delete { .. }) => {
                                cancelled = true;
                                break;
                            }
                            None => {}
                        }
                    }

                    if cancelled {
                        deleted.insert(path);
                    } else {
                        self.create(path, content);
                    }
                }
                kind if deleted.contains(kind.path()) => {}
                ActionKind::Overwrite { path, content } => {
                    self.overwrite(path, content);
                }
                ActionKind::Rename { path, to } => {
                    self.rename(path, to);
                }
                ActionKind::Delete { path } => {
                    self.delete(path);
                }
            }
        }

        tracing::debug!(before, after = self.actions.len(), "optimized action log");
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    /// Whether this exact action (id, parent and kind) is in the log.
    ///
    /// Logs built on separate allocators can reuse ids, so the id alone
    /// does not identify an action.
    pub fn has(&self, action: &Action) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    pub fn find(&self, mut predicate: impl FnMut(&Action) -> bool) -> Option<&Action> {
        self.actions.iter().find(|a| predicate(a))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl<'a> IntoIterator for &'a ActionLog {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
