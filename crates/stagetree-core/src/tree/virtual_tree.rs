//! Virtual tree over a host.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::action::{Action, ActionIds, ActionKind, ActionLog};
use crate::error::{TreeError, TreeResult};
use crate::host::Host;
use crate::path::normalize;
use crate::tree::{MergeStrategy, TreeMutate, TreeRead, UpdateRecorder};

/// What the log says about a path, shadowing the host.
#[derive(Debug, Clone)]
enum Staged {
    Present(Vec<u8>),
    Removed,
}

/// A mutable staging area over a read-only host.
///
/// Reads resolve staged state first and fall back to the host for paths no
/// action has touched. Mutations validate against that merged view, record
/// an action, and never reach the host; a [`Committer`](crate::sink::Committer)
/// replays the log later.
pub struct VirtualTree {
    id: Uuid,
    host: Arc<dyn Host>,
    log: ActionLog,
    staged: HashMap<PathBuf, Staged>,
    /// Path → id of the recorder currently allowed to commit there.
    open: HashMap<PathBuf, Uuid>,
}

impl fmt::Debug for VirtualTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualTree")
            .field("id", &self.id)
            .field("actions", &self.log.len())
            .field("staged", &self.staged.len())
            .field("open", &self.open.len())
            .finish()
    }
}

impl VirtualTree {
    /// A tree over `host` with its own id allocator.
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self::with_ids(host, ActionIds::new())
    }

    /// A tree over `host` drawing action ids from `ids`.
    ///
    /// Trees that will be merged should share one allocator.
    pub fn with_ids(host: Arc<dyn Host>, ids: ActionIds) -> Self {
        Self {
            id: Uuid::new_v4(),
            host,
            log: ActionLog::new(ids),
            staged: HashMap::new(),
            open: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Take the log out of the tree, e.g. for committing.
    pub fn into_log(self) -> ActionLog {
        self.log
    }

    /// Collapse redundant actions. The visible state does not change.
    pub fn optimize(&mut self) {
        self.log.optimize();
    }

    /// An independent tree with the same host, staged state and log.
    ///
    /// The branch shares this tree's id allocator, so [`merge`](Self::merge)
    /// can tell which of its actions were recorded after branching.
    /// Recorders opened on this tree cannot be committed on the branch.
    pub fn branch(&self) -> VirtualTree {
        VirtualTree {
            id: Uuid::new_v4(),
            host: Arc::clone(&self.host),
            log: self.log.clone(),
            staged: self.staged.clone(),
            open: HashMap::new(),
        }
    }

    /// Apply every action of `other` this tree has not recorded yet.
    ///
    /// All or nothing: if any action fails, this tree is restored to its
    /// state before the merge. Optimizing either tree between `branch` and
    /// `merge` rewrites ids and makes shared history look foreign.
    #[instrument(skip_all, fields(into = %self.id, from = %other.id, %strategy))]
    pub async fn merge(&mut self, other: &VirtualTree, strategy: MergeStrategy) -> TreeResult<()> {
        let saved = (self.log.clone(), self.staged.clone());
        let mut applied = 0usize;

        for action in other.actions() {
            if self.log.has(action) {
                continue;
            }
            if let Err(e) = self.apply(action, strategy).await {
                warn!(error = %e, action = %action, "merge failed, rolling back");
                (self.log, self.staged) = saved;
                return Err(e);
            }
            applied += 1;
        }

        debug!(applied, "merged");
        Ok(())
    }

    fn stage(&mut self, path: PathBuf, state: Staged) {
        self.staged.insert(path, state);
    }

    async fn read_existing(&self, path: &Path) -> TreeResult<Vec<u8>> {
        self.read(path)
            .await?
            .ok_or_else(|| TreeError::does_not_exist(path))
    }
}

#[async_trait]
impl TreeRead for VirtualTree {
    async fn exists(&self, path: &Path) -> bool {
        let path = normalize(path);
        match self.staged.get(&path) {
            Some(Staged::Present(_)) => true,
            Some(Staged::Removed) => false,
            None => self.host.exists(&path).await,
        }
    }

    async fn read(&self, path: &Path) -> TreeResult<Option<Vec<u8>>> {
        let path = normalize(path);
        match self.staged.get(&path) {
            Some(Staged::Present(content)) => Ok(Some(content.clone())),
            Some(Staged::Removed) => Ok(None),
            None => self.host.read(&path).await,
        }
    }

    async fn files(&self) -> TreeResult<Vec<PathBuf>> {
        let mut files: BTreeSet<PathBuf> = self
            .host
            .files()
            .await?
            .into_iter()
            .map(normalize)
            .filter(|p| !matches!(self.staged.get(p), Some(Staged::Removed)))
            .collect();
        files.extend(
            self.staged
                .iter()
                .filter(|(_, state)| matches!(state, Staged::Present(_)))
                .map(|(p, _)| p.clone()),
        );
        Ok(files.into_iter().collect())
    }
}

#[async_trait]
impl TreeMutate for VirtualTree {
    async fn create(&mut self, path: &Path, content: Vec<u8>) -> TreeResult<()> {
        let path = normalize(path);
        if self.exists(&path).await {
            return Err(TreeError::already_exists(&path));
        }
        debug!(path = %path.display(), bytes = content.len(), "stage create");
        self.stage(path.clone(), Staged::Present(content.clone()));
        self.log.create(path, content);
        Ok(())
    }

    async fn overwrite(&mut self, path: &Path, content: Vec<u8>) -> TreeResult<()> {
        let path = normalize(path);
        if !self.exists(&path).await {
            return Err(TreeError::does_not_exist(&path));
        }
        debug!(path = %path.display(), bytes = content.len(), "stage overwrite");
        self.stage(path.clone(), Staged::Present(content.clone()));
        self.log.overwrite(path, content);
        Ok(())
    }

    async fn rename(&mut self, path: &Path, to: &Path) -> TreeResult<()> {
        let from = normalize(path);
        let to = normalize(to);
        let content = self.read_existing(&from).await?;
        if self.exists(&to).await {
            return Err(TreeError::already_exists(&to));
        }
        debug!(from = %from.display(), to = %to.display(), "stage rename");
        self.stage(from.clone(), Staged::Removed);
        self.stage(to.clone(), Staged::Present(content));
        self.log.rename(from, to);
        Ok(())
    }

    async fn delete(&mut self, path: &Path) -> TreeResult<()> {
        let path = normalize(path);
        if !self.exists(&path).await {
            return Err(TreeError::does_not_exist(&path));
        }
        debug!(path = %path.display(), "stage delete");
        self.stage(path.clone(), Staged::Removed);
        self.log.delete(path);
        Ok(())
    }

    async fn copy(&mut self, path: &Path, to: &Path) -> TreeResult<()> {
        let content = self.read_existing(&normalize(path)).await?;
        self.create(to, content).await
    }

    async fn begin_update(&mut self, path: &Path) -> TreeResult<UpdateRecorder> {
        let path = normalize(path);
        let content = self.read_existing(&path).await?;
        let recorder = UpdateRecorder::new(self.id, path.clone(), content);
        self.open.insert(path, recorder.id);
        Ok(recorder)
    }

    async fn commit_update(&mut self, recorder: UpdateRecorder) -> TreeResult<()> {
        let path = recorder.path().to_path_buf();
        if recorder.tree != self.id || self.open.get(&path) != Some(&recorder.id) {
            return Err(TreeError::InvalidUpdateRecord);
        }

        let current = self.read(&path).await?;
        self.open.remove(&path);
        match current {
            Some(current) if current == recorder.original() => {}
            Some(_) => return Err(TreeError::ContentHasMutated(path)),
            None => return Err(TreeError::does_not_exist(&path)),
        }

        self.overwrite(&path, recorder.content()).await
    }

    async fn apply(&mut self, action: &Action, strategy: MergeStrategy) -> TreeResult<()> {
        use MergeStrategy as S;

        match &action.kind {
            ActionKind::Create { path, content } => {
                if !self.exists(path).await {
                    return self.create(path, content.clone()).await;
                }
                match strategy {
                    S::Overwrite => self.overwrite(path, content.clone()).await,
                    S::Skip => skipped(action),
                    S::Error | S::ContentOnly => Err(TreeError::merge_conflict(path)),
                }
            }
            ActionKind::Overwrite { path, content } => {
                if self.exists(path).await {
                    return self.overwrite(path, content.clone()).await;
                }
                match strategy {
                    S::Overwrite | S::ContentOnly => self.create(path, content.clone()).await,
                    S::Skip => skipped(action),
                    S::Error => Err(TreeError::merge_conflict(path)),
                }
            }
            ActionKind::Rename { path, to } => {
                if !self.exists(path).await {
                    return match strategy {
                        S::Skip => skipped(action),
                        _ => Err(TreeError::merge_conflict(path)),
                    };
                }
                if self.exists(to).await {
                    match strategy {
                        S::Overwrite => self.delete(to).await?,
                        S::Skip => return skipped(action),
                        S::Error | S::ContentOnly => return Err(TreeError::merge_conflict(to)),
                    }
                }
                self.rename(path, to).await
            }
            ActionKind::Delete { path } => {
                if self.exists(path).await {
                    return self.delete(path).await;
                }
                match strategy {
                    S::Overwrite | S::Skip => skipped(action),
                    S::Error | S::ContentOnly => Err(TreeError::merge_conflict(path)),
                }
            }
        }
    }

    fn actions(&self) -> &[Action] {
        self.log.as_slice()
    }
}

fn skipped(action: &Action) -> TreeResult<()> {
    debug!(action = %action, "skipping colliding action");
    Ok(())
}
