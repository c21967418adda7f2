//! Commit protocol.
//!
//! A [`Committer`] replays an action log against a [`Sink`], one action at
//! a time: validate the precondition, apply, report. Sinks only differ in
//! how they apply; validation and sequencing live here.
//!
//! Events go out on a [`Reporter`] (a broadcast channel) and are collected
//! in the returned [`CommitSummary`].

mod dry_run;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::action::{Action, ActionId, ActionKind};
use crate::error::{TreeError, TreeResult, Violation};

pub use dry_run::DryRunSink;

/// Default capacity of a reporter's event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// What a commit does when an action's precondition does not hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViolationPolicy {
    /// Stop the commit with the error.
    #[default]
    Abort,
    /// Report an error event, skip the action and carry on.
    Report,
}

/// Storage an action log is committed to.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Authoritative existence check used for validation.
    async fn file_exists(&self, path: &Path) -> TreeResult<bool>;

    async fn create_file(&self, path: &Path, content: &[u8]) -> TreeResult<()>;

    async fn overwrite_file(&self, path: &Path, content: &[u8]) -> TreeResult<()>;

    async fn rename_file(&self, from: &Path, to: &Path) -> TreeResult<()>;

    async fn delete_file(&self, path: &Path) -> TreeResult<()>;

    fn violation_policy(&self) -> ViolationPolicy {
        ViolationPolicy::Abort
    }

    /// Called once after the last action.
    async fn done(&self) -> TreeResult<()> {
        Ok(())
    }
}

/// Check an action's precondition against `sink`.
///
/// Overwrite, delete and the source of a rename must exist; create and the
/// target of a rename must not.
pub async fn validate(sink: &dyn Sink, action: &Action) -> TreeResult<()> {
    async fn must_exist(sink: &dyn Sink, path: &Path) -> TreeResult<()> {
        if sink.file_exists(path).await? {
            Ok(())
        } else {
            Err(TreeError::does_not_exist(path))
        }
    }

    async fn must_not_exist(sink: &dyn Sink, path: &Path) -> TreeResult<()> {
        if sink.file_exists(path).await? {
            Err(TreeError::already_exists(path))
        } else {
            Ok(())
        }
    }

    match &action.kind {
        ActionKind::Create { path, .. } => must_not_exist(sink, path).await,
        ActionKind::Overwrite { path, .. } | ActionKind::Delete { path } => {
            must_exist(sink, path).await
        }
        ActionKind::Rename { path, to } => {
            must_exist(sink, path).await?;
            must_not_exist(sink, to).await
        }
    }
}

/// One reported commit step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CommitEvent {
    Create { path: PathBuf, bytes: usize },
    Update { path: PathBuf, bytes: usize },
    Delete { path: PathBuf },
    Rename { path: PathBuf, to: PathBuf },
    Error { path: PathBuf, reason: Violation },
    /// The backend failed while applying an action; the commit stops here.
    Failed { path: PathBuf, message: String },
}

impl CommitEvent {
    /// The event reporting a successfully applied action.
    pub fn applied(action: &Action) -> Self {
        match &action.kind {
            ActionKind::Create { path, content } => CommitEvent::Create {
                path: path.clone(),
                bytes: content.len(),
            },
            ActionKind::Overwrite { path, content } => CommitEvent::Update {
                path: path.clone(),
                bytes: content.len(),
            },
            ActionKind::Rename { path, to } => CommitEvent::Rename {
                path: path.clone(),
                to: to.clone(),
            },
            ActionKind::Delete { path } => CommitEvent::Delete { path: path.clone() },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            CommitEvent::Create { path, .. }
            | CommitEvent::Update { path, .. }
            | CommitEvent::Delete { path }
            | CommitEvent::Rename { path, .. }
            | CommitEvent::Error { path, .. }
            | CommitEvent::Failed { path, .. } => path,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CommitEvent::Error { .. } | CommitEvent::Failed { .. })
    }
}

impl fmt::Display for CommitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitEvent::Create { path, bytes } => {
                write!(f, "CREATE {} ({bytes} bytes)", path.display())
            }
            CommitEvent::Update { path, bytes } => {
                write!(f, "UPDATE {} ({bytes} bytes)", path.display())
            }
            CommitEvent::Delete { path } => write!(f, "DELETE {}", path.display()),
            CommitEvent::Rename { path, to } => {
                write!(f, "RENAME {} => {}", path.display(), to.display())
            }
            CommitEvent::Error {
                path,
                reason: Violation::AlreadyExists,
            } => write!(f, "ERROR! {} already exists.", path.display()),
            CommitEvent::Error {
                path,
                reason: Violation::DoesNotExist,
            } => write!(f, "ERROR! {} does not exist.", path.display()),
            CommitEvent::Failed { path, message } => {
                write!(f, "ERROR! {}: {message}", path.display())
            }
        }
    }
}

/// Broadcasts commit events to any number of subscribers.
///
/// Publishing never blocks; slow subscribers see `Lagged` once the channel
/// capacity is exceeded.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: broadcast::Sender<CommitEvent>,
    capacity: usize,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl Reporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: CommitEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommitEvent> {
        self.tx.subscribe()
    }
}

/// Result of a commit that ran to the end.
#[derive(Debug, Clone, Default)]
pub struct CommitSummary {
    /// Every event, in commit order.
    pub events: Vec<CommitEvent>,
    /// Ids of the actions that were applied.
    pub applied: Vec<ActionId>,
}

impl CommitSummary {
    pub fn has_errors(&self) -> bool {
        self.events.iter().any(CommitEvent::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &CommitEvent> {
        self.events.iter().filter(|e| e.is_error())
    }
}

type CommitHook = Box<dyn Fn() -> TreeResult<()> + Send + Sync>;
type PreActionHook = Box<dyn Fn(&Action) -> Option<Action> + Send + Sync>;
type PostActionHook = Box<dyn Fn(&Action) -> TreeResult<()> + Send + Sync>;

/// Replays action logs against a sink.
///
/// Actions run strictly in order: action N+1 is not validated until action
/// N has been applied and reported. Nothing is rolled back on failure.
pub struct Committer {
    sink: Arc<dyn Sink>,
    reporter: Reporter,
    pre_commit: Option<CommitHook>,
    pre_action: Option<PreActionHook>,
    post_action: Option<PostActionHook>,
    post_commit: Option<CommitHook>,
}

impl fmt::Debug for Committer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Committer")
            .field("reporter", &self.reporter)
            .field("violation_policy", &self.sink.violation_policy())
            .finish_non_exhaustive()
    }
}

impl Committer {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            reporter: Reporter::default(),
            pre_commit: None,
            pre_action: None,
            post_action: None,
            post_commit: None,
        }
    }

    /// Publish events on an existing reporter.
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run before the first action. An error cancels the commit.
    pub fn on_pre_commit(mut self, hook: impl Fn() -> TreeResult<()> + Send + Sync + 'static) -> Self {
        self.pre_commit = Some(Box::new(hook));
        self
    }

    /// Inspect each action before validation; returning `Some` replaces it.
    pub fn on_pre_action(
        mut self,
        hook: impl Fn(&Action) -> Option<Action> + Send + Sync + 'static,
    ) -> Self {
        self.pre_action = Some(Box::new(hook));
        self
    }

    /// Run after each applied action.
    pub fn on_post_action(
        mut self,
        hook: impl Fn(&Action) -> TreeResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.post_action = Some(Box::new(hook));
        self
    }

    /// Run after the sink is done.
    pub fn on_post_commit(mut self, hook: impl Fn() -> TreeResult<()> + Send + Sync + 'static) -> Self {
        self.post_commit = Some(Box::new(hook));
        self
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Commit `actions` in order.
    ///
    /// With an aborting sink the first violation ends the commit. With a
    /// reporting sink, violations become error events and the commit
    /// continues. A backend failure always ends the commit, after a
    /// `Failed` event is published for it.
    #[instrument(skip_all, fields(actions = actions.len()))]
    pub async fn commit(&self, actions: &[Action]) -> TreeResult<CommitSummary> {
        if let Some(hook) = &self.pre_commit {
            hook()?;
        }

        let policy = self.sink.violation_policy();
        let mut summary = CommitSummary::default();

        for original in actions {
            let action = match &self.pre_action {
                Some(hook) => hook(original).unwrap_or_else(|| original.clone()),
                None => original.clone(),
            };

            if let Err(e) = self.commit_action(&action).await {
                let Some((path, reason)) = e.violation() else {
                    let event = CommitEvent::Failed {
                        path: action.path().to_path_buf(),
                        message: e.to_string(),
                    };
                    error!(action = %action, "{event}");
                    self.reporter.publish(event);
                    return Err(e);
                };
                let event = CommitEvent::Error {
                    path: path.to_path_buf(),
                    reason,
                };
                warn!(action = %action, "{event}");
                self.reporter.publish(event.clone());
                summary.events.push(event);
                match policy {
                    ViolationPolicy::Report => continue,
                    ViolationPolicy::Abort => return Err(e),
                }
            }

            let event = CommitEvent::applied(&action);
            debug!(action = %action, "{event}");
            self.reporter.publish(event.clone());
            summary.events.push(event);
            summary.applied.push(action.id);

            if let Some(hook) = &self.post_action {
                hook(&action)?;
            }
        }

        self.sink.done().await?;
        if let Some(hook) = &self.post_commit {
            hook()?;
        }

        info!(
            applied = summary.applied.len(),
            errors = summary.errors().count(),
            "commit finished"
        );
        Ok(summary)
    }

    async fn commit_action(&self, action: &Action) -> TreeResult<()> {
        let sink = self.sink.as_ref();
        validate(sink, action).await?;
        match &action.kind {
            ActionKind::Create { path, content } => sink.create_file(path, content).await,
            ActionKind::Overwrite { path, content } => sink.overwrite_file(path, content).await,
            ActionKind::Rename { path, to } => sink.rename_file(path, to).await,
            ActionKind::Delete { path } => sink.delete_file(path).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::action::{ActionIds, ActionLog};
    use crate::host::MemoryBackend;

    fn log() -> ActionLog {
        ActionLog::new(ActionIds::new())
    }

    #[test]
    fn test_event_display() {
        let cases = [
            (
                CommitEvent::Create {
                    path: "/a".into(),
                    bytes: 5,
                },
                "CREATE /a (5 bytes)",
            ),
            (
                CommitEvent::Rename {
                    path: "/a".into(),
                    to: "/b".into(),
                },
                "RENAME /a => /b",
            ),
            (
                CommitEvent::Error {
                    path: "/a".into(),
                    reason: Violation::AlreadyExists,
                },
                "ERROR! /a already exists.",
            ),
        ];
        for (event, expected) in cases {
            assert_eq!(event.to_string(), expected);
        }
    }

    #[test]
    fn test_event_json_shape() {
        let event = CommitEvent::Error {
            path: "/x".into(),
            reason: Violation::DoesNotExist,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["reason"], "doesNotExist");
        assert_eq!(json["path"], "/x");
    }

    #[tokio::test]
    async fn test_validate() {
        let sink = MemoryBackend::with_files([("/here", "")]);
        let mut log = log();
        log.create("/here", Vec::new());
        log.overwrite("/gone", Vec::new());
        log.rename("/here", "/here");
        log.delete("/here");

        let results: Vec<_> = {
            let mut out = Vec::new();
            for action in &log {
                out.push(validate(&sink, action).await);
            }
            out
        };
        assert!(matches!(results[0], Err(TreeError::PathAlreadyExists(_))));
        assert!(matches!(results[1], Err(TreeError::PathDoesNotExist(_))));
        assert!(matches!(results[2], Err(TreeError::PathAlreadyExists(_))));
        assert!(results[3].is_ok());
    }

    #[tokio::test]
    async fn test_commit_applies_in_order() {
        let target = Arc::new(MemoryBackend::with_files([("/old", "o")]));
        let mut log = log();
        log.create("/new", b"n".to_vec());
        log.rename("/new", "/moved");
        log.delete("/old");

        let committer = Committer::new(target.clone());
        let mut events = committer.reporter().subscribe();
        let summary = committer.commit(log.as_slice()).await.unwrap();

        assert_eq!(summary.applied.len(), 3);
        assert!(!summary.has_errors());
        assert_eq!(
            target.snapshot().into_iter().collect::<Vec<_>>(),
            vec![(PathBuf::from("/moved"), b"n".to_vec())]
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CommitEvent::Create {
                path: "/new".into(),
                bytes: 1
            }
        );
    }

    #[tokio::test]
    async fn test_live_commit_aborts_without_rollback() {
        let target = Arc::new(MemoryBackend::new());
        let mut log = log();
        log.create("/first", Vec::new());
        log.delete("/missing");
        log.create("/never", Vec::new());

        let committer = Committer::new(target.clone());
        let mut events = committer.reporter().subscribe();
        let result = committer.commit(log.as_slice()).await;

        assert!(matches!(result, Err(TreeError::PathDoesNotExist(_))));
        assert!(target.get("/first").is_some());
        assert!(target.get("/never").is_none());

        events.recv().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            CommitEvent::Error {
                path: "/missing".into(),
                reason: Violation::DoesNotExist
            }
        );
    }

    /// Accepts every precondition, fails every write.
    struct BrokenDisk;

    #[async_trait]
    impl Sink for BrokenDisk {
        async fn file_exists(&self, _path: &Path) -> TreeResult<bool> {
            Ok(false)
        }

        async fn create_file(&self, _path: &Path, _content: &[u8]) -> TreeResult<()> {
            Err(std::io::Error::other("disk full").into())
        }

        async fn overwrite_file(&self, _path: &Path, _content: &[u8]) -> TreeResult<()> {
            Ok(())
        }

        async fn rename_file(&self, _from: &Path, _to: &Path) -> TreeResult<()> {
            Ok(())
        }

        async fn delete_file(&self, _path: &Path) -> TreeResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_reported() {
        let mut log = log();
        log.create("/a", b"x".to_vec());
        log.create("/b", b"y".to_vec());

        let committer = Committer::new(Arc::new(BrokenDisk));
        let mut events = committer.reporter().subscribe();
        let result = committer.commit(log.as_slice()).await;

        assert!(matches!(result, Err(TreeError::Io(_))));
        let event = events.recv().await.unwrap();
        assert!(event.is_error());
        assert_eq!(event.path(), Path::new("/a"));
        assert_eq!(event.to_string(), "ERROR! /a: I/O error: disk full");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_hooks_run_in_sequence() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (pre, post, per_action) = (calls.clone(), calls.clone(), Arc::new(AtomicUsize::new(0)));
        let seen = per_action.clone();

        let mut log = log();
        log.create("/a", Vec::new());
        log.create("/b", Vec::new());

        let committer = Committer::new(Arc::new(MemoryBackend::new()))
            .on_pre_commit(move || {
                assert_eq!(pre.fetch_add(1, Ordering::SeqCst), 0);
                Ok(())
            })
            .on_post_action(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_post_commit(move || {
                assert_eq!(post.fetch_add(1, Ordering::SeqCst), 1);
                Ok(())
            });

        committer.commit(log.as_slice()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(per_action.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pre_action_can_rewrite() {
        let target = Arc::new(MemoryBackend::new());
        let mut log = log();
        log.create("/draft", b"x".to_vec());

        let committer = Committer::new(target.clone()).on_pre_action(|action| {
            let mut action = action.clone();
            if let ActionKind::Create { path, .. } = &mut action.kind {
                *path = PathBuf::from("/final");
            }
            Some(action)
        });
        committer.commit(log.as_slice()).await.unwrap();

        assert!(target.get("/draft").is_none());
        assert_eq!(target.get("/final").unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_pre_commit_error_cancels() {
        let target = Arc::new(MemoryBackend::new());
        let mut log = log();
        log.create("/a", Vec::new());

        let committer = Committer::new(target.clone())
            .on_pre_commit(|| Err(TreeError::Unimplemented("commits")));
        assert!(committer.commit(log.as_slice()).await.is_err());
        assert!(target.snapshot().is_empty());
    }
}
