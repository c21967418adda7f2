use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::TreeResult;
use crate::host::Host;
use crate::path::normalize;
use crate::sink::{Sink, ViolationPolicy};

/// A sink that applies nothing.
///
/// Existence checks see the host plus every file the commit so far would
/// have created, deleted or renamed, so a create followed by a rename of
/// the same file validates. Violations are reported and skipped, so one dry
/// run lists every problem in the log.
pub struct DryRunSink {
    host: Arc<dyn Host>,
    /// `true` for files the commit has produced, `false` for ones it removed.
    overlay: Mutex<HashMap<PathBuf, bool>>,
}

impl std::fmt::Debug for DryRunSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DryRunSink")
            .field("overlay", &self.overlay.lock().len())
            .finish_non_exhaustive()
    }
}

impl DryRunSink {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            overlay: Mutex::new(HashMap::new()),
        }
    }

    fn mark(&self, path: &Path, present: bool) {
        self.overlay.lock().insert(normalize(path), present);
    }
}

#[async_trait]
impl Sink for DryRunSink {
    async fn file_exists(&self, path: &Path) -> TreeResult<bool> {
        let path = normalize(path);
        let staged = self.overlay.lock().get(&path).copied();
        match staged {
            Some(present) => Ok(present),
            None => Ok(self.host.exists(&path).await),
        }
    }

    async fn create_file(&self, path: &Path, _content: &[u8]) -> TreeResult<()> {
        self.mark(path, true);
        Ok(())
    }

    async fn overwrite_file(&self, _path: &Path, _content: &[u8]) -> TreeResult<()> {
        Ok(())
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> TreeResult<()> {
        self.mark(from, false);
        self.mark(to, true);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> TreeResult<()> {
        self.mark(path, false);
        Ok(())
    }

    fn violation_policy(&self) -> ViolationPolicy {
        ViolationPolicy::Report
    }

    async fn done(&self) -> TreeResult<()> {
        debug!(touched = self.overlay.lock().len(), "dry run finished");
        Ok(())
    }
}
