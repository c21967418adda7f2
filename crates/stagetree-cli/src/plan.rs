//! Plan files: the list of mutations to stage, in RON.
//!
//! ```ron
//! (steps: [
//!     Create("/src/new.rs", "pub fn new() {}\n"),
//!     Edit("/src/lib.rs", [InsertLeft(0, "mod new;\n")]),
//!     Rename("/README", "/README.md"),
//!     Delete("/obsolete.txt"),
//! ])
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use stagetree_core::{TreeMutate, TreeResult};
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub enum Step {
    Create(PathBuf, String),
    Overwrite(PathBuf, String),
    Rename(PathBuf, PathBuf),
    Delete(PathBuf),
    Copy(PathBuf, PathBuf),
    Edit(PathBuf, Vec<Edit>),
}

/// A byte-level edit, addressed by offsets into the file as it was before
/// the step.
#[derive(Debug, Clone, Deserialize)]
pub enum Edit {
    InsertLeft(usize, String),
    InsertRight(usize, String),
    Remove(usize, usize),
}

impl Plan {
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).context("invalid plan")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading plan {}", path.display()))?;
        Self::from_ron(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Record every step on `tree`, stopping at the first failure.
    pub async fn stage<T: TreeMutate>(&self, tree: &mut T) -> TreeResult<()> {
        for step in &self.steps {
            debug!(?step, "staging");
            match step {
                Step::Create(path, content) => tree.create(path, content.clone().into_bytes()).await?,
                Step::Overwrite(path, content) => {
                    tree.overwrite(path, content.clone().into_bytes()).await?
                }
                Step::Rename(path, to) => tree.rename(path, to).await?,
                Step::Delete(path) => tree.delete(path).await?,
                Step::Copy(path, to) => tree.copy(path, to).await?,
                Step::Edit(path, edits) => {
                    let mut recorder = tree.begin_update(path).await?;
                    for edit in edits {
                        match edit {
                            Edit::InsertLeft(index, text) => recorder.insert_left(*index, text)?,
                            Edit::InsertRight(index, text) => recorder.insert_right(*index, text)?,
                            Edit::Remove(index, length) => recorder.remove(*index, *length)?,
                        };
                    }
                    tree.commit_update(recorder).await?
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stagetree_core::{MemoryBackend, TreeError, TreeRead, VirtualTree};

    #[test]
    fn test_parse_plan() {
        let plan = Plan::from_ron(
            r#"(steps: [
                Create("/a", "x"),
                Edit("/b", [InsertLeft(0, ">"), Remove(1, 2)]),
                Rename("/c", "/d"),
                Delete("/e"),
            ])"#,
        )
        .unwrap();
        assert_eq!(plan.steps.len(), 4);
        assert!(matches!(&plan.steps[1], Step::Edit(_, edits) if edits.len() == 2));
    }

    #[test]
    fn test_empty_plan() {
        assert!(Plan::from_ron("()").unwrap().steps.is_empty());
        assert!(Plan::from_ron("(steps: [Explode(\"/a\")])").is_err());
    }

    #[tokio::test]
    async fn test_stage_plan() {
        let host = Arc::new(MemoryBackend::with_files([("/lib.rs", "fn a() {}\n"), ("/old", "")]));
        let mut tree = VirtualTree::new(host);
        let plan = Plan::from_ron(
            r#"(steps: [
                Edit("/lib.rs", [InsertLeft(0, "pub "), InsertRight(10, "fn b() {}\n")]),
                Copy("/lib.rs", "/lib2.rs"),
                Delete("/old"),
            ])"#,
        )
        .unwrap();

        plan.stage(&mut tree).await.unwrap();
        let lib = tree.read(Path::new("/lib2.rs")).await.unwrap().unwrap();
        assert_eq!(String::from_utf8(lib).unwrap(), "pub fn a() {}\nfn b() {}\n");
        assert!(!tree.exists(Path::new("/old")).await);
        assert_eq!(tree.actions().len(), 3);
    }

    #[tokio::test]
    async fn test_stage_stops_at_first_failure() {
        let mut tree = VirtualTree::new(Arc::new(MemoryBackend::new()));
        let plan = Plan::from_ron(r#"(steps: [Create("/a", ""), Delete("/missing"), Create("/b", "")])"#)
            .unwrap();

        let result = plan.stage(&mut tree).await;
        assert!(matches!(result, Err(TreeError::PathDoesNotExist(_))));
        assert_eq!(tree.actions().len(), 1);
    }
}
