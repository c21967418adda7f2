use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::action::Action;
use crate::error::{TreeError, TreeResult};
use crate::tree::{MergeStrategy, TreeMutate, TreeRead, UpdateRecorder};

/// A tree with no files that refuses every write.
///
/// Stands in where a tree is required but nothing may be staged, e.g. as a
/// default or as a merge target that rejects all input.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTree;

#[async_trait]
impl TreeRead for NullTree {
    async fn exists(&self, _path: &Path) -> bool {
        false
    }

    async fn read(&self, _path: &Path) -> TreeResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn files(&self) -> TreeResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl TreeMutate for NullTree {
    async fn create(&mut self, path: &Path, _content: Vec<u8>) -> TreeResult<()> {
        Err(TreeError::CannotCreateFile(path.to_path_buf()))
    }

    async fn overwrite(&mut self, path: &Path, _content: Vec<u8>) -> TreeResult<()> {
        Err(TreeError::does_not_exist(path))
    }

    async fn rename(&mut self, path: &Path, _to: &Path) -> TreeResult<()> {
        Err(TreeError::does_not_exist(path))
    }

    async fn delete(&mut self, path: &Path) -> TreeResult<()> {
        Err(TreeError::does_not_exist(path))
    }

    async fn copy(&mut self, path: &Path, _to: &Path) -> TreeResult<()> {
        Err(TreeError::does_not_exist(path))
    }

    async fn begin_update(&mut self, path: &Path) -> TreeResult<UpdateRecorder> {
        Err(TreeError::does_not_exist(path))
    }

    async fn commit_update(&mut self, recorder: UpdateRecorder) -> TreeResult<()> {
        Err(TreeError::does_not_exist(recorder.path()))
    }

    async fn apply(&mut self, _action: &Action, _strategy: MergeStrategy) -> TreeResult<()> {
        Err(TreeError::Unimplemented("apply on a null tree"))
    }

    fn actions(&self) -> &[Action] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionIds, ActionLog};

    #[tokio::test]
    async fn test_reads_as_empty() {
        let tree = NullTree;
        assert!(!tree.exists(Path::new("/anything")).await);
        assert!(tree.read(Path::new("/anything")).await.unwrap().is_none());
        assert!(tree.get(Path::new("/anything")).await.unwrap().is_none());
        assert!(tree.files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_every_mutation_fails() {
        let mut tree = NullTree;
        let p = Path::new("/f");

        assert!(matches!(
            tree.create(p, Vec::new()).await,
            Err(TreeError::CannotCreateFile(_))
        ));
        for result in [
            tree.overwrite(p, Vec::new()).await,
            tree.rename(p, Path::new("/g")).await,
            tree.delete(p).await,
            tree.copy(p, Path::new("/g")).await,
        ] {
            assert!(matches!(result, Err(TreeError::PathDoesNotExist(_))));
        }
        assert!(tree.begin_update(p).await.is_err());

        let mut log = ActionLog::new(ActionIds::new());
        let action = log.delete("/f").clone();
        assert!(matches!(
            tree.apply(&action, MergeStrategy::Skip).await,
            Err(TreeError::Unimplemented(_))
        ));
        assert!(tree.actions().is_empty());
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let mut trees: Vec<Box<dyn TreeMutate>> = vec![Box::new(NullTree)];
        for tree in &mut trees {
            assert!(tree.delete(Path::new("/x")).await.is_err());
        }
    }
}
