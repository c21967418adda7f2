use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::buffer::ByteRangeBuffer;
use crate::error::TreeResult;

/// A pending byte-level edit of one file.
///
/// Handed out by [`TreeMutate::begin_update`](super::TreeMutate::begin_update)
/// and consumed by `commit_update` on the same tree. Indices are offsets into
/// the content the file had when the update began.
#[derive(Debug)]
pub struct UpdateRecorder {
    pub(crate) id: Uuid,
    pub(crate) tree: Uuid,
    path: PathBuf,
    buffer: ByteRangeBuffer,
}

impl UpdateRecorder {
    pub(crate) fn new(tree: Uuid, path: PathBuf, original: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tree,
            path,
            buffer: ByteRangeBuffer::new(original),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_left(&mut self, index: usize, content: impl AsRef<[u8]>) -> TreeResult<&mut Self> {
        self.buffer.insert_left(index, content.as_ref(), false)?;
        Ok(self)
    }

    pub fn insert_right(&mut self, index: usize, content: impl AsRef<[u8]>) -> TreeResult<&mut Self> {
        self.buffer.insert_right(index, content.as_ref(), false)?;
        Ok(self)
    }

    /// Like [`insert_left`](Self::insert_left), but a later removal over it fails.
    pub fn insert_left_essential(
        &mut self,
        index: usize,
        content: impl AsRef<[u8]>,
    ) -> TreeResult<&mut Self> {
        self.buffer.insert_left(index, content.as_ref(), true)?;
        Ok(self)
    }

    /// Like [`insert_right`](Self::insert_right), but a later removal over it fails.
    pub fn insert_right_essential(
        &mut self,
        index: usize,
        content: impl AsRef<[u8]>,
    ) -> TreeResult<&mut Self> {
        self.buffer.insert_right(index, content.as_ref(), true)?;
        Ok(self)
    }

    pub fn remove(&mut self, index: usize, length: usize) -> TreeResult<&mut Self> {
        self.buffer.remove(index, length)?;
        Ok(self)
    }

    /// The content the file had when the update began.
    pub fn original(&self) -> &[u8] {
        self.buffer.original()
    }

    /// Render the edited content.
    pub fn content(&self) -> Vec<u8> {
        self.buffer.generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chained_edits() {
        let mut rec = UpdateRecorder::new(Uuid::nil(), PathBuf::from("/f"), b"fn main() {}".to_vec());
        rec.insert_right(11, "\n    run();\n")
            .unwrap()
            .insert_left(0, "pub ")
            .unwrap();
        assert_eq!(rec.content(), b"pub fn main() {\n    run();\n}");
        assert_eq!(rec.original(), b"fn main() {}");
    }

    #[test]
    fn test_essential_insert_blocks_remove() {
        let mut rec = UpdateRecorder::new(Uuid::nil(), PathBuf::from("/f"), b"abcdef".to_vec());
        rec.insert_right_essential(3, "X").unwrap();
        assert!(rec.remove(1, 4).is_err());
        assert_eq!(rec.content(), b"abcXdef");
    }
}
