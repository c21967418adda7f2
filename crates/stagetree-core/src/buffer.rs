//! Byte-range update buffer.
//!
//! A [`ByteRangeBuffer`] keeps the original content untouched and describes
//! edits as a chain of chunks, each a `[start, end)` slice of the original
//! plus bytes inserted to its left and right. Every edit is addressed by an
//! index into the *original* content, so edits at different offsets never
//! renumber each other.
//!
//! Chunks live in an arena (`Vec<Chunk>`) and link to their successor by
//! index. Splitting a chunk pushes one new slot; nothing is ever copied
//! until [`ByteRangeBuffer::generate`].
//!
//! ```text
//!  original:  h e l l o ␠ w o r l d
//!  chain:     [0,5) ──► [5,6) ──► [6,11)
//!                 └ right margin   └ left margin
//! ```

use std::iter;

use crate::error::{TreeError, TreeResult};

/// The head of the chain always sits in the first arena slot.
const HEAD: usize = 0;

/// One link of the chain.
///
/// A `None` margin means the margin was removed: insertions there are
/// dropped (or fail, when essential). `content_removed` marks the slice
/// itself as deleted.
#[derive(Debug, Clone)]
struct Chunk {
    start: usize,
    end: usize,
    left: Option<Vec<u8>>,
    right: Option<Vec<u8>>,
    content_removed: bool,
    essential_left: bool,
    essential_right: bool,
    next: Option<usize>,
}

impl Chunk {
    fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            left: Some(Vec::new()),
            right: Some(Vec::new()),
            content_removed: false,
            essential_left: false,
            essential_right: false,
            next: None,
        }
    }

    fn len(&self) -> usize {
        let content = if self.content_removed { 0 } else { self.end - self.start };
        self.left.as_ref().map_or(0, Vec::len) + content + self.right.as_ref().map_or(0, Vec::len)
    }

    fn write_to(&self, original: &[u8], out: &mut Vec<u8>) {
        if let Some(left) = &self.left {
            out.extend_from_slice(left);
        }
        if !self.content_removed {
            out.extend_from_slice(&original[self.start..self.end]);
        }
        if let Some(right) = &self.right {
            out.extend_from_slice(right);
        }
    }

    /// Add bytes to the end of the right margin.
    fn append(&mut self, bytes: &[u8], essential: bool) -> TreeResult<()> {
        match self.right.as_mut() {
            Some(right) => {
                right.extend_from_slice(bytes);
                self.essential_right |= essential;
                Ok(())
            }
            None if essential => Err(TreeError::ContentCannotBeRemoved),
            None => {
                tracing::trace!(at = self.end, "dropping insertion into removed range");
                Ok(())
            }
        }
    }

    /// Add bytes to the end of the left margin.
    fn prepend(&mut self, bytes: &[u8], essential: bool) -> TreeResult<()> {
        match self.left.as_mut() {
            Some(left) => {
                left.extend_from_slice(bytes);
                self.essential_left |= essential;
                Ok(())
            }
            None if essential => Err(TreeError::ContentCannotBeRemoved),
            None => {
                tracing::trace!(at = self.start, "dropping insertion into removed range");
                Ok(())
            }
        }
    }

    fn check_removal(&self, left: bool, right: bool) -> TreeResult<()> {
        if (left && self.essential_left) || (right && self.essential_right) {
            return Err(TreeError::ContentCannotBeRemoved);
        }
        Ok(())
    }

    fn remove(&mut self, left: bool, content: bool, right: bool) {
        if left {
            self.left = None;
        }
        if content {
            self.content_removed = true;
        }
        if right {
            self.right = None;
        }
    }
}

/// Editable view over an immutable byte buffer.
#[derive(Debug, Clone)]
pub struct ByteRangeBuffer {
    original: Vec<u8>,
    chunks: Vec<Chunk>,
}

impl ByteRangeBuffer {
    /// Wrap `original` in a buffer with a single chunk spanning all of it.
    pub fn new(original: impl Into<Vec<u8>>) -> Self {
        let original = original.into();
        let chunks = vec![Chunk::new(0, original.len())];
        Self { original, chunks }
    }

    /// The content this buffer was created from.
    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// Length of the rendered content.
    pub fn len(&self) -> usize {
        self.chain().map(Chunk::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the edited content.
    pub fn generate(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for chunk in self.chain() {
            chunk.write_to(&self.original, &mut out);
        }
        out
    }

    /// Render the edited content as text, replacing invalid UTF-8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.generate()).into_owned()
    }

    /// Insert `bytes` at original offset `index`, after anything already
    /// inserted to the left of that offset.
    ///
    /// If the offset was removed, the insertion is dropped unless `essential`
    /// is set, in which case it fails with `ContentCannotBeRemoved`.
    pub fn insert_left(&mut self, index: usize, bytes: &[u8], essential: bool) -> TreeResult<()> {
        let (before, _) = self.slice_at(index)?;
        self.chunks[before].append(bytes, essential)
    }

    /// Insert `bytes` at original offset `index`, on the right side of the
    /// offset (before the original byte at `index`).
    pub fn insert_right(&mut self, index: usize, bytes: &[u8], essential: bool) -> TreeResult<()> {
        let (_, after) = self.slice_at(index)?;
        self.chunks[after].prepend(bytes, essential)
    }

    /// Remove original bytes `[index, index + length)` and whatever was
    /// inserted inside that range.
    ///
    /// Insertions at `index` on its right side survive; insertions at
    /// `index + length` do not. Nothing is mutated if any of the doomed
    /// margins is essential.
    pub fn remove(&mut self, index: usize, length: usize) -> TreeResult<()> {
        let max = self.original.len();
        let end = index
            .checked_add(length)
            .ok_or(TreeError::IndexOutOfBound { index, min: 0, max })?;
        self.check_index(index)?;
        self.check_index(end)?;
        if length == 0 {
            return Ok(());
        }

        let (_, first) = self.slice_at(index)?;
        let (_, last) = self.slice_at(end)?;

        let mut span = Vec::new();
        let mut cursor = Some(first);
        while let Some(idx) = cursor {
            if idx == last {
                break;
            }
            span.push(idx);
            cursor = self.chunks[idx].next;
        }

        for &idx in &span {
            self.chunks[idx].check_removal(idx != first, true)?;
        }
        self.chunks[last].check_removal(true, false)?;

        for &idx in &span {
            self.chunks[idx].remove(idx != first, true, true);
        }
        self.chunks[last].remove(true, false, false);
        Ok(())
    }

    fn check_index(&self, index: usize) -> TreeResult<()> {
        if index > self.original.len() {
            return Err(TreeError::IndexOutOfBound {
                index,
                min: 0,
                max: self.original.len(),
            });
        }
        Ok(())
    }

    fn chain(&self) -> impl Iterator<Item = &Chunk> + '_ {
        iter::successors(Some(&self.chunks[HEAD]), |chunk| {
            chunk.next.map(|idx| &self.chunks[idx])
        })
    }

    /// Find (splitting if needed) the chunk boundary at `index`.
    ///
    /// Returns the chunks ending and starting there.
    fn slice_at(&mut self, index: usize) -> TreeResult<(usize, usize)> {
        self.check_index(index)?;

        let mut cursor = Some(HEAD);
        while let Some(idx) = cursor {
            let chunk = &self.chunks[idx];
            if index <= chunk.end {
                if index == chunk.end {
                    if let Some(next) = chunk.next {
                        return Ok((idx, next));
                    }
                }
                let tail = self.split(idx, index)?;
                return Ok((idx, tail));
            }
            cursor = chunk.next;
        }

        Err(TreeError::IndexOutOfBound {
            index,
            min: 0,
            max: self.original.len(),
        })
    }

    /// Split chunk `idx` at `at`, returning the arena slot of the new tail.
    ///
    /// The tail inherits the right margin and the removed state, so a range
    /// that was deleted stays deleted on both sides of the split.
    fn split(&mut self, idx: usize, at: usize) -> TreeResult<usize> {
        let tail_idx = self.chunks.len();
        let chunk = &mut self.chunks[idx];
        if at < chunk.start || at > chunk.end {
            return Err(TreeError::IndexOutOfBound {
                index: at,
                min: chunk.start,
                max: chunk.end,
            });
        }

        let mut tail = Chunk::new(at, chunk.end);
        if chunk.content_removed {
            tail.content_removed = true;
            if chunk.right.is_none() {
                tail.left = None;
            }
        }
        chunk.end = at;

        tail.right = chunk.right.take();
        chunk.right = tail.right.as_ref().map(|_| Vec::new());
        tail.essential_right = std::mem::take(&mut chunk.essential_right);

        tail.next = chunk.next;
        chunk.next = Some(tail_idx);
        self.chunks.push(tail);
        Ok(tail_idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(s: &str) -> ByteRangeBuffer {
        ByteRangeBuffer::new(s.as_bytes().to_vec())
    }

    #[test]
    fn test_untouched_renders_original() {
        let buf = buffer("hello");
        assert_eq!(buf.generate(), b"hello");
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.original(), b"hello");
    }

    #[test]
    fn test_insert_at_end() {
        let mut buf = buffer("hello");
        buf.insert_right(5, b" world", false).unwrap();
        assert_eq!(buf.to_string_lossy(), "hello world");
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn test_insert_left_and_right_at_same_index() {
        let mut buf = buffer("ab");
        buf.insert_right(1, b"R", false).unwrap();
        buf.insert_left(1, b"L", false).unwrap();
        assert_eq!(buf.to_string_lossy(), "aLRb");

        buf.insert_left(1, b"2", false).unwrap();
        buf.insert_right(1, b"3", false).unwrap();
        assert_eq!(buf.to_string_lossy(), "aL2R3b");
    }

    #[test]
    fn test_indices_stay_anchored_to_original() {
        let mut buf = buffer("0123456789");
        buf.insert_left(2, b"aa", false).unwrap();
        buf.insert_left(5, b"bb", false).unwrap();
        buf.remove(7, 2).unwrap();
        assert_eq!(buf.to_string_lossy(), "01aa234bb569");
    }

    #[test]
    fn test_edits_are_order_independent() {
        type Edit = fn(&mut ByteRangeBuffer);
        let edits: [Edit; 3] = [
            |b| b.insert_right(0, b"> ", false).unwrap(),
            |b| b.insert_right(6, b"big ", false).unwrap(),
            |b| b.remove(8, 3).unwrap(),
        ];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        for order in orders {
            let mut buf = buffer("hello world");
            for i in order {
                edits[i](&mut buf);
            }
            assert_eq!(buf.to_string_lossy(), "> hello big wo", "order {:?}", order);
        }
    }

    #[test]
    fn test_remove_whole_content() {
        let mut buf = buffer("hello");
        buf.remove(0, 5).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.generate(), b"");
    }

    #[test]
    fn test_remove_keeps_insertion_at_start_boundary() {
        let mut buf = buffer("hello world");
        buf.insert_right(3, b"!", false).unwrap();
        buf.remove(3, 2).unwrap();
        assert_eq!(buf.to_string_lossy(), "hel! world");
    }

    #[test]
    fn test_remove_drops_insertions_inside_range() {
        let mut buf = buffer("hello world");
        buf.insert_left(2, b"X", false).unwrap();
        buf.insert_right(3, b"Y", false).unwrap();
        buf.remove(1, 4).unwrap();
        assert_eq!(buf.to_string_lossy(), "h world");
    }

    #[test]
    fn test_insert_into_removed_range_is_dropped() {
        let mut buf = buffer("hello world");
        buf.remove(2, 3).unwrap();
        buf.insert_left(3, b"X", false).unwrap();
        buf.insert_right(4, b"Y", false).unwrap();
        assert_eq!(buf.to_string_lossy(), "he world");
    }

    #[test]
    fn test_essential_insert_into_removed_range_fails() {
        let mut buf = buffer("hello world");
        buf.remove(2, 3).unwrap();
        let err = buf.insert_right(3, b"Y", true).unwrap_err();
        assert!(matches!(err, TreeError::ContentCannotBeRemoved));
        let err = buf.insert_left(4, b"Y", true).unwrap_err();
        assert!(matches!(err, TreeError::ContentCannotBeRemoved));
    }

    #[test]
    fn test_remove_over_essential_is_all_or_nothing() {
        let mut buf = buffer("hello world");
        buf.insert_right(3, b"!", true).unwrap();
        buf.insert_left(8, b"?", false).unwrap();
        let before = buf.generate();

        let err = buf.remove(1, 9).unwrap_err();
        assert!(matches!(err, TreeError::ContentCannotBeRemoved));
        assert_eq!(buf.generate(), before);

        // Removal that leaves the essential margin alone still works.
        buf.remove(4, 6).unwrap();
        assert_eq!(buf.to_string_lossy(), "hel!ld");
    }

    #[test]
    fn test_essential_right_margin_blocks_removal() {
        let mut buf = buffer("hello world");
        buf.insert_left(5, b"#", true).unwrap();
        let before = buf.generate();
        assert!(buf.remove(2, 3).is_err());
        assert_eq!(buf.generate(), before);
    }

    #[test]
    fn test_index_out_of_bound() {
        let mut buf = buffer("abc");
        let err = buf.insert_left(4, b"x", false).unwrap_err();
        assert!(matches!(
            err,
            TreeError::IndexOutOfBound { index: 4, min: 0, max: 3 }
        ));
        assert!(buf.remove(2, 5).is_err());
        assert!(buf.remove(usize::MAX, 2).is_err());
        assert_eq!(buf.generate(), b"abc");
    }

    #[test]
    fn test_zero_length_remove_is_noop() {
        let mut buf = buffer("abc");
        buf.insert_right(1, b"x", false).unwrap();
        buf.remove(1, 0).unwrap();
        assert_eq!(buf.to_string_lossy(), "axbc");
    }

    #[test]
    fn test_empty_buffer() {
        let mut buf = ByteRangeBuffer::new(Vec::new());
        assert!(buf.is_empty());
        buf.insert_left(0, b"new", false).unwrap();
        assert_eq!(buf.to_string_lossy(), "new");
    }

    #[test]
    fn test_binary_content() {
        let mut buf = ByteRangeBuffer::new(vec![0u8, 159, 146, 150]);
        buf.remove(1, 1).unwrap();
        buf.insert_left(4, &[0xff], false).unwrap();
        assert_eq!(buf.generate(), vec![0u8, 146, 150, 0xff]);
    }
}
