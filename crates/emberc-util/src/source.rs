//! Source buffer with offset-to-line/column mapping.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Span;

/// Errors raised while loading source text.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The file could not be read from disk.
    #[error("unable to read source file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A loaded source file.
///
/// Holds the full text as one contiguous buffer and precomputes the byte
/// offset of every line start, so `locate` is a binary search rather than a
/// rescan.
///
/// # Examples
///
/// ```
/// use emberc_util::SourceBuffer;
///
/// let buffer = SourceBuffer::from_string("demo.em", "a := 1;\nb := 2;\n");
/// assert_eq!(buffer.locate(8), (2, 1));
/// assert_eq!(buffer.slice(0, 1), "a");
/// ```
pub struct SourceBuffer {
    path: PathBuf,
    content: String,
    /// Byte offset of the first character of each line, line_starts[0] == 0.
    line_starts: Vec<usize>,
}

impl SourceBuffer {
    /// Load a buffer from disk.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_string(path, content))
    }

    /// Create a buffer from in-memory text.
    pub fn from_string(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        let mut line_starts = vec![0];
        for (offset, byte) in content.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        Self {
            path: path.into(),
            content,
            line_starts,
        }
    }

    /// Path this buffer was loaded from (or labeled with).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The full source text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Length of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns true when the buffer holds no text.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Map a byte offset to a 1-based (line, column) pair.
    ///
    /// Offsets past the end of the buffer map to the end of the last line.
    pub fn locate(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.content.len());
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let column = offset - self.line_starts[line_index] + 1;
        (line_index as u32 + 1, column as u32)
    }

    /// Slice of the raw text between two byte offsets.
    pub fn slice(&self, start: usize, end: usize) -> &str {
        let end = end.min(self.content.len());
        let start = start.min(end);
        &self.content[start..end]
    }

    /// The text of a 1-based line, without its trailing newline.
    pub fn line_text(&self, line: u32) -> &str {
        if line == 0 || line as usize > self.line_starts.len() {
            return "";
        }
        let start = self.line_starts[line as usize - 1];
        let end = self
            .line_starts
            .get(line as usize)
            .map(|next| next - 1)
            .unwrap_or(self.content.len());
        &self.content[start..end]
    }

    /// Span of the text's slice starting at `start` and ending at `end`,
    /// with line/column derived from `start`.
    pub fn span(&self, start: usize, end: usize) -> Span {
        let (line, column) = self.locate(start);
        Span::new(start, end, line, column)
    }
}
