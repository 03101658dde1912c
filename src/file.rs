//! Source file storage and the file fetching interface of the loader.
//!
//! The loader never touches the filesystem itself.  It asks a fetcher
//! callable for the content of a namespace's file and parses whatever comes
//! back, so databases can be loaded from disk, from memory, or from any
//! other source that can produce text for a filename.

use std::io;
use std::path::PathBuf;

/// A loaded nyan source file.
///
/// Keeps the full content plus a line index so that diagnostics can show
/// the offending line.
#[derive(Debug)]
pub struct SourceFile {
    name: String,
    data: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Wrap a file name and its content.
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> SourceFile {
        let data = data.into();
        let mut line_starts = vec![0];
        for (offset, byte) in data.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        SourceFile {
            name: name.into(),
            data,
            line_starts,
        }
    }

    /// The name this file was fetched under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full file content.
    pub fn content(&self) -> &str {
        &self.data
    }

    /// Content of line `n` (1-based), without the trailing newline.
    ///
    /// Returns an empty string for out-of-range line numbers; diagnostics
    /// must not panic while reporting another problem.
    pub fn line(&self, n: u32) -> &str {
        let idx = (n as usize).saturating_sub(1);
        let Some(&start) = self.line_starts.get(idx) else {
            return "";
        };
        let end = self
            .line_starts
            .get(idx + 1)
            .map_or(self.data.len(), |&next| next - 1);
        self.data[start..end].trim_end_matches('\r')
    }

    /// Number of lines in the file.  The empty file has one line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Callable that produces the text of a file for a given filename.
///
/// Filenames handed to the fetcher are relative paths like
/// `units/cat.nyan`, derived from the namespaces named in `import`
/// statements.  An `Err` aborts the load with a
/// [`FileRead`](crate::NyanError::FileRead) error reported at the location
/// that requested the file.
pub type FileFetcher<'a> = dyn FnMut(&str) -> io::Result<String> + 'a;

/// A [`FileFetcher`] that resolves filenames below a root directory using
/// `std::fs`.
pub fn fs_fetcher(root: impl Into<PathBuf>) -> impl FnMut(&str) -> io::Result<String> {
    let root = root.into();
    move |filename: &str| std::fs::read_to_string(root.join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_lookup() {
        let file = SourceFile::new("test.nyan", "first\nsecond\nthird");
        assert_eq!(file.line(1), "first");
        assert_eq!(file.line(2), "second");
        assert_eq!(file.line(3), "third");
        assert_eq!(file.line(4), "");
        assert_eq!(file.line_count(), 3);
    }

    #[test]
    fn empty_file_has_one_line() {
        let file = SourceFile::new("empty.nyan", "");
        assert_eq!(file.line_count(), 1);
        assert_eq!(file.line(1), "");
    }
}
