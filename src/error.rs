//! Error kinds and source locations.
//!
//! Everything that can go wrong while loading or querying a database is a
//! [`NyanError`].  Errors raised for a position in a source file carry a
//! [`LangError`] with the [`Location`] and optional notes pointing at
//! related positions (e.g. "first defined here").  [`LangError::render`]
//! produces an annotated snippet of the offending line for terminal output.

use std::fmt;
use std::sync::Arc;

use annotate_snippets::display_list::{DisplayList, FormatOptions};
use annotate_snippets::snippet::{Annotation, AnnotationType, Slice, Snippet, SourceAnnotation};
use thiserror::Error;

use crate::file::SourceFile;
use crate::{Fqon, MemberId};

/// Position of some data in a source file, or a synthetic location for
/// errors raised by native callers.
#[derive(Clone)]
pub enum Location {
    /// Not a file position; describes a native call or builtin origin.
    Builtin {
        /// What requested the operation.
        msg: String,
    },
    /// A position inside a loaded source file.
    File {
        /// File the location points into.
        file: Arc<SourceFile>,
        /// Line number, 1-based.
        line: u32,
        /// Offset inside the line, 0-based.
        column: u32,
        /// Number of characters the location covers.
        length: u32,
    },
}

impl Location {
    /// A synthetic location for operations requested by native code.
    pub fn builtin(msg: impl Into<String>) -> Location {
        Location::Builtin { msg: msg.into() }
    }

    /// A position inside a file.
    pub fn file(file: &Arc<SourceFile>, line: u32, column: u32, length: u32) -> Location {
        Location::File {
            file: Arc::clone(file),
            line,
            column,
            length,
        }
    }

    /// Whether this is a synthetic builtin location.
    pub fn is_builtin(&self) -> bool {
        matches!(self, Location::Builtin { .. })
    }

    /// Content of the line the location points at, if it is a file location.
    pub fn line_content(&self) -> Option<&str> {
        match self {
            Location::Builtin { .. } => None,
            Location::File { file, line, .. } => Some(file.line(*line)),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Builtin { msg } => write!(f, "[{}]: ", msg),
            Location::File {
                file, line, column, ..
            } => {
                write!(f, "{}:{}:{}: ", file.name(), line, column)
            }
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Builtin { msg } => write!(f, "Location[{}]", msg),
            Location::File {
                file,
                line,
                column,
                length,
            } => write!(f, "Location[{}:{}:{}+{}]", file.name(), line, column, length),
        }
    }
}

/// An error at a position in nyan source, with optional notes that point
/// at related positions.
#[derive(Debug, Clone)]
pub struct LangError {
    /// Where the error happened.
    pub location: Location,
    /// Description of the problem.
    pub msg: String,
    /// Related positions, e.g. the first definition for a redefinition error.
    pub notes: Vec<(Location, String)>,
}

impl LangError {
    /// Create an error for a location.
    pub fn new(location: Location, msg: impl Into<String>) -> LangError {
        LangError {
            location,
            msg: msg.into(),
            notes: Vec::new(),
        }
    }

    /// Attach a note pointing at a related location.
    #[must_use]
    pub fn with_note(mut self, location: Location, msg: impl Into<String>) -> LangError {
        self.notes.push((location, msg.into()));
        self
    }

    /// Render the error as an annotated snippet of the source line,
    /// followed by snippets for each note.
    pub fn render(&self) -> String {
        let mut out = render_snippet(&self.location, &self.msg, AnnotationType::Error);
        for (location, msg) in &self.notes {
            out.push('\n');
            out.push_str(&render_snippet(location, msg, AnnotationType::Note));
        }
        out
    }
}

fn render_snippet(location: &Location, msg: &str, kind: AnnotationType) -> String {
    let (origin, line, column, length, source) = match location {
        Location::Builtin { msg: origin } => {
            return format!("[{}]: {}", origin, msg);
        }
        Location::File {
            file,
            line,
            column,
            length,
        } => (
            file.name().to_owned(),
            *line,
            *column as usize,
            (*length).max(1) as usize,
            file.line(*line).to_owned(),
        ),
    };

    // clamp the annotation to the line so a stale location can't panic
    let start = column.min(source.len());
    let end = (column + length).min(source.len()).max(start);

    let snippet = Snippet {
        title: Some(Annotation {
            label: Some(msg),
            id: None,
            annotation_type: kind,
        }),
        footer: vec![],
        slices: vec![Slice {
            source: &source,
            line_start: line as usize,
            origin: Some(&origin),
            fold: false,
            annotations: vec![SourceAnnotation {
                range: (start, end),
                label: "",
                annotation_type: kind,
            }],
        }],
        opt: FormatOptions {
            color: cfg!(feature = "default"),
            ..Default::default()
        },
    };

    DisplayList::from(snippet).to_string()
}

impl fmt::Display for LangError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.location, self.msg)
    }
}

/// Everything that can go wrong in nyan.
#[derive(Debug, Error)]
pub enum NyanError {
    /// Low-level read failure from the file fetcher, reported at the
    /// location of the import that requested the file.
    #[error("file read failed: {0}")]
    FileRead(LangError),

    /// The tokenizer rejected the input.
    #[error("{0}")]
    Tokenize(LangError),

    /// The parser could not build an AST.
    #[error("{0}")]
    Parse(LangError),

    /// Unknown name, alias conflict, or duplicate definition.
    #[error("{0}")]
    Name(LangError),

    /// Operator/type mismatch, modifier violation or other type problem.
    #[error("{0}")]
    Type(LangError),

    /// Any other problem tied to a source position.
    #[error("{0}")]
    Lang(LangError),

    /// An object queried over the API does not exist.
    #[error("object not found: {0}")]
    ObjectNotFound(Fqon),

    /// A member queried over the API does not exist or was never assigned.
    #[error("could not find member {obj}.{member}")]
    MemberNotFound {
        /// Object the member was queried on.
        obj: Fqon,
        /// Requested member id.
        member: MemberId,
    },

    /// A member value was requested as the wrong type.
    #[error("type mismatch for member {obj}.{member}: value of type {real} requested as {requested}")]
    MemberType {
        /// Object the member was queried on.
        obj: Fqon,
        /// Requested member id.
        member: MemberId,
        /// Actual value kind.
        real: String,
        /// Requested value kind.
        requested: String,
    },

    /// Cycle or unresolvable merge during C3 linearization.
    #[error("C3 linearization failed: {0}")]
    C3(String),

    /// A value application failed, e.g. an undefined infinity operation.
    /// Aborts the surrounding transaction.
    #[error("invalid value application: {0}")]
    Value(String),

    /// An internal invariant was broken; this is a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NyanError {
    /// Shorthand for an internal invariant violation.
    pub fn internal(msg: impl Into<String>) -> NyanError {
        NyanError::Internal(msg.into())
    }

    /// The language-level error payload, if this error carries one.
    pub fn lang_error(&self) -> Option<&LangError> {
        match self {
            NyanError::FileRead(e)
            | NyanError::Tokenize(e)
            | NyanError::Parse(e)
            | NyanError::Name(e)
            | NyanError::Type(e)
            | NyanError::Lang(e) => Some(e),
            _ => None,
        }
    }

    /// Render the error for terminal output, with a source snippet where
    /// one is available.
    pub fn render(&self) -> String {
        match self.lang_error() {
            Some(lang) => lang.render(),
            None => self.to_string(),
        }
    }
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, NyanError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_location() -> Location {
        let file = Arc::new(SourceFile::new("test.nyan", "A():\n    x : int = 3\n"));
        Location::file(&file, 2, 8, 3)
    }

    #[test]
    fn display_points_at_file() {
        let err = LangError::new(test_location(), "something is off");
        assert_eq!(err.to_string(), "test.nyan:2:8: something is off");
    }

    #[test]
    fn render_contains_line_and_message() {
        let err = LangError::new(test_location(), "bad type");
        let rendered = err.render();
        assert!(rendered.contains("x : int = 3"));
        assert!(rendered.contains("bad type"));
    }

    #[test]
    fn builtin_locations_render_flat() {
        let err = LangError::new(Location::builtin("native call"), "no such file");
        assert_eq!(err.render(), "[native call]: no such file");
    }
}
