//! Value types exchanged with the editor.
//!
//! These mirror the protocol's structured records. They are plain data:
//! construction is unrestricted and nothing here performs IO.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Zero-based position in a document. `character` counts UTF-16 code units.
///
/// Ordering is lexicographic on `(line, character)`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Half-open span `start..end`. Callers supply `start <= end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

/// Identifies a document by URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentId {
    pub uri: String,
}

/// A [`DocumentId`] plus the client's edit version.
///
/// `version: None` means the client doesn't care which version applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedDocumentId {
    #[serde(flatten)]
    pub id: DocumentId,
    #[serde(default)]
    pub version: Option<i32>,
}

impl VersionedDocumentId {
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.id.uri
    }
}

/// A document as transferred on open, with its full text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

/// One content change from `didChange`.
///
/// Sync is full-document: `range` is accepted but `text` is always treated
/// as the complete new content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChange {
    #[serde(default)]
    pub range: Option<Range>,
    #[serde(default)]
    pub range_length: Option<u32>,
    pub text: String,
}

/// Severity level for a diagnostic. Serialized as its protocol integer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from the protocol's numeric severity (1=Error .. 4=Hint).
    ///
    /// Returns `None` for values outside the defined range.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

impl From<DiagnosticSeverity> for u8 {
    fn from(severity: DiagnosticSeverity) -> Self {
        severity as u8
    }
}

#[derive(Debug, thiserror::Error)]
#[error("diagnostic severity out of range: {0}")]
pub struct SeverityOutOfRange(u8);

impl TryFrom<u8> for DiagnosticSeverity {
    type Error = SeverityOutOfRange;

    fn try_from(value: u8) -> Result<Self, SeverityOutOfRange> {
        Self::from_lsp(u64::from(value)).ok_or(SeverityOutOfRange(value))
    }
}

/// Diagnostic code: the protocol allows either an integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticCode {
    Number(i64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedInformation {
    pub location: Location,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<DiagnosticSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<DiagnosticCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_information: Option<Vec<RelatedInformation>>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(range: Range, severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            range,
            severity: Some(severity),
            code: None,
            source: None,
            message: message.into(),
            related_information: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: DiagnosticCode) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_related(mut self, location: Location, message: impl Into<String>) -> Self {
        self.related_information
            .get_or_insert_with(Vec::new)
            .push(RelatedInformation {
                location,
                message: message.into(),
            });
        self
    }

    /// Severity, treating an absent one as an error.
    #[must_use]
    pub fn effective_severity(&self) -> DiagnosticSeverity {
        self.severity.unwrap_or(DiagnosticSeverity::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentEdit {
    pub text_document: VersionedDocumentId,
    pub edits: Vec<TextEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub title: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// Project-relative identifier of a source file.
///
/// Deliberately not a URI: the session converts between the two through
/// the resolver, and only while a project is active.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(PathBuf);

impl FileId {
    /// Build from a source-root-relative path. Leading `/` is stripped.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let relative = path.strip_prefix("/").unwrap_or(path);
        Self(relative.to_path_buf())
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}
