//! Session-level error kinds.

use std::path::PathBuf;

/// Failures of URI/FileId resolution and session queries.
///
/// Lifecycle notifications (open/change/close) swallow `NoActiveProject`;
/// everything else surfaces these to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no active project; initialize with a rootUri first")]
    NoActiveProject,
    #[error("only file:// URIs may be resolved: {uri}")]
    InvalidUri { uri: String },
    #[error("unsupported resolveType: {0}")]
    UnsupportedResolveType(String),
    #[error("path is outside the project source root: {}", path.display())]
    OutsideSourceRoot { path: PathBuf },
    #[error("document is not open: {uri}")]
    DocumentNotOpen { uri: String },
    #[error("cannot convert path to file URI: {}", path.display())]
    PathToUri { path: PathBuf },
}

impl SessionError {
    pub(crate) fn invalid_uri(uri: impl Into<String>) -> Self {
        Self::InvalidUri { uri: uri.into() }
    }
}
