//! URI ↔ FileId resolution and include-path queries.
//!
//! Everything here is pure given the active project's configuration.

use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::error::SessionError;
use crate::project::ProjectSlot;
use crate::types::FileId;

/// What a `textDocument/resolve` query is resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveType {
    /// A document-relative include target.
    Doc,
    /// A directive argument, taken verbatim under the source root.
    Directive,
}

impl ResolveType {
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        match raw {
            "doc" => Ok(Self::Doc),
            "directive" => Ok(Self::Directive),
            other => Err(SessionError::UnsupportedResolveType(other.to_string())),
        }
    }
}

/// Lexically collapse `.` and `..`. A `..` at the top is dropped.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Parse a `file://` URI into an absolute, normalized filesystem path.
pub(crate) fn uri_to_path(uri: &str) -> Result<PathBuf, SessionError> {
    let parsed = Url::parse(uri).map_err(|_| SessionError::invalid_uri(uri))?;
    if parsed.scheme() != "file" {
        return Err(SessionError::invalid_uri(uri));
    }
    let path = match parsed.to_file_path() {
        Ok(path) => path,
        // A remote host becomes the leading path segment.
        Err(()) => {
            let host = parsed
                .host_str()
                .filter(|host| !host.is_empty())
                .ok_or_else(|| SessionError::invalid_uri(uri))?
                .to_string();
            let rest = Url::parse(&format!("file://{}", parsed.path()))
                .ok()
                .and_then(|local| local.to_file_path().ok())
                .ok_or_else(|| SessionError::invalid_uri(uri))?;
            let rest = rest.strip_prefix("/").unwrap_or(&rest);
            Path::new("/").join(host).join(rest)
        }
    };
    Ok(normalize_path(&path))
}

pub(crate) fn path_to_uri(path: &Path) -> Result<Url, SessionError> {
    Url::from_file_path(path).map_err(|()| SessionError::PathToUri {
        path: path.to_path_buf(),
    })
}

pub fn uri_to_file_id(slot: &ProjectSlot, uri: &str) -> Result<FileId, SessionError> {
    let project = slot.active()?;
    let path = uri_to_path(uri)?;
    project.file_id(&path)
}

pub fn file_id_to_uri(slot: &ProjectSlot, file_id: &FileId) -> Result<String, SessionError> {
    let project = slot.active()?;
    let path = project.full_path(file_id);
    Ok(path_to_uri(&path)?.to_string())
}

/// Re-root an include target against the including document.
///
/// A target starting with `/` is relative to the source root; anything else
/// is relative to the directory of `doc_path`, which is itself
/// source-relative.
pub(crate) fn reroot_path(target: &Path, doc_path: &Path, source_root: &Path) -> (FileId, PathBuf) {
    let relative = if target.has_root() {
        FileId::new(normalize_path(target))
    } else {
        let doc_path = doc_path.strip_prefix("/").unwrap_or(doc_path);
        let doc_dir = doc_path.parent().unwrap_or(Path::new(""));
        FileId::new(normalize_path(&doc_dir.join(target)))
    };
    let full = source_root.join(relative.as_path());
    (relative, full)
}

/// Answer a `textDocument/resolve` query.
pub fn resolve_path(
    slot: &ProjectSlot,
    file_name: &str,
    doc_path: &str,
    resolve_type: ResolveType,
) -> Result<String, SessionError> {
    let project = slot.active()?;
    let config = project.config();
    match resolve_type {
        ResolveType::Doc => {
            let target = Path::new(file_name).with_extension(config.doc_extension());
            let (_, full) = reroot_path(&target, Path::new(doc_path), config.source_path());
            Ok(full.display().to_string())
        }
        ResolveType::Directive => Ok(format!("{}{file_name}", config.source_path().display())),
    }
}
