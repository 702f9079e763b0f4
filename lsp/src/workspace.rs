//! Per-session document state: which documents are open and what was last
//! published for each.
//!
//! A [`WorkspaceEntry`] exists for a URI exactly while the editor has that
//! document open. The session owns one [`WorkspaceState`] behind a single
//! mutex; every mutator (request handlers, debounce timers, the project's
//! diagnostics pump) goes through it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::diagnostics::DiagnosticsStore;
use crate::error::SessionError;
use crate::project::{Project, ProjectSlot};
use crate::types::{Diagnostic, FileId};

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceEntry {
    pub file_id: FileId,
    pub document_uri: String,
    /// Last list published for this document.
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Default)]
pub struct WorkspaceState {
    project: ProjectSlot,
    entries: HashMap<String, WorkspaceEntry>,
    /// Diagnostics per file, kept whether or not the file is open.
    file_diagnostics: DiagnosticsStore,
}

impl WorkspaceState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn project(&self) -> &ProjectSlot {
        &self.project
    }

    pub(crate) fn activate(&mut self, project: Arc<dyn Project>) {
        self.project = ProjectSlot::Active(project);
    }

    /// Track `uri` as open and hand its text to the project.
    ///
    /// Replaces any existing entry for `uri`, clearing its diagnostics.
    pub fn open(&mut self, uri: &str, file_id: FileId, text: &str) -> Result<(), SessionError> {
        let project = self.project.active()?;
        let path = project.full_path(&file_id);
        self.entries.insert(
            uri.to_string(),
            WorkspaceEntry {
                file_id,
                document_uri: uri.to_string(),
                diagnostics: Vec::new(),
            },
        );
        project.update(&path, Some(text));
        Ok(())
    }

    /// Forward the full new text of an open document to the project.
    pub fn apply_change(&mut self, uri: &str, text: &str) -> Result<(), SessionError> {
        let project = self.project.active()?;
        let entry = self
            .entries
            .get(uri)
            .ok_or_else(|| SessionError::DocumentNotOpen {
                uri: uri.to_string(),
            })?;
        let path = project.full_path(&entry.file_id);
        project.update(&path, Some(text));
        Ok(())
    }

    /// Stop tracking `uri`; the project falls back to the on-disk content.
    pub fn close(&mut self, uri: &str) -> Result<WorkspaceEntry, SessionError> {
        let project = self.project.active()?;
        let entry = self
            .entries
            .remove(uri)
            .ok_or_else(|| SessionError::DocumentNotOpen {
                uri: uri.to_string(),
            })?;
        let path = project.full_path(&entry.file_id);
        project.update(&path, None);
        Ok(entry)
    }

    #[must_use]
    pub fn entry(&self, uri: &str) -> Option<&WorkspaceEntry> {
        self.entries.get(uri)
    }

    pub(crate) fn entry_mut(&mut self, uri: &str) -> Option<&mut WorkspaceEntry> {
        self.entries.get_mut(uri)
    }

    #[must_use]
    pub fn is_open(&self, uri: &str) -> bool {
        self.entries.contains_key(uri)
    }

    /// URI under which `file_id` is open, in the client's own spelling.
    #[must_use]
    pub fn uri_for_file(&self, file_id: &FileId) -> Option<&str> {
        self.entries
            .values()
            .find(|entry| &entry.file_id == file_id)
            .map(|entry| entry.document_uri.as_str())
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn file_diagnostics(&self) -> &DiagnosticsStore {
        &self.file_diagnostics
    }

    pub(crate) fn file_diagnostics_mut(&mut self) -> &mut DiagnosticsStore {
        &mut self.file_diagnostics
    }
}
