//! Diagnostics store and publication.
//!
//! The project reports complete per-file lists; each report replaces the
//! previous one for that file. Reports for open documents are also written
//! into the document's [`WorkspaceEntry`](crate::workspace::WorkspaceEntry)
//! and published to the client in the same critical section, so the last
//! list published for a URI is always the entry's current list.

use std::collections::HashMap;

use crate::protocol::PublishDiagnosticsParams;
use crate::resolver;
use crate::types::{Diagnostic, DiagnosticSeverity, FileId};
use crate::workspace::WorkspaceState;

#[derive(Debug, Default)]
pub struct DiagnosticsStore {
    data: HashMap<FileId, Vec<Diagnostic>>,
}

impl DiagnosticsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, file_id: FileId, items: Vec<Diagnostic>) {
        if items.is_empty() {
            self.data.remove(&file_id);
        } else {
            self.data.insert(file_id, items);
        }
    }

    #[must_use]
    pub fn get(&self, file_id: &FileId) -> &[Diagnostic] {
        self.data.get(file_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of files with at least one diagnostic.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.data.len()
    }

    fn count_by_severity(&self, severity: DiagnosticSeverity) -> usize {
        self.data
            .values()
            .flatten()
            .filter(|d| d.effective_severity() == severity)
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Warning)
    }

    /// Compact summary like "E:3 W:5"; empty when there is nothing to report.
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.data.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}

/// Record a project report and build the notification for it, if the file
/// is open in the editor.
///
/// Must be called with the session state guard held, and the returned
/// notification sent before the guard is released.
pub(crate) fn set_diagnostics(
    state: &mut WorkspaceState,
    file_id: FileId,
    diagnostics: Vec<Diagnostic>,
) -> Option<PublishDiagnosticsParams> {
    state
        .file_diagnostics_mut()
        .update(file_id.clone(), diagnostics.clone());
    tracing::debug!(
        file = %file_id,
        count = diagnostics.len(),
        worst = diagnostics
            .iter()
            .map(Diagnostic::effective_severity)
            .min()
            .map_or("none", DiagnosticSeverity::label),
        summary = %state.file_diagnostics().status_string(),
        "Diagnostics updated"
    );

    let canonical = match resolver::file_id_to_uri(state.project(), &file_id) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(file = %file_id, "Dropping diagnostics: {e}");
            return None;
        }
    };

    let uri = if state.is_open(&canonical) {
        canonical
    } else {
        match state.uri_for_file(&file_id) {
            Some(uri) => uri.to_string(),
            None => {
                tracing::trace!(uri = %canonical, "Document not open, not publishing");
                return None;
            }
        }
    };

    let entry = state.entry_mut(&uri)?;
    entry.diagnostics = diagnostics;
    Some(PublishDiagnosticsParams {
        uri,
        diagnostics: entry.diagnostics.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectSlot;
    use crate::testing::active_slot;
    use crate::types::{Position, Range};

    fn make_diag(severity: DiagnosticSeverity, msg: &str, line: u32) -> Diagnostic {
        Diagnostic::new(
            Range::new(Position::new(line, 0), Position::new(line, 1)),
            severity,
            msg,
        )
    }

    fn active_state() -> WorkspaceState {
        let (slot, _) = active_slot("/proj");
        let mut state = WorkspaceState::new();
        if let ProjectSlot::Active(project) = slot {
            state.activate(project);
        }
        state
    }

    #[test]
    fn store_empty_report_removes_file() {
        let mut store = DiagnosticsStore::new();
        let id = FileId::new("a.txt");
        store.update(id.clone(), vec![make_diag(DiagnosticSeverity::Error, "e", 1)]);
        assert_eq!(store.file_count(), 1);

        store.update(id.clone(), vec![]);
        assert_eq!(store.file_count(), 0);
        assert!(store.get(&id).is_empty());
    }

    #[test]
    fn store_replaces_previous_report() {
        let mut store = DiagnosticsStore::new();
        let id = FileId::new("a.txt");
        store.update(
            id.clone(),
            vec![
                make_diag(DiagnosticSeverity::Error, "e1", 1),
                make_diag(DiagnosticSeverity::Error, "e2", 2),
            ],
        );
        assert_eq!(store.error_count(), 2);

        store.update(id.clone(), vec![make_diag(DiagnosticSeverity::Error, "e1", 1)]);
        assert_eq!(store.error_count(), 1);
        assert_eq!(store.get(&id)[0].message, "e1");
    }

    #[test]
    fn store_status_string() {
        let mut store = DiagnosticsStore::new();
        assert_eq!(store.status_string(), "");

        store.update(
            FileId::new("a.txt"),
            vec![
                make_diag(DiagnosticSeverity::Error, "e", 1),
                make_diag(DiagnosticSeverity::Warning, "w", 2),
                make_diag(DiagnosticSeverity::Warning, "w2", 3),
            ],
        );
        assert_eq!(store.status_string(), "E:1 W:2");
    }

    #[test]
    fn publishes_for_open_document() {
        let mut state = active_state();
        let uri = "file:///proj/a.txt";
        state.open(uri, FileId::new("a.txt"), "x").unwrap();

        let diags = vec![make_diag(DiagnosticSeverity::Warning, "w", 0)];
        let params = set_diagnostics(&mut state, FileId::new("a.txt"), diags.clone()).unwrap();
        assert_eq!(params.uri, uri);
        assert_eq!(params.diagnostics, diags);
        assert_eq!(state.entry(uri).unwrap().diagnostics, diags);
    }

    #[test]
    fn republishing_same_list_is_idempotent() {
        let mut state = active_state();
        let uri = "file:///proj/a.txt";
        state.open(uri, FileId::new("a.txt"), "x").unwrap();

        let diags = vec![make_diag(DiagnosticSeverity::Error, "e", 3)];
        let first = set_diagnostics(&mut state, FileId::new("a.txt"), diags.clone()).unwrap();
        let second = set_diagnostics(&mut state, FileId::new("a.txt"), diags.clone()).unwrap();
        assert_eq!(first, second);
        assert_eq!(state.entry(uri).unwrap().diagnostics, diags);
    }

    #[test]
    fn empty_report_publishes_empty_list() {
        let mut state = active_state();
        let uri = "file:///proj/a.txt";
        state.open(uri, FileId::new("a.txt"), "Hello").unwrap();

        let params = set_diagnostics(&mut state, FileId::new("a.txt"), vec![]).unwrap();
        assert_eq!(params.uri, uri);
        assert!(params.diagnostics.is_empty());
    }

    #[test]
    fn closed_document_is_stored_but_not_published() {
        let mut state = active_state();
        let diags = vec![make_diag(DiagnosticSeverity::Error, "e", 0)];

        assert!(set_diagnostics(&mut state, FileId::new("b.txt"), diags.clone()).is_none());
        assert_eq!(state.file_diagnostics().get(&FileId::new("b.txt")), diags.as_slice());
        assert!(!state.is_open("file:///proj/b.txt"));
    }

    #[test]
    fn publishes_under_client_spelling_of_uri() {
        let mut state = active_state();
        let client_uri = "file://localhost/proj/a.txt";
        state.open(client_uri, FileId::new("a.txt"), "x").unwrap();

        let params = set_diagnostics(&mut state, FileId::new("a.txt"), vec![]).unwrap();
        assert_eq!(params.uri, client_uri);
    }

    #[test]
    fn without_project_nothing_is_published() {
        let mut state = WorkspaceState::new();
        assert!(set_diagnostics(&mut state, FileId::new("a.txt"), vec![]).is_none());
    }
}
