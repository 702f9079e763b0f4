//! Filesystem-backed project used by the `quire` binary.
//!
//! It has no language knowledge. Its checks are the ones any analyzer needs
//! first: every document source under the source root must be readable and
//! valid UTF-8. Open documents are checked from their in-editor text instead
//! of the disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ignore::WalkBuilder;

use crate::project::{DiagnosticsSink, Project, ProjectConfig, ProjectError, ProjectFactory};
use crate::types::{Diagnostic, DiagnosticSeverity, FileId, Position, Range};

const DIAGNOSTIC_SOURCE: &str = "quire";

/// Upper bound on files visited by a full build.
const MAX_BUILD_FILES: usize = 50_000;

type Overlays = Arc<Mutex<HashMap<PathBuf, String>>>;

pub struct LocalProject {
    config: ProjectConfig,
    sink: DiagnosticsSink,
    /// Editor-owned text, keyed by absolute path.
    overlays: Overlays,
    monitoring: Arc<AtomicBool>,
}

impl LocalProject {
    pub fn new(config: ProjectConfig, sink: DiagnosticsSink) -> Self {
        Self {
            config,
            sink,
            overlays: Arc::new(Mutex::new(HashMap::new())),
            monitoring: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Load the project at `root`, reading `quire.toml` if present.
    pub fn open(root: &Path, sink: DiagnosticsSink) -> Result<Self, ProjectError> {
        let config = ProjectConfig::load(root)?;
        tracing::info!(
            root = %config.root().display(),
            source = %config.source_path().display(),
            extension = config.doc_extension(),
            "Project opened"
        );
        Ok(Self::new(config, sink))
    }

    fn is_document(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(self.config.doc_extension()))
    }

    fn overlay(&self, path: &Path) -> Option<String> {
        self.overlays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn report(&self, path: &Path, diagnostics: Vec<Diagnostic>) {
        if !self.monitoring.load(Ordering::Acquire) {
            return;
        }
        match self.file_id(path) {
            Ok(file_id) => self.sink.report(file_id, diagnostics),
            Err(e) => tracing::debug!("Not reporting diagnostics: {e}"),
        }
    }

    /// Drop the overlay for `path` and re-check the file on disk. Inside a
    /// tokio runtime the read runs on the blocking pool.
    fn release(&self, path: &Path) {
        self.overlays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        if !self.is_document(path) {
            return;
        }
        let file_id = match self.file_id(path) {
            Ok(file_id) => file_id,
            Err(e) => {
                tracing::debug!("Not re-checking released file: {e}");
                return;
            }
        };

        let check = DiskCheck {
            path: path.to_path_buf(),
            file_id,
            sink: self.sink.clone(),
            overlays: Arc::clone(&self.overlays),
            monitoring: Arc::clone(&self.monitoring),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || check.run());
            }
            Err(_) => check.run(),
        }
    }

    fn document_paths(&self) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(self.config.source_path())
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !matches!(name.as_ref(), ".git" | "node_modules" | "target" | "_build")
            })
            .build();

        let mut paths = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            if !self.is_document(entry.path()) {
                continue;
            }
            if paths.len() >= MAX_BUILD_FILES {
                tracing::warn!(limit = MAX_BUILD_FILES, "Build file limit reached");
                break;
            }
            paths.push(entry.into_path());
        }
        paths.sort();
        paths
    }
}

impl Project for LocalProject {
    fn config(&self) -> &ProjectConfig {
        &self.config
    }

    fn build(&self) -> Result<(), ProjectError> {
        let source = self.config.source_path();
        if !source.is_dir() {
            return Err(ProjectError::NotADirectory {
                path: source.to_path_buf(),
            });
        }

        let paths = self.document_paths();
        let mut with_findings = 0usize;
        for path in &paths {
            let diagnostics = match self.overlay(path) {
                Some(_) => Vec::new(),
                None => check_disk(path),
            };
            if !diagnostics.is_empty() {
                with_findings += 1;
            }
            self.report(path, diagnostics);
        }
        tracing::info!(files = paths.len(), with_findings, "Initial build finished");
        Ok(())
    }

    fn update(&self, path: &Path, text: Option<&str>) {
        let Some(text) = text else {
            self.release(path);
            return;
        };
        self.overlays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), text.to_string());
        // Editor text arrives as a JSON string, so it is already UTF-8.
        if self.is_document(path) {
            self.report(path, Vec::new());
        }
    }

    fn stop_monitoring(&self) {
        if self.monitoring.swap(false, Ordering::AcqRel) {
            self.overlays
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            tracing::debug!(root = %self.config.root().display(), "Project monitoring stopped");
        }
    }
}

/// Re-check of a file whose editor overlay was dropped.
struct DiskCheck {
    path: PathBuf,
    file_id: FileId,
    sink: DiagnosticsSink,
    overlays: Overlays,
    monitoring: Arc<AtomicBool>,
}

impl DiskCheck {
    fn run(self) {
        let diagnostics = check_disk(&self.path);
        // Reported under the overlay lock so a reopen either wins outright or
        // reports after this.
        let overlays = self.overlays.lock().unwrap_or_else(PoisonError::into_inner);
        if overlays.contains_key(&self.path) {
            tracing::trace!(path = %self.path.display(), "Reopened before disk check finished");
            return;
        }
        if self.monitoring.load(Ordering::Acquire) {
            self.sink.report(self.file_id, diagnostics);
        }
    }
}

fn check_disk(path: &Path) -> Vec<Diagnostic> {
    match std::fs::read(path) {
        Ok(bytes) => check_utf8(&bytes),
        Err(e) => vec![
            Diagnostic::new(
                Range::default(),
                DiagnosticSeverity::Error,
                format!("cannot read file: {e}"),
            )
            .with_source(DIAGNOSTIC_SOURCE),
        ],
    }
}

/// Opens a [`LocalProject`] for each workspace root.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProjectFactory;

impl ProjectFactory for LocalProjectFactory {
    fn open(&self, root: &Path, sink: DiagnosticsSink) -> Result<Arc<dyn Project>, ProjectError> {
        Ok(Arc::new(LocalProject::open(root, sink)?))
    }
}

/// One diagnostic at the first invalid byte, or none.
fn check_utf8(bytes: &[u8]) -> Vec<Diagnostic> {
    let Err(err) = std::str::from_utf8(bytes) else {
        return Vec::new();
    };
    let valid_up_to = err.valid_up_to();
    // The prefix is valid by construction.
    let prefix = std::str::from_utf8(&bytes[..valid_up_to]).unwrap_or_default();
    let start = end_position(prefix);
    let end = Position::new(start.line, start.character + 1);
    vec![
        Diagnostic::new(
            Range::new(start, end),
            DiagnosticSeverity::Error,
            format!("invalid UTF-8 at byte offset {valid_up_to}"),
        )
        .with_source(DIAGNOSTIC_SOURCE),
    ]
}

/// Position just past the end of `text`, with UTF-16 columns.
fn end_position(text: &str) -> Position {
    let line = text.matches('\n').count();
    let last_line = text.rsplit('\n').next().unwrap_or_default();
    Position::new(line as u32, last_line.encode_utf16().count() as u32)
}
