//! Contract with the project engine that owns parsing and diagnostics.
//!
//! The session never analyzes documents itself. It forwards open/change/close
//! intent through [`Project`], and the project reports results back through
//! a [`DiagnosticsSink`] from whatever execution context it runs analysis on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::types::{Diagnostic, FileId};

/// Name of the optional per-project configuration file at the root.
pub const PROJECT_FILE_NAME: &str = "quire.toml";

const DEFAULT_SOURCE_DIR: &str = "source";

const DEFAULT_DOC_EXTENSION: &str = "txt";

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("project root is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },
}

#[derive(Debug, Default, Deserialize)]
struct ProjectFile {
    source: Option<String>,
    doc_extension: Option<String>,
}

/// Resolved layout of a project on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    root: PathBuf,
    source_path: PathBuf,
    doc_extension: String,
}

impl ProjectConfig {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            source_path: source_path.into(),
            doc_extension: DEFAULT_DOC_EXTENSION.to_string(),
        }
    }

    #[must_use]
    pub fn with_doc_extension(mut self, extension: impl Into<String>) -> Self {
        self.doc_extension = extension.into();
        self
    }

    /// Load `quire.toml` from `root` if present.
    ///
    /// The source directory defaults to `<root>/source`; when that directory
    /// does not exist the root itself is the source directory.
    pub fn load(root: &Path) -> Result<Self, ProjectError> {
        if !root.is_dir() {
            return Err(ProjectError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        let file_path = root.join(PROJECT_FILE_NAME);
        let file = if file_path.is_file() {
            let content =
                std::fs::read_to_string(&file_path).map_err(|source| ProjectError::Read {
                    path: file_path.clone(),
                    source,
                })?;
            toml::from_str::<ProjectFile>(&content).map_err(|source| ProjectError::Parse {
                path: file_path.clone(),
                source,
            })?
        } else {
            ProjectFile::default()
        };

        let source_dir = file.source.as_deref().unwrap_or(DEFAULT_SOURCE_DIR);
        let mut source_path = root.join(source_dir);
        if !source_path.is_dir() {
            tracing::debug!(
                source = %source_path.display(),
                "Source directory missing, using project root"
            );
            source_path = root.to_path_buf();
        }

        let doc_extension = file
            .doc_extension
            .map(|ext| ext.trim_start_matches('.').to_string())
            .unwrap_or_else(|| DEFAULT_DOC_EXTENSION.to_string());

        Ok(Self {
            root: root.to_path_buf(),
            source_path,
            doc_extension,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that FileIds are relative to.
    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Canonical extension of document sources, without the dot.
    #[must_use]
    pub fn doc_extension(&self) -> &str {
        &self.doc_extension
    }
}

/// The project engine, as seen by the session.
///
/// All methods take `&self`; implementations synchronize internally. The
/// session calls them while holding its state guard, so they must not block
/// on the session and must report diagnostics through the sink rather than
/// calling back into the session directly.
pub trait Project: Send + Sync {
    fn config(&self) -> &ProjectConfig;

    /// Map an absolute path to its project identifier.
    fn file_id(&self, path: &Path) -> Result<FileId, SessionError> {
        path.strip_prefix(self.config().source_path())
            .map(FileId::new)
            .map_err(|_| SessionError::OutsideSourceRoot {
                path: path.to_path_buf(),
            })
    }

    fn full_path(&self, file_id: &FileId) -> PathBuf {
        self.config().source_path().join(file_id.as_path())
    }

    /// Initial full build. Blocking; diagnostics stream through the sink.
    fn build(&self) -> Result<(), ProjectError>;

    /// New content for `path`. `None` means the editor let go of the
    /// document and the on-disk content applies again.
    fn update(&self, path: &Path, text: Option<&str>);

    /// Release file watches and other background resources.
    fn stop_monitoring(&self) {}
}

/// The session's project handle: absent until `initialize` supplies a root.
#[derive(Clone, Default)]
pub enum ProjectSlot {
    #[default]
    Uninitialized,
    Active(Arc<dyn Project>),
}

impl ProjectSlot {
    pub fn active(&self) -> Result<&Arc<dyn Project>, SessionError> {
        match self {
            Self::Active(project) => Ok(project),
            Self::Uninitialized => Err(SessionError::NoActiveProject),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

impl fmt::Debug for ProjectSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("Uninitialized"),
            Self::Active(project) => f
                .debug_tuple("Active")
                .field(&project.config().root())
                .finish(),
        }
    }
}

/// Constructs a project for a workspace root at `initialize`.
pub trait ProjectFactory: Send + Sync {
    fn open(&self, root: &Path, sink: DiagnosticsSink) -> Result<Arc<dyn Project>, ProjectError>;
}

impl<F> ProjectFactory for F
where
    F: Fn(&Path, DiagnosticsSink) -> Result<Arc<dyn Project>, ProjectError> + Send + Sync,
{
    fn open(&self, root: &Path, sink: DiagnosticsSink) -> Result<Arc<dyn Project>, ProjectError> {
        self(root, sink)
    }
}

#[derive(Debug)]
pub(crate) enum ProjectEvent {
    Diagnostics {
        file_id: FileId,
        diagnostics: Vec<Diagnostic>,
    },
}

/// Handle the project uses to report analysis results.
///
/// Cheap to clone; reports after the session is gone are dropped.
#[derive(Debug, Clone)]
pub struct DiagnosticsSink {
    tx: mpsc::UnboundedSender<ProjectEvent>,
}

impl DiagnosticsSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<ProjectEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report the complete diagnostic list for `file_id`, replacing any
    /// previous report for it.
    pub fn report(&self, file_id: FileId, diagnostics: Vec<Diagnostic>) {
        if self
            .tx
            .send(ProjectEvent::Diagnostics {
                file_id,
                diagnostics,
            })
            .is_err()
        {
            tracing::trace!("Diagnostics reported after session closed");
        }
    }
}
