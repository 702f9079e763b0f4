//! Test doubles shared by the unit tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::project::{
    DiagnosticsSink, Project, ProjectConfig, ProjectError, ProjectFactory, ProjectSlot,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Build,
    Update(PathBuf, Option<String>),
    StopMonitoring,
}

/// A project that records every call it receives.
pub(crate) struct RecordingProject {
    config: ProjectConfig,
    calls: Mutex<Vec<Call>>,
    sink: Option<DiagnosticsSink>,
}

impl RecordingProject {
    pub(crate) fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            config: ProjectConfig::new(root, root),
            calls: Mutex::new(Vec::new()),
            sink: None,
        }
    }

    pub(crate) fn with_sink(mut self, sink: DiagnosticsSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn updates(&self) -> Vec<(PathBuf, Option<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update(path, text) => Some((path, text)),
                Call::Build | Call::StopMonitoring => None,
            })
            .collect()
    }

    pub(crate) fn sink(&self) -> &DiagnosticsSink {
        self.sink.as_ref().expect("project created with a sink")
    }
}

impl Project for RecordingProject {
    fn config(&self) -> &ProjectConfig {
        &self.config
    }

    fn build(&self) -> Result<(), ProjectError> {
        self.calls.lock().expect("calls lock").push(Call::Build);
        Ok(())
    }

    fn update(&self, path: &Path, text: Option<&str>) {
        self.calls
            .lock()
            .expect("calls lock")
            .push(Call::Update(path.to_path_buf(), text.map(str::to_string)));
    }

    fn stop_monitoring(&self) {
        self.calls
            .lock()
            .expect("calls lock")
            .push(Call::StopMonitoring);
    }
}

pub(crate) fn active_slot(root: &str) -> (ProjectSlot, Arc<RecordingProject>) {
    let project = Arc::new(RecordingProject::new(root));
    (ProjectSlot::Active(project.clone()), project)
}

/// Hands out a [`RecordingProject`] wired to the session's sink and keeps a
/// handle to it for assertions.
#[derive(Default)]
pub(crate) struct RecordingFactory {
    project: Mutex<Option<Arc<RecordingProject>>>,
}

impl RecordingFactory {
    pub(crate) fn project(&self) -> Arc<RecordingProject> {
        self.project
            .lock()
            .expect("factory lock")
            .clone()
            .expect("initialize opened a project")
    }
}

impl ProjectFactory for RecordingFactory {
    fn open(&self, root: &Path, sink: DiagnosticsSink) -> Result<Arc<dyn Project>, ProjectError> {
        let project = Arc::new(RecordingProject::new(root).with_sink(sink));
        *self.project.lock().expect("factory lock") = Some(Arc::clone(&project));
        Ok(project)
    }
}
