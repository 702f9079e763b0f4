//! The editor session.
//!
//! [`Session`] owns the lifecycle, routes protocol methods, and connects
//! three kinds of concurrent writers to one guarded state: the dispatch loop,
//! debounce timers, and the project's diagnostics pump. The watchdog only
//! ever triggers [`Session::exit`].
//!
//! Outgoing frames go to an unbounded channel that the serve loop drains.
//! Publications are enqueued while the state guard is held, so the client
//! sees them in the order the state changed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::debounce::Debouncer;
use crate::diagnostics;
use crate::error::SessionError;
use crate::project::{DiagnosticsSink, Project, ProjectEvent, ProjectFactory};
use crate::protocol::{
    DidChangeParams, DidCloseParams, DidOpenParams, InitializeParams, InitializeResult,
    Notification, PUBLISH_DIAGNOSTICS, RequestId, ResolveParams, Response, ResponseError,
    error_codes,
};
use crate::resolver::{self, ResolveType};
use crate::types::{Diagnostic, FileId};
use crate::watchdog::{ProcessProbe, SystemProbe, Watchdog};
use crate::workspace::WorkspaceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    ShuttingDown,
    Exited,
}

struct SessionState {
    lifecycle: Lifecycle,
    shutdown_requested: bool,
    workspace: WorkspaceState,
}

struct Inner {
    state: Mutex<SessionState>,
    factory: Arc<dyn ProjectFactory>,
    client: mpsc::UnboundedSender<Value>,
    debouncer: Debouncer<String>,
    watchdog: Mutex<Watchdog>,
    sink: DiagnosticsSink,
    events: Mutex<Option<mpsc::UnboundedReceiver<ProjectEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    exited: watch::Sender<bool>,
}

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Option<Value>) -> Result<T, ResponseError> {
    let params = params.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    serde_json::from_value(params).map_err(|e| ResponseError::invalid_params(method, &e))
}

impl Session {
    pub fn new(
        config: SessionConfig,
        factory: Arc<dyn ProjectFactory>,
        client: mpsc::UnboundedSender<Value>,
    ) -> Self {
        Self::with_probe(config, factory, Arc::new(SystemProbe), client)
    }

    pub fn with_probe(
        config: SessionConfig,
        factory: Arc<dyn ProjectFactory>,
        probe: Arc<dyn ProcessProbe>,
        client: mpsc::UnboundedSender<Value>,
    ) -> Self {
        let (sink, events) = DiagnosticsSink::channel();
        let (exited, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState {
                    lifecycle: Lifecycle::Uninitialized,
                    shutdown_requested: false,
                    workspace: WorkspaceState::new(),
                }),
                factory,
                client,
                debouncer: Debouncer::new(config.debounce_window()),
                watchdog: Mutex::new(Watchdog::new(config.watchdog_interval(), probe)),
                sink,
                events: Mutex::new(Some(events)),
                pump: Mutex::new(None),
                exited,
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.inner.state)
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.state().lifecycle
    }

    /// Process exit code: 0 when `shutdown` came before `exit`.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.state().shutdown_requested)
    }

    /// Resolves to `true` once `exit` has run.
    #[must_use]
    pub fn exited(&self) -> watch::Receiver<bool> {
        self.inner.exited.subscribe()
    }

    /// Run `f` against the workspace under the state guard.
    pub fn with_workspace<R>(&self, f: impl FnOnce(&WorkspaceState) -> R) -> R {
        f(&self.state().workspace)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    pub async fn handle_request(&self, id: RequestId, method: &str, params: Option<Value>) -> Response {
        if matches!(self.lifecycle(), Lifecycle::ShuttingDown | Lifecycle::Exited) {
            tracing::debug!(method, "Rejecting request after shutdown");
            return Response::error(
                Some(id),
                ResponseError::invalid_request(format!("{method} received after shutdown")),
            );
        }

        let result = match method {
            "initialize" => match parse_params::<InitializeParams>(method, params) {
                Ok(params) => self.initialize(params).await.and_then(|result| to_result(&result)),
                Err(e) => Err(e),
            },
            "textDocument/resolve" => parse_params::<ResolveParams>(method, params)
                .map(|params| Value::String(self.resolve_path(&params))),
            "shutdown" => {
                self.shutdown();
                Ok(Value::Null)
            }
            _ => {
                tracing::debug!(method, "Unsupported request");
                Err(ResponseError::method_not_found(method))
            }
        };

        match result {
            Ok(value) => Response::ok(id, value),
            Err(error) => Response::error(Some(id), error),
        }
    }

    pub fn handle_notification(&self, method: &str, params: Option<Value>) {
        if method != "exit" && matches!(self.lifecycle(), Lifecycle::ShuttingDown | Lifecycle::Exited) {
            tracing::trace!(method, "Dropping notification after shutdown");
            return;
        }

        match method {
            "initialized" => self.initialized(),
            "exit" => self.exit(),
            "textDocument/didOpen" => {
                if let Some(params) = Self::notification_params(method, params) {
                    self.did_open(params);
                }
            }
            "textDocument/didChange" => {
                if let Some(params) = Self::notification_params(method, params) {
                    self.did_change(params);
                }
            }
            "textDocument/didClose" => {
                if let Some(params) = Self::notification_params(method, params) {
                    self.did_close(params);
                }
            }
            _ => tracing::trace!(method, "Ignoring notification"),
        }
    }

    fn notification_params<T: DeserializeOwned>(method: &str, params: Option<Value>) -> Option<T> {
        match parse_params(method, params) {
            Ok(params) => Some(params),
            Err(e) => {
                tracing::warn!("{}", e.message);
                None
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult, ResponseError> {
        if self.lifecycle() != Lifecycle::Uninitialized {
            return Err(ResponseError::invalid_request(
                "initialize may only be sent once",
            ));
        }
        tracing::info!(
            root_uri = params.root_uri.as_deref().unwrap_or("<none>"),
            process_id = ?params.process_id,
            "Initializing session"
        );

        if let Some(root_uri) = params.root_uri.as_deref() {
            match self.open_project(root_uri) {
                Ok(project) => {
                    self.state().workspace.activate(Arc::clone(&project));
                    self.start_pump();
                    self.build(project).await;
                }
                Err(e) => tracing::error!("Continuing without a project: {e:#}"),
            }
        }

        self.state().lifecycle = Lifecycle::Initialized;
        match params.process_id.map(u32::try_from) {
            Some(Ok(pid)) => self.arm_watchdog(pid),
            Some(Err(_)) => tracing::warn!(
                process_id = ?params.process_id,
                "processId is not a valid pid, parent process is not watched"
            ),
            None => {}
        }
        Ok(InitializeResult::full_sync())
    }

    fn open_project(&self, root_uri: &str) -> anyhow::Result<Arc<dyn Project>> {
        let root = resolver::uri_to_path(root_uri)?;
        self.inner
            .factory
            .open(&root, self.inner.sink.clone())
            .with_context(|| format!("failed to open project at {}", root.display()))
    }

    async fn build(&self, project: Arc<dyn Project>) {
        let started = Instant::now();
        match tokio::task::spawn_blocking(move || project.build()).await {
            Ok(Ok(())) => tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Initial build complete"
            ),
            Ok(Err(e)) => tracing::error!("Initial build failed: {:#}", anyhow::Error::new(e)),
            Err(e) => tracing::error!("Initial build task failed: {e}"),
        }
    }

    /// Forward project reports to [`Session::set_diagnostics`] until exit.
    fn start_pump(&self) {
        let Some(mut events) = lock(&self.inner.events).take() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(session) = Session::from_weak(&weak) else {
                    break;
                };
                match event {
                    ProjectEvent::Diagnostics {
                        file_id,
                        diagnostics,
                    } => session.set_diagnostics(file_id, diagnostics),
                }
            }
        });
        *lock(&self.inner.pump) = Some(handle);
    }

    fn arm_watchdog(&self, pid: u32) {
        let weak = Arc::downgrade(&self.inner);
        let mut watchdog = lock(&self.inner.watchdog);
        watchdog.arm(pid, move || {
            if let Some(session) = Session::from_weak(&weak) {
                session.exit();
            }
        });
        tracing::info!(
            pid,
            interval_secs = watchdog.interval().as_secs(),
            "Parent process watchdog armed"
        );
    }

    pub fn initialized(&self) {
        tracing::debug!("Client initialized");
    }

    pub fn shutdown(&self) {
        let mut state = self.state();
        state.shutdown_requested = true;
        if state.lifecycle != Lifecycle::Exited {
            state.lifecycle = Lifecycle::ShuttingDown;
        }
        tracing::info!("Shutdown requested");
    }

    /// Tear the session down. Idempotent; safe without a prior `shutdown`.
    pub fn exit(&self) {
        let project = {
            let mut state = self.state();
            if state.lifecycle == Lifecycle::Exited {
                return;
            }
            state.lifecycle = Lifecycle::Exited;
            state.workspace.project().active().ok().cloned()
        };

        self.inner.debouncer.cancel_all();
        lock(&self.inner.watchdog).stop();
        if let Some(project) = project {
            project.stop_monitoring();
        }
        if let Some(pump) = lock(&self.inner.pump).take() {
            pump.abort();
        }

        tracing::info!(exit_code = self.exit_code(), "Session exited");
        self.inner.exited.send_replace(true);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Answer `textDocument/resolve`. Never fails: unresolvable queries
    /// echo `fileName` back.
    pub fn resolve_path(&self, params: &ResolveParams) -> String {
        let state = self.state();
        if !state.workspace.project().is_active() {
            tracing::warn!(file_name = %params.file_name, "Resolve before a project is active");
            return params.file_name.clone();
        }

        let resolved = ResolveType::parse(&params.resolve_type).and_then(|resolve_type| {
            resolver::resolve_path(
                state.workspace.project(),
                &params.file_name,
                &params.doc_path,
                resolve_type,
            )
        });
        match resolved {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(file_name = %params.file_name, "Resolve failed: {e}");
                params.file_name.clone()
            }
        }
    }

    // ========================================================================
    // Document sync
    // ========================================================================

    pub fn did_open(&self, params: DidOpenParams) {
        let item = params.text_document;
        // A change queued against the previous open must not land on top of
        // the new text.
        if self.inner.debouncer.cancel(&item.uri) {
            tracing::debug!(uri = %item.uri, "Dropped pending change on reopen");
        }
        let mut state = self.state();
        let result = resolver::uri_to_file_id(state.workspace.project(), &item.uri)
            .and_then(|file_id| state.workspace.open(&item.uri, file_id, &item.text));
        match result {
            Ok(()) => tracing::debug!(uri = %item.uri, version = item.version, "Document opened"),
            Err(e) => log_lifecycle_error("didOpen", &e),
        }
    }

    /// Debounced per URI; only the last change in a burst reaches the
    /// project.
    pub fn did_change(&self, params: DidChangeParams) {
        let uri = params.text_document.uri().to_string();
        let Some(change) = params.content_changes.into_iter().last() else {
            tracing::debug!(uri = %uri, "didChange without content changes");
            return;
        };
        if let Err(e) = resolver::uri_to_path(&uri) {
            log_lifecycle_error("didChange", &e);
            return;
        }
        if !self.state().workspace.project().is_active() {
            return;
        }

        tracing::trace!(
            uri = %uri,
            window_ms = self.inner.debouncer.window().as_millis() as u64,
            "Change scheduled"
        );
        let weak = Arc::downgrade(&self.inner);
        self.inner.debouncer.schedule(uri.clone(), move || {
            if let Some(session) = Session::from_weak(&weak) {
                session.apply_change(&uri, &change.text);
            }
        });
    }

    fn apply_change(&self, uri: &str, text: &str) {
        let mut state = self.state();
        if state.lifecycle == Lifecycle::Exited {
            return;
        }
        match state.workspace.apply_change(uri, text) {
            Ok(()) => tracing::debug!(uri, bytes = text.len(), "Document changed"),
            Err(e) => log_lifecycle_error("didChange", &e),
        }
    }

    pub fn did_close(&self, params: DidCloseParams) {
        let uri = params.text_document.uri;
        if self.inner.debouncer.cancel(&uri) {
            tracing::debug!(uri = %uri, "Dropped pending change on close");
        }
        let mut state = self.state();
        match state.workspace.close(&uri) {
            Ok(_) => tracing::debug!(uri = %uri, "Document closed"),
            Err(e) => log_lifecycle_error("didClose", &e),
        }
    }

    // ========================================================================
    // Outgoing
    // ========================================================================

    /// Record a project report and publish it if the file is open.
    pub fn set_diagnostics(&self, file_id: FileId, diagnostics: Vec<Diagnostic>) {
        let mut state = self.state();
        if state.lifecycle == Lifecycle::Exited {
            tracing::trace!(file = %file_id, "Diagnostics after exit");
            return;
        }
        if let Some(params) = diagnostics::set_diagnostics(&mut state.workspace, file_id, diagnostics) {
            self.notify(PUBLISH_DIAGNOSTICS, &params);
        }
    }

    pub(crate) fn send_response(&self, response: &Response) {
        self.send(response);
    }

    fn notify<P: Serialize>(&self, method: &'static str, params: &P) {
        match serde_json::to_value(params) {
            Ok(params) => self.send(&Notification::new(method, Some(params))),
            Err(e) => tracing::error!(method, "Failed to serialize notification: {e}"),
        }
    }

    fn send<T: Serialize>(&self, message: &T) {
        match serde_json::to_value(message) {
            Ok(frame) => {
                if self.inner.client.send(frame).is_err() {
                    tracing::trace!("Client channel closed, dropping outgoing message");
                }
            }
            Err(e) => tracing::error!("Failed to serialize outgoing message: {e}"),
        }
    }
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, ResponseError> {
    serde_json::to_value(value).map_err(|e| {
        ResponseError::new(
            error_codes::INTERNAL_ERROR,
            format!("failed to serialize result: {e}"),
        )
    })
}

/// Lifecycle notifications have no response channel; errors end here.
fn log_lifecycle_error(method: &str, err: &SessionError) {
    match err {
        SessionError::NoActiveProject => tracing::trace!(method, "No active project"),
        SessionError::DocumentNotOpen { uri } => {
            tracing::debug!(method, uri = %uri, "Document is not open");
        }
        _ => tracing::warn!(method, "{err}"),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::{Call, RecordingFactory};

    struct Harness {
        session: Session,
        factory: Arc<RecordingFactory>,
        client: mpsc::UnboundedReceiver<Value>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_probe(Arc::new(SystemProbe))
        }

        fn with_probe(probe: Arc<dyn ProcessProbe>) -> Self {
            let factory = Arc::new(RecordingFactory::default());
            let (tx, client) = mpsc::unbounded_channel();
            let session = Session::with_probe(
                SessionConfig::default(),
                factory.clone(),
                probe,
                tx,
            );
            Self {
                session,
                factory,
                client,
            }
        }

        async fn request(&self, method: &str, params: Value) -> Response {
            self.session
                .handle_request(RequestId::Number(1), method, Some(params))
                .await
        }

        async fn initialize(&self) -> Response {
            self.request("initialize", json!({"rootUri": "file:///proj"}))
                .await
        }

        fn notify(&self, method: &str, params: Value) {
            self.session.handle_notification(method, Some(params));
        }

        fn open(&self, uri: &str, text: &str) {
            self.notify(
                "textDocument/didOpen",
                json!({"textDocument": {"uri": uri, "languageId": "txt", "version": 1, "text": text}}),
            );
        }

        fn change(&self, uri: &str, text: &str) {
            self.notify(
                "textDocument/didChange",
                json!({"textDocument": {"uri": uri, "version": 2}, "contentChanges": [{"text": text}]}),
            );
        }

        fn close(&self, uri: &str) {
            self.notify("textDocument/didClose", json!({"textDocument": {"uri": uri}}));
        }

        async fn next_frame(&mut self) -> Option<Value> {
            tokio::time::timeout(Duration::from_secs(1), self.client.recv())
                .await
                .ok()
                .flatten()
        }
    }

    struct DeadProbe;

    impl ProcessProbe for DeadProbe {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn open_then_report_publishes_to_client() {
        let mut h = Harness::new();
        let response = h.initialize().await;
        assert_eq!(response.result().unwrap()["capabilities"]["textDocumentSync"], 1);

        h.open("file:///proj/a.txt", "Hello");
        let project = h.factory.project();
        assert_eq!(
            project.updates(),
            vec![(PathBuf::from("/proj/a.txt"), Some("Hello".to_string()))]
        );

        project.sink().report(FileId::new("a.txt"), vec![]);
        let frame = h.next_frame().await.unwrap();
        assert_eq!(frame["method"], "textDocument/publishDiagnostics");
        assert_eq!(frame["params"]["uri"], "file:///proj/a.txt");
        assert_eq!(frame["params"]["diagnostics"], json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_runs_build_once() {
        let h = Harness::new();
        h.initialize().await;
        assert_eq!(h.factory.project().calls(), vec![Call::Build]);
        assert_eq!(h.session.lifecycle(), Lifecycle::Initialized);
    }

    #[tokio::test(start_paused = true)]
    async fn second_initialize_is_rejected() {
        let h = Harness::new();
        h.initialize().await;
        let response = h.initialize().await;
        assert_eq!(response.error_code(), Some(error_codes::INVALID_REQUEST));
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_without_root_has_no_project() {
        let h = Harness::new();
        let response = h.request("initialize", json!({})).await;
        assert!(response.result().is_some());
        assert!(!h.session.with_workspace(|ws| ws.project().is_active()));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_forwards_only_last() {
        let h = Harness::new();
        h.initialize().await;
        h.open("file:///proj/a.txt", "v0");

        h.change("file:///proj/a.txt", "v1");
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.change("file:///proj/a.txt", "v2");
        tokio::time::sleep(Duration::from_millis(400)).await;

        let updates = h.factory.project().updates();
        assert_eq!(
            updates,
            vec![
                (PathBuf::from("/proj/a.txt"), Some("v0".to_string())),
                (PathBuf::from("/proj/a.txt"), Some("v2".to_string())),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn close_drops_pending_change() {
        let h = Harness::new();
        h.initialize().await;
        h.open("file:///proj/a.txt", "v0");
        h.change("file:///proj/a.txt", "v1");
        h.close("file:///proj/a.txt");
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(
            h.factory.project().updates(),
            vec![
                (PathBuf::from("/proj/a.txt"), Some("v0".to_string())),
                (PathBuf::from("/proj/a.txt"), None),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_drops_pending_change() {
        let h = Harness::new();
        h.initialize().await;
        h.open("file:///proj/a.txt", "v0");
        h.change("file:///proj/a.txt", "v1");
        h.open("file:///proj/a.txt", "v2");
        tokio::time::sleep(Duration::from_millis(400)).await;

        let updates = h.factory.project().updates();
        assert_eq!(
            updates.last(),
            Some(&(PathBuf::from("/proj/a.txt"), Some("v2".to_string())))
        );
        assert!(!updates.contains(&(PathBuf::from("/proj/a.txt"), Some("v1".to_string()))));
    }

    #[tokio::test(start_paused = true)]
    async fn change_on_non_file_uri_is_not_scheduled() {
        let h = Harness::new();
        h.initialize().await;
        h.change("untitled:Untitled-1", "x");
        assert_eq!(h.session.inner.debouncer.pending(), 0);

        h.change("file:///proj/a.txt", "x");
        assert_eq!(h.session.inner.debouncer.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn change_and_close_without_open_are_ignored() {
        let h = Harness::new();
        h.initialize().await;
        h.change("file:///proj/a.txt", "v1");
        h.close("file:///proj/a.txt");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(h.factory.project().calls(), vec![Call::Build]);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_published_after_close() {
        let mut h = Harness::new();
        h.initialize().await;
        h.open("file:///proj/a.txt", "x");
        h.close("file:///proj/a.txt");

        h.factory.project().sink().report(FileId::new("a.txt"), vec![]);
        assert!(h.next_frame().await.is_none());
        assert!(h.session.with_workspace(|ws| ws.open_count() == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn non_file_uri_is_ignored() {
        let h = Harness::new();
        h.initialize().await;
        h.open("untitled:Untitled-1", "x");
        assert_eq!(h.factory.project().calls(), vec![Call::Build]);
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_doc_and_directive() {
        let h = Harness::new();
        h.initialize().await;

        let doc = h
            .request(
                "textDocument/resolve",
                json!({"fileName": "intro.rst", "docPath": "guide/index.txt", "resolveType": "doc"}),
            )
            .await;
        assert_eq!(doc.result().unwrap(), "/proj/guide/intro.txt");

        let directive = h
            .request(
                "textDocument/resolve",
                json!({"fileName": "/includes/x.yaml", "docPath": "index.txt", "resolveType": "directive"}),
            )
            .await;
        assert_eq!(directive.result().unwrap(), "/proj/includes/x.yaml");
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_falls_back_to_file_name() {
        let h = Harness::new();
        let params = json!({"fileName": "x.rst", "docPath": "index.txt", "resolveType": "doc"});
        let before_init = h.request("textDocument/resolve", params).await;
        assert_eq!(before_init.result().unwrap(), "x.rst");

        h.initialize().await;
        let unknown = h
            .request(
                "textDocument/resolve",
                json!({"fileName": "x.rst", "docPath": "index.txt", "resolveType": "image"}),
            )
            .await;
        assert_eq!(unknown.result().unwrap(), "x.rst");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_request_and_bad_params() {
        let h = Harness::new();
        let response = h.request("textDocument/hover", json!({})).await;
        assert_eq!(response.error_code(), Some(error_codes::METHOD_NOT_FOUND));

        let response = h.request("textDocument/resolve", json!({"fileName": 3})).await;
        assert_eq!(response.error_code(), Some(error_codes::INVALID_PARAMS));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_then_exit() {
        let h = Harness::new();
        h.initialize().await;

        let response = h.request("shutdown", Value::Null).await;
        assert_eq!(response.result(), Some(&Value::Null));
        assert_eq!(h.session.lifecycle(), Lifecycle::ShuttingDown);

        let response = h.request("textDocument/resolve", json!({})).await;
        assert_eq!(response.error_code(), Some(error_codes::INVALID_REQUEST));

        h.notify("exit", Value::Null);
        assert_eq!(h.session.lifecycle(), Lifecycle::Exited);
        assert_eq!(h.session.exit_code(), 0);
        assert!(*h.session.exited().borrow());
        assert_eq!(
            h.factory.project().calls(),
            vec![Call::Build, Call::StopMonitoring]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exit_without_shutdown_is_idempotent() {
        let h = Harness::new();
        h.initialize().await;
        h.open("file:///proj/a.txt", "x");
        h.change("file:///proj/a.txt", "y");

        h.session.exit();
        h.session.exit();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(h.session.exit_code(), 1);
        let calls = h.factory.project().calls();
        assert_eq!(
            calls.iter().filter(|c| **c == Call::StopMonitoring).count(),
            1
        );
        assert!(
            !calls.contains(&Call::Update(PathBuf::from("/proj/a.txt"), Some("y".to_string()))),
            "pending change must not run after exit"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dead_parent_triggers_exit() {
        let h = Harness::with_probe(Arc::new(DeadProbe));
        h.request("initialize", json!({"rootUri": "file:///proj", "processId": 4242}))
            .await;

        let mut exited = h.session.exited();
        let saw_exit = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&saw_exit);
        tokio::time::timeout(Duration::from_secs(120), async move {
            if exited.wait_for(|done| *done).await.is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();

        assert!(saw_exit.load(Ordering::SeqCst));
        assert_eq!(h.session.exit_code(), 1);
        assert_eq!(h.factory.project().calls().last(), Some(&Call::StopMonitoring));
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_after_shutdown_are_dropped() {
        let h = Harness::new();
        h.initialize().await;
        h.request("shutdown", Value::Null).await;
        h.open("file:///proj/a.txt", "x");
        assert_eq!(h.factory.project().calls(), vec![Call::Build]);
    }

    #[tokio::test(start_paused = true)]
    async fn negative_process_id_is_not_watched() {
        let h = Harness::with_probe(Arc::new(DeadProbe));
        let response = h
            .request("initialize", json!({"rootUri": "file:///proj", "processId": -1}))
            .await;
        assert!(response.result().is_some());
        assert_eq!(
            lock(&h.session.inner.watchdog).state(),
            crate::watchdog::WatchdogState::Idle
        );

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.session.lifecycle(), Lifecycle::Initialized);
    }
}
