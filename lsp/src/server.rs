//! Session loop: state machine, routing and background events.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use saga_config::ServerSettings;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::capabilities::{self, REFRESH_DIAGNOSTICS_COMMAND, RELOAD_ENTITIES_COMMAND};
use crate::codec::{FrameReader, FrameWriter, TransportError};
use crate::detection::DetectorRegistry;
use crate::diagnostics::{
    DiagnosticSource, DiagnosticsAggregator, DiagnosticsPublisher, EntityDiagnosticSource,
};
use crate::documents::DocumentStore;
use crate::features::{
    DefaultFeatureProvider, DocumentView, EntityResolver, FeatureProvider, ProviderError,
    REVEAL_ENTITY_COMMAND,
};
use crate::outbound::{Outbound, run_writer};
use crate::project::{
    EntityLoader, FileChange, ProjectContextManager, ProjectRootDetector, TomlEntityLoader,
    WatchBatcher, WatchFlush,
};
use crate::protocol::{ErrorCode, IncomingFrame, RequestError, file_uri_to_path, parse_incoming};
use crate::types::{
    DidChangeTextDocumentParams, DidChangeWatchedFilesParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams, DocumentRequest, ExecuteCommandParams,
    InitializeParams, TextDocumentParams, TextDocumentPositionParams, TextDocumentRangeParams,
};

const WRITER_CHANNEL_CAPACITY: usize = 64;

const INBOUND_CHANNEL_CAPACITY: usize = 16;

/// Methods answered with an empty list.
const EMPTY_RESULT_METHODS: [&str; 8] = [
    "textDocument/references",
    "textDocument/documentHighlight",
    "textDocument/implementation",
    "textDocument/typeDefinition",
    "textDocument/declaration",
    "textDocument/foldingRange",
    "textDocument/documentLink",
    "textDocument/inlayHint",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Uninitialized,
    Initializing,
    Initialized,
    ShuttingDown,
}

/// Everything a session can be customized with.
#[derive(Default)]
pub struct ServerOptions {
    pub settings: ServerSettings,
    /// Replaces the TOML loader.
    pub loader: Option<Arc<dyn EntityLoader>>,
    /// Registered after the built-in entity source.
    pub sources: Vec<Arc<dyn DiagnosticSource>>,
    /// Replaces the built-in feature providers.
    pub features: Option<Arc<dyn FeatureProvider>>,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnd {
    /// `shutdown` was received before the session ended.
    pub clean: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Run one session until `exit`, end of input, or a fatal transport error.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    options: ServerOptions,
) -> Result<SessionEnd, TransportError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound, writer_rx) = Outbound::channel(WRITER_CHANNEL_CAPACITY);
    let writer_handle = tokio::spawn(run_writer(FrameWriter::new(writer), writer_rx));

    let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
    let reader_handle = tokio::spawn(read_frames(FrameReader::new(reader), inbound_tx));

    let (flush_tx, mut flush_rx) = mpsc::channel(4);
    let mut server = Server::new(options, outbound.clone(), flush_tx);

    let outcome = loop {
        tokio::select! {
            biased;
            inbound = inbound_rx.recv() => match inbound {
                Some(Ok(frame)) => {
                    if server.handle_frame(frame).await == Flow::Exit {
                        break Ok(server.session_end());
                    }
                }
                Some(Err(err)) if !err.is_fatal() => {
                    tracing::warn!("Discarding unparseable message: {err}");
                    let error = RequestError::new(ErrorCode::ParseError, err.to_string());
                    if outbound.respond(Value::Null, Err(error)).await.is_err() {
                        break Ok(server.session_end());
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!("LSP read error: {err}");
                    break Err(err);
                }
                None => {
                    tracing::info!("Client closed the input stream");
                    break Ok(server.session_end());
                }
            },
            Some(flush) = flush_rx.recv() => server.on_watch_flush(flush).await,
        }
    };

    server.dispose();
    outbound.shutdown().await;
    let _ = writer_handle.await;
    reader_handle.abort();
    outcome
}

async fn read_frames<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    tx: mpsc::Sender<Result<Value, TransportError>>,
) {
    loop {
        let (item, last) = match reader.read_frame().await {
            Ok(Some(frame)) => (Ok(frame), false),
            Ok(None) => break,
            Err(err) => {
                let fatal = err.is_fatal();
                (Err(err), fatal)
            }
        };
        if tx.send(item).await.is_err() || last {
            break;
        }
    }
}

fn decode<P: DeserializeOwned>(params: Value) -> Result<P, RequestError> {
    serde_json::from_value(params).map_err(|e| RequestError::invalid_params(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Value, RequestError> {
    serde_json::to_value(value).map_err(|e| RequestError::internal(e.to_string()))
}

fn decode_notification<P: DeserializeOwned>(method: &str, params: Value) -> Option<P> {
    match serde_json::from_value(params) {
        Ok(params) => Some(params),
        Err(err) => {
            tracing::warn!(method, "Dropping notification with invalid params: {err}");
            None
        }
    }
}

fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .and_then(|folder| file_uri_to_path(&folder.uri))
        .or_else(|| params.root_uri.as_deref().and_then(file_uri_to_path))
        .or_else(|| params.root_path.as_ref().map(PathBuf::from))
}

struct Server {
    state: ServerState,
    settings: ServerSettings,
    workspace_root: Option<PathBuf>,
    documents: DocumentStore,
    custom_loader: Option<Arc<dyn EntityLoader>>,
    custom_features: Option<Arc<dyn FeatureProvider>>,
    features: Arc<dyn FeatureProvider>,
    registry: DetectorRegistry,
    projects: ProjectContextManager,
    aggregator: DiagnosticsAggregator,
    publisher: DiagnosticsPublisher,
    watcher: WatchBatcher,
    outbound: Outbound,
    /// The client accepts a dynamic file-watch registration.
    register_watchers: bool,
    disposed: bool,
}

impl Server {
    fn new(options: ServerOptions, outbound: Outbound, flush_tx: mpsc::Sender<WatchFlush>) -> Self {
        let ServerOptions {
            settings,
            loader,
            sources,
            features,
        } = options;

        let registry = DetectorRegistry::new();
        let mut aggregator = DiagnosticsAggregator::new();
        aggregator.register(Arc::new(EntityDiagnosticSource::new(registry.clone())));
        for source in sources {
            aggregator.register(source);
        }

        let projects = build_projects(&settings, loader.clone(), None, &registry);
        let active_features = build_features(&settings, features.clone());
        Self {
            state: ServerState::Uninitialized,
            publisher: DiagnosticsPublisher::new(outbound.clone(), settings.diagnostics_debounce()),
            watcher: WatchBatcher::new(settings.watch_debounce(), flush_tx),
            settings,
            workspace_root: None,
            documents: DocumentStore::new(),
            custom_loader: loader,
            custom_features: features,
            features: active_features,
            registry,
            projects,
            aggregator,
            outbound,
            register_watchers: false,
            disposed: false,
        }
    }

    fn session_end(&self) -> SessionEnd {
        SessionEnd {
            clean: self.state == ServerState::ShuttingDown,
        }
    }

    async fn handle_frame(&mut self, frame: Value) -> Flow {
        match parse_incoming(&frame) {
            IncomingFrame::Request { id, method, params } => {
                tracing::debug!(%method, "Request");
                let result = self.handle_request(&method, params).await;
                if let Err(err) = &result {
                    tracing::debug!(
                        %method,
                        code = err.code.code(),
                        "Request failed: {}",
                        err.message
                    );
                }
                if self.outbound.respond(id, result).await.is_err() {
                    tracing::debug!("Response dropped, writer closed");
                }
                Flow::Continue
            }
            IncomingFrame::Notification { method, params } => {
                self.handle_notification(&method, params).await
            }
            IncomingFrame::Response { id } => {
                tracing::trace!(%id, "Ignoring client response");
                Flow::Continue
            }
            IncomingFrame::Invalid { id: Some(id) } => {
                let error = RequestError::invalid_request("malformed JSON-RPC message");
                let _ = self.outbound.respond(id, Err(error)).await;
                Flow::Continue
            }
            IncomingFrame::Invalid { id: None } => {
                tracing::debug!("Ignoring malformed JSON-RPC message");
                Flow::Continue
            }
        }
    }

    async fn handle_request(&mut self, method: &str, params: Value) -> Result<Value, RequestError> {
        match (self.state, method) {
            (ServerState::Uninitialized, "initialize") => return self.initialize(params),
            (_, "initialize") => {
                return Err(RequestError::invalid_request("server already initialized"));
            }
            (ServerState::Uninitialized | ServerState::Initializing, _) => {
                return Err(RequestError::server_not_initialized());
            }
            (ServerState::ShuttingDown, _) => {
                return Err(RequestError::invalid_request("server is shutting down"));
            }
            (ServerState::Initialized, _) => {}
        }

        match method {
            "shutdown" => {
                self.dispose();
                self.state = ServerState::ShuttingDown;
                tracing::info!("Shutdown requested");
                Ok(Value::Null)
            }
            "textDocument/definition" => {
                self.document_request(params, |f, view, p: &TextDocumentPositionParams| {
                    f.definition(view, p.position)
                })
            }
            "textDocument/hover" => {
                self.document_request(params, |f, view, p: &TextDocumentPositionParams| {
                    f.hover(view, p.position)
                })
            }
            "textDocument/codeAction" => {
                self.document_request(params, |f, view, p: &TextDocumentRangeParams| {
                    f.code_actions(view, p.range)
                })
            }
            "textDocument/semanticTokens/full" => {
                self.document_request(params, |f, view, _: &TextDocumentParams| {
                    f.semantic_tokens(view, None)
                })
            }
            "textDocument/semanticTokens/range" => {
                self.document_request(params, |f, view, p: &TextDocumentRangeParams| {
                    f.semantic_tokens(view, Some(p.range))
                })
            }
            "textDocument/documentSymbol" => {
                self.document_request(params, |f, view, _: &TextDocumentParams| {
                    f.document_symbols(view)
                })
            }
            "textDocument/completion" => {
                self.document_request(params, |f, view, p: &TextDocumentPositionParams| {
                    f.completion(view, p.position)
                })
            }
            "textDocument/codeLens" => {
                self.document_request(params, |f, view, _: &TextDocumentParams| f.code_lens(view))
            }
            "workspace/executeCommand" => self.execute_command(params).await,
            m if EMPTY_RESULT_METHODS.contains(&m) => Ok(json!([])),
            _ => Err(RequestError::method_not_found(method)),
        }
    }

    fn initialize(&mut self, params: Value) -> Result<Value, RequestError> {
        let params: InitializeParams = if params.is_null() {
            InitializeParams::default()
        } else {
            decode(params)?
        };
        if let Some(options) = &params.initialization_options {
            self.settings.apply_overrides(options);
        }
        self.workspace_root = workspace_root(&params);
        self.register_watchers = params.watches_files_dynamically();

        self.projects = build_projects(
            &self.settings,
            self.custom_loader.clone(),
            self.workspace_root.clone(),
            &self.registry,
        );
        self.features = build_features(&self.settings, self.custom_features.clone());
        self.publisher.set_delay(self.settings.diagnostics_debounce());
        self.watcher.set_delay(self.settings.watch_debounce());

        self.state = ServerState::Initializing;
        tracing::info!(workspace = ?self.workspace_root, "Initializing session");
        Ok(capabilities::initialize_result())
    }

    /// Decode params, build the document's view and run a provider.
    ///
    /// A document that is not open, or a provider error, yields the empty
    /// result. A provider panic is answered with an internal error.
    fn document_request<P, T>(
        &mut self,
        params: Value,
        run: impl FnOnce(&dyn FeatureProvider, &DocumentView<'_>, &P) -> Result<T, ProviderError>,
    ) -> Result<Value, RequestError>
    where
        P: DeserializeOwned + DocumentRequest,
        T: Serialize + Default,
    {
        let params: P = decode(params)?;
        let Ok(document) = self.documents.get(params.uri()) else {
            tracing::debug!(uri = params.uri(), "Request for a document that is not open");
            return encode(&T::default());
        };
        let context = self.projects.context_for_uri(params.uri());
        let view = DocumentView {
            uri: &document.uri,
            content: &document.content,
            project_root: context.map(|c| c.root.as_path()),
            entity_info: context.map(|c| &c.info),
            resolver: EntityResolver::new(context.map(|c| c.detector.clone())),
        };

        let features = self.features.as_ref();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| run(features, &view, &params)));
        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                tracing::warn!(uri = view.uri, "Provider failed: {err}");
                T::default()
            }
            Err(_) => {
                tracing::error!(uri = view.uri, "Provider panicked");
                return Err(RequestError::internal("feature provider panicked"));
            }
        };
        encode(&value)
    }

    async fn execute_command(&mut self, params: Value) -> Result<Value, RequestError> {
        let params: ExecuteCommandParams = decode(params)?;
        tracing::debug!(command = %params.command, "Executing command");
        match params.command.as_str() {
            RELOAD_ENTITIES_COMMAND => {
                let roots = self.projects.reload_all();
                tracing::info!(projects = roots.len(), "Reloaded entities");
                self.after_reload().await;
                Ok(Value::Null)
            }
            REFRESH_DIAGNOSTICS_COMMAND => {
                self.republish_all().await;
                Ok(Value::Null)
            }
            REVEAL_ENTITY_COMMAND => {
                let Some(uri) = params.arguments.first().and_then(Value::as_str) else {
                    return Err(RequestError::invalid_params(format!(
                        "{REVEAL_ENTITY_COMMAND} expects a file URI"
                    )));
                };
                let show = json!({ "uri": uri, "takeFocus": true });
                if self
                    .outbound
                    .request("window/showDocument", Some(show))
                    .await
                    .is_err()
                {
                    tracing::debug!("window/showDocument dropped, writer closed");
                }
                Ok(Value::Null)
            }
            other => Err(RequestError::invalid_params(format!(
                "unknown command: {other}"
            ))),
        }
    }

    async fn handle_notification(&mut self, method: &str, params: Value) -> Flow {
        if method == "exit" {
            tracing::info!(clean = self.state == ServerState::ShuttingDown, "Exit");
            return Flow::Exit;
        }
        match (self.state, method) {
            (ServerState::Initializing, "initialized") => {
                self.state = ServerState::Initialized;
                tracing::info!("Session initialized");
                if self.register_watchers {
                    self.register_file_watchers().await;
                }
                return Flow::Continue;
            }
            (ServerState::Initialized, _) => {}
            (state, _) => {
                tracing::trace!(?state, method, "Dropping notification");
                return Flow::Continue;
            }
        }

        match method {
            "textDocument/didOpen" => {
                if let Some(p) = decode_notification::<DidOpenTextDocumentParams>(method, params) {
                    let item = p.text_document;
                    self.documents
                        .open(item.uri.clone(), item.text, item.version, item.language_id);
                    self.refresh_diagnostics(&item.uri, false).await;
                }
            }
            "textDocument/didChange" => {
                let parsed = decode_notification::<DidChangeTextDocumentParams>(method, params);
                if let Some(p) = parsed {
                    let uri = p.text_document.uri;
                    match self
                        .documents
                        .change(&uri, &p.content_changes, p.text_document.version)
                    {
                        Ok(_) => self.refresh_diagnostics(&uri, true).await,
                        Err(err) => tracing::warn!("Ignoring change: {err}"),
                    }
                }
            }
            "textDocument/didClose" => {
                if let Some(p) = decode_notification::<DidCloseTextDocumentParams>(method, params) {
                    let uri = p.text_document.uri;
                    self.documents.close(&uri);
                    self.publisher.publish(&uri, Vec::new()).await;
                }
            }
            "textDocument/didSave" => {
                if let Some(p) = decode_notification::<DidSaveTextDocumentParams>(method, params) {
                    self.refresh_diagnostics(&p.text_document.uri, false).await;
                }
            }
            "workspace/didChangeWatchedFiles" => {
                let parsed = decode_notification::<DidChangeWatchedFilesParams>(method, params);
                if let Some(p) = parsed {
                    let changes: Vec<FileChange> = p
                        .changes
                        .into_iter()
                        .filter_map(|event| {
                            file_uri_to_path(&event.uri).map(|path| FileChange {
                                path,
                                kind: event.kind,
                            })
                        })
                        .collect();
                    if !changes.is_empty() {
                        tracing::debug!(count = changes.len(), "Buffered watched-file changes");
                        self.watcher.push(changes);
                    }
                }
            }
            _ => tracing::trace!(method, "Ignoring notification"),
        }
        Flow::Continue
    }

    /// Generate diagnostics for an open document and publish them.
    async fn refresh_diagnostics(&mut self, uri: &str, debounced: bool) {
        let Ok(document) = self.documents.get(uri) else {
            return;
        };
        let root = self.projects.context_for_uri(uri).map(|c| c.root.clone());
        let round = self
            .aggregator
            .generate(uri, &document.content, root.as_deref())
            .await;
        if debounced {
            self.publisher.publish_debounced(uri, round.diagnostics);
        } else {
            self.publisher.publish(uri, round.diagnostics).await;
        }
    }

    async fn republish_all(&mut self) {
        for uri in self.documents.uris() {
            self.refresh_diagnostics(&uri, false).await;
        }
    }

    async fn after_reload(&mut self) {
        self.republish_all().await;
        if self
            .outbound
            .request("workspace/semanticTokens/refresh", None)
            .await
            .is_err()
        {
            tracing::debug!("Semantic token refresh dropped, writer closed");
        }
    }

    async fn register_file_watchers(&self) {
        let params = capabilities::watched_files_registration(&self.settings);
        if self
            .outbound
            .request("client/registerCapability", Some(params))
            .await
            .is_err()
        {
            tracing::debug!("File watcher registration dropped, writer closed");
        }
    }

    async fn on_watch_flush(&mut self, flush: WatchFlush) {
        let Some(changes) = self.watcher.take(flush) else {
            return;
        };
        let touched = self
            .projects
            .apply_file_changes(&changes, self.settings.incremental_reload_limit);
        if touched.is_empty() {
            tracing::debug!(count = changes.len(), "Watched changes touched no project");
            return;
        }
        self.after_reload().await;
    }

    /// Cancel timers and release sources. Runs once.
    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.publisher.dispose();
        self.watcher.cancel();
        self.aggregator.cancel_all();
        self.aggregator.dispose();
    }
}

fn build_projects(
    settings: &ServerSettings,
    custom_loader: Option<Arc<dyn EntityLoader>>,
    workspace_root: Option<PathBuf>,
    registry: &DetectorRegistry,
) -> ProjectContextManager {
    let loader = custom_loader
        .unwrap_or_else(|| Arc::new(TomlEntityLoader::new(&settings.entities_dir)));
    ProjectContextManager::new(
        loader,
        ProjectRootDetector::new(settings.root_markers.clone(), workspace_root),
        registry.clone(),
    )
}

fn build_features(
    settings: &ServerSettings,
    custom: Option<Arc<dyn FeatureProvider>>,
) -> Arc<dyn FeatureProvider> {
    custom.unwrap_or_else(|| Arc::new(DefaultFeatureProvider::new(settings.hover_preview_chars)))
}
