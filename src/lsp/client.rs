//! LSP client for BSL Language Server.
//!
//! [`BslClient`] starts the server from a [`LaunchSpec`], performs the
//! `initialize` handshake and keeps the connection alive for follow-up
//! requests.
//!
//! # Example
//!
//! ```ignore
//! use bsl_launcher::lsp::{BslClient, LaunchSpec};
//!
//! let launch = LaunchSpec::new(&deps, &settings, &workspace);
//! let client = BslClient::builder(launch).build().await?;
//!
//! let symbols = client.document_symbols(Path::new("src/Module.bsl")).await?;
//! client.shutdown().await?;
//! ```

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_lsp::concurrency::ConcurrencyLayer;
use async_lsp::panic::CatchUnwindLayer;
use async_lsp::router::Router;
use async_lsp::tracing::TracingLayer;
use async_lsp::{LanguageServer, ServerSocket};
use lsp_types::{
    ClientCapabilities, ClientInfo, CompletionClientCapabilities, CompletionItemCapability,
    DidChangeWatchedFilesClientCapabilities, DidOpenTextDocumentParams,
    DocumentSymbolClientCapabilities, DocumentSymbolParams, DocumentSymbolResponse,
    DynamicRegistrationClientCapabilities, GotoCapability, HoverClientCapabilities,
    InitializeParams, InitializedParams, MarkupKind, PartialResultParams,
    PublishDiagnosticsClientCapabilities, ServerCapabilities, TextDocumentClientCapabilities,
    TextDocumentIdentifier, TextDocumentItem, TextDocumentSyncClientCapabilities, TraceValue,
    Url, WindowClientCapabilities, WorkDoneProgressParams, WorkspaceClientCapabilities,
    WorkspaceEditClientCapabilities, WorkspaceFolder, WorkspaceSymbolClientCapabilities,
    notification, request,
};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tracing::{debug, info, warn};

use crate::error::LspError;

use super::LspResult;
use super::launch::LaunchSpec;
use super::types::{language_id_for, path_to_url};

/// Name reported in `clientInfo`.
const CLIENT_NAME: &str = "bsl-launcher";

/// Locale requested from the server. Diagnostics are authored in Russian.
const SERVER_LOCALE: &str = "ru";

/// Router state. Notifications are only logged.
struct ClientState;

/// Configuration for building a [`BslClient`].
#[derive(Debug, Clone)]
pub struct BslClientConfig {
    /// How to start the server.
    pub launch: LaunchSpec,
    /// Timeout for the `initialize` request. The JVM and the server index
    /// need a while on large configurations.
    pub init_timeout: Duration,
    /// Timeout for other requests.
    pub request_timeout: Duration,
}

/// Builder for [`BslClient`].
#[derive(Debug)]
pub struct BslClientBuilder {
    config: BslClientConfig,
}

impl BslClientBuilder {
    /// Creates a builder with default timeouts.
    pub fn new(launch: LaunchSpec) -> Self {
        Self {
            config: BslClientConfig {
                launch,
                init_timeout: Duration::from_secs(120),
                request_timeout: Duration::from_secs(30),
            },
        }
    }

    /// Sets the initialization timeout.
    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Starts the server and completes the `initialize` handshake.
    ///
    /// ## Errors
    /// [`LspError::ServerStartFailed`] if the process cannot be spawned,
    /// [`LspError::Timeout`] or [`LspError::InitializationFailed`] if the
    /// handshake does not complete.
    pub async fn build(self) -> LspResult<BslClient> {
        let launch = &self.config.launch;
        let workspace_root = launch.cwd.canonicalize().map_err(|e| {
            LspError::InitializationFailed(format!("failed to canonicalize workspace root: {e}"))
        })?;

        info!(command = %launch.display(), "starting BSL Language Server process");
        let mut cmd = async_process::Command::new(&launch.program);
        cmd.args(&launch.args)
            .env("JAVA_HOME", &launch.java_home)
            .current_dir(&workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            LspError::ServerStartFailed(format!(
                "failed to spawn '{}': {e}",
                launch.program.display()
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::ServerStartFailed("failed to capture stdout".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::ServerStartFailed("failed to capture stdin".to_string()))?;

        let (mainloop, server) = async_lsp::MainLoop::new_client(|_client| {
            let mut router = Router::new(ClientState);

            router
                .request::<request::RegisterCapability, _>(|_, params| {
                    debug!(count = params.registrations.len(), "server registered capabilities");
                    async { Ok(()) }
                })
                .request::<request::WorkDoneProgressCreate, _>(|_, _| async { Ok(()) })
                .request::<request::WorkspaceConfiguration, _>(|_, params| {
                    let items = params.items.len();
                    async move { Ok(vec![Value::Null; items]) }
                })
                .notification::<notification::LogMessage>(|_, params| {
                    info!(kind = ?params.typ, "LSP: window/logMessage: {}", params.message);
                    ControlFlow::Continue(())
                })
                .notification::<notification::Progress>(|_, _| ControlFlow::Continue(()))
                .notification::<notification::PublishDiagnostics>(|_, params| {
                    debug!(uri = %params.uri, count = params.diagnostics.len(), "diagnostics published");
                    ControlFlow::Continue(())
                })
                .unhandled_notification(|_, notif| {
                    debug!(method = %notif.method, "ignoring notification");
                    ControlFlow::Continue(())
                });

            ServiceBuilder::new()
                .layer(TracingLayer::default())
                .layer(CatchUnwindLayer::default())
                .layer(ConcurrencyLayer::default())
                .service(router)
        });

        let mainloop_handle = tokio::spawn(async move {
            if let Err(e) = mainloop.run_buffered(stdout, stdin).await {
                warn!(error = ?e, "BSL Language Server connection closed");
            }
        });

        let init_params = initialize_params(&workspace_root)?;
        let server = Arc::new(Mutex::new(server));

        info!("sending initialize request to BSL Language Server");
        let init_result = tokio::time::timeout(
            self.config.init_timeout,
            server.lock().await.initialize(init_params),
        )
        .await
        .map_err(|_| LspError::Timeout(self.config.init_timeout))?
        .map_err(|e| LspError::InitializationFailed(format!("initialize request failed: {e:?}")))?;

        let capabilities = init_result.capabilities;
        info!(
            capabilities = ?capability_keys(&capabilities),
            "BSL Language Server capabilities"
        );
        let completions_available = capabilities.completion_provider.is_some();
        let diagnostics_available = capabilities.diagnostic_provider.is_some();
        if diagnostics_available {
            info!("BSL Language Server diagnostics enabled");
        }

        server
            .lock()
            .await
            .initialized(InitializedParams {})
            .map_err(|e| {
                LspError::InitializationFailed(format!("initialized notification failed: {e:?}"))
            })?;

        Ok(BslClient {
            config: self.config,
            server,
            _mainloop_handle: mainloop_handle,
            capabilities: Arc::new(capabilities),
            completions_available,
            diagnostics_available,
            open_documents: Arc::new(Mutex::new(HashSet::new())),
            _child_process: Arc::new(Mutex::new(child)),
        })
    }
}

/// A running BSL Language Server session.
#[derive(Debug)]
pub struct BslClient {
    config: BslClientConfig,
    server: Arc<Mutex<ServerSocket>>,
    _mainloop_handle: tokio::task::JoinHandle<()>,
    capabilities: Arc<ServerCapabilities>,
    completions_available: bool,
    diagnostics_available: bool,
    open_documents: Arc<Mutex<HashSet<Url>>>,
    /// Kept alive so the process is not killed on drop.
    _child_process: Arc<Mutex<async_process::Child>>,
}

impl BslClient {
    /// Creates a builder for `launch`.
    pub fn builder(launch: LaunchSpec) -> BslClientBuilder {
        BslClientBuilder::new(launch)
    }

    /// Capabilities returned by `initialize`.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Whether the server advertised `completionProvider`.
    pub fn completions_available(&self) -> bool {
        self.completions_available
    }

    /// Whether the server advertised `diagnosticProvider`.
    pub fn diagnostics_available(&self) -> bool {
        self.diagnostics_available
    }

    /// Sends `shutdown` followed by `exit`.
    ///
    /// ## Errors
    /// Returns [`LspError::RequestFailed`] if either message cannot be sent.
    pub async fn shutdown(&self) -> LspResult<()> {
        self.server
            .lock()
            .await
            .shutdown(())
            .await
            .map_err(|e| LspError::RequestFailed(format!("shutdown request failed: {e:?}")))?;

        self.server
            .lock()
            .await
            .exit(())
            .map_err(|e| LspError::RequestFailed(format!("exit notification failed: {e:?}")))?;

        Ok(())
    }

    /// Opens a BSL or OneScript module in the server.
    ///
    /// Opening an already open document is a no-op.
    /// ## Errors
    /// [`LspError::DocumentNotFound`] if the file cannot be read.
    pub async fn did_open(&self, path: &Path) -> LspResult<()> {
        let uri = path_to_url(path)?;
        if self.open_documents.lock().await.contains(&uri) {
            return Ok(());
        }

        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            LspError::DocumentNotFound(format!("failed to read '{}': {e}", path.display()))
        })?;

        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: language_id_for(path).to_string(),
                version: 0,
                text,
            },
        };

        self.server
            .lock()
            .await
            .did_open(params)
            .map_err(|e| LspError::RequestFailed(format!("didOpen notification failed: {e:?}")))?;

        self.open_documents.lock().await.insert(uri);
        Ok(())
    }

    /// Returns the symbols of a module, opening it first if needed.
    ///
    /// ## Errors
    /// Propagates [`Self::did_open`] errors, plus [`LspError::Timeout`] and
    /// [`LspError::RequestFailed`].
    pub async fn document_symbols(&self, path: &Path) -> LspResult<DocumentSymbolResponse> {
        self.did_open(path).await?;
        let uri = path_to_url(path)?;

        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };

        let result = tokio::time::timeout(
            self.config.request_timeout,
            self.server.lock().await.document_symbol(params),
        )
        .await
        .map_err(|_| LspError::Timeout(self.config.request_timeout))?
        .map_err(|e| LspError::RequestFailed(format!("document_symbol failed: {e:?}")))?;

        Ok(result.unwrap_or(DocumentSymbolResponse::Flat(vec![])))
    }
}

/// Top-level keys of the serialized capabilities, e.g. `completionProvider`.
pub fn capability_keys(capabilities: &ServerCapabilities) -> Vec<String> {
    match serde_json::to_value(capabilities) {
        Ok(Value::Object(map)) => map.into_iter().map(|(key, _)| key).collect(),
        _ => Vec::new(),
    }
}

/// Builds the `initialize` request for `workspace_root`.
///
/// ## Errors
/// [`LspError::InitializationFailed`] if the root cannot be expressed as a
/// `file://` URI.
#[allow(deprecated)]
pub fn initialize_params(workspace_root: &Path) -> LspResult<InitializeParams> {
    let root_uri = Url::from_file_path(workspace_root).map_err(|()| {
        LspError::InitializationFailed(format!(
            "invalid workspace root path: {}",
            workspace_root.display()
        ))
    })?;
    let name = workspace_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workspace")
        .to_string();

    Ok(InitializeParams {
        process_id: Some(std::process::id()),
        root_path: Some(workspace_root.to_string_lossy().into_owned()),
        root_uri: Some(root_uri.clone()),
        initialization_options: Some(json!({ "workspaceFolders": [root_uri.as_str()] })),
        capabilities: client_capabilities(),
        trace: Some(TraceValue::Verbose),
        workspace_folders: Some(vec![WorkspaceFolder {
            uri: root_uri,
            name,
        }]),
        client_info: Some(ClientInfo {
            name: CLIENT_NAME.to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
        locale: Some(SERVER_LOCALE.to_string()),
        ..Default::default()
    })
}

fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        workspace: Some(WorkspaceClientCapabilities {
            apply_edit: Some(true),
            workspace_edit: Some(WorkspaceEditClientCapabilities {
                document_changes: Some(true),
                ..Default::default()
            }),
            did_change_configuration: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(true),
            }),
            did_change_watched_files: Some(DidChangeWatchedFilesClientCapabilities {
                dynamic_registration: Some(true),
                relative_pattern_support: Some(true),
            }),
            symbol: Some(WorkspaceSymbolClientCapabilities {
                dynamic_registration: Some(true),
                ..Default::default()
            }),
            execute_command: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(true),
            }),
            configuration: Some(true),
            workspace_folders: Some(true),
            ..Default::default()
        }),
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                dynamic_registration: Some(true),
                will_save: Some(true),
                will_save_wait_until: Some(true),
                did_save: Some(true),
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                version_support: Some(false),
                code_description_support: Some(true),
                data_support: Some(true),
                ..Default::default()
            }),
            completion: Some(CompletionClientCapabilities {
                dynamic_registration: Some(true),
                context_support: Some(true),
                completion_item: Some(CompletionItemCapability {
                    snippet_support: Some(false),
                    commit_characters_support: Some(true),
                    documentation_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
                    deprecated_support: Some(true),
                    preselect_support: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(true),
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(true),
                link_support: Some(true),
            }),
            references: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(true),
            }),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                dynamic_registration: Some(true),
                hierarchical_document_symbol_support: Some(true),
                ..Default::default()
            }),
            call_hierarchy: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(true),
            }),
            ..Default::default()
        }),
        window: Some(WindowClientCapabilities {
            work_done_progress: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}
