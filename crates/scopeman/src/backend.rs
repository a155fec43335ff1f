//
// backend.rs
//
// Copyright (C) 2022-2026 Posit Software, PBC. All rights reserved.
// Modifications copyright (C) 2026 Jonathan Marc Bearak
//

use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::Client;
use tower_lsp::LanguageServer;
use tower_lsp::LspService;
use tower_lsp::Server;

use crate::channel::AnalysisChannel;
use crate::collaborators::{
    DocumentProvider, DocumentSnapshot, ExtensionClassifier, FsDirectoryLister,
};
use crate::config::{parse_scope_config, ScopeConfig};
use crate::coordinator::{HintSession, ScopeCoordinator};
use crate::documents::{path_from_uri, OpenDocuments};
use crate::engine_process::{EngineLink, EngineProcess};
use crate::environment::{Environment, EnvironmentLoader};
use crate::perf;
use crate::protocol::EngineMessage;

/// Parameters for the scopeman/activeEditorChanged notification
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveEditorChangedParams {
    uri: String,
}

/// Upper bound on a completion request when the settings leave it open.
/// tower-lsp serves a handful of requests at a time, so a reply that never
/// comes must not hold one of those slots.
const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(5);

fn with_completion_timeout(mut config: ScopeConfig) -> ScopeConfig {
    if config.request_timeout.is_none() {
        config.request_timeout = Some(DEFAULT_COMPLETION_TIMEOUT);
    }
    config
}

fn completion_items(names: Vec<String>) -> Vec<CompletionItem> {
    names
        .into_iter()
        .map(|label| CompletionItem {
            label,
            kind: Some(CompletionItemKind::PROPERTY),
            ..Default::default()
        })
        .collect()
}

pub struct Backend {
    client: Client,
    coordinator: Arc<ScopeCoordinator>,
    documents: Arc<OpenDocuments>,
    /// Taken by `initialized` when the inbound loop starts
    inbound: StdMutex<Option<mpsc::UnboundedReceiver<EngineMessage>>>,
    engine: Mutex<Option<EngineProcess>>,
    cancel: CancellationToken,
    workspace_root: StdRwLock<Option<String>>,
}

impl Backend {
    pub fn new(client: Client, config: ScopeConfig, link: EngineLink) -> Self {
        let config = with_completion_timeout(config);
        config.log_summary();

        let documents = Arc::new(OpenDocuments::new());
        let provider: Arc<dyn DocumentProvider> = documents.clone();
        let channel = Arc::new(AnalysisChannel::new(
            link.outbound,
            provider,
            config.max_files_in_dir,
            config.orphan_policy,
        ));
        let coordinator = Arc::new(ScopeCoordinator::new(
            config,
            channel,
            Environment::new(),
            Arc::new(FsDirectoryLister),
            Arc::new(ExtensionClassifier),
        ));

        Self {
            client,
            coordinator,
            documents,
            inbound: StdMutex::new(Some(link.inbound)),
            engine: Mutex::new(link.process),
            cancel: CancellationToken::new(),
            workspace_root: StdRwLock::new(None),
        }
    }

    pub fn coordinator(&self) -> &Arc<ScopeCoordinator> {
        &self.coordinator
    }

    pub fn documents(&self) -> &Arc<OpenDocuments> {
        &self.documents
    }

    pub fn workspace_root(&self) -> Option<String> {
        self.workspace_root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn activate(&self, path: &str) {
        if !self.coordinator.supports(path) {
            return;
        }
        let Some(text) = self.documents.get_text(path).await else {
            log::trace!("Activated {} but its text is unavailable", path);
            return;
        };
        let document = DocumentSnapshot::new(path, text);
        self.coordinator.on_editor_activated(&document).await;
    }

    /// Handle the scopeman/activeEditorChanged notification
    async fn handle_active_editor_changed(&self, params: ActiveEditorChangedParams) {
        log::trace!("Received activeEditorChanged: {}", params.uri);
        let Some(path) = Url::parse(&params.uri).ok().as_ref().and_then(path_from_uri) else {
            log::warn!("activeEditorChanged with unusable URI: {}", params.uri);
            return;
        };
        self.activate(&path).await;
    }

    /// Handle the scopeman/projectClosing notification
    async fn handle_project_closing(&self) {
        self.coordinator.on_project_closing();
        // Closed files of the next project are read fresh from disk.
        self.documents.file_cache().invalidate_all();
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        log::info!("Initializing scopeman");

        let root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .map(|folder| folder.uri.clone())
            .or(params.root_uri);
        if let Some(root) = root.as_ref().and_then(path_from_uri) {
            log::info!("Workspace root: {}", root);
            *self
                .workspace_root
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(root);
        }

        let js_files = FileOperationRegistrationOptions {
            filters: vec![FileOperationFilter {
                scheme: Some(String::from("file")),
                pattern: FileOperationPattern {
                    glob: String::from("**/*.{js,mjs,cjs,jsx}"),
                    matches: Some(FileOperationPatternKind::File),
                    options: None,
                },
            }],
        };

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![String::from(".")]),
                    ..Default::default()
                }),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: None,
                    file_operations: Some(WorkspaceFileOperationsServerCapabilities {
                        did_create: None,
                        will_create: None,
                        did_rename: Some(js_files),
                        will_rename: None,
                        did_delete: None,
                        will_delete: None,
                    }),
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: String::from("scopeman"),
                version: Some(String::from(env!("CARGO_PKG_VERSION"))),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("scopeman initialized");

        let config = self.coordinator.config();
        let loader = EnvironmentLoader::new(config.defs_dir, config.definition_files);
        loader.load(self.coordinator.environment());

        let inbound = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match inbound {
            Some(inbound) => {
                let channel = self.coordinator.channel().clone();
                tokio::spawn(channel.run(inbound, self.cancel.child_token()));
            }
            None => log::warn!("Analysis channel already running"),
        }

        self.client
            .log_message(MessageType::INFO, "scopeman ready")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        log::info!("scopeman shutting down");
        self.cancel.cancel();
        self.coordinator.on_project_closing();
        perf::log_summary();

        if let Some(engine) = self.engine.lock().await.take() {
            if let Err(e) = engine.shutdown().await {
                log::warn!("{:#}", e);
            }
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        let Some(path) = path_from_uri(&doc.uri) else {
            return;
        };
        self.documents.open(&path, &doc.text, Some(doc.version));
        self.activate(&path).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(path) = path_from_uri(&params.text_document.uri) else {
            return;
        };
        self.documents.apply_changes(
            &path,
            params.content_changes,
            Some(params.text_document.version),
        );
        if self.coordinator.supports(&path) {
            if let Some(document) = self.documents.snapshot(&path) {
                self.coordinator.on_document_edited(&document);
            }
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        if let Some(path) = path_from_uri(&params.text_document.uri) {
            self.documents.close(&path);
        }
    }

    async fn did_rename_files(&self, params: RenameFilesParams) {
        for rename in params.files {
            let old = Url::parse(&rename.old_uri).ok();
            let new = Url::parse(&rename.new_uri).ok();
            let (Some(old_path), Some(new_path)) = (
                old.as_ref().and_then(path_from_uri),
                new.as_ref().and_then(path_from_uri),
            ) else {
                log::warn!("Ignoring rename {} -> {}", rename.old_uri, rename.new_uri);
                continue;
            };
            self.documents.rename(&old_path, &new_path);
            self.coordinator.on_file_renamed(&old_path, &new_path);
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let current = self.coordinator.config();
        let Some(new_config) = parse_scope_config(&params.settings, &current) else {
            log::trace!("No scopeman settings in configuration change");
            return;
        };
        if current.engine_changed(&new_config) {
            log::warn!(
                "Engine command changed; the new engine starts with the next server restart"
            );
        }
        let new_config = with_completion_timeout(new_config);
        new_config.log_summary();
        self.coordinator.set_config(new_config);
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position = params.text_document_position;
        let Some(path) = path_from_uri(&position.text_document.uri) else {
            return Ok(None);
        };
        if !self.coordinator.supports(&path) {
            return Ok(None);
        }
        let (Some(document), Some(offset)) = (
            self.documents.snapshot(&path),
            self.documents.offset_at(&path, position.position),
        ) else {
            return Ok(None);
        };

        let mut session = HintSession::new();
        match self
            .coordinator
            .request_hints(&mut session, &document, offset)
            .await
        {
            Ok(()) => Ok(Some(CompletionResponse::Array(completion_items(
                session.copy_completions(),
            )))),
            Err(e) => {
                log::debug!(
                    "No completions for {} (version {:?}): {}",
                    path,
                    self.documents.version(&path),
                    e
                );
                Ok(None)
            }
        }
    }
}

pub async fn start_lsp(config: ScopeConfig) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let link = match &config.engine_command {
        Some(command) => match EngineProcess::spawn(command) {
            Ok(link) => link,
            Err(e) => {
                log::warn!("{:#}; continuing without an analysis engine", e);
                EngineLink::detached()
            }
        },
        None => EngineLink::detached(),
    };

    let (service, socket) = LspService::build(|client| Backend::new(client, config, link))
        .custom_method(
            "scopeman/activeEditorChanged",
            Backend::handle_active_editor_changed,
        )
        .custom_method("scopeman/projectClosing", Backend::handle_project_closing)
        .finish();
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
