//
// channel.rs
//
// Bidirectional message channel to the analysis engine
//

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::collaborators::DocumentProvider;
use crate::correlator::{CompletionHandle, OrphanPolicy, RequestCorrelator};
use crate::perf;
use crate::protocol::{CompletionsResponse, EngineMessage, EngineRequest, FileRequest};

/// The directory the engine was last initialized with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSession {
    pub root_dir: String,
    pub files: Vec<String>,
    /// Number of definition documents sent with the init
    pub env_len: usize,
}

/// Sends requests to the engine and routes its replies.
///
/// Outbound sends never block. Inbound messages are handled one at a time by
/// [`run`](Self::run), or directly through [`dispatch`](Self::dispatch).
pub struct AnalysisChannel {
    outbound: mpsc::UnboundedSender<EngineRequest>,
    correlator: Mutex<RequestCorrelator>,
    session: RwLock<Option<EngineSession>>,
    documents: Arc<dyn DocumentProvider>,
    max_files_in_dir: AtomicUsize,
}

impl AnalysisChannel {
    pub fn new(
        outbound: mpsc::UnboundedSender<EngineRequest>,
        documents: Arc<dyn DocumentProvider>,
        max_files_in_dir: usize,
        policy: OrphanPolicy,
    ) -> Self {
        Self {
            outbound,
            correlator: Mutex::new(RequestCorrelator::new(policy)),
            session: RwLock::new(None),
            documents,
            max_files_in_dir: AtomicUsize::new(max_files_in_dir),
        }
    }

    fn send(&self, request: EngineRequest) -> bool {
        let kind = request.kind();
        match self.outbound.send(request) {
            Ok(()) => {
                perf::record_sent();
                true
            }
            Err(_) => {
                log::warn!("Analysis engine channel closed; dropped {} message", kind);
                false
            }
        }
    }

    /// Point the engine at `dir`. Replaces the previous session; nothing is
    /// awaited.
    pub fn init(&self, dir: &str, mut files: Vec<String>, env: Vec<Arc<Value>>) {
        files.truncate(self.max_files_in_dir.load(Ordering::Relaxed));
        log::info!("Initializing analysis engine for {} ({} files)", dir, files.len());

        let session = EngineSession {
            root_dir: dir.to_string(),
            files: files.clone(),
            env_len: env.len(),
        };
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);

        self.send(EngineRequest::Init {
            dir: dir.to_string(),
            files,
            env,
        });
    }

    /// Ask the engine for completions in `file` at `offset`.
    ///
    /// The pending entry is registered before the query leaves, so the reply
    /// can never arrive first.
    pub fn request_completions(
        &self,
        dir: &str,
        file: &str,
        offset: usize,
        text: String,
    ) -> CompletionHandle {
        let handle = self.correlator().register(dir, file, offset);
        log::trace!("Query {} for {}{} at offset {}", handle.id(), dir, file, offset);

        let sent = self.send(EngineRequest::Query {
            dir: dir.to_string(),
            file: file.to_string(),
            offset,
            text,
        });
        if !sent {
            // Dropping the resolver completes the handle with EngineGone.
            self.correlator().abandon(file, handle.id());
        }
        handle
    }

    /// Handle one message from the engine.
    pub async fn dispatch(&self, message: EngineMessage) {
        perf::record_received();
        match message {
            EngineMessage::Completions(response) => self.on_completions(response),
            EngineMessage::GetFile(request) => self.on_get_file(request).await,
            EngineMessage::Log(line) => log::info!("[engine] {}", line),
            EngineMessage::Unknown(value) => {
                log::warn!("Ignoring unknown engine message: {}", value)
            }
        }
    }

    fn on_completions(&self, response: CompletionsResponse) {
        let CompletionsResponse {
            dir,
            file,
            offset,
            completions,
        } = response;
        let count = completions.len();
        if self.correlator().resolve(&dir, &file, completions.into()) {
            log::trace!("Resolved {} completions for {} at {}", count, file, offset);
        } else {
            perf::record_dropped();
            log::trace!("No pending request for {}{}; reply dropped", dir, file);
        }
    }

    async fn on_get_file(&self, request: FileRequest) {
        let Some(root) = self.root_dir() else {
            log::warn!("Engine asked for {} before any directory was initialized", request.file);
            return;
        };
        let path = format!("{}{}", root, request.file);
        match self.documents.get_text(&path).await {
            Some(text) => {
                self.send(EngineRequest::FileContent {
                    file: request.file,
                    text,
                });
            }
            None => log::warn!("Could not read {} for the analysis engine", path),
        }
    }

    /// Drain `inbound` until it closes or `cancel` fires.
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<EngineMessage>,
        cancel: CancellationToken,
    ) {
        log::info!("Analysis channel started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Analysis channel cancelled");
                    break;
                }
                message = inbound.recv() => {
                    match message {
                        Some(message) => self.dispatch(message).await,
                        None => {
                            log::info!("Analysis engine closed its channel");
                            break;
                        }
                    }
                }
            }
        }
    }

    pub fn root_dir(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.root_dir.clone())
    }

    pub fn session(&self) -> Option<EngineSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_pending(&self, file: &str) -> bool {
        self.correlator().is_pending(file)
    }

    pub fn pending_count(&self) -> usize {
        self.correlator().pending_count()
    }

    pub fn abandon(&self, file: &str, id: u64) -> bool {
        self.correlator().abandon(file, id)
    }

    pub fn release_orphans(&self) -> usize {
        self.correlator().release_orphans()
    }

    pub fn set_orphan_policy(&self, policy: OrphanPolicy) {
        self.correlator().set_policy(policy);
    }

    pub fn set_max_files_in_dir(&self, max: usize) {
        self.max_files_in_dir.store(max, Ordering::Relaxed);
    }

    fn correlator(&self) -> std::sync::MutexGuard<'_, RequestCorrelator> {
        self.correlator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
