//! A coordinator wired to in-memory collaborators, with the engine side of
//! the channel exposed to the test.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::AnalysisChannel;
use crate::collaborators::{DocumentSnapshot, ExtensionClassifier};
use crate::config::ScopeConfig;
use crate::coordinator::{HintSession, ScopeCoordinator};
use crate::environment::Environment;
use crate::error::HintError;
use crate::protocol::{CompletionsResponse, EngineMessage, EngineRequest};
use crate::test_utils::fakes::{MemoryDocuments, StaticLister};

pub struct CoordinatorHarness {
    pub coordinator: Arc<ScopeCoordinator>,
    pub documents: MemoryDocuments,
    pub lister: StaticLister,
    pub environment: Environment,
    /// Everything the coordinator sent to the engine
    pub outbound: mpsc::UnboundedReceiver<EngineRequest>,
}

impl CoordinatorHarness {
    pub fn new() -> Self {
        Self::with_config(ScopeConfig::default())
    }

    pub fn with_config(config: ScopeConfig) -> Self {
        let documents = MemoryDocuments::new();
        let lister = StaticLister::new();
        let environment = Environment::new();
        let (tx, outbound) = mpsc::unbounded_channel();
        let channel = Arc::new(AnalysisChannel::new(
            tx,
            Arc::new(documents.clone()),
            config.max_files_in_dir,
            config.orphan_policy,
        ));
        let coordinator = Arc::new(ScopeCoordinator::new(
            config,
            channel,
            environment.clone(),
            Arc::new(lister.clone()),
            Arc::new(ExtensionClassifier),
        ));
        Self {
            coordinator,
            documents,
            lister,
            environment,
            outbound,
        }
    }

    pub fn channel(&self) -> &Arc<AnalysisChannel> {
        self.coordinator.channel()
    }

    pub fn drain_outbound(&mut self) -> Vec<EngineRequest> {
        let mut sent = Vec::new();
        while let Ok(request) = self.outbound.try_recv() {
            sent.push(request);
        }
        sent
    }

    /// Next message sent to the engine, waiting up to five seconds.
    pub async fn next_request(&mut self) -> EngineRequest {
        tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
            .await
            .expect("engine request in time")
            .expect("outbound channel open")
    }

    /// Run `request_hints` for `path` on its own task.
    pub fn spawn_hints(
        &self,
        path: &str,
        text: &str,
        offset: usize,
    ) -> JoinHandle<Result<HintSession, HintError>> {
        let coordinator = self.coordinator.clone();
        let document = DocumentSnapshot::new(path, text);
        tokio::spawn(async move {
            let mut session = HintSession::new();
            coordinator
                .request_hints(&mut session, &document, offset)
                .await
                .map(|()| session)
        })
    }

    /// Files of the last init sent, discarding everything else queued.
    pub fn init_files(&mut self) -> Vec<String> {
        self.drain_outbound()
            .into_iter()
            .filter_map(|request| match request {
                EngineRequest::Init { files, .. } => Some(files),
                _ => None,
            })
            .last()
            .unwrap_or_default()
    }

    /// Yield until a query for `file` is registered.
    pub async fn wait_until_pending(&self, file: &str) {
        for _ in 0..1000 {
            if self.channel().is_pending(file) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("no request for {file} became pending");
    }

    /// Deliver a completions reply as if the engine sent it.
    pub async fn reply(&self, dir: &str, file: &str, names: &[&str]) {
        self.channel()
            .dispatch(EngineMessage::Completions(CompletionsResponse {
                dir: dir.to_string(),
                file: file.to_string(),
                offset: 0,
                completions: names.iter().map(|s| s.to_string()).collect(),
            }))
            .await;
    }
}

impl Default for CoordinatorHarness {
    fn default() -> Self {
        Self::new()
    }
}
