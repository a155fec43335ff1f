//
// correlator.rs
//
// Matches engine completion replies to the caller waiting for them
//

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::HintError;
use crate::protocol::Completions;

pub type Resolution = Result<Completions, HintError>;

/// What happens to a caller whose pending request is overwritten by a newer
/// request for the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// The earlier caller is never resolved while the project stays open.
    #[default]
    Silent,
    /// The earlier caller receives [`HintError::Superseded`].
    Notify,
}

struct PendingRequest {
    id: u64,
    dir: String,
    offset: usize,
    resolver: oneshot::Sender<Resolution>,
}

/// At most one pending completion request per file name.
pub struct RequestCorrelator {
    pending: HashMap<String, PendingRequest>,
    /// Resolvers of overwritten requests under `OrphanPolicy::Silent`. Holding
    /// them keeps their handles pending instead of failing with `EngineGone`.
    orphaned: Vec<oneshot::Sender<Resolution>>,
    next_id: u64,
    policy: OrphanPolicy,
}

impl RequestCorrelator {
    pub fn new(policy: OrphanPolicy) -> Self {
        Self {
            pending: HashMap::new(),
            orphaned: Vec::new(),
            next_id: 0,
            policy,
        }
    }

    pub fn policy(&self) -> OrphanPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: OrphanPolicy) {
        self.policy = policy;
    }

    /// Track a new request for `file`, displacing any request already pending
    /// for that file.
    pub fn register(&mut self, dir: &str, file: &str, offset: usize) -> CompletionHandle {
        let (resolver, receiver) = oneshot::channel();
        self.next_id += 1;
        let id = self.next_id;

        let request = PendingRequest {
            id,
            dir: dir.to_string(),
            offset,
            resolver,
        };
        if let Some(previous) = self.pending.insert(file.to_string(), request) {
            self.orphan(file, previous);
        }

        CompletionHandle {
            id,
            file: file.to_string(),
            receiver,
        }
    }

    fn orphan(&mut self, file: &str, previous: PendingRequest) {
        log::trace!(
            "Request {} for {} (offset {}) overwritten before the engine answered",
            previous.id,
            file,
            previous.offset
        );
        match self.policy {
            OrphanPolicy::Silent => {
                self.orphaned.push(previous.resolver);
                // Callers that dropped their handle have nothing left to wait on.
                self.orphaned.retain(|resolver| !resolver.is_closed());
            }
            OrphanPolicy::Notify => {
                let _ = previous.resolver.send(Err(HintError::Superseded {
                    file: file.to_string(),
                }));
            }
        }
    }

    /// Deliver `completions` to the request pending for `file` and clear it.
    ///
    /// Returns `false` when nothing was pending; the reply is then dropped.
    pub fn resolve(&mut self, dir: &str, file: &str, completions: Completions) -> bool {
        let Some(request) = self.pending.remove(file) else {
            return false;
        };
        if request.dir != dir {
            log::trace!(
                "Completions for {} answered from {} but were requested in {}",
                file,
                dir,
                request.dir
            );
        }
        if request.resolver.send(Ok(completions)).is_err() {
            log::trace!("Caller for request {} ({}) is gone", request.id, file);
        }
        true
    }

    /// Forget the pending entry for `file` if it still belongs to request `id`.
    pub fn abandon(&mut self, file: &str, id: u64) -> bool {
        match self.pending.get(file) {
            Some(request) if request.id == id => {
                self.pending.remove(file);
                true
            }
            _ => false,
        }
    }

    /// Drop parked resolvers of overwritten requests. Their handles then
    /// complete with [`HintError::EngineGone`].
    pub fn release_orphans(&mut self) -> usize {
        let count = self.orphaned.len();
        self.orphaned.clear();
        count
    }

    pub fn is_pending(&self, file: &str) -> bool {
        self.pending.contains_key(file)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn orphaned_count(&self) -> usize {
        self.orphaned.len()
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new(OrphanPolicy::default())
    }
}

/// Awaitable result of one completion request.
#[derive(Debug)]
pub struct CompletionHandle {
    id: u64,
    file: String,
    receiver: oneshot::Receiver<Resolution>,
}

impl CompletionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn file(&self) -> &str {
        &self.file
    }
}

impl Future for CompletionHandle {
    type Output = Resolution;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(resolution)) => Poll::Ready(resolution),
            Poll::Ready(Err(_)) => Poll::Ready(Err(HintError::EngineGone {
                file: this.file.clone(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}
