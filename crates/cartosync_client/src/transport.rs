//! Transport layer abstraction.

use crate::error::{SyncError, SyncResult};
use cartosync_model::{ClientId, DocumentId};
use cartosync_protocol::{Poke, PullRequest, PullResponse, PushRequest, PushResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Carries push and pull requests to the server.
///
/// Implementations decide the medium (HTTP, in-process for tests);
/// the store only assumes request/response semantics and that a
/// retryable error means the request may or may not have been
/// processed. Push idempotence makes blind retries safe.
pub trait Transport: Send + Sync {
    /// Pushes a mutation batch.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Pulls changes.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Subscribes to change pokes for a document. Transports without a
    /// notification channel decline; periodic pulls still converge.
    fn subscribe_pokes(
        &self,
        _document_id: DocumentId,
        _client_id: ClientId,
    ) -> SyncResult<mpsc::UnboundedReceiver<Poke>> {
        Err(SyncError::Protocol(
            "transport does not deliver pokes".into(),
        ))
    }

    /// Checks whether the transport is connected.
    fn is_connected(&self) -> bool;
}

/// A scriptable transport for tests.
///
/// Responses are queued; each request consumes one. Scripted errors
/// let tests exercise the retry and out-of-sync paths.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    push_script: Mutex<VecDeque<SyncResult<PushResponse>>>,
    pull_script: Mutex<VecDeque<SyncResult<PullResponse>>>,
}

impl MockTransport {
    /// Creates a connected mock with empty scripts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            push_script: Mutex::new(VecDeque::new()),
            pull_script: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues a push outcome.
    pub fn script_push(&self, outcome: SyncResult<PushResponse>) {
        if let Ok(mut script) = self.push_script.lock() {
            script.push_back(outcome);
        }
    }

    /// Queues a pull outcome.
    pub fn script_pull(&self, outcome: SyncResult<PullResponse>) {
        if let Ok(mut script) = self.pull_script.lock() {
            script.push_back(outcome);
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn push(&self, _request: &PushRequest) -> SyncResult<PushResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.push_script
            .lock()
            .map_err(|_| SyncError::Protocol("mock poisoned".into()))?
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no scripted push response".into())))
    }

    fn pull(&self, _request: &PullRequest) -> SyncResult<PullResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.pull_script
            .lock()
            .map_err(|_| SyncError::Protocol("mock poisoned".into()))?
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no scripted pull response".into())))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
