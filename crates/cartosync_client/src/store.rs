//! The optimistic local store.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::moment::{EntityState, Moment, MomentEntry, MomentLog};
use crate::oplog::{PendingLog, SyncCursor};
use crate::transport::Transport;
use cartosync_model::{ClientId, Document, DocumentId, MutationId, Version};
use cartosync_protocol::{
    apply, Applied, MutationOp, MutationResult, PullReply, PullRequest, PushRequest,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A mutation applied on this client.
    Local,
    /// Changes integrated from the server.
    Remote,
}

/// Emitted on store activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// The visible document changed.
    Changed(ChangeOrigin),
    /// A stale undo moment was discarded instead of applied: a remote
    /// edit touched the same entity since the moment was recorded.
    UndoDiscarded,
    /// A stale redo moment was discarded instead of applied.
    RedoDiscarded,
}

/// Health of the store's server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Pushes and pulls are succeeding (or have not been attempted).
    Idle,
    /// Push retries are exhausted; local edits are held until a sync
    /// succeeds.
    OutOfSync,
}

struct GestureState {
    /// The document as it was when the gesture began.
    base: Document,
    /// The latest provisional operation; replaced on every update,
    /// logged only at commit.
    op: Option<MutationOp>,
}

struct StoreState {
    /// Last server-confirmed state, stamped at the pulled version.
    base: Document,
    /// Optimistic state: base plus the pending log replayed.
    local: Document,
    log: PendingLog,
    moments: MomentLog,
    gesture: Option<GestureState>,
    status: SyncStatus,
}

/// The client's working copy of one document.
///
/// Mutations apply optimistically to the local document, queue in the
/// pending log and record an undo moment, all before any network
/// traffic. [`push`](LocalStore::push) submits the queue,
/// [`pull`](LocalStore::pull) integrates server changes and rebases
/// the still-pending queue on top, so the local document is always
/// "server state plus my unconfirmed edits".
pub struct LocalStore {
    client_id: ClientId,
    document_id: DocumentId,
    config: SyncConfig,
    state: Mutex<StoreState>,
    /// Serializes pushes: a push started while another is in flight
    /// waits, preserving per-client submission order on the wire.
    push_gate: Mutex<()>,
    cancel_pull: AtomicBool,
    events: broadcast::Sender<StoreEvent>,
}

impl LocalStore {
    /// Creates a store for a document, starting from an empty local
    /// copy at version zero. The first pull fetches actual state.
    #[must_use]
    pub fn new(client_id: ClientId, document_id: DocumentId, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        let moment_limit = config.moment_limit;
        Self {
            client_id,
            document_id,
            config,
            state: Mutex::new(StoreState {
                base: Document::new(document_id),
                local: Document::new(document_id),
                log: PendingLog::new(),
                moments: MomentLog::new(moment_limit),
                gesture: None,
                status: SyncStatus::Idle,
            }),
            push_gate: Mutex::new(()),
            cancel_pull: AtomicBool::new(false),
            events,
        }
    }

    /// Returns the id of the owning client.
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Returns a copy of the optimistic local document.
    #[must_use]
    pub fn document(&self) -> Document {
        self.state.lock().local.clone()
    }

    /// Returns the last pulled server version.
    #[must_use]
    pub fn pulled_version(&self) -> Version {
        self.state.lock().log.cursor().last_pulled_version
    }

    /// Returns the persistent sync cursor.
    #[must_use]
    pub fn cursor(&self) -> SyncCursor {
        self.state.lock().log.cursor()
    }

    /// Returns the number of unconfirmed mutations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().log.pending_count()
    }

    /// Returns the sync status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.state.lock().status
    }

    /// Returns the undo depth.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.state.lock().moments.undo_depth()
    }

    /// Returns the redo depth.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.state.lock().moments.redo_depth()
    }

    /// Subscribes to change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Applies a mutation optimistically.
    ///
    /// On success the local document advances, the mutation queues for
    /// push and a new undo moment is recorded. Returns false when the
    /// operation was a no-op against current state.
    pub fn mutate(&self, op: MutationOp) -> SyncResult<bool> {
        let mut state = self.state.lock();
        if state.gesture.is_some() {
            return Err(SyncError::GestureInProgress);
        }
        let Some(entry) = Self::apply_one(&mut state, &op)? else {
            return Ok(false);
        };
        self.log_op(&mut state, op);
        state.moments.record(Moment::new(vec![entry]));
        drop(state);
        self.emit(StoreEvent::Changed(ChangeOrigin::Local));
        Ok(true)
    }

    /// Begins a gesture: a burst of provisional edits (dragging a
    /// vertex, say) that collapses into one mutation at commit.
    pub fn begin_gesture(&self) -> SyncResult<()> {
        let mut state = self.state.lock();
        if state.gesture.is_some() {
            return Err(SyncError::GestureInProgress);
        }
        state.gesture = Some(GestureState {
            base: state.local.clone(),
            op: None,
        });
        Ok(())
    }

    /// Replaces the gesture's provisional operation and shows its
    /// effect locally. Nothing is logged or pushed yet.
    pub fn update_gesture(&self, op: MutationOp) -> SyncResult<()> {
        let mut state = self.state.lock();
        let Some(gesture) = &state.gesture else {
            return Err(SyncError::NoGesture);
        };
        // Each update reapplies against the gesture base, so
        // intermediate states never accumulate.
        let preview = match apply(&gesture.base, &op)? {
            Applied::Changed { document, .. } => document,
            Applied::Noop { .. } => gesture.base.clone(),
        };
        state.local = preview;
        if let Some(gesture) = &mut state.gesture {
            gesture.op = Some(op);
        }
        drop(state);
        self.emit(StoreEvent::Changed(ChangeOrigin::Local));
        Ok(())
    }

    /// Commits the gesture: the final provisional operation becomes a
    /// single real mutation with one undo moment.
    pub fn commit_gesture(&self) -> SyncResult<bool> {
        let mut state = self.state.lock();
        let Some(gesture) = state.gesture.take() else {
            return Err(SyncError::NoGesture);
        };
        // Rewind to the gesture base and apply the final operation
        // through the normal path.
        state.local = gesture.base;
        let Some(op) = gesture.op else {
            return Ok(false);
        };
        let Some(entry) = Self::apply_one(&mut state, &op)? else {
            return Ok(false);
        };
        self.log_op(&mut state, op);
        state.moments.record(Moment::new(vec![entry]));
        drop(state);
        self.emit(StoreEvent::Changed(ChangeOrigin::Local));
        Ok(true)
    }

    /// Abandons the gesture, restoring the pre-gesture document.
    pub fn cancel_gesture(&self) -> SyncResult<()> {
        let mut state = self.state.lock();
        let Some(gesture) = state.gesture.take() else {
            return Err(SyncError::NoGesture);
        };
        state.local = gesture.base;
        drop(state);
        self.emit(StoreEvent::Changed(ChangeOrigin::Local));
        Ok(())
    }

    /// Undoes the most recent moment.
    ///
    /// Returns false when there is nothing to undo, or when the moment
    /// went stale because another client edited the same entity since;
    /// a stale moment is discarded, never applied, and the drop is
    /// announced as [`StoreEvent::UndoDiscarded`].
    pub fn undo(&self) -> SyncResult<bool> {
        let mut state = self.state.lock();
        if state.gesture.is_some() {
            return Err(SyncError::GestureInProgress);
        }
        let Some(moment) = state.moments.pop_undo() else {
            return Ok(false);
        };
        if moment.stale_for_undo(&state.local) {
            debug!("discarding stale undo moment");
            drop(state);
            self.emit(StoreEvent::UndoDiscarded);
            return Ok(false);
        }
        for op in moment.inverses() {
            if Self::apply_one(&mut state, &op)?.is_some() {
                self.log_op(&mut state, op);
            }
        }
        state.moments.push_redo(moment);
        drop(state);
        self.emit(StoreEvent::Changed(ChangeOrigin::Local));
        Ok(true)
    }

    /// Redoes the most recently undone moment. Stale moments are
    /// discarded, as with [`undo`](LocalStore::undo).
    pub fn redo(&self) -> SyncResult<bool> {
        let mut state = self.state.lock();
        if state.gesture.is_some() {
            return Err(SyncError::GestureInProgress);
        }
        let Some(moment) = state.moments.pop_redo() else {
            return Ok(false);
        };
        if moment.stale_for_redo(&state.local) {
            debug!("discarding stale redo moment");
            drop(state);
            self.emit(StoreEvent::RedoDiscarded);
            return Ok(false);
        }
        for op in moment.forwards() {
            if Self::apply_one(&mut state, &op)?.is_some() {
                self.log_op(&mut state, op);
            }
        }
        state.moments.push_undo(moment);
        drop(state);
        self.emit(StoreEvent::Changed(ChangeOrigin::Local));
        Ok(true)
    }

    /// Pushes pending mutations, retrying transient failures with
    /// backoff. Returns the number of mutations the server disposed
    /// of.
    ///
    /// Exhausting retries marks the store out of sync; pending edits
    /// are kept and the next successful push recovers, safely, because
    /// the server skips anything it already applied.
    pub fn push(&self, transport: &dyn Transport) -> SyncResult<usize> {
        let _gate = self.push_gate.lock();
        let batch = {
            let state = self.state.lock();
            state.log.pending_batch(self.config.push_batch_size)
        };
        if batch.is_empty() {
            return Ok(0);
        }
        let last_mutation_id = batch.last().map_or(MutationId::ZERO, |m| m.id);
        let request = PushRequest {
            client_id: self.client_id,
            document_id: self.document_id,
            last_mutation_id,
            mutations: batch,
        };

        let mut attempt = 0;
        let response = loop {
            match transport.push(&request) {
                Ok(response) => break response,
                Err(err) if err.is_retryable() && attempt + 1 < self.config.retry.max_attempts => {
                    attempt += 1;
                    debug!(attempt, "push failed, retrying: {err}");
                    std::thread::sleep(self.config.retry.delay_for_attempt(attempt));
                }
                Err(err) => {
                    if err.is_retryable() {
                        self.state.lock().status = SyncStatus::OutOfSync;
                        return Err(SyncError::OutOfSync);
                    }
                    return Err(err);
                }
            }
        };

        let mut state = self.state.lock();
        let acked = response.mutation_infos.len();
        for info in &response.mutation_infos {
            if let MutationResult::ValidationError { detail } = &info.result {
                // The server consumed the id; the bad optimistic edit
                // disappears from the local document on the next pull.
                warn!(mutation = %info.id, "server rejected mutation: {detail}");
            }
            state.log.acknowledge(info.id);
        }
        state.log.compact();
        state.status = SyncStatus::Idle;
        Ok(acked)
    }

    /// Pulls server changes and rebases pending mutations on top.
    ///
    /// Returns the server version the store is now at. The local
    /// document is rebuilt as the new base plus every still-pending
    /// mutation replayed in order; replayed mutations that no longer
    /// apply (target deleted remotely) drop out silently.
    pub fn pull(&self, transport: &dyn Transport) -> SyncResult<Version> {
        let since_version = self.pulled_version();
        let request = PullRequest {
            client_id: self.client_id,
            document_id: self.document_id,
            since_version,
        };
        let response = transport.pull(&request)?;
        if self.cancel_pull.swap(false, Ordering::SeqCst) {
            // Cancelled while in flight: discard the response whole.
            return Err(SyncError::Cancelled);
        }
        if response.new_version < since_version {
            // Reads are monotonic; a regressing version is a server
            // the client should not trust.
            return Err(SyncError::Protocol(format!(
                "version regressed from {since_version} to {}",
                response.new_version
            )));
        }

        let mut state = self.state.lock();
        let base = match response.reply {
            PullReply::Patches(patches) => {
                let mut base = state.base.clone();
                for patch in patches {
                    base = patch.change.apply_to(base);
                }
                base.at_version(response.new_version)
            }
            PullReply::Snapshot(snapshot) => {
                Document::from_snapshot(self.document_id, response.new_version, snapshot)
            }
        };
        state.base = base;
        state.log.set_pulled_version(response.new_version);
        Self::rebase(&mut state);
        // A round trip succeeded; the server is reachable again.
        state.status = SyncStatus::Idle;
        drop(state);

        self.emit(StoreEvent::Changed(ChangeOrigin::Remote));
        Ok(response.new_version)
    }

    /// Flags the pull in flight for cancellation: its response is
    /// discarded without side effects. Pushes are never cancelled
    /// client-side; the server runs them to completion regardless.
    pub fn cancel_pull(&self) {
        self.cancel_pull.store(true, Ordering::SeqCst);
    }

    /// Subscribes to server pokes through the transport.
    pub fn subscribe_pokes(
        &self,
        transport: &dyn Transport,
    ) -> SyncResult<mpsc::UnboundedReceiver<cartosync_protocol::Poke>> {
        transport.subscribe_pokes(self.document_id, self.client_id)
    }

    /// Pushes then pulls.
    pub fn sync(&self, transport: &dyn Transport) -> SyncResult<Version> {
        self.push(transport)?;
        self.pull(transport)
    }

    /// Applies `op` to the local document, returning the moment entry
    /// when state changed.
    fn apply_one(state: &mut StoreState, op: &MutationOp) -> SyncResult<Option<MomentEntry>> {
        let before = EntityState::capture(&state.local, op.target());
        match apply(&state.local, op)? {
            Applied::Changed {
                document, inverse, ..
            } => {
                let after = EntityState::capture(&document, op.target());
                state.local = document;
                Ok(Some(MomentEntry::new(op.clone(), inverse, before, after)))
            }
            Applied::Noop { .. } => Ok(None),
        }
    }

    fn log_op(&self, state: &mut StoreState, op: MutationOp) {
        state.log.append(self.client_id, op);
    }

    /// Rebuilds the local document as base plus pending mutations.
    fn rebase(state: &mut StoreState) {
        let pending: Vec<MutationOp> = state.log.pending().map(|m| m.op.clone()).collect();
        let mut local = state.base.clone();
        for op in pending {
            if let Ok(Applied::Changed { document, .. }) = apply(&local, &op) {
                local = document;
            }
        }
        state.local = local;
    }

    fn emit(&self, event: StoreEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}
