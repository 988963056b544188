//! The pending mutation log.

use cartosync_model::{ClientId, MutationId, Version};
use cartosync_protocol::{Mutation, MutationOp};
use std::collections::VecDeque;

/// Persistent sync position of a client.
///
/// Everything needed to resume after a restart: the highest mutation
/// id ever issued and the last server version integrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncCursor {
    /// Highest mutation id issued so far.
    pub last_mutation_id: MutationId,
    /// Last server version integrated by pull.
    pub last_pulled_version: Version,
}

/// An entry in the pending log.
#[derive(Debug, Clone, PartialEq)]
struct LogEntry {
    mutation: Mutation,
    acknowledged: bool,
}

/// The client's append-only log of unconfirmed mutations.
///
/// # Invariants
///
/// - Entries are in issue order and mutation ids ascend strictly.
/// - An entry stays pending until the server's push response names its
///   id, whatever the per-mutation outcome was; every named id is
///   acknowledged and later compacted away.
#[derive(Debug, Default)]
pub struct PendingLog {
    entries: VecDeque<LogEntry>,
    next_id: MutationId,
    cursor: SyncCursor,
}

impl PendingLog {
    /// Creates an empty log for a fresh client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: MutationId::ZERO.next(),
            cursor: SyncCursor::default(),
        }
    }

    /// Recreates a log from a persisted cursor. Pending entries are
    /// not restored; unpushed edits from before the restart are lost.
    #[must_use]
    pub fn from_cursor(cursor: SyncCursor) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: cursor.last_mutation_id.next(),
            cursor,
        }
    }

    /// Appends an operation, assigning the next mutation id.
    pub fn append(&mut self, client_id: ClientId, op: MutationOp) -> Mutation {
        let mutation = Mutation::new(self.next_id, client_id, op);
        self.next_id = self.next_id.next();
        self.cursor.last_mutation_id = mutation.id;
        self.entries.push_back(LogEntry {
            mutation: mutation.clone(),
            acknowledged: false,
        });
        mutation
    }

    /// Returns the pending mutations, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &Mutation> {
        self.entries
            .iter()
            .filter(|e| !e.acknowledged)
            .map(|e| &e.mutation)
    }

    /// Returns up to `limit` pending mutations for a push.
    #[must_use]
    pub fn pending_batch(&self, limit: usize) -> Vec<Mutation> {
        self.pending().take(limit).cloned().collect()
    }

    /// Returns the number of pending mutations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.acknowledged).count()
    }

    /// Acknowledges one mutation by id.
    pub fn acknowledge(&mut self, id: MutationId) {
        for entry in &mut self.entries {
            if entry.mutation.id == id {
                entry.acknowledged = true;
            }
        }
    }

    /// Records the server version a pull brought the client to.
    pub fn set_pulled_version(&mut self, version: Version) {
        self.cursor.last_pulled_version = version;
    }

    /// Returns the persistent cursor.
    #[must_use]
    pub fn cursor(&self) -> SyncCursor {
        self.cursor
    }

    /// Drops acknowledged entries from the front of the log.
    pub fn compact(&mut self) {
        while let Some(entry) = self.entries.front() {
            if entry.acknowledged {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns the total number of entries, acknowledged included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
