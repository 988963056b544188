//! Bounded per-document patch history.

use cartosync_model::Version;
use cartosync_protocol::{EntityChange, Patch};
use std::collections::VecDeque;

/// A bounded log of versioned entity changes.
///
/// Backs incremental pull: a client at version `v` gets the patches
/// after `v` as long as they are still retained. Once the log has
/// shed patches past the client's cursor the server falls back to a
/// snapshot, so the bound trades pull bandwidth for memory and never
/// costs correctness.
#[derive(Debug)]
pub struct VersionHistory {
    patches: VecDeque<Patch>,
    limit: usize,
}

impl VersionHistory {
    /// Creates an empty history retaining at most `limit` patches.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            patches: VecDeque::new(),
            limit,
        }
    }

    /// Records the change that produced `version`, evicting the oldest
    /// patches when full. A zero limit retains nothing and every pull
    /// falls back to a snapshot.
    pub fn record(&mut self, version: Version, change: EntityChange) {
        while self.patches.len() >= self.limit {
            if self.patches.pop_front().is_none() {
                return;
            }
        }
        self.patches.push_back(Patch { version, change });
    }

    /// Returns the patches after `since`, or `None` when the log no
    /// longer reaches back that far.
    #[must_use]
    pub fn patches_since(&self, since: Version, current: Version) -> Option<Vec<Patch>> {
        if since == current {
            return Some(Vec::new());
        }
        // Coverage check: the patch at since.next() must still be
        // retained.
        let oldest = self.patches.front()?.version;
        if oldest > since.next() {
            return None;
        }
        Some(
            self.patches
                .iter()
                .filter(|p| p.version > since)
                .cloned()
                .collect(),
        )
    }

    /// Returns the number of retained patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Returns true when no patches are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}
