//! Undo history.
//!
//! Edits are grouped into moments, one per user action (a single
//! mutation, or one gesture). Undo applies the stored inverse
//! operations; redo applies the forward operations again. Both go
//! through the normal mutation path, so an undo is itself a new
//! mutation that syncs like any other.
//!
//! A moment can go stale: if another client changed the same entity
//! since the moment was recorded, applying the inverse would clobber
//! their edit. Staleness is detected by comparing current entity state
//! against the state the moment left behind; a stale moment is
//! discarded rather than applied.

use cartosync_model::{Document, Feature, Folder};
use cartosync_protocol::{MutationOp, Target};

/// A point-in-time copy of one entity, present or absent.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityState {
    /// A feature's state; `None` means absent.
    Feature(Option<Feature>),
    /// A folder's state; `None` means absent.
    Folder(Option<Folder>),
}

impl EntityState {
    /// Captures the current state of `target` in `doc`.
    #[must_use]
    pub fn capture(doc: &Document, target: Target) -> Self {
        match target {
            Target::Feature(id) => EntityState::Feature(doc.feature(&id).cloned()),
            Target::Folder(id) => EntityState::Folder(doc.folder(&id).cloned()),
        }
    }
}

/// One mutation inside a moment, with enough context to reverse it.
#[derive(Debug, Clone)]
pub struct MomentEntry {
    /// The operation as applied.
    pub forward: MutationOp,
    /// The operation that reverses it.
    pub inverse: MutationOp,
    /// Entity state before the forward op.
    pub before: EntityState,
    /// Entity state after the forward op.
    pub after: EntityState,
}

impl MomentEntry {
    /// Builds an entry from the dispatcher's outcome context.
    #[must_use]
    pub fn new(
        forward: MutationOp,
        inverse: MutationOp,
        before: EntityState,
        after: EntityState,
    ) -> Self {
        Self {
            forward,
            inverse,
            before,
            after,
        }
    }
}

/// One undoable user action.
#[derive(Debug, Clone)]
pub struct Moment {
    entries: Vec<MomentEntry>,
}

impl Moment {
    /// Creates a moment from its entries.
    #[must_use]
    pub fn new(entries: Vec<MomentEntry>) -> Self {
        Self { entries }
    }

    /// Returns the entries in application order.
    #[must_use]
    pub fn entries(&self) -> &[MomentEntry] {
        &self.entries
    }

    /// Returns the inverse operations, in reverse application order.
    #[must_use]
    pub fn inverses(&self) -> Vec<MutationOp> {
        self.entries.iter().rev().map(|e| e.inverse.clone()).collect()
    }

    /// Returns the forward operations in application order.
    #[must_use]
    pub fn forwards(&self) -> Vec<MutationOp> {
        self.entries.iter().map(|e| e.forward.clone()).collect()
    }

    /// Returns true when undoing against `doc` would clobber a
    /// concurrent edit: some touched entity no longer holds the state
    /// this moment left it in.
    #[must_use]
    pub fn stale_for_undo(&self, doc: &Document) -> bool {
        self.entries
            .iter()
            .any(|e| EntityState::capture(doc, e.forward.target()) != e.after)
    }

    /// Returns true when redoing against `doc` would clobber a
    /// concurrent edit.
    #[must_use]
    pub fn stale_for_redo(&self, doc: &Document) -> bool {
        self.entries
            .iter()
            .any(|e| EntityState::capture(doc, e.forward.target()) != e.before)
    }
}

/// The undo and redo stacks.
#[derive(Debug, Default)]
pub struct MomentLog {
    undo: Vec<Moment>,
    redo: Vec<Moment>,
    limit: usize,
}

impl MomentLog {
    /// Creates an empty log retaining at most `limit` undo moments.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Records a new moment. Clears the redo stack: a fresh edit
    /// forks history and the undone branch is gone.
    pub fn record(&mut self, moment: Moment) {
        self.redo.clear();
        self.push_undo(moment);
    }

    /// Pops the most recent undoable moment.
    pub fn pop_undo(&mut self) -> Option<Moment> {
        self.undo.pop()
    }

    /// Pushes a moment onto the redo stack after a successful undo.
    pub fn push_redo(&mut self, moment: Moment) {
        self.redo.push(moment);
    }

    /// Pops the most recent redoable moment.
    pub fn pop_redo(&mut self) -> Option<Moment> {
        self.redo.pop()
    }

    /// Pushes a moment back onto the undo stack after a successful
    /// redo.
    pub fn push_undo(&mut self, moment: Moment) {
        while self.undo.len() >= self.limit && !self.undo.is_empty() {
            self.undo.remove(0);
        }
        self.undo.push(moment);
    }

    /// Returns the undo depth.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Returns the redo depth.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartosync_model::{DocumentId, FeatureId, Geometry};

    fn feature() -> Feature {
        Feature::new(Geometry::point(1.0, 2.0), "a0")
    }

    fn put_moment(feature: &Feature) -> Moment {
        Moment::new(vec![MomentEntry::new(
            MutationOp::PutFeature {
                feature: feature.clone(),
            },
            MutationOp::DeleteFeature { id: feature.id },
            EntityState::Feature(None),
            EntityState::Feature(Some(feature.clone())),
        )])
    }

    #[test]
    fn fresh_moment_is_not_stale() {
        let feature = feature();
        let doc = Document::new(DocumentId::new()).with_feature(feature.clone());
        let moment = put_moment(&feature);

        assert!(!moment.stale_for_undo(&doc));
        assert_eq!(moment.inverses().len(), 1);
    }

    #[test]
    fn remote_edit_makes_undo_stale() {
        let feature = feature();
        let moment = put_moment(&feature);

        // Another client moved the feature since.
        let mut moved = feature;
        moved.geometry = Geometry::point(9.0, 9.0);
        let doc = Document::new(DocumentId::new()).with_feature(moved);

        assert!(moment.stale_for_undo(&doc));
    }

    #[test]
    fn remote_delete_makes_undo_stale() {
        let feature = feature();
        let moment = put_moment(&feature);
        let doc = Document::new(DocumentId::new());
        assert!(moment.stale_for_undo(&doc));
    }

    #[test]
    fn redo_checks_pre_state() {
        let feature = feature();
        let moment = put_moment(&feature);

        // After undo the feature is absent again, matching `before`.
        let doc = Document::new(DocumentId::new());
        assert!(!moment.stale_for_redo(&doc));

        // A concurrent client recreated it differently.
        let doc = doc.with_feature(Feature::new(Geometry::point(0.0, 0.0), "b0"));
        assert!(!moment.stale_for_redo(&doc));

        let mut other = feature.clone();
        other.id = feature.id;
        other.at = "c0".to_string();
        let doc = Document::new(DocumentId::new()).with_feature(other);
        assert!(moment.stale_for_redo(&doc));
    }

    #[test]
    fn new_edit_clears_redo() {
        let feature = feature();
        let mut log = MomentLog::new(10);
        log.record(put_moment(&feature));

        let undone = log.pop_undo().unwrap();
        log.push_redo(undone);
        assert_eq!(log.redo_depth(), 1);

        log.record(put_moment(&feature));
        assert_eq!(log.redo_depth(), 0);
    }

    #[test]
    fn undo_depth_is_bounded() {
        let mut log = MomentLog::new(3);
        for _ in 0..5 {
            log.record(put_moment(&feature()));
        }
        assert_eq!(log.undo_depth(), 3);
    }

    #[test]
    fn entity_state_capture() {
        let feature = feature();
        let doc = Document::new(DocumentId::new()).with_feature(feature.clone());

        let state = EntityState::capture(&doc, Target::Feature(feature.id));
        assert_eq!(state, EntityState::Feature(Some(feature)));

        let absent = EntityState::capture(&doc, Target::Feature(FeatureId::new()));
        assert_eq!(absent, EntityState::Feature(None));
    }
}
