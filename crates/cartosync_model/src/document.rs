//! The synchronized document value.

use crate::feature::Feature;
use crate::folder::Folder;
use crate::id::{DocumentId, FeatureId, FolderId, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A collaboratively edited feature collection.
///
/// `Document` is a plain value: every "mutation" constructs a new
/// document, leaving the previous one intact for concurrent readers.
/// The version counter is stamped by the server and only increases.
///
/// # Invariants
///
/// - Sibling entities are totally ordered by `(at, id)`; two siblings
///   never share an `at` key issued by the fractional index sequencer,
///   and the id tiebreak keeps the order total even if they do.
/// - A `folder_id` pointing at a missing folder is tolerated on read:
///   the entity is listed at the root until the folder reappears (for
///   example when a folder deletion is undone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    id: DocumentId,
    version: Version,
    features: BTreeMap<FeatureId, Feature>,
    folders: BTreeMap<FolderId, Folder>,
}

impl Document {
    /// Creates an empty document at version zero.
    #[must_use]
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            version: Version::ZERO,
            features: BTreeMap::new(),
            folders: BTreeMap::new(),
        }
    }

    /// Rebuilds a document from a snapshot at the given version.
    #[must_use]
    pub fn from_snapshot(id: DocumentId, version: Version, snapshot: DocumentSnapshot) -> Self {
        Self {
            id,
            version,
            features: snapshot.features.into_iter().map(|f| (f.id, f)).collect(),
            folders: snapshot.folders.into_iter().map(|f| (f.id, f)).collect(),
        }
    }

    /// Returns the document id.
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Returns the current version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns a copy stamped with the given version.
    #[must_use]
    pub fn at_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Looks up a feature.
    #[must_use]
    pub fn feature(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    /// Looks up a folder.
    #[must_use]
    pub fn folder(&self, id: &FolderId) -> Option<&Folder> {
        self.folders.get(id)
    }

    /// Returns the number of features.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Returns the number of folders.
    #[must_use]
    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    /// Iterates over all features in id order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    /// Iterates over all folders in id order.
    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.folders.values()
    }

    /// Returns the features that are siblings under `parent`, sorted
    /// by order key.
    ///
    /// `None` is the root. Features whose folder reference dangles are
    /// treated as root-level.
    #[must_use]
    pub fn features_in(&self, parent: Option<FolderId>) -> Vec<&Feature> {
        let mut siblings: Vec<&Feature> = self
            .features
            .values()
            .filter(|f| self.effective_parent(f.folder_id) == parent)
            .collect();
        siblings.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.id.cmp(&b.id)));
        siblings
    }

    /// Returns the folders that are siblings under `parent`, sorted by
    /// order key.
    #[must_use]
    pub fn folders_in(&self, parent: Option<FolderId>) -> Vec<&Folder> {
        let mut siblings: Vec<&Folder> = self
            .folders
            .values()
            .filter(|f| self.effective_parent(f.folder_id) == parent)
            .collect();
        siblings.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.id.cmp(&b.id)));
        siblings
    }

    /// Returns the highest order key among the features under `parent`.
    #[must_use]
    pub fn last_feature_at(&self, parent: Option<FolderId>) -> Option<String> {
        self.features_in(parent).last().map(|f| f.at.clone())
    }

    /// Returns a copy with the feature inserted or replaced.
    #[must_use]
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.insert(feature.id, feature);
        self
    }

    /// Returns a copy with the feature removed.
    #[must_use]
    pub fn without_feature(mut self, id: &FeatureId) -> Self {
        self.features.remove(id);
        self
    }

    /// Returns a copy with the folder inserted or replaced.
    #[must_use]
    pub fn with_folder(mut self, folder: Folder) -> Self {
        self.folders.insert(folder.id, folder);
        self
    }

    /// Returns a copy with the folder removed.
    ///
    /// Member entities keep their back-reference; they surface at the
    /// root until the folder is restored.
    #[must_use]
    pub fn without_folder(mut self, id: &FolderId) -> Self {
        self.folders.remove(id);
        self
    }

    /// Returns true if `ancestor` is reachable from `folder` by
    /// walking parent references.
    ///
    /// Used to reject folder moves that would create a cycle.
    #[must_use]
    pub fn folder_has_ancestor(&self, folder: &FolderId, ancestor: &FolderId) -> bool {
        let mut current = Some(*folder);
        // Bounded walk: the parent chain cannot exceed the folder count
        // unless it already cycles.
        for _ in 0..=self.folders.len() {
            match current {
                Some(id) if id == *ancestor => return true,
                Some(id) => current = self.folders.get(&id).and_then(|f| f.folder_id),
                None => return false,
            }
        }
        true
    }

    /// Takes a consistent snapshot of every entity.
    ///
    /// The snapshot is a deep copy ordered by `(at, id)`; exporters read
    /// it without ever observing a partially applied mutation.
    #[must_use]
    pub fn snapshot(&self) -> DocumentSnapshot {
        let mut features: Vec<Feature> = self.features.values().cloned().collect();
        features.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.id.cmp(&b.id)));
        let mut folders: Vec<Folder> = self.folders.values().cloned().collect();
        folders.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.id.cmp(&b.id)));
        DocumentSnapshot { features, folders }
    }

    fn effective_parent(&self, reference: Option<FolderId>) -> Option<FolderId> {
        reference.filter(|id| self.folders.contains_key(id))
    }
}

/// A consistent, ordered copy of a document's entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    /// All features, ordered by `(at, id)`.
    pub features: Vec<Feature>,
    /// All folders, ordered by `(at, id)`.
    pub folders: Vec<Folder>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    fn doc() -> Document {
        Document::new(DocumentId::new())
    }

    #[test]
    fn empty_document() {
        let doc = doc();
        assert_eq!(doc.version(), Version::ZERO);
        assert_eq!(doc.feature_count(), 0);
        assert!(doc.features_in(None).is_empty());
    }

    #[test]
    fn insert_and_order() {
        let doc = doc()
            .with_feature(Feature::new(Geometry::point(0.0, 0.0), "a2"))
            .with_feature(Feature::new(Geometry::point(1.0, 1.0), "a0"))
            .with_feature(Feature::new(Geometry::point(2.0, 2.0), "a1"));

        let ordered = doc.features_in(None);
        let keys: Vec<&str> = ordered.iter().map(|f| f.at.as_str()).collect();
        assert_eq!(keys, ["a0", "a1", "a2"]);
        assert_eq!(doc.last_feature_at(None), Some("a2".to_string()));
    }

    #[test]
    fn updates_do_not_alias() {
        let feature = Feature::new(Geometry::point(0.0, 0.0), "a0");
        let id = feature.id;
        let before = doc().with_feature(feature.clone());

        let mut renamed = feature;
        renamed.at = "b0".to_string();
        let after = before.clone().with_feature(renamed);

        // The earlier value is untouched.
        assert_eq!(before.feature(&id).map(|f| f.at.as_str()), Some("a0"));
        assert_eq!(after.feature(&id).map(|f| f.at.as_str()), Some("b0"));
    }

    #[test]
    fn dangling_folder_reference_reads_as_root() {
        let folder = Folder::new("group", "a0");
        let feature = Feature::new(Geometry::point(0.0, 0.0), "a0").in_folder(folder.id);
        let folder_id = folder.id;

        let doc = doc().with_folder(folder).with_feature(feature.clone());
        assert_eq!(doc.features_in(Some(folder_id)).len(), 1);
        assert!(doc.features_in(None).is_empty());

        // Folder deleted remotely: the member surfaces at the root but
        // keeps its reference.
        let doc = doc.without_folder(&folder_id);
        assert_eq!(doc.features_in(None).len(), 1);
        assert_eq!(doc.feature(&feature.id).unwrap().folder_id, Some(folder_id));
    }

    #[test]
    fn cycle_detection() {
        let a = Folder::new("a", "a0");
        let b = Folder::new("b", "a1").in_folder(a.id);
        let c = Folder::new("c", "a2").in_folder(b.id);
        let (a_id, c_id) = (a.id, c.id);

        let doc = doc().with_folder(a).with_folder(b).with_folder(c);
        assert!(doc.folder_has_ancestor(&c_id, &a_id));
        assert!(!doc.folder_has_ancestor(&a_id, &c_id));
    }

    #[test]
    fn snapshot_roundtrip() {
        let original = doc()
            .with_feature(Feature::new(Geometry::point(0.0, 0.0), "a0"))
            .with_folder(Folder::new("group", "a0"))
            .at_version(Version::new(7));

        let rebuilt =
            Document::from_snapshot(original.id(), original.version(), original.snapshot());
        assert_eq!(rebuilt, original);
    }
}
