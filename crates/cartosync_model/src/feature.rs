//! Feature records.

use crate::geometry::Geometry;
use crate::id::{FeatureId, FolderId};
use serde::{Deserialize, Serialize};

/// Free-form feature properties, as a JSON object.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// An immutable feature record.
///
/// A feature is one geometry plus its properties, its sibling order
/// key `at`, and an optional back-reference to a folder. Updates never
/// modify a record in place; the mutation dispatcher constructs a new
/// record for every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Opaque, immutable id.
    pub id: FeatureId,
    /// The geometry.
    pub geometry: Geometry,
    /// Free-form properties.
    #[serde(default)]
    pub properties: Properties,
    /// Fractional order key among siblings.
    pub at: String,
    /// Containing folder, if any. A back-reference, not ownership:
    /// the folder may be deleted while this reference remains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<FolderId>,
}

impl Feature {
    /// Creates a feature at the root with the given order key.
    #[must_use]
    pub fn new(geometry: Geometry, at: impl Into<String>) -> Self {
        Self {
            id: FeatureId::new(),
            geometry,
            properties: Properties::new(),
            at: at.into(),
            folder_id: None,
        }
    }

    /// Returns a copy placed in the given folder.
    #[must_use]
    pub fn in_folder(mut self, folder_id: FolderId) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    /// Returns a copy with one property set.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_style() {
        let folder = FolderId::new();
        let feature = Feature::new(Geometry::point(0.0, 0.0), "a0")
            .in_folder(folder)
            .with_property("name", serde_json::json!("lighthouse"));

        assert_eq!(feature.at, "a0");
        assert_eq!(feature.folder_id, Some(folder));
        assert_eq!(feature.properties["name"], "lighthouse");
    }

    #[test]
    fn serde_omits_empty_folder() {
        let feature = Feature::new(Geometry::point(0.0, 0.0), "a0");
        let json = serde_json::to_value(&feature).unwrap();
        assert!(json.get("folderId").is_none());
        assert_eq!(json["at"], "a0");
    }
}
