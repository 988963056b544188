//! Mutations.

use cartosync_model::{
    ClientId, Feature, FeatureId, Folder, FolderId, Geometry, MutationId, Properties,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A named state transition with its arguments.
///
/// On the wire this is `{"name": ..., "args": {...}}`. Update
/// operations carry only the fields they change; `folder_id` uses a
/// double option so "leave alone", "clear" and "set" are distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "camelCase")]
pub enum MutationOp {
    /// Creates or replaces a feature.
    PutFeature {
        /// The complete record to store.
        feature: Feature,
    },
    /// Updates some fields of a feature.
    #[serde(rename_all = "camelCase")]
    UpdateFeature {
        /// The feature to update.
        id: FeatureId,
        /// New geometry, if changing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        geometry: Option<Geometry>,
        /// Replacement properties, if changing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<Properties>,
        /// New order key, if reordering.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<String>,
        /// Folder move: `Some(None)` clears, `Some(Some(_))` sets.
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "double_option"
        )]
        folder_id: Option<Option<FolderId>>,
    },
    /// Deletes a feature.
    DeleteFeature {
        /// The feature to delete.
        id: FeatureId,
    },
    /// Creates or replaces a folder.
    PutFolder {
        /// The complete record to store.
        folder: Folder,
    },
    /// Updates some fields of a folder.
    #[serde(rename_all = "camelCase")]
    UpdateFolder {
        /// The folder to update.
        id: FolderId,
        /// New name, if renaming.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// New order key, if reordering.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<String>,
        /// Parent move: `Some(None)` moves to root, `Some(Some(_))`
        /// nests.
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "double_option"
        )]
        folder_id: Option<Option<FolderId>>,
    },
    /// Deletes a folder. Member entities keep their back-reference
    /// and surface at the root.
    DeleteFolder {
        /// The folder to delete.
        id: FolderId,
    },
}

impl MutationOp {
    /// Returns the wire name of this operation.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            MutationOp::PutFeature { .. } => "putFeature",
            MutationOp::UpdateFeature { .. } => "updateFeature",
            MutationOp::DeleteFeature { .. } => "deleteFeature",
            MutationOp::PutFolder { .. } => "putFolder",
            MutationOp::UpdateFolder { .. } => "updateFolder",
            MutationOp::DeleteFolder { .. } => "deleteFolder",
        }
    }

    /// Returns the entity this operation targets.
    #[must_use]
    pub fn target(&self) -> Target {
        match self {
            MutationOp::PutFeature { feature } => Target::Feature(feature.id),
            MutationOp::UpdateFeature { id, .. } | MutationOp::DeleteFeature { id } => {
                Target::Feature(*id)
            }
            MutationOp::PutFolder { folder } => Target::Folder(folder.id),
            MutationOp::UpdateFolder { id, .. } | MutationOp::DeleteFolder { id } => {
                Target::Folder(*id)
            }
        }
    }
}

/// The entity a mutation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// A feature.
    Feature(FeatureId),
    /// A folder.
    Folder(FolderId),
}

/// A client-issued mutation, append-only once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    /// Client-local id, monotonic in issue order.
    pub id: MutationId,
    /// The issuing client.
    pub client_id: ClientId,
    /// Issue time in Unix milliseconds. Informational only; ordering
    /// is by mutation id.
    pub timestamp_ms: i64,
    /// The operation.
    #[serde(flatten)]
    pub op: MutationOp,
}

impl Mutation {
    /// Creates a mutation stamped with the current wall clock.
    #[must_use]
    pub fn new(id: MutationId, client_id: ClientId, op: MutationOp) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self {
            id,
            client_id,
            timestamp_ms,
            op,
        }
    }
}

/// Deserializes a present-but-possibly-null field into a double
/// option, so `null` (clear) survives where a missing field means
/// "leave alone".
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        let op = MutationOp::DeleteFeature {
            id: FeatureId::new(),
        };
        assert_eq!(op.name(), "deleteFeature");

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["name"], "deleteFeature");
        assert!(json["args"]["id"].is_string());
    }

    #[test]
    fn update_field_presence() {
        let id = FeatureId::new();
        let op = MutationOp::UpdateFeature {
            id,
            geometry: None,
            properties: None,
            at: Some("a1".to_string()),
            folder_id: Some(None),
        };

        let json = serde_json::to_value(&op).unwrap();
        let args = &json["args"];
        assert!(args.get("geometry").is_none());
        assert_eq!(args["at"], "a1");
        assert!(args["folderId"].is_null());

        let decoded: MutationOp = serde_json::from_value(json).unwrap();
        match decoded {
            MutationOp::UpdateFeature {
                at, folder_id, geometry, ..
            } => {
                assert_eq!(at.as_deref(), Some("a1"));
                assert_eq!(folder_id, Some(None));
                assert_eq!(geometry, None);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn mutation_roundtrip() {
        let mutation = Mutation::new(
            MutationId::new(3),
            ClientId::new(),
            MutationOp::DeleteFolder {
                id: FolderId::new(),
            },
        );

        let json = serde_json::to_string(&mutation).unwrap();
        let decoded: Mutation = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, mutation);
    }

    #[test]
    fn target_extraction() {
        let feature_id = FeatureId::new();
        let op = MutationOp::UpdateFeature {
            id: feature_id,
            geometry: None,
            properties: None,
            at: Some("b".to_string()),
            folder_id: None,
        };
        assert_eq!(op.target(), Target::Feature(feature_id));
    }
}
