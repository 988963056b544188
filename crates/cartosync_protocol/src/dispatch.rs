//! The mutation dispatcher.
//!
//! [`apply`] is a pure state-transition function: given a document and
//! an operation it either produces the successor document — along with
//! the inverse operation and the entity-level change it caused — or
//! fails atomically with a [`ValidationError`]. It never partially
//! applies anything.
//!
//! Stale preconditions are not failures. A mutation whose target is
//! gone becomes a [`Applied::Noop`]; a mutation referencing a missing
//! folder is applied as-is with an adjustment note (field-level
//! last-writer-wins, the reference dangles harmlessly). This is what
//! lets the server apply a concurrent client's mutation against
//! current state instead of rejecting it.

use crate::error::ValidationError;
use crate::messages::EntityChange;
use crate::mutation::MutationOp;
use cartosync_model::{fracindex, Document};

/// Outcome of applying a mutation.
#[derive(Debug, Clone)]
pub enum Applied {
    /// The document advanced.
    Changed {
        /// The successor document.
        document: Document,
        /// Operation that restores the pre-state, computed from a
        /// snapshot captured before application.
        inverse: MutationOp,
        /// The entity-level patch this mutation produced.
        change: EntityChange,
        /// Present when a stale precondition was adjusted rather than
        /// rejected.
        adjustment: Option<String>,
    },
    /// The mutation had no effect against current state.
    Noop {
        /// Why nothing happened.
        reason: String,
    },
}

impl Applied {
    /// Returns the successor document, or `None` for a no-op.
    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        match self {
            Applied::Changed { document, .. } => Some(document),
            Applied::Noop { .. } => None,
        }
    }
}

/// Applies `op` to `doc`, returning the outcome.
pub fn apply(doc: &Document, op: &MutationOp) -> Result<Applied, ValidationError> {
    match op {
        MutationOp::PutFeature { feature } => {
            feature.geometry.validate()?;
            fracindex::validate_key(&feature.at)?;

            let adjustment = feature.folder_id.and_then(|fid| {
                if doc.folder(&fid).is_none() {
                    Some(format!("folder {fid} is gone; feature surfaces at root"))
                } else {
                    None
                }
            });
            let inverse = match doc.feature(&feature.id) {
                Some(previous) => MutationOp::PutFeature {
                    feature: previous.clone(),
                },
                None => MutationOp::DeleteFeature { id: feature.id },
            };
            Ok(Applied::Changed {
                document: doc.clone().with_feature(feature.clone()),
                inverse,
                change: EntityChange::PutFeature {
                    feature: feature.clone(),
                },
                adjustment,
            })
        }

        MutationOp::UpdateFeature {
            id,
            geometry,
            properties,
            at,
            folder_id,
        } => {
            if geometry.is_none() && properties.is_none() && at.is_none() && folder_id.is_none() {
                return Err(ValidationError::EmptyUpdate);
            }
            if let Some(geometry) = geometry {
                geometry.validate()?;
            }
            if let Some(at) = at {
                fracindex::validate_key(at)?;
            }
            let Some(previous) = doc.feature(id) else {
                return Ok(Applied::Noop {
                    reason: format!("feature {id} no longer exists"),
                });
            };

            let mut updated = previous.clone();
            if let Some(geometry) = geometry {
                updated.geometry = geometry.clone();
            }
            if let Some(properties) = properties {
                updated.properties = properties.clone();
            }
            if let Some(at) = at {
                updated.at = at.clone();
            }
            let mut adjustment = None;
            if let Some(new_folder) = folder_id {
                updated.folder_id = *new_folder;
                if let Some(fid) = new_folder {
                    if doc.folder(fid).is_none() {
                        adjustment =
                            Some(format!("folder {fid} is gone; feature surfaces at root"));
                    }
                }
            }

            Ok(Applied::Changed {
                document: doc.clone().with_feature(updated.clone()),
                inverse: MutationOp::PutFeature {
                    feature: previous.clone(),
                },
                change: EntityChange::PutFeature { feature: updated },
                adjustment,
            })
        }

        MutationOp::DeleteFeature { id } => match doc.feature(id) {
            Some(previous) => Ok(Applied::Changed {
                document: doc.clone().without_feature(id),
                inverse: MutationOp::PutFeature {
                    feature: previous.clone(),
                },
                change: EntityChange::DeleteFeature { id: *id },
                adjustment: None,
            }),
            None => Ok(Applied::Noop {
                reason: format!("feature {id} already deleted"),
            }),
        },

        MutationOp::PutFolder { folder } => {
            fracindex::validate_key(&folder.at)?;
            if folder.name.is_empty() {
                return Err(ValidationError::EmptyFolderName);
            }
            if let Some(parent) = folder.folder_id {
                if parent == folder.id {
                    return Err(ValidationError::SelfParent(folder.id));
                }
                if doc.folder_has_ancestor(&parent, &folder.id) {
                    return Err(ValidationError::FolderCycle {
                        folder: folder.id,
                        parent,
                    });
                }
            }

            let adjustment = folder.folder_id.and_then(|parent| {
                if doc.folder(&parent).is_none() {
                    Some(format!("parent folder {parent} is gone; folder surfaces at root"))
                } else {
                    None
                }
            });
            let inverse = match doc.folder(&folder.id) {
                Some(previous) => MutationOp::PutFolder {
                    folder: previous.clone(),
                },
                None => MutationOp::DeleteFolder { id: folder.id },
            };
            Ok(Applied::Changed {
                document: doc.clone().with_folder(folder.clone()),
                inverse,
                change: EntityChange::PutFolder {
                    folder: folder.clone(),
                },
                adjustment,
            })
        }

        MutationOp::UpdateFolder {
            id,
            name,
            at,
            folder_id,
        } => {
            if name.is_none() && at.is_none() && folder_id.is_none() {
                return Err(ValidationError::EmptyUpdate);
            }
            if let Some(at) = at {
                fracindex::validate_key(at)?;
            }
            if let Some(name) = name {
                if name.is_empty() {
                    return Err(ValidationError::EmptyFolderName);
                }
            }
            if let Some(Some(parent)) = folder_id {
                if parent == id {
                    return Err(ValidationError::SelfParent(*id));
                }
                if doc.folder_has_ancestor(parent, id) {
                    return Err(ValidationError::FolderCycle {
                        folder: *id,
                        parent: *parent,
                    });
                }
            }
            let Some(previous) = doc.folder(id) else {
                return Ok(Applied::Noop {
                    reason: format!("folder {id} no longer exists"),
                });
            };

            let mut updated = previous.clone();
            if let Some(name) = name {
                updated.name = name.clone();
            }
            if let Some(at) = at {
                updated.at = at.clone();
            }
            let mut adjustment = None;
            if let Some(new_parent) = folder_id {
                updated.folder_id = *new_parent;
                if let Some(parent) = new_parent {
                    if doc.folder(parent).is_none() {
                        adjustment =
                            Some(format!("parent folder {parent} is gone; folder surfaces at root"));
                    }
                }
            }

            Ok(Applied::Changed {
                document: doc.clone().with_folder(updated.clone()),
                inverse: MutationOp::PutFolder {
                    folder: previous.clone(),
                },
                change: EntityChange::PutFolder { folder: updated },
                adjustment,
            })
        }

        MutationOp::DeleteFolder { id } => match doc.folder(id) {
            Some(previous) => Ok(Applied::Changed {
                document: doc.clone().without_folder(id),
                inverse: MutationOp::PutFolder {
                    folder: previous.clone(),
                },
                change: EntityChange::DeleteFolder { id: *id },
                adjustment: None,
            }),
            None => Ok(Applied::Noop {
                reason: format!("folder {id} already deleted"),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartosync_model::{DocumentId, Feature, Folder, Geometry};

    fn doc() -> Document {
        Document::new(DocumentId::new())
    }

    fn put(doc: &Document, op: &MutationOp) -> Document {
        match apply(doc, op).unwrap() {
            Applied::Changed { document, .. } => document,
            Applied::Noop { reason } => panic!("unexpected noop: {reason}"),
        }
    }

    #[test]
    fn put_then_delete_feature() {
        let feature = Feature::new(Geometry::point(1.0, 2.0), "a0");
        let id = feature.id;

        let with = put(&doc(), &MutationOp::PutFeature { feature });
        assert!(with.feature(&id).is_some());

        let without = put(&with, &MutationOp::DeleteFeature { id });
        assert!(without.feature(&id).is_none());
    }

    #[test]
    fn create_inverse_is_delete() {
        let feature = Feature::new(Geometry::point(1.0, 2.0), "a0");
        let id = feature.id;

        match apply(&doc(), &MutationOp::PutFeature { feature }).unwrap() {
            Applied::Changed { inverse, .. } => {
                assert_eq!(inverse, MutationOp::DeleteFeature { id });
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_inverse_restores_snapshot() {
        let feature = Feature::new(Geometry::point(1.0, 2.0), "a0")
            .with_property("name", serde_json::json!("pier"));
        let id = feature.id;
        let base = put(&doc(), &MutationOp::PutFeature { feature: feature.clone() });

        let update = MutationOp::UpdateFeature {
            id,
            geometry: None,
            properties: Some(
                Feature::new(Geometry::point(0.0, 0.0), "a0")
                    .with_property("name", serde_json::json!("dock"))
                    .properties,
            ),
            at: None,
            folder_id: None,
        };

        let (updated, inverse) = match apply(&base, &update).unwrap() {
            Applied::Changed { document, inverse, .. } => (document, inverse),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(updated.feature(&id).unwrap().properties["name"], "dock");

        // Applying the inverse restores the exact pre-state.
        let restored = put(&updated, &inverse);
        assert_eq!(restored.feature(&id), base.feature(&id));
    }

    #[test]
    fn update_of_missing_feature_is_noop() {
        let result = apply(
            &doc(),
            &MutationOp::UpdateFeature {
                id: cartosync_model::FeatureId::new(),
                geometry: None,
                properties: None,
                at: Some("a1".to_string()),
                folder_id: None,
            },
        )
        .unwrap();
        assert!(matches!(result, Applied::Noop { .. }));
    }

    #[test]
    fn empty_update_is_rejected() {
        let result = apply(
            &doc(),
            &MutationOp::UpdateFeature {
                id: cartosync_model::FeatureId::new(),
                geometry: None,
                properties: None,
                at: None,
                folder_id: None,
            },
        );
        assert_eq!(result.unwrap_err(), ValidationError::EmptyUpdate);
    }

    #[test]
    fn invalid_geometry_fails_atomically() {
        let base = doc();
        let feature = Feature::new(
            Geometry::LineString {
                coordinates: vec![[0.0, 0.0]],
            },
            "a0",
        );
        let result = apply(&base, &MutationOp::PutFeature { feature });
        assert!(matches!(result, Err(ValidationError::Geometry(_))));
        // The input document is untouched by construction; nothing to
        // roll back.
        assert_eq!(base.feature_count(), 0);
    }

    #[test]
    fn move_to_missing_folder_adjusts() {
        let feature = Feature::new(Geometry::point(0.0, 0.0), "a0");
        let id = feature.id;
        let base = put(&doc(), &MutationOp::PutFeature { feature });

        let gone = cartosync_model::FolderId::new();
        let result = apply(
            &base,
            &MutationOp::UpdateFeature {
                id,
                geometry: None,
                properties: None,
                at: None,
                folder_id: Some(Some(gone)),
            },
        )
        .unwrap();

        match result {
            Applied::Changed {
                document,
                adjustment,
                ..
            } => {
                // Last-writer-wins: the move is applied, the dangling
                // reference reads as root.
                assert_eq!(document.feature(&id).unwrap().folder_id, Some(gone));
                assert_eq!(document.features_in(None).len(), 1);
                assert!(adjustment.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn folder_cycle_rejected() {
        let a = Folder::new("a", "a0");
        let b = Folder::new("b", "a1").in_folder(a.id);
        let (a_id, b_id) = (a.id, b.id);

        let base = put(
            &put(&doc(), &MutationOp::PutFolder { folder: a }),
            &MutationOp::PutFolder { folder: b },
        );

        let result = apply(
            &base,
            &MutationOp::UpdateFolder {
                id: a_id,
                name: None,
                at: None,
                folder_id: Some(Some(b_id)),
            },
        );
        assert!(matches!(result, Err(ValidationError::FolderCycle { .. })));
    }

    #[test]
    fn replay_is_deterministic() {
        let feature = Feature::new(Geometry::point(3.0, 4.0), "a0");
        let folder = Folder::new("group", "a0");
        let ops = vec![
            MutationOp::PutFolder { folder: folder.clone() },
            MutationOp::PutFeature { feature: feature.clone() },
            MutationOp::UpdateFeature {
                id: feature.id,
                geometry: None,
                properties: None,
                at: None,
                folder_id: Some(Some(folder.id)),
            },
            MutationOp::DeleteFolder { id: folder.id },
        ];

        let id = DocumentId::new();
        let replay = |_: usize| {
            let mut doc = Document::new(id);
            for op in &ops {
                if let Applied::Changed { document, .. } = apply(&doc, op).unwrap() {
                    doc = document;
                }
            }
            doc
        };

        assert_eq!(replay(0), replay(1));
    }
}
