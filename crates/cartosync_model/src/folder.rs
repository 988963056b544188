//! Folder records.

use crate::id::FolderId;
use serde::{Deserialize, Serialize};

/// An immutable folder record.
///
/// Folders group features and may nest. Like features they carry a
/// fractional order key among their siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    /// Opaque, immutable id.
    pub id: FolderId,
    /// Display name.
    pub name: String,
    /// Fractional order key among siblings.
    pub at: String,
    /// Parent folder, if nested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<FolderId>,
}

impl Folder {
    /// Creates a root-level folder with the given order key.
    #[must_use]
    pub fn new(name: impl Into<String>, at: impl Into<String>) -> Self {
        Self {
            id: FolderId::new(),
            name: name.into(),
            at: at.into(),
            folder_id: None,
        }
    }

    /// Returns a copy nested under the given parent.
    #[must_use]
    pub fn in_folder(mut self, parent: FolderId) -> Self {
        self.folder_id = Some(parent);
        self
    }
}
