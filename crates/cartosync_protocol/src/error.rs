//! Validation errors.

use cartosync_model::{fracindex::FracIndexError, FolderId, GeometryError};
use thiserror::Error;

/// A mutation whose arguments are malformed.
///
/// Validation failures are rejected atomically: the dispatcher never
/// applies part of an invalid mutation, and clients must not retry one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The geometry was structurally invalid.
    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    /// The order key was malformed.
    #[error("invalid order key: {0}")]
    OrderKey(#[from] FracIndexError),

    /// An update carried no fields to change.
    #[error("update carries no fields")]
    EmptyUpdate,

    /// A folder named itself as parent.
    #[error("folder {0} cannot be its own parent")]
    SelfParent(FolderId),

    /// A folder move would create a parent cycle.
    #[error("moving folder {folder} under {parent} would create a cycle")]
    FolderCycle {
        /// Folder being moved.
        folder: FolderId,
        /// Requested parent.
        parent: FolderId,
    },

    /// A folder name was empty.
    #[error("folder name cannot be empty")]
    EmptyFolderName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = ValidationError::EmptyUpdate;
        assert_eq!(err.to_string(), "update carries no fields");

        let folder = FolderId::new();
        let err = ValidationError::SelfParent(folder);
        assert!(err.to_string().contains(&folder.to_string()));
    }
}
