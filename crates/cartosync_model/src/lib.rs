//! # Cartosync Model
//!
//! Value types shared by every layer of the Cartosync engine:
//!
//! - Identifier newtypes ([`DocumentId`], [`FeatureId`], [`FolderId`],
//!   [`ClientId`]) and the per-document [`Version`] counter
//! - Immutable entity records ([`Feature`], [`Folder`]) and the
//!   [`Document`] value they live in
//! - The fractional index sequencer ([`fracindex`]) that generates
//!   sibling order keys
//!
//! Everything here is a plain value: updates construct new records, so
//! concurrent readers never observe a torn write.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod document;
mod feature;
mod folder;
mod geometry;
mod id;

pub mod fracindex;

pub use document::{Document, DocumentSnapshot};
pub use feature::{Feature, Properties};
pub use folder::Folder;
pub use geometry::{Geometry, GeometryError, Position};
pub use id::{ClientId, DocumentId, FeatureId, FolderId, MutationId, Version};
