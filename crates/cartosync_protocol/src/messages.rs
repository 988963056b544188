//! Wire messages for the push and pull endpoints.

use crate::mutation::Mutation;
use cartosync_model::{
    ClientId, Document, DocumentId, DocumentSnapshot, Feature, FeatureId, Folder, FolderId,
    MutationId, Version,
};
use serde::{Deserialize, Serialize};

/// An ordered batch of mutations submitted by one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// The submitting client.
    pub client_id: ClientId,
    /// The document the batch targets.
    pub document_id: DocumentId,
    /// The id of the final mutation in the batch; the client's issue
    /// watermark at push time.
    pub last_mutation_id: MutationId,
    /// Mutations in issue order, ids strictly ascending.
    pub mutations: Vec<Mutation>,
}

impl PushRequest {
    /// Returns true when mutation ids ascend strictly.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.mutations.windows(2).all(|w| w[0].id < w[1].id)
    }

    /// Returns true when `last_mutation_id` names the final mutation
    /// of a non-empty batch.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.mutations
            .last()
            .is_some_and(|m| m.id == self.last_mutation_id)
    }
}

/// Per-mutation outcomes plus the resulting document version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// One entry per submitted mutation, in submission order.
    pub mutation_infos: Vec<MutationInfo>,
    /// Document version after the batch. Does not advance the pull
    /// cursor; the next pull delivers the changes as patches.
    pub new_version: Version,
}

/// The outcome of one mutation in a push batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationInfo {
    /// The mutation this describes.
    pub id: MutationId,
    /// What happened to it.
    pub result: MutationResult,
}

/// How the server disposed of a mutation.
///
/// Every variant is terminal: the server has consumed the mutation id
/// and the client must discard its pending copy, retrying none of
/// these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MutationResult {
    /// Applied; the document advanced.
    Ok,
    /// Seen in an earlier push; skipped without effect.
    AlreadyApplied,
    /// Structurally invalid; dropped.
    #[serde(rename_all = "camelCase")]
    ValidationError {
        /// What was wrong.
        detail: String,
    },
    /// Applied against state that had moved; the server adjusted a
    /// stale precondition rather than rejecting.
    #[serde(rename_all = "camelCase")]
    Conflict {
        /// What was adjusted.
        detail: String,
    },
    /// Had no effect against current state, typically because the
    /// target was concurrently deleted.
    #[serde(rename_all = "camelCase")]
    Noop {
        /// Why nothing happened.
        detail: String,
    },
}

impl MutationResult {
    /// Returns true when the document advanced because of this
    /// mutation.
    #[must_use]
    pub fn changed_state(&self) -> bool {
        matches!(self, MutationResult::Ok | MutationResult::Conflict { .. })
    }
}

/// Asks for everything the client has not yet seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// The requesting client.
    pub client_id: ClientId,
    /// The document to read.
    pub document_id: DocumentId,
    /// Last version the client has integrated; `Version::ZERO` for a
    /// fresh client.
    pub since_version: Version,
}

/// The server's answer to a pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Patches or a snapshot.
    pub reply: PullReply,
    /// The version the reply brings the client to.
    pub new_version: Version,
}

/// Incremental patches when history allows, a snapshot otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "camelCase")]
pub enum PullReply {
    /// Entity changes since the requested version, in version order.
    Patches(Vec<Patch>),
    /// Complete current state; replaces whatever the client holds.
    Snapshot(DocumentSnapshot),
}

/// One versioned entity change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// The version this change produced.
    pub version: Version,
    /// What changed.
    #[serde(flatten)]
    pub change: EntityChange,
}

/// An entity-level delta; the unit of incremental pull.
///
/// Partial updates collapse to a put of the post-state, so applying a
/// patch never requires the pre-state to be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EntityChange {
    /// A feature was created or now has this state.
    PutFeature {
        /// Complete post-state.
        feature: Feature,
    },
    /// A feature was deleted.
    DeleteFeature {
        /// The deleted feature.
        id: FeatureId,
    },
    /// A folder was created or now has this state.
    PutFolder {
        /// Complete post-state.
        folder: Folder,
    },
    /// A folder was deleted.
    DeleteFolder {
        /// The deleted folder.
        id: FolderId,
    },
}

impl EntityChange {
    /// Applies this change to a document, returning the successor.
    /// Patches are post-states, so application cannot fail.
    #[must_use]
    pub fn apply_to(&self, doc: Document) -> Document {
        match self {
            EntityChange::PutFeature { feature } => doc.with_feature(feature.clone()),
            EntityChange::DeleteFeature { id } => doc.without_feature(id),
            EntityChange::PutFolder { folder } => doc.with_folder(folder.clone()),
            EntityChange::DeleteFolder { id } => doc.without_folder(id),
        }
    }
}
