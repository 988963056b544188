//! Hosted documents and the registry that owns them.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::history::VersionHistory;
use cartosync_model::{ClientId, Document, DocumentId, MutationId, Version};
use cartosync_protocol::{
    apply, Applied, MutationInfo, MutationResult, PullReply, PullRequest, PullResponse,
    PushRequest, PushResponse,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One hosted document behind its serialization lock.
///
/// The mutex is the only ordering mechanism: every push and pull for
/// a document goes through it, which is what makes version stamping
/// and idempotence bookkeeping atomic with application.
pub struct ServerDocument {
    state: Mutex<DocumentState>,
}

struct DocumentState {
    document: Document,
    history: VersionHistory,
    /// Highest mutation id applied per client. Everything at or below
    /// the watermark has been consumed and is skipped on replay.
    applied: HashMap<ClientId, MutationId>,
}

/// A push outcome plus whether the document advanced (and subscribers
/// should be poked).
pub struct PushOutcome {
    /// The response to send back.
    pub response: PushResponse,
    /// True when at least one mutation changed state.
    pub advanced: bool,
}

impl ServerDocument {
    /// Creates an empty hosted document.
    #[must_use]
    pub fn new(id: DocumentId, history_limit: usize) -> Self {
        Self {
            state: Mutex::new(DocumentState {
                document: Document::new(id),
                history: VersionHistory::new(history_limit),
                applied: HashMap::new(),
            }),
        }
    }

    /// Returns the current version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.state.lock().document.version()
    }

    /// Returns a copy of the current document.
    #[must_use]
    pub fn document(&self) -> Document {
        self.state.lock().document.clone()
    }

    /// Applies a push batch.
    ///
    /// Mutations are processed in submission order. Ids at or below
    /// the client's watermark are skipped as already applied; every
    /// processed id advances the watermark, including rejected and
    /// no-op mutations, so a retry of the same batch is harmless.
    pub fn push(&self, request: &PushRequest) -> ServerResult<PushOutcome> {
        let mut state = self.state.lock();
        let mut infos = Vec::with_capacity(request.mutations.len());
        let mut advanced = false;

        for mutation in &request.mutations {
            let watermark = state
                .applied
                .get(&request.client_id)
                .copied()
                .unwrap_or(MutationId::ZERO);
            if mutation.id <= watermark {
                infos.push(MutationInfo {
                    id: mutation.id,
                    result: MutationResult::AlreadyApplied,
                });
                continue;
            }
            if mutation.id > watermark.next() {
                // A gap usually means the client lost unpushed edits
                // across a restart. Harmless for convergence; worth a
                // trace.
                debug!(
                    client = %request.client_id,
                    expected = %watermark.next(),
                    got = %mutation.id,
                    "mutation id gap"
                );
            }

            let result = match apply(&state.document, &mutation.op) {
                Ok(Applied::Changed {
                    document,
                    change,
                    adjustment,
                    ..
                }) => {
                    let version = state.document.version().next();
                    state.document = document.at_version(version);
                    state.history.record(version, change);
                    advanced = true;
                    match adjustment {
                        Some(detail) => MutationResult::Conflict { detail },
                        None => MutationResult::Ok,
                    }
                }
                Ok(Applied::Noop { reason }) => MutationResult::Noop { detail: reason },
                Err(err) => {
                    debug!(
                        client = %request.client_id,
                        mutation = %mutation.id,
                        op = mutation.op.name(),
                        "rejected invalid mutation: {err}"
                    );
                    MutationResult::ValidationError {
                        detail: err.to_string(),
                    }
                }
            };

            state.applied.insert(request.client_id, mutation.id);
            infos.push(MutationInfo {
                id: mutation.id,
                result,
            });
        }

        Ok(PushOutcome {
            response: PushResponse {
                mutation_infos: infos,
                new_version: state.document.version(),
            },
            advanced,
        })
    }

    /// Answers a pull: patches when history covers the cursor and the
    /// delta fits in `max_patches`, a snapshot otherwise.
    ///
    /// A cursor ahead of the current version means the client is
    /// confused (server state was reset, or the cursor is from another
    /// document); it gets a snapshot that resets it.
    #[must_use]
    pub fn pull(&self, request: &PullRequest, max_patches: usize) -> PullResponse {
        let state = self.state.lock();
        let current = state.document.version();

        let reply = if request.since_version > current {
            None
        } else {
            state
                .history
                .patches_since(request.since_version, current)
                .filter(|patches| patches.len() <= max_patches)
                .map(PullReply::Patches)
        };

        PullResponse {
            reply: reply.unwrap_or_else(|| PullReply::Snapshot(state.document.snapshot())),
            new_version: current,
        }
    }
}

/// The set of documents a server hosts.
pub struct DocumentRegistry {
    documents: RwLock<HashMap<DocumentId, Arc<ServerDocument>>>,
    config: ServerConfig,
}

impl DocumentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Creates and hosts a new empty document.
    pub fn create(&self, id: DocumentId) -> ServerResult<Arc<ServerDocument>> {
        let mut documents = self.documents.write();
        if documents.contains_key(&id) {
            return Err(ServerError::DocumentExists(id));
        }
        let document = Arc::new(ServerDocument::new(id, self.config.history_limit));
        documents.insert(id, Arc::clone(&document));
        Ok(document)
    }

    /// Looks up a hosted document.
    pub fn get(&self, id: DocumentId) -> ServerResult<Arc<ServerDocument>> {
        self.documents
            .read()
            .get(&id)
            .cloned()
            .ok_or(ServerError::UnknownDocument(id))
    }

    /// Returns the number of hosted documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true when nothing is hosted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartosync_model::{Feature, Geometry};
    use cartosync_protocol::{Mutation, MutationOp};

    fn hosted() -> ServerDocument {
        ServerDocument::new(DocumentId::new(), 100)
    }

    fn put_feature(id: u64, client: ClientId) -> Mutation {
        Mutation::new(
            MutationId::new(id),
            client,
            MutationOp::PutFeature {
                feature: Feature::new(Geometry::point(0.0, 0.0), "a0"),
            },
        )
    }

    #[test]
    fn push_stamps_versions_in_order() {
        let doc = hosted();
        let client = ClientId::new();
        let request = PushRequest {
            client_id: client,
            document_id: DocumentId::new(),
            last_mutation_id: MutationId::new(2),
            mutations: vec![put_feature(1, client), put_feature(2, client)],
        };

        let outcome = doc.push(&request).unwrap();
        assert!(outcome.advanced);
        assert_eq!(outcome.response.new_version, Version::new(2));
        assert!(outcome
            .response
            .mutation_infos
            .iter()
            .all(|i| i.result == MutationResult::Ok));
    }

    #[test]
    fn replayed_push_is_idempotent() {
        let doc = hosted();
        let client = ClientId::new();
        let request = PushRequest {
            client_id: client,
            document_id: DocumentId::new(),
            last_mutation_id: MutationId::new(1),
            mutations: vec![put_feature(1, client)],
        };

        let first = doc.push(&request).unwrap();
        assert_eq!(first.response.new_version, Version::new(1));

        // Same batch again: skipped, version unchanged, no poke.
        let second = doc.push(&request).unwrap();
        assert!(!second.advanced);
        assert_eq!(second.response.new_version, Version::new(1));
        assert_eq!(
            second.response.mutation_infos[0].result,
            MutationResult::AlreadyApplied
        );
        assert_eq!(doc.document().feature_count(), 1);
    }

    #[test]
    fn invalid_mutation_consumes_its_id() {
        let doc = hosted();
        let client = ClientId::new();
        let invalid = Mutation::new(
            MutationId::new(1),
            client,
            MutationOp::UpdateFeature {
                id: cartosync_model::FeatureId::new(),
                geometry: None,
                properties: None,
                at: None,
                folder_id: None,
            },
        );
        let request = PushRequest {
            client_id: client,
            document_id: DocumentId::new(),
            last_mutation_id: MutationId::new(1),
            mutations: vec![invalid],
        };

        let outcome = doc.push(&request).unwrap();
        assert!(!outcome.advanced);
        assert_eq!(outcome.response.new_version, Version::ZERO);
        assert!(matches!(
            outcome.response.mutation_infos[0].result,
            MutationResult::ValidationError { .. }
        ));

        // Retrying the consumed id is a skip, not a second rejection.
        let retry = doc.push(&request).unwrap();
        assert_eq!(
            retry.response.mutation_infos[0].result,
            MutationResult::AlreadyApplied
        );
    }

    #[test]
    fn noop_does_not_advance_version() {
        let doc = hosted();
        let client = ClientId::new();
        let request = PushRequest {
            client_id: client,
            document_id: DocumentId::new(),
            last_mutation_id: MutationId::new(1),
            mutations: vec![Mutation::new(
                MutationId::new(1),
                client,
                MutationOp::DeleteFeature {
                    id: cartosync_model::FeatureId::new(),
                },
            )],
        };

        let outcome = doc.push(&request).unwrap();
        assert!(!outcome.advanced);
        assert_eq!(outcome.response.new_version, Version::ZERO);
        assert!(matches!(
            outcome.response.mutation_infos[0].result,
            MutationResult::Noop { .. }
        ));
    }

    #[test]
    fn watermarks_are_per_client() {
        let doc = hosted();
        let (a, b) = (ClientId::new(), ClientId::new());

        doc.push(&PushRequest {
            client_id: a,
            document_id: DocumentId::new(),
            last_mutation_id: MutationId::new(1),
            mutations: vec![put_feature(1, a)],
        })
        .unwrap();

        // Client b's mutation 1 is its own; it must not be skipped.
        let outcome = doc
            .push(&PushRequest {
                client_id: b,
                document_id: DocumentId::new(),
                last_mutation_id: MutationId::new(1),
                mutations: vec![put_feature(1, b)],
            })
            .unwrap();
        assert_eq!(outcome.response.mutation_infos[0].result, MutationResult::Ok);
        assert_eq!(doc.document().feature_count(), 2);
    }

    #[test]
    fn pull_patches_then_snapshot_fallback() {
        let doc = ServerDocument::new(DocumentId::new(), 2);
        let client = ClientId::new();
        let mutations = (1..=4).map(|i| put_feature(i, client)).collect();
        doc.push(&PushRequest {
            client_id: client,
            document_id: DocumentId::new(),
            last_mutation_id: MutationId::new(4),
            mutations,
        })
        .unwrap();

        // Cursor at 2: patches 3 and 4 are retained.
        let response = doc.pull(
            &PullRequest {
                client_id: client,
                document_id: DocumentId::new(),
                since_version: Version::new(2),
            },
            100,
        );
        assert_eq!(response.new_version, Version::new(4));
        match response.reply {
            PullReply::Patches(patches) => assert_eq!(patches.len(), 2),
            PullReply::Snapshot(_) => panic!("expected patches"),
        }

        // Cursor at 1: patch 2 was evicted, snapshot fallback.
        let response = doc.pull(
            &PullRequest {
                client_id: client,
                document_id: DocumentId::new(),
                since_version: Version::new(1),
            },
            100,
        );
        match response.reply {
            PullReply::Snapshot(snapshot) => assert_eq!(snapshot.features.len(), 4),
            PullReply::Patches(_) => panic!("expected snapshot"),
        }
    }

    #[test]
    fn oversized_delta_becomes_snapshot() {
        let doc = hosted();
        let client = ClientId::new();
        let mutations = (1..=4).map(|i| put_feature(i, client)).collect();
        doc.push(&PushRequest {
            client_id: client,
            document_id: DocumentId::new(),
            last_mutation_id: MutationId::new(4),
            mutations,
        })
        .unwrap();

        // Four patches would be needed but only two fit.
        let response = doc.pull(
            &PullRequest {
                client_id: client,
                document_id: DocumentId::new(),
                since_version: Version::ZERO,
            },
            2,
        );
        assert!(matches!(response.reply, PullReply::Snapshot(_)));
    }

    #[test]
    fn pull_from_the_future_resets_with_snapshot() {
        let doc = hosted();
        let response = doc.pull(
            &PullRequest {
                client_id: ClientId::new(),
                document_id: DocumentId::new(),
                since_version: Version::new(99),
            },
            100,
        );
        assert_eq!(response.new_version, Version::ZERO);
        assert!(matches!(response.reply, PullReply::Snapshot(_)));
    }

    #[test]
    fn registry_create_and_get() {
        let registry = DocumentRegistry::new(ServerConfig::default());
        let id = DocumentId::new();

        registry.create(id).unwrap();
        assert!(registry.get(id).is_ok());
        assert!(matches!(
            registry.create(id),
            Err(ServerError::DocumentExists(_))
        ));
        assert!(matches!(
            registry.get(DocumentId::new()),
            Err(ServerError::UnknownDocument(_))
        ));
    }
}
