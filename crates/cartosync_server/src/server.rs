//! The server facade.

use crate::auth::{AccessPolicy, AllowAll, TokenValidator};
use crate::config::ServerConfig;
use crate::document::DocumentRegistry;
use crate::error::{ServerError, ServerResult};
use crate::poke::PokeHub;
use cartosync_model::{ClientId, Document, DocumentId, Version};
use cartosync_protocol::{Poke, PullRequest, PullResponse, PushRequest, PushResponse};
use tokio::sync::mpsc;
use tracing::info;

/// The authoritative sync server.
///
/// Owns the hosted documents, the poke hub and the access policy;
/// request handling validates, delegates to the document and notifies
/// subscribers.
pub struct SyncServer {
    config: ServerConfig,
    registry: DocumentRegistry,
    pokes: PokeHub,
    validator: Option<TokenValidator>,
    policy: Box<dyn AccessPolicy>,
}

impl SyncServer {
    /// Creates a server that allows every authenticated client access
    /// to every document.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_policy(config, Box::new(AllowAll))
    }

    /// Creates a server with an access policy.
    #[must_use]
    pub fn with_policy(config: ServerConfig, policy: Box<dyn AccessPolicy>) -> Self {
        let validator = config
            .auth_secret
            .clone()
            .filter(|_| config.require_auth)
            .map(|secret| TokenValidator::new(secret, config.token_expiry));
        Self {
            registry: DocumentRegistry::new(config.clone()),
            pokes: PokeHub::new(),
            validator,
            policy,
            config,
        }
    }

    /// Creates and hosts a new empty document, returning its id.
    pub fn create_document(&self) -> ServerResult<DocumentId> {
        let id = DocumentId::new();
        self.registry.create(id)?;
        info!(document = %id, "document created");
        Ok(id)
    }

    /// Issues an access token for a client, when auth is enabled.
    #[must_use]
    pub fn issue_token(&self, client_id: ClientId, document_id: DocumentId) -> Option<Vec<u8>> {
        self.validator
            .as_ref()
            .map(|v| v.create_token(client_id, document_id))
    }

    /// Handles a push request.
    pub fn push(&self, request: &PushRequest, token: Option<&[u8]>) -> ServerResult<PushResponse> {
        self.authorize(request.client_id, request.document_id, token)?;
        if !self.policy.can_write(request.client_id, request.document_id) {
            return Err(ServerError::NotAuthorized("write denied".into()));
        }
        if request.mutations.len() > self.config.max_push_batch {
            return Err(ServerError::BatchTooLarge {
                actual: request.mutations.len(),
                limit: self.config.max_push_batch,
            });
        }
        if !request.is_ordered() {
            return Err(ServerError::OutOfOrderBatch(request.client_id));
        }
        if !request.is_consistent() {
            return Err(ServerError::InvalidRequest(
                "lastMutationId does not name the final mutation".into(),
            ));
        }

        let document = self.registry.get(request.document_id)?;
        let outcome = document.push(request)?;
        if outcome.advanced {
            self.pokes.poke(
                request.document_id,
                outcome.response.new_version,
                request.client_id,
            );
        }
        Ok(outcome.response)
    }

    /// Handles a pull request.
    pub fn pull(&self, request: &PullRequest, token: Option<&[u8]>) -> ServerResult<PullResponse> {
        self.authorize(request.client_id, request.document_id, token)?;
        if !self.policy.can_read(request.client_id, request.document_id) {
            return Err(ServerError::NotAuthorized("read denied".into()));
        }
        let document = self.registry.get(request.document_id)?;
        Ok(document.pull(request, self.config.max_pull_batch))
    }

    /// Subscribes a client to change pokes for a document.
    pub fn subscribe(
        &self,
        document_id: DocumentId,
        client_id: ClientId,
    ) -> ServerResult<mpsc::UnboundedReceiver<Poke>> {
        self.registry.get(document_id)?;
        Ok(self.pokes.subscribe(document_id, client_id))
    }

    /// Returns the current version of a hosted document.
    pub fn document_version(&self, document_id: DocumentId) -> ServerResult<Version> {
        Ok(self.registry.get(document_id)?.version())
    }

    /// Returns a copy of a hosted document's current state.
    pub fn document(&self, document_id: DocumentId) -> ServerResult<Document> {
        Ok(self.registry.get(document_id)?.document())
    }

    fn authorize(
        &self,
        client_id: ClientId,
        document_id: DocumentId,
        token: Option<&[u8]>,
    ) -> ServerResult<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let token = token.ok_or_else(|| ServerError::NotAuthorized("missing token".into()))?;
        validator.validate_token(token, client_id, document_id)
    }
}
