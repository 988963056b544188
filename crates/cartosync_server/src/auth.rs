//! Token-based authentication using HMAC-SHA256.
//!
//! ## Token format
//!
//! - 16 bytes: client id
//! - 16 bytes: document id
//! - 8 bytes: timestamp (Unix millis, big-endian)
//! - 32 bytes: HMAC-SHA256 signature
//!
//! Total: 72 bytes, base64-encoded for transport.

use crate::error::{ServerError, ServerResult};
use cartosync_model::{ClientId, DocumentId};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_LEN: usize = 72;
const SIGNED_LEN: usize = 40;

/// Decides which clients may read or write which documents.
///
/// Consulted before any push or pull, after token validation. Policy
/// decisions beyond this check (sharing models, roles) live outside
/// the sync server.
pub trait AccessPolicy: Send + Sync {
    /// May `client` pull `document`?
    fn can_read(&self, client: ClientId, document: DocumentId) -> bool;

    /// May `client` push to `document`?
    fn can_write(&self, client: ClientId, document: DocumentId) -> bool;
}

/// The default policy: every client may read and write everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_read(&self, _client: ClientId, _document: DocumentId) -> bool {
        true
    }

    fn can_write(&self, _client: ClientId, _document: DocumentId) -> bool {
        true
    }
}

/// Issues and validates access tokens.
#[derive(Clone)]
pub struct TokenValidator {
    secret: Vec<u8>,
    token_expiry: Duration,
}

impl TokenValidator {
    /// Creates a validator over a shared secret.
    #[must_use]
    pub fn new(secret: Vec<u8>, token_expiry: Duration) -> Self {
        Self {
            secret,
            token_expiry,
        }
    }

    /// Creates a token granting `client_id` access to `document_id`.
    #[must_use]
    pub fn create_token(&self, client_id: ClientId, document_id: DocumentId) -> Vec<u8> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let mut data = Vec::with_capacity(SIGNED_LEN);
        data.extend_from_slice(client_id.as_uuid().as_bytes());
        data.extend_from_slice(document_id.as_uuid().as_bytes());
        data.extend_from_slice(&timestamp.to_be_bytes());

        let signature = self.sign(&data);

        let mut token = data;
        token.extend_from_slice(&signature);
        token
    }

    /// Validates a token against the client and document of a request.
    pub fn validate_token(
        &self,
        token: &[u8],
        client_id: ClientId,
        document_id: DocumentId,
    ) -> ServerResult<()> {
        if token.len() != TOKEN_LEN {
            return Err(ServerError::NotAuthorized("invalid token length".into()));
        }

        if token[0..16] != *client_id.as_uuid().as_bytes() {
            return Err(ServerError::NotAuthorized("client id mismatch".into()));
        }
        if token[16..32] != *document_id.as_uuid().as_bytes() {
            return Err(ServerError::NotAuthorized("document id mismatch".into()));
        }

        let expected = self.sign(&token[0..SIGNED_LEN]);
        if token[SIGNED_LEN..] != expected {
            return Err(ServerError::NotAuthorized("invalid signature".into()));
        }

        let timestamp_bytes: [u8; 8] = token[32..SIGNED_LEN]
            .try_into()
            .map_err(|_| ServerError::NotAuthorized("invalid token".into()))?;
        let timestamp = u64::from_be_bytes(timestamp_bytes);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        if now > timestamp + self.token_expiry.as_millis() as u64 {
            return Err(ServerError::NotAuthorized("token expired".into()));
        }

        Ok(())
    }

    fn sign(&self, data: &[u8]) -> [u8; 32] {
        // HMAC accepts keys of any length.
        #[allow(clippy::expect_used)]
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac key");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}
