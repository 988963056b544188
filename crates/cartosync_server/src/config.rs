//! Server configuration.

use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum mutations accepted in one push request.
    pub max_push_batch: usize,
    /// Maximum patches returned by one pull; larger deltas come back
    /// as a snapshot instead.
    pub max_pull_batch: usize,
    /// Patches retained per document. Pulls reaching further back get
    /// a snapshot instead.
    pub history_limit: usize,
    /// Whether to require authentication.
    pub require_auth: bool,
    /// Secret key for token validation (if auth enabled).
    pub auth_secret: Option<Vec<u8>>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl ServerConfig {
    /// Sets the maximum push batch size.
    #[must_use]
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets the maximum pull batch size.
    #[must_use]
    pub fn with_max_pull_batch(mut self, size: usize) -> Self {
        self.max_pull_batch = size;
        self
    }

    /// Sets the per-document patch retention.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Enables authentication with the given secret.
    #[must_use]
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }

    /// Sets the token expiration duration.
    #[must_use]
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_push_batch: 100,
            max_pull_batch: 500,
            history_limit: 1000,
            require_auth: false,
            auth_secret: None,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }
}
