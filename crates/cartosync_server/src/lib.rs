//! # Cartosync Server
//!
//! The authoritative side of the sync protocol. A [`SyncServer`] hosts
//! documents, serializes concurrent pushes through a per-document
//! lock, stamps versions, answers pulls with patches or snapshots and
//! pokes subscribers when a document changes.
//!
//! Ordering is last-writer-wins at the entity level: whichever push
//! acquires the lock first applies first, and later mutations see the
//! result. There is no operational transform; the dispatcher adjusts
//! stale preconditions instead.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod document;
mod error;
mod history;
mod poke;
mod server;

pub use auth::{AccessPolicy, AllowAll, TokenValidator};
pub use config::ServerConfig;
pub use document::{DocumentRegistry, PushOutcome, ServerDocument};
pub use error::{ServerError, ServerResult};
pub use history::VersionHistory;
pub use poke::PokeHub;
pub use server::SyncServer;
