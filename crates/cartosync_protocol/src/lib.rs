//! # Cartosync Protocol
//!
//! The shared language between clients and the server:
//!
//! - [`Mutation`] and [`MutationOp`] — named, argument-carrying state
//!   transitions, append-only once issued
//! - [`dispatch`] — the pure mutation dispatcher: `apply` produces a
//!   new document plus the inverse operation, or fails atomically
//! - Wire messages for push, pull and poke
//!
//! Both sides apply mutations through the same dispatcher, which is
//! what makes optimistic local application and authoritative server
//! application agree: replaying an ordered, gapless mutation sequence
//! on an empty document is deterministic.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod dispatch;
mod error;
mod messages;
mod mutation;
mod poke;

pub use dispatch::{apply, Applied};
pub use error::ValidationError;
pub use messages::{
    EntityChange, MutationInfo, MutationResult, Patch, PullReply, PullRequest, PullResponse,
    PushRequest, PushResponse,
};
pub use mutation::{Mutation, MutationOp, Target};
pub use poke::Poke;
