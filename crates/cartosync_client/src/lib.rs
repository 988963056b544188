//! # Cartosync Client
//!
//! The offline-first side of the sync protocol. A [`LocalStore`] holds
//! an optimistic working copy of one document: mutations apply locally
//! and instantly, queue in a pending log, and sync to the server when
//! a [`Transport`] is available. Pulled server changes are rebased
//! under the still-pending local edits, so the visible document is
//! always "confirmed state plus my unconfirmed edits".
//!
//! Undo is first-class: every user action records a moment with its
//! inverse, and undoing issues a regular mutation that syncs like any
//! other. Moments invalidated by concurrent remote edits are discarded
//! rather than applied.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod moment;
mod oplog;
mod store;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use moment::{EntityState, Moment, MomentEntry, MomentLog};
pub use oplog::{PendingLog, SyncCursor};
pub use store::{ChangeOrigin, LocalStore, StoreEvent, SyncStatus};
pub use transport::{MockTransport, Transport};
