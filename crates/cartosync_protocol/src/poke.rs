//! The poke message.

use cartosync_model::{DocumentId, Version};
use serde::{Deserialize, Serialize};

/// A hint that a document changed and subscribers should pull.
///
/// Pokes carry no document content. Losing one costs latency, never
/// correctness: the next pull delivers everything regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poke {
    /// The document that changed.
    pub document_id: DocumentId,
    /// The version the change produced, when known. Purely advisory;
    /// clients must not treat it as a pull cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}
