//! Raw wire shapes returned by the CRM remote API.
//!
//! The batch endpoints answer with heterogeneous, per-id shapes: a bare
//! status token for some resource kinds, an object with a success flag
//! and/or error code for others, and sometimes no entry at all for an
//! id that was submitted. These shapes are decoded exactly once, here,
//! and handed to the result classifier; nothing past that boundary
//! branches on the raw shape again.

use std::collections::BTreeMap;

use serde::Deserialize;

use crmrelay_shared::{EntityId, EntityRef};

// ---------------------------------------------------------------------------
// List responses
// ---------------------------------------------------------------------------

/// One entity as returned by the list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEntity {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    /// Any remaining fields are display metadata, kept opaque.
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl From<WireEntity> for EntityRef {
    fn from(wire: WireEntity) -> Self {
        Self {
            id: EntityId(wire.id),
            display_name: wire.display_name,
            fields: wire.fields,
        }
    }
}

/// Response body of `GET /v1/{resource}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub items: Vec<WireEntity>,
    /// Opaque token for the next page; absent when exhausted.
    #[serde(default)]
    pub next_cursor: Option<String>,
    /// Opaque token for the previous page; absent on the first page.
    #[serde(default)]
    pub previous_cursor: Option<String>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

// ---------------------------------------------------------------------------
// Batch mutation responses
// ---------------------------------------------------------------------------

/// Per-id status entry: either a bare token from a fixed vocabulary, or
/// an object carrying a success flag and/or error code/message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawEntryStatus {
    Token(String),
    Detail(RawEntryDetail),
}

/// Object form of a per-id status entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawEntryDetail {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response body of the batch mutation endpoints: a map from entity id
/// to status entry. Ids the server chose not to mention are absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RawBatchResponse {
    pub entries: BTreeMap<String, RawEntryStatus>,
}

impl RawBatchResponse {
    pub fn entry(&self, id: &EntityId) -> Option<&RawEntryStatus> {
        self.entries.get(id.as_str())
    }
}

/// Response body of the single-item mutation endpoints: one scalar
/// success/failure with no per-id breakdown.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSingleResponse {
    pub success: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
