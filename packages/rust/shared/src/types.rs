//! Core domain types for crmrelay bulk operations and remote search.
//!
//! Everything downstream of the remote API speaks in these types: raw
//! wire shapes are decoded once, at the boundary, into the canonical
//! [`Outcome`] / [`BatchResult`] model and never inspected again.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EntityId / EntityRef
// ---------------------------------------------------------------------------

/// An opaque server-assigned entity identifier.
///
/// The remote CRM hands these out as strings; crmrelay never parses or
/// recomputes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A selectable item: opaque id plus display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Opaque server identifier.
    pub id: EntityId,
    /// Human-readable label for pickers and summaries.
    pub display_name: String,
    /// Additional display fields (email, company, dates, ...), keyed by
    /// field name. Opaque to everything except client-side refinement.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl EntityRef {
    /// Create a reference with no extra fields.
    pub fn new(id: impl Into<EntityId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            fields: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resources and relation targets
// ---------------------------------------------------------------------------

/// A searchable/mutable CRM resource collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Contacts,
    Companies,
    Emails,
    Sequences,
    Tags,
    Products,
    Appointments,
    Notes,
}

impl Resource {
    /// URL path segment for this resource.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Companies => "companies",
            Self::Emails => "emails",
            Self::Sequences => "sequences",
            Self::Tags => "tags",
            Self::Products => "products",
            Self::Appointments => "appointments",
            Self::Notes => "notes",
        }
    }

    /// Singular noun for human-readable summaries.
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Contacts => "contact",
            Self::Companies => "company",
            Self::Emails => "email",
            Self::Sequences => "sequence",
            Self::Tags => "tag",
            Self::Products => "product",
            Self::Appointments => "appointment",
            Self::Notes => "note",
        }
    }
}

/// The kind of relationship a bulk membership operation mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Contact membership in a follow-up sequence.
    Sequence,
    /// Tag applied to contacts.
    Tag,
    /// Contact-to-contact link.
    Link,
}

impl RelationKind {
    /// URL path segment for the owning collection.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Sequence => "sequences",
            Self::Tag => "tags",
            Self::Link => "links",
        }
    }

    /// Phrase describing membership, used by the summarizer
    /// ("already in sequence", "not tagged", ...).
    pub fn membership_phrase(&self) -> &'static str {
        match self {
            Self::Sequence => "in sequence",
            Self::Tag => "tagged",
            Self::Link => "linked",
        }
    }
}

/// What a batch operation acts on: either membership in a relation with
/// a specific target record, or a resource collection as a whole
/// (batch delete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetContext {
    /// Membership in `kind` relative to `target` (a sequence, tag, or
    /// contact being linked to).
    Relation {
        kind: RelationKind,
        target: EntityId,
    },
    /// A bare resource collection, for operations with no target record.
    Collection { resource: Resource },
}

impl TargetContext {
    pub fn relation(kind: RelationKind, target: impl Into<EntityId>) -> Self {
        Self::Relation {
            kind,
            target: target.into(),
        }
    }

    pub fn collection(resource: Resource) -> Self {
        Self::Collection { resource }
    }

    /// Membership phrase for summaries, if this context has one.
    pub fn membership_phrase(&self) -> Option<&'static str> {
        match self {
            Self::Relation { kind, .. } => Some(kind.membership_phrase()),
            Self::Collection { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Bulk actions
// ---------------------------------------------------------------------------

/// The flavor of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    /// Add entities to a relation (sequence membership, tag, link).
    Add,
    /// Remove entities from a relation.
    Remove,
    /// Delete entities from a collection outright.
    Delete,
}

impl BulkAction {
    /// Add-flavored operations map "already" status tokens to
    /// [`Outcome::AlreadyInRelation`]; remove-flavored ones map them to
    /// [`Outcome::NotInRelation`].
    pub fn is_additive(&self) -> bool {
        matches!(self, Self::Add)
    }

    /// URL path segment for the mutation verb.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Delete => "delete",
        }
    }

    /// Past-tense verb for human-readable summaries.
    pub fn verb_past(&self) -> &'static str {
        match self {
            Self::Add => "added",
            Self::Remove => "removed",
            Self::Delete => "deleted",
        }
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Selection mode for an entity picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// At most one entity may be selected; toggling replaces it.
    Single,
    /// Any number of entities; toggling adds or removes.
    Multiple,
}

/// A remote search query as issued by the search provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text search term, matched server-side.
    #[serde(default)]
    pub free_text: String,
    /// Ids to drop from results client-side (e.g. the current record
    /// during a merge flow).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclusions: BTreeSet<EntityId>,
    /// Extra server-side filter fields, passed through as query params.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_filters: BTreeMap<String, String>,
}

impl SearchQuery {
    pub fn text(free_text: impl Into<String>) -> Self {
        Self {
            free_text: free_text.into(),
            ..Self::default()
        }
    }
}

/// An opaque pagination token issued by the server.
///
/// Passed through unchanged; never recomputed client-side. An absent
/// cursor in a direction means that direction is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Cursor {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One page of search results, already converted from the wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<EntityRef>,
    pub next_cursor: Option<Cursor>,
    pub previous_cursor: Option<Cursor>,
    pub total_count: Option<u64>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a per-entity operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The server rejected this entity with a known permission token.
    PermissionDenied,
    /// The whole call failed before per-entity information existed.
    Transport(String),
    /// The server rejected this entity with a reason string or error code.
    Rejected(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::Transport(msg) => write!(f, "transport failure: {msg}"),
            Self::Rejected(msg) => write!(f, "{msg}"),
        }
    }
}

/// The canonical per-entity result of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The mutation took effect for this entity.
    Success,
    /// Add-flavored op: the entity was already in the relation.
    AlreadyInRelation,
    /// Remove-flavored op: the entity was not in the relation.
    NotInRelation,
    /// The mutation did not take effect; the reason is retained for
    /// display and explicit user retry.
    Failed(FailureReason),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// The classified result of one batch submission.
///
/// Covers every submitted id exactly once — never fewer, never more —
/// in submission order. Constructed only by the result classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    outcomes: Vec<(EntityId, Outcome)>,
}

impl BatchResult {
    /// Build a result from per-id pairs. The classifier guarantees the
    /// one-outcome-per-submitted-id invariant before calling this.
    pub fn from_pairs(outcomes: Vec<(EntityId, Outcome)>) -> Self {
        debug_assert!(
            {
                let mut ids: Vec<_> = outcomes.iter().map(|(id, _)| id).collect();
                ids.sort();
                ids.windows(2).all(|w| w[0] != w[1])
            },
            "duplicate entity id in batch result"
        );
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(oid, _)| oid == id)
            .map(|(_, o)| o)
    }

    /// Iterate outcomes in submission order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Outcome)> {
        self.outcomes.iter().map(|(id, o)| (id, o))
    }

    /// True when every submitted id classified as `Failed`.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|(_, o)| o.is_failed())
    }
}

// ---------------------------------------------------------------------------
// SubmissionId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one bulk submission (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub Uuid);

impl SubmissionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_opaque_passthrough() {
        let id = EntityId::from("c-00417");
        assert_eq!(id.to_string(), "c-00417");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"c-00417\"");
    }

    #[test]
    fn entity_ref_serialization_skips_empty_fields() {
        let entity = EntityRef::new("42", "Ada Lovelace");
        let json = serde_json::to_string(&entity).expect("serialize");
        assert!(!json.contains("fields"));

        let mut with_fields = entity.clone();
        with_fields
            .fields
            .insert("email".into(), serde_json::json!("ada@example.com"));
        let json = serde_json::to_string(&with_fields).expect("serialize");
        assert!(json.contains("ada@example.com"));
    }

    #[test]
    fn action_flavor() {
        assert!(BulkAction::Add.is_additive());
        assert!(!BulkAction::Remove.is_additive());
        assert!(!BulkAction::Delete.is_additive());
        assert_eq!(BulkAction::Delete.verb_past(), "deleted");
    }

    #[test]
    fn batch_result_lookup_preserves_submission_order() {
        let result = BatchResult::from_pairs(vec![
            ("3".into(), Outcome::Success),
            ("1".into(), Outcome::AlreadyInRelation),
            ("2".into(), Outcome::Failed(FailureReason::PermissionDenied)),
        ]);
        assert_eq!(result.len(), 3);
        let order: Vec<&str> = result.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["3", "1", "2"]);
        assert_eq!(result.get(&"1".into()), Some(&Outcome::AlreadyInRelation));
        assert!(!result.all_failed());
    }

    #[test]
    fn all_failed_requires_every_id_failed() {
        let result = BatchResult::from_pairs(vec![
            (
                "10".into(),
                Outcome::Failed(FailureReason::PermissionDenied),
            ),
            (
                "11".into(),
                Outcome::Failed(FailureReason::Rejected("LOCKED".into())),
            ),
        ]);
        assert!(result.all_failed());

        let empty = BatchResult::from_pairs(vec![]);
        assert!(!empty.all_failed());
    }

    #[test]
    fn failure_reason_display() {
        assert_eq!(FailureReason::PermissionDenied.to_string(), "permission denied");
        assert_eq!(
            FailureReason::Rejected("CONTACT_LOCKED".into()).to_string(),
            "CONTACT_LOCKED"
        );
        assert!(
            FailureReason::Transport("connection reset".into())
                .to_string()
                .starts_with("transport failure")
        );
    }

    #[test]
    fn submission_id_roundtrip() {
        let id = SubmissionId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        let parsed: SubmissionId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
