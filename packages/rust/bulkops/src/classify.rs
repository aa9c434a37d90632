//! Result classifier — normalizes raw batch responses into the
//! canonical outcome model.
//!
//! The batch endpoints answer in several shapes (token map, object map,
//! scalar, absent entries, or an outright transport failure). This
//! module decodes all of them into exactly one [`Outcome`] per
//! *submitted* id — never fewer, never more — so nothing downstream
//! branches on the raw shape.
//!
//! Classification priority, first match wins:
//! 1. call rejected → every submitted id fails with the transport reason
//! 2. known "already" token → `AlreadyInRelation` / `NotInRelation`,
//!    chosen by the operation's flavor
//! 3. entry denotes an error → `Failed(reason)`
//! 4. no entry, or entry denotes success → `Success`

use crmrelay_api::wire::{RawBatchResponse, RawEntryDetail, RawEntryStatus, RawSingleResponse};
use crmrelay_shared::{BatchResult, BulkAction, CrmRelayError, EntityId, FailureReason, Outcome};

/// Status tokens denoting plain success.
const SUCCESS_TOKENS: &[&str] = &["SUCCESS", "OK"];

/// Status tokens denoting "the entity was already in / not in the
/// relation"; the operation flavor decides which variant applies.
const ALREADY_TOKENS: &[&str] = &[
    "ALREADY_IN_SEQUENCE",
    "ALREADY_TAGGED",
    "ALREADY_LINKED",
    "DUPLICATE",
];

/// Error tokens recognized as permission denials.
const PERMISSION_TOKENS: &[&str] = &["NO_PERMISSION", "PERMISSION_DENIED"];

/// Classify a per-id batch response against the submitted id list.
///
/// Ids absent from the response classify as `Success` (observed backend
/// behavior for ids it processed without comment); response entries for
/// ids that were never submitted are ignored.
pub fn classify_batch(
    submitted: &[EntityId],
    action: BulkAction,
    raw: &RawBatchResponse,
) -> BatchResult {
    let outcomes = submitted
        .iter()
        .map(|id| (id.clone(), outcome_for_entry(action, raw.entry(id))))
        .collect();
    BatchResult::from_pairs(outcomes)
}

/// Classify a single-item scalar response into the same canonical shape.
pub fn classify_single(
    submitted: &EntityId,
    action: BulkAction,
    raw: &RawSingleResponse,
) -> BatchResult {
    let outcome = if raw.success {
        Outcome::Success
    } else {
        match &raw.code {
            Some(code) if is_already_token(code) => already_variant(action),
            Some(code) if is_permission_token(code) => {
                Outcome::Failed(FailureReason::PermissionDenied)
            }
            Some(code) => Outcome::Failed(FailureReason::Rejected(code.clone())),
            None => {
                let reason = raw
                    .message
                    .clone()
                    .unwrap_or_else(|| "operation failed".to_string());
                Outcome::Failed(FailureReason::Rejected(reason))
            }
        }
    };
    BatchResult::from_pairs(vec![(submitted.clone(), outcome)])
}

/// The call itself failed before any per-id information existed: every
/// submitted id fails with the transport reason.
pub fn classify_transport_failure(submitted: &[EntityId], error: &CrmRelayError) -> BatchResult {
    let reason = FailureReason::Transport(error.to_string());
    let outcomes = submitted
        .iter()
        .map(|id| (id.clone(), Outcome::Failed(reason.clone())))
        .collect();
    BatchResult::from_pairs(outcomes)
}

fn outcome_for_entry(action: BulkAction, entry: Option<&RawEntryStatus>) -> Outcome {
    match entry {
        // Absent id: implicit success. A distinct "not found" vocabulary
        // would land here if the backend ever grows one.
        None => Outcome::Success,
        Some(RawEntryStatus::Token(token)) => classify_token(action, token),
        Some(RawEntryStatus::Detail(detail)) => classify_detail(action, detail),
    }
}

fn classify_token(action: BulkAction, token: &str) -> Outcome {
    let token = token.trim();
    if is_already_token(token) {
        return already_variant(action);
    }
    if is_permission_token(token) {
        return Outcome::Failed(FailureReason::PermissionDenied);
    }
    if SUCCESS_TOKENS.iter().any(|t| token.eq_ignore_ascii_case(t)) {
        return Outcome::Success;
    }
    // Unknown tokens are failures carrying the token as the reason.
    Outcome::Failed(FailureReason::Rejected(token.to_string()))
}

fn classify_detail(action: BulkAction, detail: &RawEntryDetail) -> Outcome {
    if let Some(code) = &detail.code {
        if is_already_token(code) {
            return already_variant(action);
        }
        if is_permission_token(code) {
            return Outcome::Failed(FailureReason::PermissionDenied);
        }
        return Outcome::Failed(FailureReason::Rejected(code.clone()));
    }

    match (detail.success, &detail.message) {
        (Some(true), _) | (None, None) => Outcome::Success,
        (_, Some(message)) => Outcome::Failed(FailureReason::Rejected(message.clone())),
        (Some(false), None) => {
            Outcome::Failed(FailureReason::Rejected("operation failed".to_string()))
        }
    }
}

fn already_variant(action: BulkAction) -> Outcome {
    if action.is_additive() {
        Outcome::AlreadyInRelation
    } else {
        Outcome::NotInRelation
    }
}

fn is_already_token(token: &str) -> bool {
    ALREADY_TOKENS.iter().any(|t| token.eq_ignore_ascii_case(t))
}

fn is_permission_token(token: &str) -> bool {
    PERMISSION_TOKENS
        .iter()
        .any(|t| token.eq_ignore_ascii_case(t))
}
