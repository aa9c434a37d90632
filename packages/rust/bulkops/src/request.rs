//! Operation request builder.
//!
//! Turns a selection snapshot plus action and target context into the
//! payload for the batch endpoints, rejecting malformed requests before
//! anything is dispatched.

use crmrelay_selector::Selection;
use crmrelay_shared::{BulkAction, CrmRelayError, EntityId, Result, TargetContext};

/// Which endpoint a request should go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The batch endpoint, with a per-id status map response.
    Batch,
    /// The dedicated single-item endpoint, with a scalar response.
    /// The result is normalized into the same canonical shape, so
    /// callers downstream stay endpoint-agnostic.
    Single,
}

/// A validated, ready-to-dispatch batch operation.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub context: TargetContext,
    /// Ids in selection order.
    pub entity_ids: Vec<EntityId>,
}

impl BulkRequest {
    /// Route size-1 selections to the single-item endpoint.
    pub fn route(&self) -> Route {
        if self.entity_ids.len() == 1 {
            Route::Single
        } else {
            Route::Batch
        }
    }
}

/// Build a [`BulkRequest`] from the current selection.
///
/// Fails with a validation error — before any dispatch — when the
/// selection is empty or the action does not fit the context (membership
/// actions need a relation target, deletes need a bare collection).
pub fn build(
    action: BulkAction,
    context: TargetContext,
    selection: &Selection,
) -> Result<BulkRequest> {
    if selection.is_empty() {
        return Err(CrmRelayError::validation(
            "cannot submit a bulk operation with an empty selection",
        ));
    }

    match (&action, &context) {
        (BulkAction::Delete, TargetContext::Relation { .. }) => {
            return Err(CrmRelayError::validation(
                "delete operates on a collection, not a relation target",
            ));
        }
        (BulkAction::Add | BulkAction::Remove, TargetContext::Collection { .. }) => {
            return Err(CrmRelayError::validation(
                "membership operations require a relation target",
            ));
        }
        _ => {}
    }

    Ok(BulkRequest {
        action,
        context,
        entity_ids: selection.ids(),
    })
}
