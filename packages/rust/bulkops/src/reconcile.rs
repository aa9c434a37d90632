//! Reconciliation policy — decides which local state to mutate from a
//! classified batch result.
//!
//! Terminal-good outcomes (success, and by default the "already"
//! variants) have their entities removed from or updated in the local
//! collection being acted on. Failed entities stay visible, annotated
//! with their reason, for inspection and explicit retry. A wholly
//! failed batch mutates nothing, so a blanket rejection (e.g. a
//! permission error on everything) cannot drift the UI away from the
//! server.

use crmrelay_shared::{BatchResult, EntityId, FailureReason, Outcome};

/// Per-operation reconciliation knobs.
#[derive(Debug, Clone)]
pub struct ReconcilePolicy {
    /// Whether `AlreadyInRelation` / `NotInRelation` count as
    /// terminal-good for local mutation. Call sites that must keep the
    /// "already" set distinct (e.g. to avoid double-counting) set this
    /// to false; counts stay separate either way.
    pub already_is_terminal_good: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            already_is_terminal_good: true,
        }
    }
}

/// Terminal disposition of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDisposition {
    /// Every submitted id ended terminal-good.
    AllSuccess,
    /// A mix: mutate the good subset, surface a combined warning.
    PartialSuccess,
    /// Every submitted id failed; mutate nothing, surface one error.
    AllFailed,
    /// The call itself failed; mutate nothing.
    TransportError,
}

impl BatchDisposition {
    /// True when no local state may be mutated for this submission.
    pub fn mutates_nothing(&self) -> bool {
        matches!(self, Self::AllFailed | Self::TransportError)
    }
}

/// The reconciliation decision for one batch result.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub disposition: BatchDisposition,
    /// Ids to remove from (or update in) the local collection,
    /// in submission order.
    pub remove_ids: Vec<EntityId>,
    /// Ids to keep visible, annotated with their failure reason,
    /// in submission order.
    pub failed: Vec<(EntityId, FailureReason)>,
}

/// Apply `policy` to a classified result.
pub fn reconcile(result: &BatchResult, policy: &ReconcilePolicy) -> Reconciliation {
    let mut remove_ids = Vec::new();
    let mut failed = Vec::new();
    let mut transport = false;

    for (id, outcome) in result.iter() {
        match outcome {
            Outcome::Success => remove_ids.push(id.clone()),
            Outcome::AlreadyInRelation | Outcome::NotInRelation => {
                if policy.already_is_terminal_good {
                    remove_ids.push(id.clone());
                }
            }
            Outcome::Failed(reason) => {
                if matches!(reason, FailureReason::Transport(_)) {
                    transport = true;
                }
                failed.push((id.clone(), reason.clone()));
            }
        }
    }

    let disposition = if result.all_failed() {
        if transport {
            BatchDisposition::TransportError
        } else {
            BatchDisposition::AllFailed
        }
    } else if failed.is_empty() && remove_ids.len() == result.len() {
        BatchDisposition::AllSuccess
    } else {
        BatchDisposition::PartialSuccess
    };

    if disposition.mutates_nothing() {
        remove_ids.clear();
    }

    Reconciliation {
        disposition,
        remove_ids,
        failed,
    }
}
