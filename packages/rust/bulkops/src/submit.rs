//! Bulk submission coordinator.
//!
//! Glues the request builder, the remote call, the result classifier,
//! the reconciliation policy, and the summarizer behind one `submit`
//! call, and owns the per-submission state machine:
//!
//! `Idle → Submitting → {AllSuccess | PartialSuccess | AllFailed |
//! TransportError} → Idle`
//!
//! The terminal state is left only on [`acknowledge`] or, when
//! configured, after the auto-dismiss delay. A mutual-exclusion lock
//! rejects overlapping submissions on the same coordinator so the
//! triggering control stays disabled for the call's duration.
//!
//! [`acknowledge`]: BulkCoordinator::acknowledge

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{info, instrument, warn};

use crmrelay_api::ApiClient;
use crmrelay_selector::Selection;
use crmrelay_shared::{
    BatchResult, BulkAction, CrmRelayError, Result, SubmissionId, TargetContext,
};

use crate::classify;
use crate::reconcile::{BatchDisposition, ReconcilePolicy, Reconciliation, reconcile};
use crate::request::{self, Route};
use crate::summary::{Summary, summarize};

// ---------------------------------------------------------------------------
// Phases and reports
// ---------------------------------------------------------------------------

/// Where the coordinator currently is in its submission state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionPhase {
    Idle,
    Submitting { submission: SubmissionId },
    Done {
        submission: SubmissionId,
        disposition: BatchDisposition,
    },
}

/// Everything the presentation layer needs from one finished submission:
/// the canonical per-id outcomes, the local-state mutation decision, and
/// the aggregate summary.
#[derive(Debug, Clone)]
pub struct BulkReport {
    pub submission: SubmissionId,
    pub action: BulkAction,
    pub context: TargetContext,
    pub result: BatchResult,
    pub reconciliation: Reconciliation,
    pub summary: Summary,
}

/// Coordinator construction options.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorOptions {
    pub policy: ReconcilePolicy,
    /// When set, a terminal phase auto-dismisses back to `Idle` after
    /// this delay instead of waiting for `acknowledge()`.
    pub acknowledge_after: Option<Duration>,
}

// ---------------------------------------------------------------------------
// BulkCoordinator
// ---------------------------------------------------------------------------

struct Inner {
    client: ApiClient,
    options: CoordinatorOptions,
    /// Mutual exclusion for submissions; held for the call's duration.
    busy: Mutex<()>,
    phase: watch::Sender<SubmissionPhase>,
}

/// Coordinates bulk relationship operations against the remote API.
///
/// Cheap to clone; clones share the same lock and phase channel.
#[derive(Clone)]
pub struct BulkCoordinator {
    inner: Arc<Inner>,
}

impl BulkCoordinator {
    pub fn new(client: ApiClient, options: CoordinatorOptions) -> Self {
        let (phase, _) = watch::channel(SubmissionPhase::Idle);
        Self {
            inner: Arc::new(Inner {
                client,
                options,
                busy: Mutex::new(()),
                phase,
            }),
        }
    }

    /// Subscribe to submission phase changes.
    pub fn subscribe(&self) -> watch::Receiver<SubmissionPhase> {
        self.inner.phase.subscribe()
    }

    /// Current phase snapshot.
    pub fn phase(&self) -> SubmissionPhase {
        self.inner.phase.borrow().clone()
    }

    /// Leave a terminal phase (result acknowledged by the user).
    pub fn acknowledge(&self) {
        self.inner.phase.send_modify(|phase| {
            if matches!(phase, SubmissionPhase::Done { .. }) {
                *phase = SubmissionPhase::Idle;
            }
        });
    }

    /// Submit one bulk operation for the selected entities.
    ///
    /// Validation failures and an already-running submission return an
    /// error before anything is dispatched. A transport-level failure
    /// does *not*: it comes back as a normal report in which every
    /// submitted id is `Failed` and no local mutation is allowed.
    #[instrument(skip_all, fields(action = action.verb(), selected = selection.len()))]
    pub async fn submit(
        &self,
        action: BulkAction,
        context: &TargetContext,
        selection: &Selection,
    ) -> Result<BulkReport> {
        let _guard = self
            .inner
            .busy
            .try_lock()
            .map_err(|_| CrmRelayError::Busy)?;

        // Aborts before any phase change or dispatch.
        let request = request::build(action, context.clone(), selection)?;

        let submission = SubmissionId::new();
        self.inner.phase.send_replace(SubmissionPhase::Submitting {
            submission: submission.clone(),
        });

        info!(%submission, ids = request.entity_ids.len(), "dispatching bulk operation");

        let result = match request.route() {
            Route::Single => {
                let id = &request.entity_ids[0];
                match self.inner.client.mutate_single(context, action, id).await {
                    Ok(raw) => classify::classify_single(id, action, &raw),
                    Err(e) => self.transport_result(&request.entity_ids, e),
                }
            }
            Route::Batch => {
                match self
                    .inner
                    .client
                    .mutate_batch(context, action, &request.entity_ids)
                    .await
                {
                    Ok(raw) => classify::classify_batch(&request.entity_ids, action, &raw),
                    Err(e) => self.transport_result(&request.entity_ids, e),
                }
            }
        };

        let reconciliation = reconcile(&result, &self.inner.options.policy);
        let summary = summarize(&result, action, context, entity_noun(context));

        info!(
            %submission,
            disposition = ?reconciliation.disposition,
            message = %summary.message,
            "bulk operation classified"
        );

        self.inner.phase.send_replace(SubmissionPhase::Done {
            submission: submission.clone(),
            disposition: reconciliation.disposition,
        });
        self.schedule_auto_dismiss(submission.clone());

        Ok(BulkReport {
            submission,
            action,
            context: context.clone(),
            result,
            reconciliation,
            summary,
        })
    }

    /// Rule 1 of the classification priority: the call rejected, so
    /// every submitted id fails with the transport reason.
    fn transport_result(
        &self,
        submitted: &[crmrelay_shared::EntityId],
        error: CrmRelayError,
    ) -> BatchResult {
        warn!(error = %error, "bulk call failed before per-entity results existed");
        classify::classify_transport_failure(submitted, &error)
    }

    fn schedule_auto_dismiss(&self, submission: SubmissionId) {
        let Some(delay) = self.inner.options.acknowledge_after else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.phase.send_modify(|phase| {
                // Only dismiss the submission this timer belongs to.
                if matches!(phase, SubmissionPhase::Done { submission: s, .. } if *s == submission)
                {
                    *phase = SubmissionPhase::Idle;
                }
            });
        });
    }
}

/// Singular noun for summary messages: membership operations act on
/// contacts; collection operations omit the noun.
fn entity_noun(context: &TargetContext) -> Option<&'static str> {
    match context {
        TargetContext::Relation { .. } => Some("contact"),
        TargetContext::Collection { .. } => None,
    }
}
