//! Bulk relationship operations for crmrelay.
//!
//! One submission flows through four stages: the request builder
//! validates and snapshots the selection, the classifier turns the
//! backend's heterogeneous response into one canonical outcome per
//! submitted id, the reconciliation policy decides what local state may
//! change, and the summarizer renders the aggregate message. The
//! [`BulkCoordinator`] drives the whole pipeline and owns the
//! submission state machine.

pub mod classify;
pub mod reconcile;
pub mod request;
pub mod submit;
pub mod summary;

pub use reconcile::{BatchDisposition, ReconcilePolicy, Reconciliation, reconcile};
pub use request::{BulkRequest, Route};
pub use submit::{BulkCoordinator, BulkReport, CoordinatorOptions, SubmissionPhase};
pub use summary::{OutcomeCounts, Summary, summarize};
