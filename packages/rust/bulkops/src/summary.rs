//! Aggregate summarizer — turns a classified batch result into counts
//! and a human-readable message.
//!
//! Non-zero categories are joined with ", ", pluralized, e.g.
//! "2 contacts added successfully, 1 already in sequence".

use serde::Serialize;

use crmrelay_shared::{BatchResult, BulkAction, FailureReason, Outcome, TargetContext};

/// Per-category counts derived from a [`BatchResult`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub success: usize,
    pub already: usize,
    pub not_in_relation: usize,
    pub failed: usize,
    /// Subset of `failed` that was a recognized permission denial.
    pub permission_denied: usize,
}

impl OutcomeCounts {
    pub fn of(result: &BatchResult) -> Self {
        let mut counts = Self::default();
        for (_, outcome) in result.iter() {
            match outcome {
                Outcome::Success => counts.success += 1,
                Outcome::AlreadyInRelation => counts.already += 1,
                Outcome::NotInRelation => counts.not_in_relation += 1,
                Outcome::Failed(reason) => {
                    counts.failed += 1;
                    if matches!(reason, FailureReason::PermissionDenied) {
                        counts.permission_denied += 1;
                    }
                }
            }
        }
        counts
    }
}

/// Counts plus the composed banner message for one submission.
#[derive(Debug, Clone)]
pub struct Summary {
    pub counts: OutcomeCounts,
    pub message: String,
}

/// Compose the aggregate summary for a classified result.
///
/// `noun` is the singular entity noun for the success segment
/// ("contact"); pass `None` to omit it ("2 deleted successfully").
pub fn summarize(
    result: &BatchResult,
    action: BulkAction,
    context: &TargetContext,
    noun: Option<&str>,
) -> Summary {
    let counts = OutcomeCounts::of(result);
    let phrase = context.membership_phrase();
    let mut segments: Vec<String> = Vec::new();

    if counts.success > 0 {
        let subject = match noun {
            Some(noun) => format!("{} {}", counts.success, pluralize(noun, counts.success)),
            None => counts.success.to_string(),
        };
        segments.push(format!("{subject} {} successfully", action.verb_past()));
    }

    if counts.already > 0 {
        if let Some(phrase) = phrase {
            segments.push(format!("{} already {phrase}", counts.already));
        }
    }

    if counts.not_in_relation > 0 {
        if let Some(phrase) = phrase {
            segments.push(format!("{} not {phrase}", counts.not_in_relation));
        }
    }

    if counts.failed > 0 {
        let mut segment = format!("{} failed", counts.failed);
        if counts.permission_denied > 0 {
            segment.push_str(&format!(" ({} permission denied)", counts.permission_denied));
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        segments.push("nothing to do".to_string());
    }

    Summary {
        counts,
        message: segments.join(", "),
    }
}

fn pluralize(noun: &str, count: usize) -> String {
    if count == 1 {
        return noun.to_string();
    }
    if let Some(stem) = noun.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    format!("{noun}s")
}
