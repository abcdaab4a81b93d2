//! Backlog item lifecycle
//!
//! `Pending -> InProgress -> Complete`, forward only, one step at a time.
//! Each timestamp is set exactly once, on entering its state.

use crate::error::TransitionError;
use chrono::{DateTime, Duration, Utc};
use quill_types::{BacklogItem, BacklogItemId, BacklogStatus, Plan, PlanId};
use serde::{Deserialize, Serialize};

/// Statuses reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: BacklogStatus) -> Vec<BacklogStatus> {
    match from {
        BacklogStatus::Pending => vec![BacklogStatus::InProgress],
        BacklogStatus::InProgress => vec![BacklogStatus::Complete],
        BacklogStatus::Complete => vec![],
    }
}

/// Check a transition for an item
///
/// # Errors
///
/// Returns [`TransitionError::Backlog`] for skips, backward moves and
/// self-transitions.
pub fn validate_transition(item: &BacklogItem, to: BacklogStatus) -> Result<(), TransitionError> {
    if allowed_transitions(item.status).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::Backlog {
            backlog_id: item.backlog_id.clone(),
            from: item.status,
            to,
        })
    }
}

/// A status change, observed or derived from timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogTransition {
    /// Item
    pub item_id: BacklogItemId,
    /// Owning plan
    pub plan_id: PlanId,
    /// Plan-scoped key
    pub backlog_id: String,
    /// Previous status; `None` for creation
    pub from: Option<BacklogStatus>,
    /// New status
    pub to: BacklogStatus,
    /// When it happened
    pub at: DateTime<Utc>,
}

fn transition(
    item: &mut BacklogItem,
    to: BacklogStatus,
    now: DateTime<Utc>,
) -> Result<BacklogTransition, TransitionError> {
    validate_transition(item, to)?;
    let from = item.status;
    item.status = to;
    item.updated_at = now;
    match to {
        BacklogStatus::InProgress => item.in_progress_at = Some(now),
        BacklogStatus::Complete => item.completed_at = Some(now),
        BacklogStatus::Pending => {}
    }
    tracing::debug!(
        plan_id = %item.plan_id,
        backlog_id = %item.backlog_id,
        %from,
        %to,
        "backlog item transitioned"
    );
    Ok(BacklogTransition {
        item_id: item.id,
        plan_id: item.plan_id,
        backlog_id: item.backlog_id.clone(),
        from: Some(from),
        to,
        at: now,
    })
}

/// Move a pending item to `InProgress`
///
/// # Errors
///
/// Fails unless the item is `Pending`.
pub fn claim(
    item: &mut BacklogItem,
    now: DateTime<Utc>,
) -> Result<BacklogTransition, TransitionError> {
    transition(item, BacklogStatus::InProgress, now)
}

/// Move an in-progress item to `Complete`
///
/// # Errors
///
/// Fails unless the item is `InProgress`.
pub fn complete(
    item: &mut BacklogItem,
    now: DateTime<Utc>,
) -> Result<BacklogTransition, TransitionError> {
    transition(item, BacklogStatus::Complete, now)
}

/// In progress for longer than the SLA
#[must_use]
pub fn is_stale(item: &BacklogItem, now: DateTime<Utc>, sla: Duration) -> bool {
    stale_since(item, sla).is_some_and(|since| now > since)
}

/// Instant an in-progress item crosses the SLA
///
/// `None` when the item is not in progress, or when the SLA reaches past the
/// representable time range and the item can never go stale.
#[must_use]
pub fn stale_since(item: &BacklogItem, sla: Duration) -> Option<DateTime<Utc>> {
    match (item.status, item.in_progress_at) {
        (BacklogStatus::InProgress, Some(started)) => started.checked_add_signed(sla),
        _ => None,
    }
}

/// The item's plan is gone, or its originating pass no longer resolves
#[must_use]
pub fn is_orphaned(item: &BacklogItem, plan: Option<&Plan>) -> bool {
    match plan {
        None => true,
        Some(plan) if plan.id != item.plan_id => true,
        Some(plan) => item.pass_index.is_some_and(|index| plan.pass(index).is_none()),
    }
}

/// Transitions implied by an item's timestamps, oldest first
#[must_use]
pub fn derived_transitions(item: &BacklogItem) -> Vec<BacklogTransition> {
    let base = |from: Option<BacklogStatus>, to: BacklogStatus, at: DateTime<Utc>| {
        BacklogTransition {
            item_id: item.id,
            plan_id: item.plan_id,
            backlog_id: item.backlog_id.clone(),
            from,
            to,
            at,
        }
    };
    let mut out = vec![base(None, BacklogStatus::Pending, item.created_at)];
    if let Some(at) = item.in_progress_at {
        out.push(base(Some(BacklogStatus::Pending), BacklogStatus::InProgress, at));
    }
    if let Some(at) = item.completed_at {
        out.push(base(Some(BacklogStatus::InProgress), BacklogStatus::Complete, at));
    }
    out
}
