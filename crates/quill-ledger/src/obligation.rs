//! Persona obligation lifecycle
//!
//! `Open -> Resolved` or `Open -> Dismissed`. Both outcomes are terminal.

use crate::error::TransitionError;
use chrono::{DateTime, Duration, Utc};
use quill_types::{ObligationStatus, PersonaObligation};

/// Statuses reachable from `from`
#[must_use]
pub fn allowed_transitions(from: ObligationStatus) -> Vec<ObligationStatus> {
    match from {
        ObligationStatus::Open => vec![ObligationStatus::Resolved, ObligationStatus::Dismissed],
        ObligationStatus::Resolved | ObligationStatus::Dismissed => vec![],
    }
}

fn close(
    obligation: &mut PersonaObligation,
    to: ObligationStatus,
    action: &'static str,
    actor: &str,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if !allowed_transitions(obligation.status).contains(&to) {
        return Err(TransitionError::ObligationTerminal {
            id: obligation.id,
            status: obligation.status,
            action,
        });
    }
    obligation.status = to;
    obligation.resolved_at = Some(now);
    obligation.resolved_by = Some(actor.to_string());
    obligation.resolution_notes = notes;
    tracing::debug!(
        obligation_id = %obligation.id,
        persona = %obligation.persona,
        status = %to,
        "obligation closed"
    );
    Ok(())
}

/// Mark an open obligation as fulfilled
///
/// # Errors
///
/// Fails if the obligation is already terminal.
pub fn resolve(
    obligation: &mut PersonaObligation,
    actor: &str,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    close(obligation, ObligationStatus::Resolved, "resolved", actor, notes, now)
}

/// Drop an open obligation without fulfilling it
///
/// # Errors
///
/// Fails if the obligation is already terminal.
pub fn dismiss(
    obligation: &mut PersonaObligation,
    actor: &str,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    close(obligation, ObligationStatus::Dismissed, "dismissed", actor, notes, now)
}

/// Open for longer than `window`
#[must_use]
pub fn is_aging(obligation: &PersonaObligation, now: DateTime<Utc>, window: Duration) -> bool {
    obligation.status == ObligationStatus::Open && now - obligation.created_at > window
}
