//! Backlog items and persona obligations

use crate::id::{AgentId, BacklogItemId, ObligationId, PlanId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a backlog item; forward-only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BacklogStatus {
    /// Not started
    Pending,
    /// Claimed by a worker
    InProgress,
    /// Done
    Complete,
}

impl std::fmt::Display for BacklogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Complete => "Complete",
        };
        f.write_str(s)
    }
}

/// A unit of planning work, unique per `(plan_id, backlog_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogItem {
    /// Row identifier
    pub id: BacklogItemId,
    /// Owning plan
    pub plan_id: PlanId,
    /// Plan-scoped key supplied by the planner
    pub backlog_id: String,
    /// Originating plan pass
    #[serde(default)]
    pub pass_index: Option<u32>,
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Lifecycle status
    pub status: BacklogStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Set once on entering `InProgress`
    #[serde(default)]
    pub in_progress_at: Option<DateTime<Utc>>,
    /// Set once on entering `Complete`
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BacklogItem {
    /// Create a pending item
    #[must_use]
    pub fn new(
        plan_id: PlanId,
        backlog_id: impl Into<String>,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BacklogItemId::new(),
            plan_id,
            backlog_id: backlog_id.into(),
            pass_index: None,
            title: title.into(),
            description: String::new(),
            status: BacklogStatus::Pending,
            created_at: now,
            updated_at: now,
            in_progress_at: None,
            completed_at: None,
        }
    }

    /// With originating pass
    #[inline]
    #[must_use]
    pub fn with_pass(mut self, index: u32) -> Self {
        self.pass_index = Some(index);
        self
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Lifecycle of a persona obligation; terminal once not `Open`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObligationStatus {
    /// Outstanding
    Open,
    /// Fulfilled
    Resolved,
    /// Abandoned deliberately
    Dismissed,
}

impl ObligationStatus {
    /// Whether no further transition is allowed
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl std::fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Open => "Open",
            Self::Resolved => "Resolved",
            Self::Dismissed => "Dismissed",
        };
        f.write_str(s)
    }
}

/// A continuity commitment tied to a persona
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaObligation {
    /// Obligation identifier
    pub id: ObligationId,
    /// Owning plan
    pub plan_id: PlanId,
    /// Persona the commitment belongs to
    pub persona: String,
    /// Agent that recorded it, when known
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    /// What must be honored
    pub description: String,
    /// Lifecycle status
    pub status: ObligationStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Set on leaving `Open`
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Actor that resolved or dismissed it
    #[serde(default)]
    pub resolved_by: Option<String>,
    /// Free-form resolution notes
    #[serde(default)]
    pub resolution_notes: Option<String>,
}

impl PersonaObligation {
    /// Create an open obligation
    #[must_use]
    pub fn new(
        plan_id: PlanId,
        persona: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ObligationId::new(),
            plan_id,
            persona: persona.into(),
            agent_id: None,
            description: description.into(),
            status: ObligationStatus::Open,
            created_at: now,
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
        }
    }
}
