//! Health report
//!
//! The serialized shape is a fixed downstream contract:
//! `{status, planners[], backlog{...}, worldBible{plans[]}, telemetry{...}, warnings[], alerts[]}`.

use crate::alert::Alert;
use chrono::{DateTime, Utc};
use quill_ledger::BacklogTransition;
use quill_types::{
    BacklogItemId, CorrelationIds, ExecutionId, ExecutionOutcome, ObligationId, ObligationStatus,
    PhaseKind, PlanId, WorldBibleId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rolled-up status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Nothing to report
    Healthy,
    /// Anomalies that do not stop the pipeline
    Degraded,
    /// A required template is missing
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Healthy => "Healthy",
            Self::Degraded => "Degraded",
            Self::Critical => "Critical",
        };
        f.write_str(s)
    }
}

/// Template classification for one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateState {
    /// An active template exists
    Active,
    /// Templates exist but none is active
    Inactive,
    /// No template registered
    Missing,
}

/// Template status of one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerStatus {
    /// Phase
    pub phase: PhaseKind,
    /// Classification
    pub state: TemplateState,
    /// Name of the template in use, or of the latest inactive one
    pub template_name: Option<String>,
    /// Whether the phase must have an active template
    pub required: bool,
}

/// Backlog counts for one plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanBacklog {
    /// Plan
    pub plan_id: PlanId,
    /// Pending items
    pub pending: usize,
    /// In-progress items
    pub in_progress: usize,
    /// Completed items
    pub complete: usize,
    /// Most recent item update
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// In-progress item past its SLA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleBacklogItem {
    /// Item
    pub item_id: BacklogItemId,
    /// Plan
    pub plan_id: PlanId,
    /// Plan-scoped key
    pub backlog_id: String,
    /// Title
    pub title: String,
    /// Claim time
    pub in_progress_at: DateTime<Utc>,
    /// Instant the SLA was crossed
    pub stale_since: DateTime<Utc>,
    /// Minutes in progress at evaluation time
    pub minutes_in_progress: i64,
}

/// Item whose plan or pass no longer resolves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedBacklogItem {
    /// Item
    pub item_id: BacklogItemId,
    /// Plan the item points at
    pub plan_id: PlanId,
    /// Plan-scoped key
    pub backlog_id: String,
    /// Why it is orphaned
    pub reason: String,
}

/// An iterative planning execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    /// Execution
    pub execution_id: ExecutionId,
    /// Plan
    pub plan_id: PlanId,
    /// Iteration index
    pub iteration_index: u32,
    /// Outcome
    pub outcome: ExecutionOutcome,
    /// Completion time
    pub occurred_at: DateTime<Utc>,
}

/// A closed obligation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLog {
    /// Obligation
    pub obligation_id: ObligationId,
    /// Plan
    pub plan_id: PlanId,
    /// Persona
    pub persona: String,
    /// Terminal status reached
    pub action: ObligationStatus,
    /// Who closed it
    pub actor: Option<String>,
    /// Notes
    pub notes: Option<String>,
    /// When
    pub at: DateTime<Utc>,
}

/// Backlog section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogHealth {
    /// Pending items, all plans
    pub pending: usize,
    /// In-progress items, all plans
    pub in_progress: usize,
    /// Completed items, all plans
    pub complete: usize,
    /// Per-plan counts
    pub plans: Vec<PlanBacklog>,
    /// Items past their SLA
    pub stale_items: Vec<StaleBacklogItem>,
    /// Items without a plan or pass
    pub orphaned_items: Vec<OrphanedBacklogItem>,
    /// Latest transitions, newest first
    pub recent_transitions: Vec<BacklogTransition>,
    /// Iterative executions in the window, newest first
    pub telemetry_events: Vec<TelemetryEvent>,
    /// Closed obligations, newest first
    pub action_logs: Vec<ActionLog>,
}

/// World bible classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BibleState {
    /// Recently updated
    Fresh,
    /// Newest active entry older than the window
    Stale,
    /// No active entries (or no bible)
    Missing,
}

/// World bible status for one plan branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanWorldBible {
    /// Plan
    pub plan_id: PlanId,
    /// Bible, when one exists
    pub bible_id: Option<WorldBibleId>,
    /// Domain
    pub domain: Option<String>,
    /// Branch
    pub branch_slug: Option<String>,
    /// Active entries
    pub active_entries: usize,
    /// Newest active entry update
    pub last_updated_at: Option<DateTime<Utc>>,
    /// Classification
    pub state: BibleState,
}

/// World bible section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldBibleHealth {
    /// One row per bible, plus one per plan without any
    pub plans: Vec<PlanWorldBible>,
}

/// A failed execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    /// Execution
    pub execution_id: ExecutionId,
    /// Plan
    pub plan_id: PlanId,
    /// Phase
    pub phase: PhaseKind,
    /// Error text
    pub error: Option<String>,
    /// Start of the last reply
    pub snippet: Option<String>,
    /// Correlation ids of the last exchange
    pub correlation: Option<CorrelationIds>,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

/// Execution telemetry section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryHealth {
    /// Start of the window
    pub window_start: DateTime<Utc>,
    /// Executions in the window
    pub total: usize,
    /// Counts by outcome
    pub outcomes: BTreeMap<String, usize>,
    /// Counts by critique budget status
    pub critique: BTreeMap<String, usize>,
    /// Most recent failures, newest first
    pub recent_failures: Vec<FailureSummary>,
}

/// Point-in-time health of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Rolled-up status
    pub status: HealthStatus,
    /// Evaluation time
    pub generated_at: DateTime<Utc>,
    /// Template status per phase
    pub planners: Vec<PlannerStatus>,
    /// Backlog section
    pub backlog: BacklogHealth,
    /// World bible section
    pub world_bible: WorldBibleHealth,
    /// Telemetry section
    pub telemetry: TelemetryHealth,
    /// Non-alerting observations
    pub warnings: Vec<String>,
    /// One alert per anomaly
    pub alerts: Vec<Alert>,
}

impl HealthReport {
    /// Alerts under an id prefix
    pub fn alerts_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a Alert> + 'a {
        self.alerts.iter().filter(move |a| a.has_prefix(prefix))
    }
}
