//! Alerts and their stable identifiers
//!
//! Ids are `category[:subject]`, so routing and SLO rules can match a whole
//! category by prefix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix for required phases without an active template (`template-missing:<phase>`)
pub const TEMPLATE_MISSING: &str = "template-missing";
/// In-progress backlog items past their SLA
pub const BACKLOG_STALE: &str = "backlog:stale";
/// Backlog items whose plan or pass no longer resolves
pub const BACKLOG_ORPHANED: &str = "backlog:orphaned";
/// Prefix for plans without active canon (`worldbible:missing:<plan>`)
pub const WORLD_BIBLE_MISSING: &str = "worldbible:missing";
/// Prefix for plans whose canon is out of date (`worldbible:stale:<plan>`)
pub const WORLD_BIBLE_STALE: &str = "worldbible:stale";
/// Failed executions inside the telemetry window
pub const PLANNER_RECENT_FAILURES: &str = "planner:recent-failures";

/// Alert id under a prefix
#[must_use]
pub fn scoped_id(prefix: &str, subject: impl std::fmt::Display) -> String {
    format!("{prefix}:{subject}")
}

/// Whether `id` is `prefix` itself or lies under it, matching whole
/// `:`-separated segments
#[must_use]
pub fn id_has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational
    Info,
    /// Needs attention
    Warning,
    /// Pipeline cannot run correctly
    Critical,
}

/// One anomaly found by the aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Prefix-stable identifier
    pub id: String,
    /// Severity
    pub severity: AlertSeverity,
    /// Short title
    pub title: String,
    /// Details
    pub description: String,
    /// When the condition began
    #[serde(rename = "observedAtUtc")]
    pub observed_at: DateTime<Utc>,
}

impl Alert {
    /// Create an alert
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        severity: AlertSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            title: title.into(),
            description: description.into(),
            observed_at,
        }
    }

    /// Whether the id is `prefix` itself or lies under it
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        id_has_prefix(&self.id, prefix)
    }
}
