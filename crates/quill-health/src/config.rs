//! Health and alerting configuration

use crate::alert::id_has_prefix;
use chrono::Duration;
use quill_types::PhaseKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Convert configured minutes to a duration, saturating on overflow
pub(crate) fn minutes(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_minutes)
        .unwrap_or(Duration::MAX)
}

/// Thresholds for [`crate::HealthAggregator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthConfig {
    /// Minutes a backlog item may stay in progress
    pub backlog_sla_minutes: u64,
    /// Minutes before a world bible's newest active entry is stale
    pub world_bible_freshness_minutes: u64,
    /// Minutes an obligation may stay open before it is reported as aging
    pub obligation_aging_minutes: u64,
    /// Minutes of execution history to read
    pub telemetry_window_minutes: u64,
    /// Failures listed in the report
    pub recent_failure_limit: usize,
    /// Backlog transitions listed in the report
    pub recent_transition_limit: usize,
    /// Reply characters kept in failure snippets
    pub snippet_chars: usize,
    /// Phases that must have an active template
    pub required_phases: Vec<PhaseKind>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            backlog_sla_minutes: 60,
            world_bible_freshness_minutes: 6 * 60,
            obligation_aging_minutes: 72 * 60,
            telemetry_window_minutes: 24 * 60,
            recent_failure_limit: 5,
            recent_transition_limit: 20,
            snippet_chars: 240,
            required_phases: PhaseKind::ALL.to_vec(),
        }
    }
}

impl HealthConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a backlog SLA
    #[inline]
    #[must_use]
    pub fn with_backlog_sla_minutes(mut self, minutes: u64) -> Self {
        self.backlog_sla_minutes = minutes;
        self
    }

    /// With a world bible freshness window
    #[inline]
    #[must_use]
    pub fn with_world_bible_freshness_minutes(mut self, minutes: u64) -> Self {
        self.world_bible_freshness_minutes = minutes;
        self
    }

    /// With an obligation aging window
    #[inline]
    #[must_use]
    pub fn with_obligation_aging_minutes(mut self, minutes: u64) -> Self {
        self.obligation_aging_minutes = minutes;
        self
    }

    /// With the phases that must have an active template
    #[inline]
    #[must_use]
    pub fn with_required_phases(mut self, phases: Vec<PhaseKind>) -> Self {
        self.required_phases = phases;
        self
    }

    pub(crate) fn backlog_sla(&self) -> Duration {
        minutes(self.backlog_sla_minutes)
    }

    pub(crate) fn freshness_window(&self) -> Duration {
        minutes(self.world_bible_freshness_minutes)
    }

    pub(crate) fn aging_window(&self) -> Duration {
        minutes(self.obligation_aging_minutes)
    }

    pub(crate) fn telemetry_window(&self) -> Duration {
        minutes(self.telemetry_window_minutes)
    }
}

/// Routing, SLO and debounce settings for [`crate::AlertPublisher`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlertConfig {
    /// Publishing switch
    pub enabled: bool,
    /// Routing key by exact alert id
    pub routes: BTreeMap<String, String>,
    /// Routing key for alerts without an exact route
    pub default_route: String,
    /// SLO thresholds in minutes, by exact alert id or id prefix
    pub slo_minutes: BTreeMap<String, u64>,
    /// Minimum minutes between two publications of the same alert id
    pub debounce_minutes: u64,
    /// Webhook URL used for routing keys without their own endpoint
    pub endpoint: Option<String>,
    /// Webhook URL by routing key
    pub endpoints: BTreeMap<String, String>,
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            routes: BTreeMap::new(),
            default_route: "default".to_string(),
            slo_minutes: BTreeMap::new(),
            debounce_minutes: 15,
            endpoint: None,
            endpoints: BTreeMap::new(),
            timeout_secs: 10,
        }
    }
}

impl AlertConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disabled publisher
    #[inline]
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Route an exact alert id to a routing key
    #[inline]
    #[must_use]
    pub fn with_route(
        mut self,
        alert_id: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        self.routes.insert(alert_id.into(), routing_key.into());
        self
    }

    /// With the fallback routing key
    #[inline]
    #[must_use]
    pub fn with_default_route(mut self, routing_key: impl Into<String>) -> Self {
        self.default_route = routing_key.into();
        self
    }

    /// SLO threshold for an alert id or id prefix
    #[inline]
    #[must_use]
    pub fn with_slo(mut self, id_or_prefix: impl Into<String>, minutes: u64) -> Self {
        self.slo_minutes.insert(id_or_prefix.into(), minutes);
        self
    }

    /// With a debounce window
    #[inline]
    #[must_use]
    pub fn with_debounce_minutes(mut self, minutes: u64) -> Self {
        self.debounce_minutes = minutes;
        self
    }

    /// Routing key for an alert id
    #[must_use]
    pub fn route_for(&self, alert_id: &str) -> &str {
        self.routes
            .get(alert_id)
            .map_or(self.default_route.as_str(), String::as_str)
    }

    /// SLO threshold for an alert id: exact match first, then the longest
    /// configured prefix of whole id segments
    #[must_use]
    pub fn slo_for(&self, alert_id: &str) -> Option<u64> {
        if let Some(minutes) = self.slo_minutes.get(alert_id) {
            return Some(*minutes);
        }
        self.slo_minutes
            .iter()
            .filter(|(prefix, _)| id_has_prefix(alert_id, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, minutes)| *minutes)
    }

    pub(crate) fn debounce_window(&self) -> Duration {
        minutes(self.debounce_minutes)
    }
}
