//! Subcommand implementations

use crate::config::QuillConfig;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use quill_health::{
    AlertPublisher, HealthAggregator, HealthReport, HealthStatus, HttpAlertSink, PublishSummary,
};
use quill_store::{InMemoryStore, StoreSnapshot};
use quill_types::{Clock, ManualClock, PhaseKind, SystemClock};
use quill_validator::{ResponseValidator, ValidationResult};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

/// Process exit codes
pub(crate) mod exit {
    pub(crate) const OK: i32 = 0;
    pub(crate) const REJECTED: i32 = 1;
    pub(crate) const DEGRADED: i32 = 1;
    pub(crate) const CRITICAL: i32 = 2;
}

/// Validate a reply file for a phase
pub(crate) fn validate(
    phase: &str,
    file: &Path,
    terms: &[String],
) -> anyhow::Result<ValidationResult> {
    let phase: PhaseKind = phase.parse()?;
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading reply {}", file.display()))?;
    if !phase.is_structured() && terms.is_empty() {
        tracing::warn!("scene reply validated without salient terms; the gate passes trivially");
    }
    Ok(ResponseValidator::new().validate(phase, &raw, terms)?)
}

pub(crate) fn render_validation(result: &ValidationResult) -> String {
    let mut out = String::new();
    if result.is_passed() {
        let _ = writeln!(out, "PASSED {}", result.phase);
    } else {
        let _ = writeln!(out, "FAILED {}", result.phase);
        for detail in result.details() {
            let _ = writeln!(out, "  - {detail}");
        }
    }
    out
}

/// Compute health over a store snapshot, evaluated at `now` when given
pub(crate) async fn health(
    snapshot: &Path,
    config: &QuillConfig,
    now: Option<DateTime<Utc>>,
) -> anyhow::Result<HealthReport> {
    let snapshot = StoreSnapshot::load(snapshot)
        .with_context(|| format!("loading snapshot {}", snapshot.display()))?;
    let store = Arc::new(InMemoryStore::from_snapshot(snapshot)?);
    let clock: Arc<dyn Clock> = match now {
        Some(at) => Arc::new(ManualClock::at(at)),
        None => Arc::new(SystemClock),
    };
    let report = HealthAggregator::new(store)
        .with_clock(clock)
        .with_config(config.health.clone())
        .compute()
        .await?;
    Ok(report)
}

/// Send the report's alerts to the configured webhook(s)
pub(crate) async fn publish(
    report: &HealthReport,
    config: &QuillConfig,
) -> anyhow::Result<PublishSummary> {
    if config.alerts.endpoint.is_none() && config.alerts.endpoints.is_empty() {
        bail!("no alert endpoint configured; set alerts.endpoint or alerts.endpoints");
    }
    let sink = Arc::new(HttpAlertSink::from_config(&config.alerts)?);
    let publisher = AlertPublisher::new(config.alerts.clone(), sink);
    Ok(publisher.publish(&report.alerts).await)
}

pub(crate) fn render_report(report: &HealthReport) -> String {
    let mut out = String::new();
    let as_of = report.generated_at.to_rfc3339();
    let _ = writeln!(out, "Pipeline health: {} (as of {as_of})", report.status);

    let _ = writeln!(out, "\nTemplates:");
    for planner in &report.planners {
        let required = if planner.required { "" } else { " (optional)" };
        let name = planner.template_name.as_deref().unwrap_or("-");
        let phase = planner.phase.to_string();
        let _ = writeln!(out, "  {phase:<17} {:?}{required}  {name}", planner.state);
    }

    let backlog = &report.backlog;
    let _ = writeln!(
        out,
        "\nBacklog: {} pending, {} in progress, {} complete ({} stale, {} orphaned)",
        backlog.pending,
        backlog.in_progress,
        backlog.complete,
        backlog.stale_items.len(),
        backlog.orphaned_items.len()
    );

    let _ = writeln!(out, "\nWorld bibles:");
    for row in &report.world_bible.plans {
        let branch = match (&row.domain, &row.branch_slug) {
            (Some(domain), Some(branch)) => format!("{domain}/{branch}"),
            _ => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "  {} {branch}: {:?}, {} active",
            row.plan_id, row.state, row.active_entries
        );
    }

    let telemetry = &report.telemetry;
    let _ = writeln!(
        out,
        "\nExecutions since {}: {} total, {} recent failure(s)",
        telemetry.window_start.to_rfc3339(),
        telemetry.total,
        telemetry.recent_failures.len()
    );

    if !report.warnings.is_empty() {
        let _ = writeln!(out, "\nWarnings:");
        for warning in &report.warnings {
            let _ = writeln!(out, "  - {warning}");
        }
    }
    if !report.alerts.is_empty() {
        let _ = writeln!(out, "\nAlerts:");
        for alert in &report.alerts {
            let _ = writeln!(out, "  [{:?}] {}: {}", alert.severity, alert.id, alert.description);
        }
    }
    out
}

pub(crate) fn health_exit_code(status: HealthStatus) -> i32 {
    match status {
        HealthStatus::Healthy => exit::OK,
        HealthStatus::Degraded => exit::DEGRADED,
        HealthStatus::Critical => exit::CRITICAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{PhaseTemplate, Plan};
    use std::io::Write;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn validate_reports_schema_violations() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"title": "Ashfall"}}"#).unwrap();

        let result = validate("vision", file.path(), &[]).unwrap();
        assert!(!result.is_passed());
        let text = render_validation(&result);
        assert!(text.starts_with("FAILED Vision"));
        assert!(text.contains("  - "));
    }

    #[test]
    fn validate_scene_with_terms() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Ash drifted over the Hollow Market at dusk.").unwrap();
        let terms = vec!["Hollow Market".to_string(), "Ashfall Prologue".to_string()];

        let result = validate("scene", file.path(), &terms).unwrap();
        assert_eq!(result.missing_terms(), ["Ashfall Prologue".to_string()]);
    }

    #[test]
    fn unknown_phase_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(validate("epilogue", file.path(), &[]).is_err());
    }

    #[tokio::test]
    async fn health_from_snapshot() {
        let plan = Plan::new("Emberfall Saga", "", at());
        let snapshot = StoreSnapshot {
            plans: vec![plan],
            templates: vec![
                PhaseTemplate::new(PhaseKind::Vision, "vision", "Draft", at()).inactive(),
            ],
            ..StoreSnapshot::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        snapshot.save(&path).unwrap();

        let report = health(&path, &QuillConfig::default(), Some(at())).await.unwrap();
        assert_eq!(report.status, HealthStatus::Critical);
        assert_eq!(health_exit_code(report.status), exit::CRITICAL);

        let text = render_report(&report);
        assert!(text.starts_with("Pipeline health: Critical"));
        assert!(text.contains("template-missing:vision"));
    }

    #[tokio::test]
    async fn publish_requires_an_endpoint() {
        let report = HealthReport {
            status: HealthStatus::Healthy,
            generated_at: at(),
            planners: Vec::new(),
            backlog: quill_health::BacklogHealth::default(),
            world_bible: quill_health::WorldBibleHealth::default(),
            telemetry: quill_health::TelemetryHealth {
                window_start: at(),
                total: 0,
                outcomes: Default::default(),
                critique: Default::default(),
                recent_failures: Vec::new(),
            },
            warnings: Vec::new(),
            alerts: Vec::new(),
        };
        let err = publish(&report, &QuillConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("no alert endpoint configured"));
    }
}
