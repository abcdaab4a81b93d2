//! Health aggregation
//!
//! [`HealthAggregator::compute`] reads a point-in-time view of the store and
//! projects it into a [`HealthReport`]:
//!
//! 1. Classify each phase's templates (active / inactive / missing)
//! 2. Count backlog items per plan; find stale and orphaned items
//! 3. Classify every world bible as fresh, stale or missing
//! 4. Summarize execution telemetry inside the configured window
//!
//! Reads are not coordinated with writers. A record caught mid-transition is
//! reported as it was read.

use crate::alert::{
    scoped_id, Alert, AlertSeverity, BACKLOG_ORPHANED, BACKLOG_STALE, PLANNER_RECENT_FAILURES,
    TEMPLATE_MISSING, WORLD_BIBLE_MISSING, WORLD_BIBLE_STALE,
};
use crate::config::HealthConfig;
use crate::error::HealthError;
use crate::report::{
    ActionLog, BacklogHealth, BibleState, FailureSummary, HealthReport, HealthStatus,
    OrphanedBacklogItem, PlanBacklog, PlanWorldBible, PlannerStatus, StaleBacklogItem,
    TelemetryEvent, TelemetryHealth, TemplateState, WorldBibleHealth,
};
use chrono::{DateTime, Duration, Utc};
use quill_ledger::{backlog, obligation, BibleFreshness, WorldBibleLedger};
use quill_store::Store;
use quill_types::{
    BacklogStatus, Clock, ExecutionOutcome, PhaseKind, PhaseTemplate, Plan, PlanId, SystemClock,
    WorldBible, WorldBibleEntry,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Anomalies collected while building the report
#[derive(Debug, Default)]
struct Findings {
    warnings: Vec<String>,
    alerts: Vec<Alert>,
    template_missing: bool,
    degraded: bool,
}

impl Findings {
    fn alert(&mut self, alert: Alert) {
        self.degraded = true;
        self.alerts.push(alert);
    }
}

/// Builds [`HealthReport`]s from a [`Store`]
pub struct HealthAggregator {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: HealthConfig,
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HealthAggregator {
    /// Aggregator with default thresholds and the wall clock
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config: HealthConfig::default(),
        }
    }

    /// With a time source
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// With thresholds
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: HealthConfig) -> Self {
        self.config = config;
        self
    }

    /// Thresholds in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Compute a report as of the clock's current instant
    ///
    /// # Errors
    ///
    /// Fails only when the store cannot be read.
    #[instrument(skip(self))]
    pub async fn compute(&self) -> Result<HealthReport, HealthError> {
        let now = self.clock.now();
        let mut findings = Findings::default();

        let plans: HashMap<PlanId, Plan> = self
            .store
            .plans()
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let planners = self.planners(now, &mut findings).await?;
        let mut backlog = self.backlog(&plans, now, &mut findings).await?;
        let world_bible = self.world_bibles(&plans, now, &mut findings).await?;
        let telemetry = self.telemetry(&mut backlog, now, &mut findings).await?;
        self.obligations(&mut backlog, now, &mut findings).await?;

        let status = if findings.template_missing {
            HealthStatus::Critical
        } else if findings.degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        info!(
            %status,
            alerts = findings.alerts.len(),
            warnings = findings.warnings.len(),
            "health computed"
        );

        Ok(HealthReport {
            status,
            generated_at: now,
            planners,
            backlog,
            world_bible,
            telemetry,
            warnings: findings.warnings,
            alerts: findings.alerts,
        })
    }

    async fn planners(
        &self,
        now: DateTime<Utc>,
        findings: &mut Findings,
    ) -> Result<Vec<PlannerStatus>, HealthError> {
        let templates = self.store.templates().await?;
        let mut planners = Vec::with_capacity(PhaseKind::ALL.len());

        for phase in PhaseKind::ALL {
            let registered: Vec<&PhaseTemplate> =
                templates.iter().filter(|t| t.phase == phase).collect();
            let active = registered
                .iter()
                .filter(|t| t.is_active)
                .max_by_key(|t| t.updated_at);
            let latest = registered.iter().max_by_key(|t| t.updated_at);

            let (state, template_name) = match (active, latest) {
                (Some(t), _) => (TemplateState::Active, Some(t.name.clone())),
                (None, Some(t)) => (TemplateState::Inactive, Some(t.name.clone())),
                (None, None) => (TemplateState::Missing, None),
            };
            let required = self.config.required_phases.contains(&phase);

            if required && state != TemplateState::Active {
                findings.template_missing = true;
                let (description, observed_at) = match latest {
                    Some(t) => (
                        format!("{phase} has templates but none is active (latest: '{}')", t.name),
                        t.updated_at,
                    ),
                    None => (format!("no template is registered for {phase}"), now),
                };
                findings.alert(Alert::new(
                    scoped_id(TEMPLATE_MISSING, phase.tag()),
                    AlertSeverity::Critical,
                    format!("{phase} template missing"),
                    description,
                    observed_at,
                ));
            }

            planners.push(PlannerStatus {
                phase,
                state,
                template_name,
                required,
            });
        }
        Ok(planners)
    }

    async fn backlog(
        &self,
        plans: &HashMap<PlanId, Plan>,
        now: DateTime<Utc>,
        findings: &mut Findings,
    ) -> Result<BacklogHealth, HealthError> {
        let items = self.store.backlog_items(None).await?;
        let sla = self.config.backlog_sla();
        let mut health = BacklogHealth::default();
        let mut per_plan: BTreeMap<PlanId, PlanBacklog> = BTreeMap::new();
        let mut transitions = Vec::new();

        for item in &items {
            let counts = per_plan.entry(item.plan_id).or_insert_with(|| PlanBacklog {
                plan_id: item.plan_id,
                pending: 0,
                in_progress: 0,
                complete: 0,
                last_updated_at: None,
            });
            let (total, plan_count) = match item.status {
                BacklogStatus::Pending => (&mut health.pending, &mut counts.pending),
                BacklogStatus::InProgress => (&mut health.in_progress, &mut counts.in_progress),
                BacklogStatus::Complete => (&mut health.complete, &mut counts.complete),
            };
            *total += 1;
            *plan_count += 1;
            counts.last_updated_at = counts.last_updated_at.max(Some(item.updated_at));

            if backlog::is_stale(item, now, sla) {
                if let (Some(in_progress_at), Some(stale_since)) =
                    (item.in_progress_at, backlog::stale_since(item, sla))
                {
                    health.stale_items.push(StaleBacklogItem {
                        item_id: item.id,
                        plan_id: item.plan_id,
                        backlog_id: item.backlog_id.clone(),
                        title: item.title.clone(),
                        in_progress_at,
                        stale_since,
                        minutes_in_progress: (now - in_progress_at).num_minutes(),
                    });
                }
            }

            let plan = plans.get(&item.plan_id);
            if backlog::is_orphaned(item, plan) {
                let reason = match (plan, item.pass_index) {
                    (None, _) => "plan not found".to_string(),
                    (Some(_), Some(index)) => format!("plan pass {index} not found"),
                    (Some(_), None) => "plan does not resolve".to_string(),
                };
                health.orphaned_items.push(OrphanedBacklogItem {
                    item_id: item.id,
                    plan_id: item.plan_id,
                    backlog_id: item.backlog_id.clone(),
                    reason,
                });
            }

            transitions.extend(backlog::derived_transitions(item));
        }

        transitions.sort_by(|a, b| b.at.cmp(&a.at));
        transitions.truncate(self.config.recent_transition_limit);
        health.recent_transitions = transitions;
        health.plans = per_plan.into_values().collect();

        if let Some(since) = health.stale_items.iter().map(|s| s.stale_since).min() {
            findings.alert(Alert::new(
                BACKLOG_STALE,
                AlertSeverity::Warning,
                "Stale backlog items",
                format!(
                    "{} item(s) in progress for more than {} minutes",
                    health.stale_items.len(),
                    self.config.backlog_sla_minutes
                ),
                since,
            ));
        }
        if !health.orphaned_items.is_empty() {
            let ids: Vec<&str> = health
                .orphaned_items
                .iter()
                .map(|o| o.backlog_id.as_str())
                .collect();
            findings.alert(Alert::new(
                BACKLOG_ORPHANED,
                AlertSeverity::Warning,
                "Orphaned backlog items",
                format!("plan or pass no longer resolves for: {}", ids.join(", ")),
                now,
            ));
        }

        debug!(
            items = items.len(),
            stale = health.stale_items.len(),
            orphaned = health.orphaned_items.len(),
            "backlog evaluated"
        );
        Ok(health)
    }

    async fn world_bibles(
        &self,
        plans: &HashMap<PlanId, Plan>,
        now: DateTime<Utc>,
        findings: &mut Findings,
    ) -> Result<WorldBibleHealth, HealthError> {
        let window = self.config.freshness_window();
        let bibles = self.store.world_bibles(None).await?;
        let mut rows = Vec::with_capacity(bibles.len());

        for bible in &bibles {
            let entries = self.store.world_bible_entries(bible.id).await?;
            rows.push(self.classify_bible(bible, entries, now, window, findings));
        }

        let mut orphan_plans: Vec<&Plan> = plans
            .values()
            .filter(|p| !bibles.iter().any(|b| b.plan_id == p.id))
            .collect();
        orphan_plans.sort_by_key(|p| p.id);
        for plan in orphan_plans {
            rows.push(PlanWorldBible {
                plan_id: plan.id,
                bible_id: None,
                domain: None,
                branch_slug: None,
                active_entries: 0,
                last_updated_at: None,
                state: BibleState::Missing,
            });
        }

        // One alert per (category, plan), listing the affected branches
        let mut grouped: BTreeMap<(&'static str, PlanId), (DateTime<Utc>, Vec<String>)> =
            BTreeMap::new();
        for row in &rows {
            let (prefix, began) = match row.state {
                BibleState::Fresh => continue,
                BibleState::Stale => (
                    WORLD_BIBLE_STALE,
                    row.last_updated_at
                        .and_then(|t| t.checked_add_signed(window))
                        .unwrap_or(now),
                ),
                BibleState::Missing => (
                    WORLD_BIBLE_MISSING,
                    missing_since(row, &bibles, plans).unwrap_or(now),
                ),
            };
            let branch = match (&row.domain, &row.branch_slug) {
                (Some(domain), Some(branch)) => format!("{domain}/{branch}"),
                _ => "no world bible".to_string(),
            };
            let slot = grouped
                .entry((prefix, row.plan_id))
                .or_insert_with(|| (began, Vec::new()));
            slot.0 = slot.0.min(began);
            slot.1.push(branch);
        }

        for ((prefix, plan_id), (began, branches)) in grouped {
            let name = plans.get(&plan_id).map_or("unknown plan", |p| p.name.as_str());
            let (title, description) = if prefix == WORLD_BIBLE_STALE {
                (
                    format!("World bible stale for '{name}'"),
                    format!(
                        "no canon update within {} minutes: {}",
                        self.config.world_bible_freshness_minutes,
                        branches.join(", ")
                    ),
                )
            } else {
                (
                    format!("World bible missing for '{name}'"),
                    format!("no active canon: {}", branches.join(", ")),
                )
            };
            findings.alert(Alert::new(
                scoped_id(prefix, plan_id),
                AlertSeverity::Warning,
                title,
                description,
                began,
            ));
        }

        Ok(WorldBibleHealth { plans: rows })
    }

    fn classify_bible(
        &self,
        bible: &WorldBible,
        entries: Vec<WorldBibleEntry>,
        now: DateTime<Utc>,
        window: Duration,
        findings: &mut Findings,
    ) -> PlanWorldBible {
        let ledger = WorldBibleLedger::from_entries(bible.id, entries.iter().cloned());
        let (active_entries, freshness) = match ledger {
            Ok(ledger) => (ledger.active_entries().count(), ledger.freshness(now, window)),
            Err(err) => {
                warn!(bible_id = %bible.id, error = %err, "world bible entries are inconsistent");
                findings
                    .warnings
                    .push(format!("world bible {} is inconsistent: {err}", bible.id));
                let active = entries.iter().filter(|e| e.is_active);
                let last = active.clone().map(|e| e.updated_at).max();
                let freshness = match last {
                    None => BibleFreshness::Missing,
                    Some(t) if now - t > window => BibleFreshness::Stale { last_updated: t },
                    Some(t) => BibleFreshness::Fresh { last_updated: t },
                };
                (active.count(), freshness)
            }
        };

        let (state, last_updated_at) = match freshness {
            BibleFreshness::Missing => (BibleState::Missing, None),
            BibleFreshness::Stale { last_updated } => (BibleState::Stale, Some(last_updated)),
            BibleFreshness::Fresh { last_updated } => (BibleState::Fresh, Some(last_updated)),
        };
        PlanWorldBible {
            plan_id: bible.plan_id,
            bible_id: Some(bible.id),
            domain: Some(bible.domain.clone()),
            branch_slug: Some(bible.branch_slug.clone()),
            active_entries,
            last_updated_at,
            state,
        }
    }

    async fn telemetry(
        &self,
        backlog: &mut BacklogHealth,
        now: DateTime<Utc>,
        findings: &mut Findings,
    ) -> Result<TelemetryHealth, HealthError> {
        let window_start = now
            .checked_sub_signed(self.config.telemetry_window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut executions = self.store.executions(Some(window_start)).await?;
        executions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

        let mut outcomes = BTreeMap::new();
        let mut critique = BTreeMap::new();
        for execution in &executions {
            *outcomes.entry(execution.outcome.to_string()).or_insert(0) += 1;
            *critique.entry(execution.critique_status.to_string()).or_insert(0) += 1;
        }

        backlog.telemetry_events = executions
            .iter()
            .filter(|e| e.phase == PhaseKind::Iterative)
            .map(|e| TelemetryEvent {
                execution_id: e.id,
                plan_id: e.plan_id,
                iteration_index: e.iteration_index,
                outcome: e.outcome,
                occurred_at: e.completed_at,
            })
            .collect();

        let failures: Vec<_> = executions
            .iter()
            .filter(|e| e.outcome == ExecutionOutcome::Failed)
            .collect();
        if let Some(first) = failures.iter().map(|e| e.completed_at).min() {
            findings.alert(Alert::new(
                PLANNER_RECENT_FAILURES,
                AlertSeverity::Warning,
                "Recent planner failures",
                format!(
                    "{} failed execution(s) in the last {} minutes",
                    failures.len(),
                    self.config.telemetry_window_minutes
                ),
                first,
            ));
        }
        let recent_failures = failures
            .into_iter()
            .take(self.config.recent_failure_limit)
            .map(|e| FailureSummary {
                execution_id: e.id,
                plan_id: e.plan_id,
                phase: e.phase,
                error: e.error.clone(),
                snippet: e
                    .transcripts
                    .last()
                    .map(|t| t.reply_snippet(self.config.snippet_chars)),
                correlation: e.correlation().cloned(),
                completed_at: e.completed_at,
            })
            .collect();

        Ok(TelemetryHealth {
            window_start,
            total: executions.len(),
            outcomes,
            critique,
            recent_failures,
        })
    }

    async fn obligations(
        &self,
        backlog: &mut BacklogHealth,
        now: DateTime<Utc>,
        findings: &mut Findings,
    ) -> Result<(), HealthError> {
        let window = self.config.aging_window();
        let obligations = self.store.obligations(None).await?;

        for ob in obligations.iter().filter(|o| obligation::is_aging(o, now, window)) {
            findings.warnings.push(format!(
                "obligation {} for {} has been open for {} hours: {}",
                ob.id,
                ob.persona,
                (now - ob.created_at).num_hours(),
                ob.description
            ));
        }

        let mut logs: Vec<ActionLog> = obligations
            .iter()
            .filter(|o| o.status.is_terminal())
            .map(|o| ActionLog {
                obligation_id: o.id,
                plan_id: o.plan_id,
                persona: o.persona.clone(),
                action: o.status,
                actor: o.resolved_by.clone(),
                notes: o.resolution_notes.clone(),
                at: o.resolved_at.unwrap_or(o.created_at),
            })
            .collect();
        logs.sort_by(|a, b| b.at.cmp(&a.at));
        backlog.action_logs = logs;
        Ok(())
    }
}

/// When a bible row lost its last active entry, or when its plan began
/// without one
fn missing_since(
    row: &PlanWorldBible,
    bibles: &[WorldBible],
    plans: &HashMap<PlanId, Plan>,
) -> Option<DateTime<Utc>> {
    match row.bible_id {
        Some(id) => bibles.iter().find(|b| b.id == id).map(|b| b.created_at),
        None => plans.get(&row.plan_id).map(|p| p.created_at),
    }
}
