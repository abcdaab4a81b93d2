//! Health aggregation scenarios over an in-memory store

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use quill_health::{
    AlertConfig, AlertPublisher, BibleState, HealthAggregator, HealthConfig, HealthStatus,
    MemoryAlertSink, TemplateState, BACKLOG_ORPHANED, BACKLOG_STALE, PLANNER_RECENT_FAILURES,
    TEMPLATE_MISSING, WORLD_BIBLE_MISSING, WORLD_BIBLE_STALE,
};
use quill_ledger::{backlog, obligation, UpsertRequest, WorldBibleLedger};
use quill_store::{InMemoryStore, Store, Transaction};
use quill_types::{
    AgentId, BacklogItem, CritiqueBudgetStatus, ExecutionId, ExecutionOutcome, ManualClock,
    PersonaObligation, PhaseKind, PhaseTemplate, Plan, PlannerExecution, WorldBible,
};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

struct Harness {
    store: Arc<InMemoryStore>,
    clock: ManualClock,
    plan: Plan,
}

impl Harness {
    /// Plan with one pass, active templates for every phase and a fresh bible
    async fn healthy() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = ManualClock::at(t0());
        let mut plan = Plan::new("Emberfall Saga", "Ash and trade", t0());
        plan.append_pass("Opening", "Set the stage", t0());

        let bible = WorldBible::new(plan.id, "canon", "main", t0());
        let mut ledger = WorldBibleLedger::new(bible.id);
        ledger
            .upsert(UpsertRequest::new("characters", "Mira", "A courier"), t0())
            .unwrap();

        let mut tx = Transaction::new();
        tx.put(plan.clone()).put(bible);
        for entry in ledger.take_changes() {
            tx.put(entry);
        }
        for phase in PhaseKind::ALL {
            tx.put(PhaseTemplate::new(phase, format!("{phase} v1"), "Follow the brief.", t0()));
        }
        store.commit(tx).await.unwrap();

        Self { store, clock, plan }
    }

    fn aggregator(&self, config: HealthConfig) -> HealthAggregator {
        HealthAggregator::new(self.store.clone())
            .with_clock(Arc::new(self.clock.clone()))
            .with_config(config)
    }

    async fn put(&self, write: impl Into<quill_store::Write>) {
        let mut tx = Transaction::new();
        tx.put(write);
        self.store.commit(tx).await.unwrap();
    }

    fn execution(
        &self,
        phase: PhaseKind,
        outcome: ExecutionOutcome,
        at: DateTime<Utc>,
    ) -> PlannerExecution {
        PlannerExecution {
            id: ExecutionId::new(),
            plan_id: self.plan.id,
            phase,
            agent_id: AgentId::new(),
            iteration_index: 0,
            outcome,
            critique_status: CritiqueBudgetStatus::NotRequested,
            transcripts: Vec::new(),
            error: (outcome == ExecutionOutcome::Failed).then(|| "reply rejected".to_string()),
            started_at: at,
            completed_at: at,
        }
    }
}

#[tokio::test]
async fn healthy_pipeline_reports_no_alerts() {
    let h = Harness::healthy().await;
    let report = h.aggregator(HealthConfig::default()).compute().await.unwrap();

    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.alerts.is_empty());
    assert!(report.planners.iter().all(|p| p.state == TemplateState::Active));
    assert_eq!(report.world_bible.plans.len(), 1);
    assert_eq!(report.world_bible.plans[0].state, BibleState::Fresh);
    assert_eq!(report.world_bible.plans[0].active_entries, 1);
}

#[tokio::test]
async fn in_progress_item_goes_stale_after_sla() {
    let h = Harness::healthy().await;
    let mut item = BacklogItem::new(h.plan.id, "B-1", "Map the ash road", t0()).with_pass(0);
    let mut tx = Transaction::new();
    tx.insert_backlog_item(item.clone());
    h.store.commit(tx).await.unwrap();
    backlog::claim(&mut item, t0()).unwrap();
    h.put(item.clone()).await;

    let aggregator = h.aggregator(HealthConfig::default().with_backlog_sla_minutes(60));

    h.clock.set(t0() + Duration::minutes(30));
    let early = aggregator.compute().await.unwrap();
    assert!(early.backlog.stale_items.is_empty());
    assert_eq!(early.status, HealthStatus::Healthy);
    assert_eq!(early.backlog.in_progress, 1);

    h.clock.set(t0() + Duration::minutes(90));
    let late = aggregator.compute().await.unwrap();
    assert_eq!(late.status, HealthStatus::Degraded);
    assert_eq!(late.backlog.stale_items.len(), 1);
    let stale = &late.backlog.stale_items[0];
    assert_eq!(stale.backlog_id, "B-1");
    assert_eq!(stale.minutes_in_progress, 90);
    assert_eq!(stale.stale_since, t0() + Duration::minutes(60));

    let alert = late.alerts_with_prefix(BACKLOG_STALE).next().unwrap();
    assert_eq!(alert.observed_at, t0() + Duration::minutes(60));
}

#[tokio::test]
async fn unbounded_backlog_sla_reports_instead_of_failing() {
    let h = Harness::healthy().await;
    let mut item = BacklogItem::new(h.plan.id, "B-1", "Map the ash road", t0()).with_pass(0);
    let mut tx = Transaction::new();
    tx.insert_backlog_item(item.clone());
    h.store.commit(tx).await.unwrap();
    backlog::claim(&mut item, t0()).unwrap();
    h.put(item).await;

    h.clock.set(t0() + Duration::days(365));
    let report = h
        .aggregator(HealthConfig::default().with_backlog_sla_minutes(u64::MAX))
        .compute()
        .await
        .unwrap();
    assert_eq!(report.backlog.in_progress, 1);
    assert!(report.backlog.stale_items.is_empty());
    assert_eq!(report.alerts_with_prefix(BACKLOG_STALE).count(), 0);
}

#[tokio::test]
async fn inactive_only_template_is_critical() {
    let store = Arc::new(InMemoryStore::new());
    let plan = Plan::new("Emberfall Saga", "", t0());
    let mut tx = Transaction::new();
    tx.put(plan)
        .put(PhaseTemplate::new(PhaseKind::Vision, "vision draft", "Draft", t0()).inactive());
    store.commit(tx).await.unwrap();

    let report = HealthAggregator::new(store)
        .with_clock(Arc::new(ManualClock::at(t0())))
        .with_config(HealthConfig::default().with_required_phases(vec![PhaseKind::Vision]))
        .compute()
        .await
        .unwrap();

    assert_eq!(report.status, HealthStatus::Critical);
    let vision = report
        .planners
        .iter()
        .find(|p| p.phase == PhaseKind::Vision)
        .unwrap();
    assert_eq!(vision.state, TemplateState::Inactive);
    assert_eq!(vision.template_name.as_deref(), Some("vision draft"));

    let ids: Vec<&str> = report
        .alerts_with_prefix(TEMPLATE_MISSING)
        .map(|a| a.id.as_str())
        .collect();
    assert_eq!(ids, vec!["template-missing:vision"]);

    // phases that are not required are listed but do not alert
    let scene = report
        .planners
        .iter()
        .find(|p| p.phase == PhaseKind::SceneWeaver)
        .unwrap();
    assert_eq!((scene.state, scene.required), (TemplateState::Missing, false));
}

#[tokio::test]
async fn world_bible_freshness_and_missing_canon() {
    let h = Harness::healthy().await;
    let bare = Plan::new("Glass Archive", "", t0());
    h.put(bare.clone()).await;

    h.clock.set(t0() + Duration::hours(7));
    let report = h.aggregator(HealthConfig::default()).compute().await.unwrap();

    assert_eq!(report.status, HealthStatus::Degraded);
    let stale_id = format!("{WORLD_BIBLE_STALE}:{}", h.plan.id);
    let missing_id = format!("{WORLD_BIBLE_MISSING}:{}", bare.id);
    let ids: Vec<&str> = report.alerts.iter().map(|a| a.id.as_str()).collect();
    assert!(ids.contains(&stale_id.as_str()));
    assert!(ids.contains(&missing_id.as_str()));

    let stale = report.alerts.iter().find(|a| a.id == stale_id).unwrap();
    assert_eq!(stale.observed_at, t0() + Duration::hours(6));

    let bare_row = report
        .world_bible
        .plans
        .iter()
        .find(|r| r.plan_id == bare.id)
        .unwrap();
    assert_eq!((bare_row.state, bare_row.bible_id), (BibleState::Missing, None));
}

#[tokio::test]
async fn swept_bible_is_missing() {
    let h = Harness::healthy().await;
    let bible = h.store.world_bibles(Some(h.plan.id)).await.unwrap().remove(0);
    let entries = h.store.world_bible_entries(bible.id).await.unwrap();
    let mut ledger = WorldBibleLedger::from_entries(bible.id, entries).unwrap();
    ledger.sweep(&Default::default(), t0() + Duration::minutes(5));
    let mut tx = Transaction::new();
    for entry in ledger.take_changes() {
        tx.put(entry);
    }
    h.store.commit(tx).await.unwrap();

    let report = h.aggregator(HealthConfig::default()).compute().await.unwrap();
    assert_eq!(report.world_bible.plans[0].state, BibleState::Missing);
    assert_eq!(report.alerts_with_prefix(WORLD_BIBLE_MISSING).count(), 1);
}

#[tokio::test]
async fn orphaned_items_and_transitions() {
    let h = Harness::healthy().await;
    let dangling_pass = BacklogItem::new(h.plan.id, "B-7", "Revisit the harbor", t0()).with_pass(4);
    let mut tx = Transaction::new();
    tx.insert_backlog_item(dangling_pass)
        .insert_backlog_item(BacklogItem::new(h.plan.id, "B-8", "Name the ferryman", t0()));
    h.store.commit(tx).await.unwrap();

    let report = h.aggregator(HealthConfig::default()).compute().await.unwrap();

    assert_eq!(report.backlog.orphaned_items.len(), 1);
    assert_eq!(report.backlog.orphaned_items[0].reason, "plan pass 4 not found");
    assert_eq!(report.alerts_with_prefix(BACKLOG_ORPHANED).count(), 1);
    assert_eq!(report.backlog.pending, 2);
    assert_eq!(report.backlog.plans[0].pending, 2);
    assert_eq!(report.backlog.recent_transitions.len(), 2);
}

#[tokio::test]
async fn telemetry_counts_and_recent_failures() {
    let h = Harness::healthy().await;
    h.clock.set(t0() + Duration::hours(2));
    let now = t0() + Duration::hours(2);

    let mut tx = Transaction::new();
    for (phase, outcome, at) in [
        (PhaseKind::Vision, ExecutionOutcome::Completed, now - Duration::minutes(50)),
        (PhaseKind::Iterative, ExecutionOutcome::Blocked, now - Duration::minutes(40)),
        (PhaseKind::SceneWeaver, ExecutionOutcome::Failed, now - Duration::minutes(30)),
        (PhaseKind::SceneWeaver, ExecutionOutcome::Failed, now - Duration::minutes(10)),
        (PhaseKind::Vision, ExecutionOutcome::Failed, now - Duration::days(3)),
    ] {
        tx.put(h.execution(phase, outcome, at));
    }
    h.store.commit(tx).await.unwrap();

    let report = h
        .aggregator(HealthConfig {
            recent_failure_limit: 1,
            ..HealthConfig::default()
        })
        .compute()
        .await
        .unwrap();

    assert_eq!(report.telemetry.total, 4);
    assert_eq!(report.telemetry.outcomes["Failed"], 2);
    assert_eq!(report.telemetry.outcomes["Blocked"], 1);
    assert_eq!(report.telemetry.critique["NotRequested"], 4);
    assert_eq!(report.telemetry.recent_failures.len(), 1);
    assert_eq!(report.telemetry.recent_failures[0].completed_at, now - Duration::minutes(10));
    assert_eq!(report.backlog.telemetry_events.len(), 1);

    let alert = report.alerts_with_prefix(PLANNER_RECENT_FAILURES).next().unwrap();
    assert_eq!(alert.observed_at, now - Duration::minutes(30));
    assert_eq!(report.status, HealthStatus::Degraded);
}

#[tokio::test]
async fn aging_obligations_warn_and_closed_ones_are_logged() {
    let h = Harness::healthy().await;
    let aging = PersonaObligation::new(h.plan.id, "Mira", "Pay back the ferryman", t0());
    let mut closed = PersonaObligation::new(h.plan.id, "Oren", "Return the map", t0());
    obligation::resolve(&mut closed, "editor", Some("chapter 2".into()), t0() + Duration::hours(1))
        .unwrap();
    let mut tx = Transaction::new();
    tx.put(aging).put(closed);
    h.store.commit(tx).await.unwrap();

    h.clock.set(t0() + Duration::hours(73));
    let report = h.aggregator(HealthConfig::default()).compute().await.unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("Mira"));
    assert!(report.warnings[0].contains("73 hours"));
    assert_eq!(report.backlog.action_logs.len(), 1);
    assert_eq!(report.backlog.action_logs[0].actor.as_deref(), Some("editor"));
}

#[tokio::test]
async fn report_serializes_to_contract_shape() {
    let h = Harness::healthy().await;
    let report = h.aggregator(HealthConfig::default()).compute().await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["status"], "Healthy");
    for key in [
        "pending",
        "inProgress",
        "complete",
        "plans",
        "staleItems",
        "orphanedItems",
        "recentTransitions",
        "telemetryEvents",
        "actionLogs",
    ] {
        assert!(json["backlog"].get(key).is_some(), "backlog.{key} missing");
    }
    assert!(json["worldBible"]["plans"].is_array());
    assert!(json["telemetry"]["recentFailures"].is_array());
    assert!(json["warnings"].is_array());
    assert!(json["alerts"].is_array());
}

#[tokio::test]
async fn computed_alerts_publish_once_per_window() {
    let h = Harness::healthy().await;
    h.clock.set(t0() + Duration::hours(7));
    let report = h.aggregator(HealthConfig::default()).compute().await.unwrap();

    let sink = Arc::new(MemoryAlertSink::new());
    let config = AlertConfig::new()
        .with_default_route("ops")
        .with_slo(WORLD_BIBLE_STALE, 30)
        .with_debounce_minutes(15);
    let publisher = AlertPublisher::new(config, sink.clone()).with_clock(Arc::new(h.clock.clone()));

    let first = publisher.publish(&report.alerts).await;
    assert_eq!(first.published.len(), 1);
    let payloads = sink.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].routing_key, "ops");
    assert!(payloads[0].alerts[0].slo_breached);
    assert_eq!(payloads[0].alerts[0].slo_minutes, Some(30));

    h.clock.advance(Duration::minutes(10));
    let repeat = publisher.publish(&report.alerts).await;
    assert!(repeat.published.is_empty());
    assert_eq!(repeat.suppressed.len(), 1);

    h.clock.advance(Duration::minutes(5));
    let after = publisher.publish(&report.alerts).await;
    assert_eq!(after.published.len(), 1);
    assert_eq!(sink.payloads().len(), 2);
}
