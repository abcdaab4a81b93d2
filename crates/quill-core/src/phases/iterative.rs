use super::{items, payload, text, Artifacts, PhaseEnv, PhaseStrategy, PreparedPrompt};
use crate::error::PhaseError;
use quill_ledger::backlog;
use quill_types::{
    BacklogItem, BacklogStatus, ObligationStatus, PersonaObligation, PhaseKind, StructuredValue,
};
use quill_validator::ValidationResult;
use std::collections::{HashMap, HashSet};

const INSTRUCTION: &str = "Run one planning pass over the story. Reply with a single JSON object \
with keys: passTitle, summary (at least 40 characters), backlog (list of {id, title, description, \
priority: low|medium|high}), optionally progress (list of {id, status: in-progress|complete}) \
moving existing items one step forward, and optionally obligations (list of {persona, \
description}) naming continuity commitments a character must honor later. Reuse backlog ids only \
for items that already exist.";

/// Appends a planning pass, new backlog items and persona obligations
#[derive(Debug, Clone, Copy, Default)]
pub struct IterativePhase;

#[async_trait::async_trait]
impl PhaseStrategy for IterativePhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Iterative
    }

    async fn build_prompt(&self, env: &PhaseEnv<'_>) -> Result<PreparedPrompt, PhaseError> {
        let backlog = env.store.backlog_items(Some(env.plan.id)).await?;
        let obligations = env.store.obligations(Some(env.plan.id)).await?;

        let open_items: Vec<String> = backlog
            .iter()
            .filter(|item| item.status != BacklogStatus::Complete)
            .map(|item| format!("[{}] {} ({})", item.backlog_id, item.title, item.status))
            .collect();
        let open_obligations: Vec<String> = obligations
            .iter()
            .filter(|o| o.status == ObligationStatus::Open)
            .map(|o| format!("{}: {}", o.persona, o.description))
            .collect();
        let latest = env
            .plan
            .latest_pass()
            .map(|pass| format!("Pass {}: {}\n{}", pass.index, pass.title, pass.summary));

        let text = env
            .prompt(INSTRUCTION)
            .section("Iteration", env.ctx.iteration_index.to_string())
            .optional("Previous Pass", latest.as_deref())
            .list("Open Backlog", &open_items)
            .list("Open Obligations", &open_obligations)
            .build();
        Ok(PreparedPrompt::text(text))
    }

    async fn persist_artifacts(
        &self,
        env: &PhaseEnv<'_>,
        _prompt: &PreparedPrompt,
        _reply: &str,
        validation: &ValidationResult,
    ) -> Result<Artifacts, PhaseError> {
        let body = payload(validation);
        let mut artifacts = Artifacts::default();

        let mut plan = env.plan.clone();
        let pass_index = plan
            .append_pass(text(body, "passTitle"), text(body, "summary"), env.now)
            .index;

        let mut existing: HashMap<String, BacklogItem> = env
            .store
            .backlog_items(Some(plan.id))
            .await?
            .into_iter()
            .map(|item| (item.backlog_id.clone(), item))
            .collect();

        let mut advanced = Vec::new();
        for entry in items(body, "progress") {
            let backlog_id = text(entry, "id");
            let Some(item) = existing.get_mut(&backlog_id) else {
                artifacts
                    .blocked
                    .push(format!("backlog item '{backlog_id}' not found"));
                continue;
            };
            if text(entry, "status") == "complete" {
                backlog::complete(item, env.now)?;
            } else {
                backlog::claim(item, env.now)?;
            }
            artifacts.tx.put(item.clone());
            advanced.push(StructuredValue::from(backlog_id));
        }

        let mut taken: HashSet<String> = existing.into_keys().collect();
        let mut created = Vec::new();
        let mut skipped = Vec::new();
        for entry in items(body, "backlog") {
            let backlog_id = text(entry, "id");
            if !taken.insert(backlog_id.clone()) {
                artifacts
                    .blocked
                    .push(format!("backlog item '{backlog_id}' already exists"));
                skipped.push(StructuredValue::from(backlog_id));
                continue;
            }
            let item = BacklogItem::new(plan.id, backlog_id.clone(), text(entry, "title"), env.now)
                .with_pass(pass_index)
                .with_description(text(entry, "description"));
            artifacts.tx.insert_backlog_item(item);
            created.push(StructuredValue::from(backlog_id));
        }

        let mut opened = 0usize;
        for entry in items(body, "obligations") {
            let mut obligation = PersonaObligation::new(
                plan.id,
                text(entry, "persona"),
                text(entry, "description"),
                env.now,
            );
            obligation.agent_id = Some(env.ctx.agent_id);
            artifacts.tx.put(obligation);
            opened += 1;
        }

        tracing::info!(
            plan_id = %plan.id,
            pass_index,
            created = created.len(),
            advanced = advanced.len(),
            skipped = skipped.len(),
            obligations = opened,
            "planning pass recorded"
        );

        artifacts.summary = format!(
            "pass {pass_index} recorded with {} new backlog item(s)",
            created.len()
        );
        artifacts.data = StructuredValue::map_from([
            ("passIndex", StructuredValue::from(pass_index)),
            ("createdBacklogIds", StructuredValue::List(created)),
            ("advancedBacklogIds", StructuredValue::List(advanced)),
            ("skippedBacklogIds", StructuredValue::List(skipped)),
            ("obligationsOpened", StructuredValue::from(opened)),
        ]);
        artifacts.tx.put(plan);
        Ok(artifacts)
    }
}
