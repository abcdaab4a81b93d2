use super::{items, payload, render, text, Artifacts, PhaseEnv, PhaseStrategy, PreparedPrompt};
use crate::error::PhaseError;
use quill_ledger::{UpsertRequest, WorldBibleLedger};
use quill_types::{EntryProvenance, PhaseKind, StructuredValue, WorldBible};
use quill_validator::{ValidationResult, WORLD_BIBLE_CATEGORIES};

const INSTRUCTION: &str = "Maintain the canonical world bible. Reply with a single JSON object \
with lists under characters, locations and optionally factions and artifacts. Each entry has name, \
summary (at least 20 characters), status (active, inactive, deceased, destroyed, missing or \
unknown) and optional continuityNotes. List every fact that is still canonical: anything omitted \
is retired.";

/// Records canonical world facts into the plan's world bible
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldBiblePhase;

impl WorldBiblePhase {
    async fn existing(env: &PhaseEnv<'_>) -> Result<Option<WorldBible>, PhaseError> {
        Ok(env
            .store
            .find_world_bible(env.plan.id, &env.config.world_bible_domain, &env.ctx.branch_slug)
            .await?)
    }
}

#[async_trait::async_trait]
impl PhaseStrategy for WorldBiblePhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::WorldBible
    }

    async fn build_prompt(&self, env: &PhaseEnv<'_>) -> Result<PreparedPrompt, PhaseError> {
        let mut canon = Vec::new();
        if let Some(bible) = Self::existing(env).await? {
            let entries = env.store.world_bible_entries(bible.id).await?;
            canon = entries
                .iter()
                .filter(|e| e.is_active)
                .take(env.config.max_world_entries)
                .map(|e| format!("{} ({}, {}): {}", e.name, e.category, e.status, e.summary))
                .collect();
        }

        let vision = env.plan.vision.as_ref().and_then(render);
        let text = env
            .prompt(INSTRUCTION)
            .optional("Vision", vision.as_deref())
            .section("Branch", env.ctx.branch_slug.clone())
            .list("Current Canon", &canon)
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
        let mut artifacts = Artifacts::default();

        let (bible, entries) = match Self::existing(env).await? {
            Some(bible) => {
                let entries = env.store.world_bible_entries(bible.id).await?;
                (bible, entries)
            }
            None => {
                let bible = WorldBible::new(
                    env.plan.id,
                    env.config.world_bible_domain.clone(),
                    env.ctx.branch_slug.clone(),
                    env.now,
                );
                artifacts.tx.put(bible.clone());
                (bible, Vec::new())
            }
        };

        let provenance = EntryProvenance {
            execution_id: Some(env.execution_id),
            agent_id: Some(env.ctx.agent_id),
            iteration_index: Some(env.ctx.iteration_index),
        };
        let body = payload(validation);
        let requests: Vec<UpsertRequest> = WORLD_BIBLE_CATEGORIES
            .iter()
            .flat_map(|category| {
                items(body, category).iter().map(move |entry| {
                    UpsertRequest::new(*category, text(entry, "name"), text(entry, "summary"))
                        .with_status(text(entry, "status"))
                        .with_notes(entry.str_list_field("continuityNotes"))
                })
            })
            .map(|request| request.with_provenance(provenance.clone()))
            .collect();

        let mut ledger = WorldBibleLedger::from_entries(bible.id, entries)?;
        let pass = ledger.apply_pass(requests, env.now)?;
        for entry in ledger.take_changes() {
            artifacts.tx.put(entry);
        }

        tracing::info!(
            plan_id = %env.plan.id,
            bible_id = %bible.id,
            recorded = pass.created.len(),
            retired = pass.swept.len(),
            "world bible pass applied"
        );

        artifacts.summary = format!(
            "{} world bible entries recorded, {} retired",
            pass.created.len(),
            pass.swept.len()
        );
        artifacts.data = StructuredValue::map_from([
            ("bibleId", StructuredValue::from(bible.id.to_string())),
            ("recorded", StructuredValue::from(pass.created.len())),
            ("retired", StructuredValue::from(pass.swept.len())),
            (
                "slugs",
                StructuredValue::from(pass.touched.into_iter().collect::<Vec<_>>()),
            ),
        ]);
        Ok(artifacts)
    }
}
