use super::chapter_architect::write_outline;
use super::{items, payload, text, Artifacts, PhaseEnv, PhaseStrategy, PreparedPrompt};
use crate::error::PhaseError;
use quill_ledger::slugify;
use quill_types::{
    BlueprintId, ChapterBlueprint, ChapterScroll, CorrelationIds, PhaseKind, ScrollId,
    StructuredValue,
};
use quill_validator::ValidationResult;

const INSTRUCTION: &str = "Revise the chapter scroll. Reply with a single JSON object with keys: \
title, synopsis (at least 40 characters), optional revisionNotes and sections (list of {title, \
summary, optional order, optional scenes: list of {title, description}, optional sections: \
nested list of the same shape}). The revision replaces the current scroll.";

/// Produces the next scroll revision of a blueprint
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollRefinerPhase;

impl ScrollRefinerPhase {
    async fn blueprint(env: &PhaseEnv<'_>) -> Result<ChapterBlueprint, PhaseError> {
        let id = env.ctx.blueprint_id.ok_or(PhaseError::MissingInput {
            phase: PhaseKind::ScrollRefiner,
            input: "blueprint_id",
        })?;
        env.store
            .blueprint(id)
            .await?
            .ok_or_else(|| PhaseError::not_found(BlueprintId::KIND, id))
    }
}

#[async_trait::async_trait]
impl PhaseStrategy for ScrollRefinerPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::ScrollRefiner
    }

    async fn build_prompt(&self, env: &PhaseEnv<'_>) -> Result<PreparedPrompt, PhaseError> {
        let blueprint = Self::blueprint(env).await?;
        let active = env.store.active_scroll(blueprint.id).await?;

        let mut sections = Vec::new();
        if let Some(scroll) = &active {
            sections = env
                .store
                .sections_for_scroll(scroll.id)
                .await?
                .into_iter()
                .map(|s| format!("{}. {}: {}", s.order, s.title, s.summary))
                .collect();
        }
        let current = active
            .as_ref()
            .map(|s| format!("v{} {}\n{}", s.version, s.title, s.synopsis));

        let text = env
            .prompt(INSTRUCTION)
            .section(
                "Blueprint",
                format!("{}\n{}", blueprint.title, blueprint.description),
            )
            .optional("Current Scroll", current.as_deref())
            .list("Current Sections", &sections)
            .build();
        Ok(PreparedPrompt {
            text,
            salient_terms: Vec::new(),
            correlation: CorrelationIds {
                blueprint_id: Some(blueprint.id),
                scroll_id: active.map(|s| s.id),
                ..CorrelationIds::default()
            },
        })
    }

    async fn persist_artifacts(
        &self,
        env: &PhaseEnv<'_>,
        _prompt: &PreparedPrompt,
        _reply: &str,
        validation: &ValidationResult,
    ) -> Result<Artifacts, PhaseError> {
        let blueprint = Self::blueprint(env).await?;
        let body = payload(validation);
        let mut artifacts = Artifacts::default();

        let previous = env.store.scrolls_for_blueprint(blueprint.id).await?;
        let version = previous.iter().map(|s| s.version).max().unwrap_or(0) + 1;
        let mut retired = 0usize;
        for mut scroll in previous.into_iter().filter(|s| s.is_active) {
            scroll.is_active = false;
            artifacts.tx.put(scroll);
            retired += 1;
        }

        let title = text(body, "title");
        let scroll = ChapterScroll {
            id: ScrollId::new(),
            blueprint_id: blueprint.id,
            version,
            slug: slugify(&title),
            title,
            synopsis: text(body, "synopsis"),
            is_active: true,
            created_at: env.now,
        };
        let scroll_id = scroll.id;
        artifacts.tx.put(scroll);
        let sections = items(body, "sections");
        let counts = write_outline(&mut artifacts.tx, scroll_id, sections, env.now);

        tracing::info!(
            blueprint_id = %blueprint.id,
            %scroll_id,
            version,
            retired,
            sections = counts.sections,
            "scroll revision recorded"
        );

        artifacts.summary = format!(
            "scroll v{version} of '{}' recorded with {} section(s)",
            blueprint.title, counts.sections
        );
        artifacts.data = StructuredValue::map_from([
            ("blueprintId", StructuredValue::from(blueprint.id.to_string())),
            ("scrollId", StructuredValue::from(scroll_id.to_string())),
            ("version", StructuredValue::from(version)),
            ("sections", StructuredValue::from(counts.sections)),
            ("scenes", StructuredValue::from(counts.scenes)),
        ]);
        Ok(artifacts)
    }
}
