use super::{items, payload, render, text, Artifacts, PhaseEnv, PhaseStrategy, PreparedPrompt};
use crate::error::PhaseError;
use chrono::{DateTime, Utc};
use quill_ledger::slugify;
use quill_store::Transaction;
use quill_types::{
    BlueprintId, ChapterBlueprint, ChapterScene, ChapterScroll, ChapterSection, PhaseKind,
    SceneId, SceneStatus, ScrollId, SectionId, StructuredValue,
};
use quill_validator::{ValidationResult, MAX_SECTION_DEPTH};

const INSTRUCTION: &str = "Design the structure of the next chapter. Reply with a single JSON \
object with keys: title, description (at least 20 characters), synopsis (at least 40 characters) \
and sections (list of {title, summary, optional description, scenes: list of {title, description}, \
optional sections: nested list of the same shape, at most three levels deep}).";

/// Counts of rows written for one outline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct OutlineCounts {
    pub(super) sections: usize,
    pub(super) scenes: usize,
}

/// Queue sections and their pending scenes under `scroll_id`.
///
/// A section's position comes from its `order` field when present, else
/// from its index among its siblings. Nested `sections` become children of
/// the enclosing section, down to [`MAX_SECTION_DEPTH`] levels.
pub(super) fn write_outline(
    tx: &mut Transaction,
    scroll_id: ScrollId,
    sections: &[StructuredValue],
    now: DateTime<Utc>,
) -> OutlineCounts {
    let mut counts = OutlineCounts::default();
    write_sections(tx, scroll_id, None, sections, MAX_SECTION_DEPTH, now, &mut counts);
    counts
}

fn write_sections(
    tx: &mut Transaction,
    scroll_id: ScrollId,
    parent_section_id: Option<SectionId>,
    sections: &[StructuredValue],
    depth: usize,
    now: DateTime<Utc>,
    counts: &mut OutlineCounts,
) {
    for (index, outline) in sections.iter().enumerate() {
        let order = outline
            .get("order")
            .and_then(StructuredValue::as_f64)
            .and_then(|o| u32::try_from(o as i64).ok())
            .unwrap_or_else(|| u32::try_from(index).unwrap_or(u32::MAX));
        let title = text(outline, "title");
        let section = ChapterSection {
            id: SectionId::new(),
            scroll_id,
            parent_section_id,
            order,
            slug: slugify(&title),
            title,
            description: text(outline, "description"),
            summary: text(outline, "summary"),
        };
        let section_id = section.id;
        tx.put(section);
        counts.sections += 1;

        for (position, beat) in items(outline, "scenes").iter().enumerate() {
            let title = text(beat, "title");
            tx.put(ChapterScene {
                id: SceneId::new(),
                section_id,
                order: u32::try_from(position).unwrap_or(u32::MAX),
                slug: slugify(&title),
                title,
                description: text(beat, "description"),
                status: SceneStatus::Pending,
                content: None,
                updated_at: now,
            });
            counts.scenes += 1;
        }

        let children = items(outline, "sections");
        if depth > 1 {
            write_sections(tx, scroll_id, Some(section_id), children, depth - 1, now, counts);
        } else if !children.is_empty() {
            tracing::debug!(%section_id, dropped = children.len(), "outline nested too deep");
        }
    }
}

/// Creates a chapter blueprint with its first scroll revision
#[derive(Debug, Clone, Copy, Default)]
pub struct ChapterArchitectPhase;

#[async_trait::async_trait]
impl PhaseStrategy for ChapterArchitectPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::ChapterArchitect
    }

    async fn build_prompt(&self, env: &PhaseEnv<'_>) -> Result<PreparedPrompt, PhaseError> {
        let existing: Vec<String> = env
            .store
            .blueprints_for_plan(env.plan.id)
            .await?
            .into_iter()
            .map(|b| format!("{}: {}", b.title, b.description))
            .collect();
        let vision = env.plan.vision.as_ref().and_then(render);
        let latest = env
            .plan
            .latest_pass()
            .map(|pass| format!("{}\n{}", pass.title, pass.summary));

        let text = env
            .prompt(INSTRUCTION)
            .optional("Vision", vision.as_deref())
            .optional("Latest Planning Pass", latest.as_deref())
            .list("Existing Chapters", &existing)
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

        let title = text(body, "title");
        let blueprint = ChapterBlueprint {
            id: BlueprintId::new(),
            plan_id: env.plan.id,
            slug: slugify(&title),
            title: title.clone(),
            description: text(body, "description"),
            structure: body.clone(),
            created_at: env.now,
        };
        let scroll = ChapterScroll {
            id: ScrollId::new(),
            blueprint_id: blueprint.id,
            version: 1,
            title: title.clone(),
            slug: blueprint.slug.clone(),
            synopsis: text(body, "synopsis"),
            is_active: true,
            created_at: env.now,
        };
        let (blueprint_id, scroll_id) = (blueprint.id, scroll.id);
        artifacts.tx.put(blueprint);
        artifacts.tx.put(scroll);
        let sections = items(body, "sections");
        let counts = write_outline(&mut artifacts.tx, scroll_id, sections, env.now);

        tracing::info!(
            plan_id = %env.plan.id,
            %blueprint_id,
            sections = counts.sections,
            scenes = counts.scenes,
            "chapter blueprint created"
        );

        artifacts.summary = format!(
            "blueprint '{title}' created with {} section(s) and {} scene(s)",
            counts.sections, counts.scenes
        );
        artifacts.data = StructuredValue::map_from([
            ("blueprintId", StructuredValue::from(blueprint_id.to_string())),
            ("scrollId", StructuredValue::from(scroll_id.to_string())),
            ("sections", StructuredValue::from(counts.sections)),
            ("scenes", StructuredValue::from(counts.scenes)),
        ]);
        Ok(artifacts)
    }
}
