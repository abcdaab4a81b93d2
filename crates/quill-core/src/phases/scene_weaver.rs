//! Prose generation for a single scene
//!
//! The scene prompt is assembled from the whole chapter chain above the
//! scene. The same chain feeds the salient-term list the reply must mention,
//! so a reply drifting away from its scene is caught by the validator.

use super::{render, Artifacts, PhaseEnv, PhaseStrategy, PreparedPrompt};
use crate::error::PhaseError;
use quill_store::Store;
use quill_types::{
    AgentId, ChapterBlueprint, ChapterScene, ChapterScroll, ChapterSection, CorrelationIds,
    PersonaProfile, PhaseKind, Plan, SceneId, SceneStatus, StructuredValue,
};
use quill_validator::{SalientTerms, ValidationResult};

const INSTRUCTION: &str = "Write the prose for the scene below. Reply with the scene text only. \
Stay consistent with the chapter structure, the persona and the required references; every \
required reference must appear in the prose.";

/// A scene and whatever of its ancestry could be loaded
#[derive(Debug, Clone, PartialEq)]
pub struct SceneChain {
    /// Target scene
    pub scene: ChapterScene,
    /// Owning section
    pub section: Option<ChapterSection>,
    /// Owning scroll
    pub scroll: Option<ChapterScroll>,
    /// Owning blueprint
    pub blueprint: Option<ChapterBlueprint>,
    /// Persona writing the scene
    pub persona: Option<PersonaProfile>,
}

impl SceneChain {
    /// Load a scene and walk up to its blueprint. Missing ancestors stay `None`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the scene itself is absent; store errors propagate.
    pub async fn load(
        store: &dyn Store,
        scene_id: SceneId,
        persona: AgentId,
    ) -> Result<Self, PhaseError> {
        let scene = store
            .scene(scene_id)
            .await?
            .ok_or_else(|| PhaseError::not_found(SceneId::KIND, scene_id))?;
        let section = store.section(scene.section_id).await?;
        let scroll = match &section {
            Some(section) => store.scroll(section.scroll_id).await?,
            None => None,
        };
        let blueprint = match &scroll {
            Some(scroll) => store.blueprint(scroll.blueprint_id).await?,
            None => None,
        };
        let persona = store.persona(persona).await?;
        Ok(Self {
            scene,
            section,
            scroll,
            blueprint,
            persona,
        })
    }

    /// Correlation ids for the transcript
    #[must_use]
    pub fn correlation(&self) -> CorrelationIds {
        CorrelationIds {
            scene_id: Some(self.scene.id),
            scroll_id: self.scroll.as_ref().map(|s| s.id),
            blueprint_id: self.blueprint.as_ref().map(|b| b.id),
            ..CorrelationIds::default()
        }
    }
}

/// Terms a scene reply must mention, nearest context first
#[must_use]
pub fn collect_salient_terms(plan: &Plan, chain: &SceneChain) -> SalientTerms {
    let mut terms = SalientTerms::new();
    let scene = &chain.scene;
    terms.extend([&scene.title, &scene.slug, &scene.description]);
    if let Some(section) = &chain.section {
        terms.extend([
            &section.title,
            &section.slug,
            &section.description,
            &section.summary,
        ]);
    }
    if let Some(scroll) = &chain.scroll {
        terms.extend([&scroll.title, &scroll.slug, &scroll.synopsis]);
    }
    if let Some(blueprint) = &chain.blueprint {
        terms.extend([&blueprint.title, &blueprint.slug, &blueprint.description]);
    }
    terms.extend([
        &plan.name,
        &plan.description,
        &plan.project_title,
        &plan.project_logline,
    ]);
    terms
}

/// Writes prose for one scene
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneWeaverPhase;

impl SceneWeaverPhase {
    async fn chain(env: &PhaseEnv<'_>) -> Result<SceneChain, PhaseError> {
        let scene_id = env.ctx.scene_id.ok_or(PhaseError::MissingInput {
            phase: PhaseKind::SceneWeaver,
            input: "scene_id",
        })?;
        SceneChain::load(env.store, scene_id, env.ctx.agent_id).await
    }
}

fn capped(lines: &[String], limit: usize) -> &[String] {
    &lines[..lines.len().min(limit)]
}

#[async_trait::async_trait]
impl PhaseStrategy for SceneWeaverPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::SceneWeaver
    }

    async fn build_prompt(&self, env: &PhaseEnv<'_>) -> Result<PreparedPrompt, PhaseError> {
        let chain = Self::chain(env).await?;
        let terms = collect_salient_terms(env.plan, &chain);

        let structure = chain
            .blueprint
            .as_ref()
            .and_then(|b| render(&b.structure));
        let synopsis = chain.scroll.as_ref().map(|s| s.synopsis.as_str());
        let summary = chain.section.as_ref().map(|s| s.summary.as_str());
        let scene = format!("{}\n{}", chain.scene.title, chain.scene.description);
        let persona = chain.persona.as_ref();
        let no_lines: &[String] = &[];
        let memories =
            persona.map_or(no_lines, |p| capped(&p.memories, env.config.max_persona_memories));
        let notes =
            persona.map_or(no_lines, |p| capped(&p.world_notes, env.config.max_world_notes));

        let text = env
            .prompt(INSTRUCTION)
            .optional("Blueprint Structure", structure.as_deref())
            .optional("Scroll Synopsis", synopsis)
            .optional("Section Summary", summary)
            .section("Scene", scene)
            .optional("Persona Summary", persona.map(|p| p.summary.as_str()))
            .list("Persona Memories", memories)
            .list("World Notes", notes)
            .list("Required References", terms.as_slice())
            .build();

        tracing::debug!(
            scene_id = %chain.scene.id,
            terms = terms.len(),
            "scene prompt assembled"
        );

        Ok(PreparedPrompt {
            text,
            correlation: chain.correlation(),
            salient_terms: terms.into_vec(),
        })
    }

    async fn persist_artifacts(
        &self,
        env: &PhaseEnv<'_>,
        _prompt: &PreparedPrompt,
        reply: &str,
        _validation: &ValidationResult,
    ) -> Result<Artifacts, PhaseError> {
        let chain = Self::chain(env).await?;
        let mut scene = chain.scene;
        let mut artifacts = Artifacts::default();

        if !scene.status.accepts_prose() {
            tracing::warn!(scene_id = %scene.id, "scene is archived; prose not stored");
            artifacts
                .blocked
                .push(format!("scene '{}' is archived", scene.slug));
            artifacts.summary = format!("scene '{}' is archived; prose discarded", scene.title);
        } else {
            scene.content = Some(reply.trim().to_string());
            scene.status = SceneStatus::Completed;
            scene.updated_at = env.now;
            artifacts.summary = format!("scene '{}' drafted", scene.title);
        }

        artifacts.data = StructuredValue::map_from([
            ("sceneId", StructuredValue::from(scene.id.to_string())),
            (
                "status",
                StructuredValue::from(format!("{:?}", scene.status)),
            ),
            (
                "characters",
                StructuredValue::from(reply.chars().count()),
            ),
        ]);
        if artifacts.blocked.is_empty() {
            artifacts.tx.put(scene);
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quill_types::{BlueprintId, PlanId, ScrollId, SectionId};

    fn chain() -> SceneChain {
        let now = Utc::now();
        let blueprint = ChapterBlueprint {
            id: BlueprintId::new(),
            plan_id: PlanId::new(),
            title: "Cinder Road".into(),
            slug: "cinder-road".into(),
            description: "The caravan crosses the burned plains".into(),
            structure: StructuredValue::Null,
            created_at: now,
        };
        let scroll = ChapterScroll {
            id: ScrollId::new(),
            blueprint_id: blueprint.id,
            version: 1,
            title: "Ashfall Prologue".into(),
            slug: "ashfall-prologue".into(),
            synopsis: String::new(),
            is_active: true,
            created_at: now,
        };
        let section = ChapterSection {
            id: SectionId::new(),
            scroll_id: scroll.id,
            parent_section_id: None,
            order: 0,
            title: "Market Day".into(),
            slug: "market-day".into(),
            description: String::new(),
            summary: "Trade".into(),
        };
        SceneChain {
            scene: ChapterScene {
                id: SceneId::new(),
                section_id: section.id,
                order: 0,
                title: "Hollow Market".into(),
                slug: "hollow-market".into(),
                description: String::new(),
                status: SceneStatus::Pending,
                content: None,
                updated_at: now,
            },
            section: Some(section),
            scroll: Some(scroll),
            blueprint: Some(blueprint),
            persona: None,
        }
    }

    #[test]
    fn terms_follow_chain_order_and_skip_short_values() {
        let plan = Plan::new("Embers", "", Utc::now());
        let terms = collect_salient_terms(&plan, &chain()).into_vec();
        assert_eq!(terms[0], "Hollow Market");
        assert_eq!(terms[1], "hollow-market");
        assert!(terms.contains(&"Ashfall Prologue".to_string()));
        assert!(terms.contains(&"Embers".to_string()));
        // "Trade" passes, blank descriptions do not
        assert!(terms.contains(&"Trade".to_string()));
        assert!(terms.iter().all(|t| t.chars().count() > 3));
    }

    #[test]
    fn correlation_carries_chain_ids() {
        let chain = chain();
        let ids = chain.correlation();
        assert_eq!(ids.scene_id, Some(chain.scene.id));
        assert_eq!(ids.scroll_id, chain.scroll.as_ref().map(|s| s.id));
        assert_eq!(ids.blueprint_id, chain.blueprint.as_ref().map(|b| b.id));
        assert!(ids.conversation_id.is_none());
    }
}
