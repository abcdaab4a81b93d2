use super::{payload, render, Artifacts, PhaseEnv, PhaseStrategy, PreparedPrompt};
use crate::error::PhaseError;
use quill_types::{PhaseKind, StructuredValue};
use quill_validator::ValidationResult;

const INSTRUCTION: &str = "Define the creative vision for this story. Reply with a single JSON \
object with keys: title, logline (one sentence, at least 20 characters), genre, tone (one of \
hopeful, bleak, whimsical, tense, melancholic, epic, intimate), themes (list of strings), pillars \
(list of {name, description}) and optionally audience.";

/// Establishes the plan's creative vision
#[derive(Debug, Clone, Copy, Default)]
pub struct VisionPhase;

#[async_trait::async_trait]
impl PhaseStrategy for VisionPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Vision
    }

    async fn build_prompt(&self, env: &PhaseEnv<'_>) -> Result<PreparedPrompt, PhaseError> {
        let previous = env.plan.vision.as_ref().and_then(render);
        let text = env
            .prompt(INSTRUCTION)
            .optional("Current Vision", previous.as_deref())
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
        let vision = payload(validation).clone();
        let title = vision.str_field("title").unwrap_or_default().to_string();

        let mut plan = env.plan.clone();
        if plan.project_title.trim().is_empty() {
            plan.project_title.clone_from(&title);
        }
        if plan.project_logline.trim().is_empty() {
            plan.project_logline = vision.str_field("logline").unwrap_or_default().to_string();
        }
        plan.vision = Some(vision.clone());
        plan.updated_at = env.now;

        let mut artifacts = Artifacts {
            summary: format!("vision '{title}' recorded"),
            data: StructuredValue::map_from([
                ("planId", StructuredValue::from(plan.id.to_string())),
                ("vision", vision),
            ]),
            ..Artifacts::default()
        };
        artifacts.tx.put(plan);
        Ok(artifacts)
    }
}
