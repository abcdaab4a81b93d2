//! Phase strategies
//!
//! Each pipeline phase is a [`PhaseStrategy`] registered in a
//! [`PhaseRegistry`] under its [`PhaseKind`]. The runner owns the shared
//! flow (load, call, validate, record); strategies only supply what differs:
//! the prompt, the validation call and the artifacts to persist.

mod chapter_architect;
mod iterative;
mod scene_weaver;
mod scroll_refiner;
mod vision;
mod world_bible;

pub use chapter_architect::ChapterArchitectPhase;
pub use iterative::IterativePhase;
pub use scene_weaver::{collect_salient_terms, SceneChain, SceneWeaverPhase};
pub use scroll_refiner::ScrollRefinerPhase;
pub use vision::VisionPhase;
pub use world_bible::WorldBiblePhase;

use crate::config::RunnerConfig;
use crate::context::PhaseContext;
use crate::error::PhaseError;
use crate::prompt::PromptBuilder;
use chrono::{DateTime, Utc};
use quill_store::{Store, Transaction};
use quill_types::{
    Conversation, CorrelationIds, ExecutionId, PhaseKind, PhaseTemplate, Plan, StructuredValue,
};
use quill_validator::{ResponseValidator, ValidationResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only inputs shared by every strategy call of one run
#[derive(Clone, Copy)]
pub struct PhaseEnv<'a> {
    /// Store to read upstream artifacts from
    pub store: &'a dyn Store,
    /// Invocation context
    pub ctx: &'a PhaseContext,
    /// Loaded plan
    pub plan: &'a Plan,
    /// Loaded conversation
    pub conversation: &'a Conversation,
    /// Active template for the phase, if registered
    pub template: Option<&'a PhaseTemplate>,
    /// Runner limits
    pub config: &'a RunnerConfig,
    /// Execution being recorded
    pub execution_id: ExecutionId,
    /// Evaluation instant
    pub now: DateTime<Utc>,
}

impl std::fmt::Debug for PhaseEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseEnv")
            .field("plan_id", &self.plan.id)
            .field("execution_id", &self.execution_id)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl PhaseEnv<'_> {
    /// Template body, or the built-in instruction when no active template exists
    #[must_use]
    pub fn instruction(&self, builtin: &str) -> String {
        self.template
            .map(|t| t.body.trim())
            .filter(|body| !body.is_empty())
            .unwrap_or(builtin)
            .to_string()
    }

    /// Prompt builder seeded with the instruction, plan and critique sections
    #[must_use]
    pub fn prompt(&self, builtin: &str) -> PromptBuilder {
        let plan = self.plan;
        let plan_text = format!("{}\n{}", plan.name, plan.description);
        let mut builder = PromptBuilder::new()
            .section("Instructions", self.instruction(builtin))
            .optional("Plan", Some(plan_text.as_str()))
            .optional("Project Title", Some(plan.project_title.as_str()))
            .optional("Project Logline", Some(plan.project_logline.as_str()));
        if let Some(feedback) = self.ctx.critique.as_ref().filter(|f| !f.details.is_empty()) {
            let title = format!(
                "Previous Attempt Rejected ({}/{})",
                feedback.attempt.saturating_sub(1),
                feedback.max_attempts
            );
            builder = builder.list(&title, &feedback.details);
        }
        builder
    }
}

/// Output of prompt assembly
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedPrompt {
    /// Prompt text sent to the backend
    pub text: String,
    /// Terms the reply must mention (prose phases)
    pub salient_terms: Vec<String>,
    /// Chapter ids the run is correlated with
    pub correlation: CorrelationIds,
}

impl PreparedPrompt {
    /// Prompt with no salient terms or chapter correlation
    #[must_use]
    pub fn text(text: String) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }
}

/// Writes and result data produced by a successful phase
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    /// Writes to commit atomically
    pub tx: Transaction,
    /// One-line summary
    pub summary: String,
    /// Structured result data
    pub data: StructuredValue,
    /// Reasons the phase could only partially apply its output
    pub blocked: Vec<String>,
}

/// Phase-specific behavior plugged into the runner
#[async_trait::async_trait]
pub trait PhaseStrategy: Send + Sync + std::fmt::Debug {
    /// Phase implemented
    fn kind(&self) -> PhaseKind;

    /// Assemble the prompt from upstream artifacts
    async fn build_prompt(&self, env: &PhaseEnv<'_>) -> Result<PreparedPrompt, PhaseError>;

    /// Validate the raw reply
    fn validate(
        &self,
        validator: &ResponseValidator,
        reply: &str,
        prompt: &PreparedPrompt,
    ) -> Result<ValidationResult, PhaseError> {
        Ok(validator.validate(self.kind(), reply, &prompt.salient_terms)?)
    }

    /// Derive the writes for an accepted reply
    async fn persist_artifacts(
        &self,
        env: &PhaseEnv<'_>,
        prompt: &PreparedPrompt,
        reply: &str,
        validation: &ValidationResult,
    ) -> Result<Artifacts, PhaseError>;
}

/// Map from phase kind to strategy
#[derive(Debug, Clone, Default)]
pub struct PhaseRegistry {
    strategies: HashMap<PhaseKind, Arc<dyn PhaseStrategy>>,
}

impl PhaseRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the six built-in phases
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VisionPhase));
        registry.register(Arc::new(WorldBiblePhase));
        registry.register(Arc::new(IterativePhase));
        registry.register(Arc::new(ChapterArchitectPhase));
        registry.register(Arc::new(ScrollRefinerPhase));
        registry.register(Arc::new(SceneWeaverPhase));
        registry
    }

    /// Register (or replace) a strategy under its kind
    pub fn register(&mut self, strategy: Arc<dyn PhaseStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    /// Strategy for a phase
    #[must_use]
    pub fn get(&self, kind: PhaseKind) -> Option<Arc<dyn PhaseStrategy>> {
        self.strategies.get(&kind).cloned()
    }

    /// Registered phases in pipeline order
    #[must_use]
    pub fn phases(&self) -> Vec<PhaseKind> {
        PhaseKind::ALL
            .into_iter()
            .filter(|kind| self.strategies.contains_key(kind))
            .collect()
    }
}

static NULL: StructuredValue = StructuredValue::Null;

/// Accepted payload of a structured reply (`Null` for prose phases)
pub(crate) fn payload(validation: &ValidationResult) -> &StructuredValue {
    validation.payload.as_ref().unwrap_or(&NULL)
}

/// Render a structured value as indented JSON for prompts
pub(crate) fn render(value: &StructuredValue) -> Option<String> {
    if value.is_null() {
        return None;
    }
    serde_json::to_string_pretty(&value.to_json()).ok()
}

/// Elements of a list field (empty when absent)
pub(crate) fn items<'v>(value: &'v StructuredValue, key: &str) -> &'v [StructuredValue] {
    value.get(key).and_then(StructuredValue::as_list).unwrap_or(&[])
}

/// Trimmed string field or empty
pub(crate) fn text(value: &StructuredValue, key: &str) -> String {
    value.str_field(key).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_phase() {
        let registry = PhaseRegistry::with_defaults();
        assert_eq!(registry.phases(), PhaseKind::ALL.to_vec());
        for kind in PhaseKind::ALL {
            assert_eq!(registry.get(kind).map(|s| s.kind()), Some(kind));
        }
    }
}
