//! Phase invocation context

use quill_types::{
    AgentId, BlueprintId, ConversationId, CritiqueBudgetStatus, PlanId, SceneId, ScrollId,
    StructuredMap, StructuredValue,
};

/// Feedback from a rejected previous attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CritiqueFeedback {
    /// 1-based attempt number this feedback precedes
    pub attempt: u32,
    /// Total attempts the wrapper allows
    pub max_attempts: u32,
    /// Validation details from the previous attempt
    pub details: Vec<String>,
}

impl CritiqueFeedback {
    /// Whether this is the wrapper's last attempt
    #[inline]
    #[must_use]
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Everything a phase run needs to locate its inputs
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseContext {
    /// Plan being generated
    pub plan_id: PlanId,
    /// Persona agent
    pub agent_id: AgentId,
    /// Conversation the generative call is attached to
    pub conversation_id: ConversationId,
    /// World bible branch
    pub branch_slug: String,
    /// Target blueprint (scroll refiner, scene weaver)
    pub blueprint_id: Option<BlueprintId>,
    /// Target scroll
    pub scroll_id: Option<ScrollId>,
    /// Target scene (scene weaver)
    pub scene_id: Option<SceneId>,
    /// Planning iteration
    pub iteration_index: u32,
    /// Raw invocation metadata; must carry `providerId`
    pub metadata: StructuredMap,
    /// Feedback when run under a critique loop
    pub critique: Option<CritiqueFeedback>,
}

impl PhaseContext {
    /// Context on the `main` branch with empty metadata
    #[must_use]
    pub fn new(plan_id: PlanId, agent_id: AgentId, conversation_id: ConversationId) -> Self {
        Self {
            plan_id,
            agent_id,
            conversation_id,
            branch_slug: "main".to_string(),
            blueprint_id: None,
            scroll_id: None,
            scene_id: None,
            iteration_index: 0,
            metadata: StructuredMap::new(),
            critique: None,
        }
    }

    /// With a world bible branch
    #[inline]
    #[must_use]
    pub fn with_branch(mut self, branch_slug: impl Into<String>) -> Self {
        self.branch_slug = branch_slug.into();
        self
    }

    /// With a target blueprint
    #[inline]
    #[must_use]
    pub fn with_blueprint(mut self, id: BlueprintId) -> Self {
        self.blueprint_id = Some(id);
        self
    }

    /// With a target scroll
    #[inline]
    #[must_use]
    pub fn with_scroll(mut self, id: ScrollId) -> Self {
        self.scroll_id = Some(id);
        self
    }

    /// With a target scene
    #[inline]
    #[must_use]
    pub fn with_scene(mut self, id: SceneId) -> Self {
        self.scene_id = Some(id);
        self
    }

    /// With an iteration index
    #[inline]
    #[must_use]
    pub fn with_iteration(mut self, index: u32) -> Self {
        self.iteration_index = index;
        self
    }

    /// With a metadata entry
    #[inline]
    #[must_use]
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<StructuredValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Shorthand for `providerId` / `modelId` metadata
    #[must_use]
    pub fn with_provider(self, provider_id: &str, model_id: Option<&str>) -> Self {
        let ctx = self.with_metadata(crate::config::PROVIDER_ID_KEY, provider_id);
        match model_id {
            Some(model) => ctx.with_metadata(crate::config::MODEL_ID_KEY, model),
            None => ctx,
        }
    }

    /// Critique-budget status to stamp on an execution
    #[must_use]
    pub fn critique_status(&self, rejected: bool) -> CritiqueBudgetStatus {
        match &self.critique {
            None => CritiqueBudgetStatus::NotRequested,
            Some(feedback) if rejected && feedback.is_final_attempt() => {
                CritiqueBudgetStatus::Exhausted
            }
            Some(_) => CritiqueBudgetStatus::WithinBudget,
        }
    }
}
