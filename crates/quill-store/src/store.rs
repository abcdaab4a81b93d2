//! Persistence interface
//!
//! Typed read accessors for every entity plus a single atomic write path.

use crate::error::StoreError;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use quill_types::{
    AgentId, BacklogItem, BlueprintId, ChapterBlueprint, ChapterScene, ChapterScroll,
    ChapterSection, Conversation, ConversationId, PersonaObligation, PersonaProfile,
    PhaseTemplate, Plan, PlanId, PlannerExecution, SceneId, ScrollId, SectionId, WorldBible,
    WorldBibleEntry, WorldBibleId,
};

/// Transactional store for the pipeline's records
///
/// Collection queries return records ordered by creation (id order).
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Plan by id
    async fn plan(&self, id: PlanId) -> Result<Option<Plan>, StoreError>;

    /// All plans
    async fn plans(&self) -> Result<Vec<Plan>, StoreError>;

    /// Conversation by id
    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError>;

    /// Persona profile for an agent
    async fn persona(&self, agent_id: AgentId) -> Result<Option<PersonaProfile>, StoreError>;

    /// Every registered phase template, active or not
    async fn templates(&self) -> Result<Vec<PhaseTemplate>, StoreError>;

    /// Blueprint by id
    async fn blueprint(&self, id: BlueprintId) -> Result<Option<ChapterBlueprint>, StoreError>;

    /// Blueprints of a plan
    async fn blueprints_for_plan(
        &self,
        plan_id: PlanId,
    ) -> Result<Vec<ChapterBlueprint>, StoreError>;

    /// Scroll by id
    async fn scroll(&self, id: ScrollId) -> Result<Option<ChapterScroll>, StoreError>;

    /// Every scroll version of a blueprint, oldest first
    async fn scrolls_for_blueprint(
        &self,
        blueprint_id: BlueprintId,
    ) -> Result<Vec<ChapterScroll>, StoreError>;

    /// Section by id
    async fn section(&self, id: SectionId) -> Result<Option<ChapterSection>, StoreError>;

    /// Sections of a scroll ordered by `order`
    async fn sections_for_scroll(
        &self,
        scroll_id: ScrollId,
    ) -> Result<Vec<ChapterSection>, StoreError>;

    /// Scene by id
    async fn scene(&self, id: SceneId) -> Result<Option<ChapterScene>, StoreError>;

    /// Scenes of a section ordered by `order`
    async fn scenes_for_section(
        &self,
        section_id: SectionId,
    ) -> Result<Vec<ChapterScene>, StoreError>;

    /// World bibles, optionally restricted to one plan
    async fn world_bibles(&self, plan_id: Option<PlanId>) -> Result<Vec<WorldBible>, StoreError>;

    /// The bible for `(plan, domain, branch)`
    async fn find_world_bible(
        &self,
        plan_id: PlanId,
        domain: &str,
        branch_slug: &str,
    ) -> Result<Option<WorldBible>, StoreError>;

    /// Every entry of a bible ordered by sequence
    async fn world_bible_entries(
        &self,
        bible_id: WorldBibleId,
    ) -> Result<Vec<WorldBibleEntry>, StoreError>;

    /// Backlog items, optionally restricted to one plan
    async fn backlog_items(&self, plan_id: Option<PlanId>) -> Result<Vec<BacklogItem>, StoreError>;

    /// Obligations, optionally restricted to one plan
    async fn obligations(
        &self,
        plan_id: Option<PlanId>,
    ) -> Result<Vec<PersonaObligation>, StoreError>;

    /// Executions completed at or after `since`
    async fn executions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlannerExecution>, StoreError>;

    /// Apply every write in `tx`, or none of them
    async fn commit(&self, tx: Transaction) -> Result<(), StoreError>;

    /// The active scroll of a blueprint
    async fn active_scroll(
        &self,
        blueprint_id: BlueprintId,
    ) -> Result<Option<ChapterScroll>, StoreError> {
        Ok(self
            .scrolls_for_blueprint(blueprint_id)
            .await?
            .into_iter()
            .rev()
            .find(|s| s.is_active))
    }
}
