//! Testing utilities for the Quill workspace
//!
//! Shared fixtures, a scripted chat backend and canned replies.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use quill_core::{
    CancellationToken, ChatClient, ChatError, ChatReply, ChatRequest, PhaseContext, PhaseRunner,
};
use quill_store::{InMemoryStore, Store, StoreError, Transaction};
use quill_types::{
    AgentId, BacklogItem, BlueprintId, ChapterBlueprint, ChapterScene, ChapterScroll,
    ChapterSection, Conversation, ConversationId, ManualClock, PersonaObligation, PersonaProfile,
    PhaseTemplate, Plan, PlanId, PlannerExecution, SceneId, SceneStatus, ScrollId, SectionId,
    StructuredValue, WorldBible, WorldBibleEntry, WorldBibleId,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// Provider id used by fixture contexts
pub const TEST_PROVIDER: &str = "scripted";

/// Fixed start instant for fixture clocks
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

#[derive(Debug)]
enum Step {
    Reply(ChatReply),
    ReplyAndCancel(ChatReply),
    Fail(ChatError),
    Hang,
}

/// Chat backend that plays back a fixed script and records every request
#[derive(Debug, Default)]
pub struct ScriptedChatClient {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply
    #[must_use]
    pub fn reply(self, text: impl Into<String>) -> Self {
        let n = self.script.lock().len() + 1;
        self.push(Step::Reply(ChatReply {
            text: text.into(),
            message_id: Some(format!("msg-{n}")),
        }))
    }

    /// Queue a reply that cancels the caller's token before returning
    #[must_use]
    pub fn reply_and_cancel(self, text: impl Into<String>) -> Self {
        self.push(Step::ReplyAndCancel(ChatReply {
            text: text.into(),
            message_id: None,
        }))
    }

    /// Queue a failure
    #[must_use]
    pub fn fail(self, error: ChatError) -> Self {
        self.push(Step::Fail(error))
    }

    /// Queue a call that never answers until cancelled
    #[must_use]
    pub fn hang(self) -> Self {
        self.push(Step::Hang)
    }

    fn push(self, step: Step) -> Self {
        self.script.lock().push_back(step);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait::async_trait]
impl ChatClient for ScriptedChatClient {
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ChatError> {
        self.requests.lock().push(request);
        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::ReplyAndCancel(reply)) => {
                cancel.cancel();
                Ok(reply)
            }
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Hang) => {
                cancel.cancelled().await;
                Err(ChatError::Cancelled)
            }
            None => Err(ChatError::Transport("script exhausted".to_string())),
        }
    }
}

/// Store that reads through to an [`InMemoryStore`] and rejects every commit
/// of more than `max_writes` writes
///
/// With the default of one, a run's artifact transaction fails while its
/// single-write execution record still lands.
#[derive(Debug)]
pub struct CommitFailingStore {
    inner: Arc<InMemoryStore>,
    max_writes: usize,
    rejected: Mutex<usize>,
}

impl CommitFailingStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            max_writes: 1,
            rejected: Mutex::new(0),
        }
    }

    /// Reject every commit, including single writes
    pub fn reject_all(mut self) -> Self {
        self.max_writes = 0;
        self
    }

    /// Number of commits rejected so far
    pub fn rejected(&self) -> usize {
        *self.rejected.lock()
    }
}

#[async_trait::async_trait]
impl Store for CommitFailingStore {
    async fn plan(&self, id: PlanId) -> Result<Option<Plan>, StoreError> {
        self.inner.plan(id).await
    }

    async fn plans(&self) -> Result<Vec<Plan>, StoreError> {
        self.inner.plans().await
    }

    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        self.inner.conversation(id).await
    }

    async fn persona(&self, agent_id: AgentId) -> Result<Option<PersonaProfile>, StoreError> {
        self.inner.persona(agent_id).await
    }

    async fn templates(&self) -> Result<Vec<PhaseTemplate>, StoreError> {
        self.inner.templates().await
    }

    async fn blueprint(&self, id: BlueprintId) -> Result<Option<ChapterBlueprint>, StoreError> {
        self.inner.blueprint(id).await
    }

    async fn blueprints_for_plan(
        &self,
        plan_id: PlanId,
    ) -> Result<Vec<ChapterBlueprint>, StoreError> {
        self.inner.blueprints_for_plan(plan_id).await
    }

    async fn scroll(&self, id: ScrollId) -> Result<Option<ChapterScroll>, StoreError> {
        self.inner.scroll(id).await
    }

    async fn scrolls_for_blueprint(
        &self,
        blueprint_id: BlueprintId,
    ) -> Result<Vec<ChapterScroll>, StoreError> {
        self.inner.scrolls_for_blueprint(blueprint_id).await
    }

    async fn section(&self, id: SectionId) -> Result<Option<ChapterSection>, StoreError> {
        self.inner.section(id).await
    }

    async fn sections_for_scroll(
        &self,
        scroll_id: ScrollId,
    ) -> Result<Vec<ChapterSection>, StoreError> {
        self.inner.sections_for_scroll(scroll_id).await
    }

    async fn scene(&self, id: SceneId) -> Result<Option<ChapterScene>, StoreError> {
        self.inner.scene(id).await
    }

    async fn scenes_for_section(
        &self,
        section_id: SectionId,
    ) -> Result<Vec<ChapterScene>, StoreError> {
        self.inner.scenes_for_section(section_id).await
    }

    async fn world_bibles(&self, plan_id: Option<PlanId>) -> Result<Vec<WorldBible>, StoreError> {
        self.inner.world_bibles(plan_id).await
    }

    async fn find_world_bible(
        &self,
        plan_id: PlanId,
        domain: &str,
        branch_slug: &str,
    ) -> Result<Option<WorldBible>, StoreError> {
        self.inner.find_world_bible(plan_id, domain, branch_slug).await
    }

    async fn world_bible_entries(
        &self,
        bible_id: WorldBibleId,
    ) -> Result<Vec<WorldBibleEntry>, StoreError> {
        self.inner.world_bible_entries(bible_id).await
    }

    async fn backlog_items(&self, plan_id: Option<PlanId>) -> Result<Vec<BacklogItem>, StoreError> {
        self.inner.backlog_items(plan_id).await
    }

    async fn obligations(
        &self,
        plan_id: Option<PlanId>,
    ) -> Result<Vec<PersonaObligation>, StoreError> {
        self.inner.obligations(plan_id).await
    }

    async fn executions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlannerExecution>, StoreError> {
        self.inner.executions(since).await
    }

    async fn commit(&self, tx: Transaction) -> Result<(), StoreError> {
        if tx.len() > self.max_writes {
            *self.rejected.lock() += 1;
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.commit(tx).await
    }
}

/// A seeded store holding one plan with a single-scene chapter
#[derive(Debug, Clone)]
pub struct StoryFixture {
    pub store: Arc<InMemoryStore>,
    pub clock: ManualClock,
    pub plan: Plan,
    pub conversation: Conversation,
    pub agent_id: AgentId,
    pub blueprint: ChapterBlueprint,
    pub scroll: ChapterScroll,
    pub section: ChapterSection,
    pub scene: ChapterScene,
}

impl StoryFixture {
    /// Context targeting the fixture's scene with a valid provider
    pub fn context(&self) -> PhaseContext {
        PhaseContext::new(self.plan.id, self.agent_id, self.conversation.id)
            .with_provider(TEST_PROVIDER, None)
            .with_blueprint(self.blueprint.id)
            .with_scroll(self.scroll.id)
            .with_scene(self.scene.id)
    }

    /// Runner over the fixture store and clock
    pub fn runner(&self, chat: Arc<ScriptedChatClient>) -> PhaseRunner {
        PhaseRunner::new(self.store.clone(), chat).with_clock(Arc::new(self.clock.clone()))
    }

    /// Replace the stored scene
    pub async fn set_scene_status(&mut self, status: SceneStatus) {
        self.scene.status = status;
        let mut tx = Transaction::new();
        tx.put(self.scene.clone());
        self.store.commit(tx).await.unwrap();
    }
}

/// Seed a plan "Emberfall Saga" whose chapter "Cinder Road" has scroll
/// "Ashfall Prologue", section "Market Day" and scene "Hollow Market"
pub async fn seed_story() -> StoryFixture {
    let now = epoch();
    let clock = ManualClock::at(now);
    let agent_id = AgentId::new();
    let plan = Plan::new("Emberfall Saga", "", now).with_project("Emberfall", "");
    let conversation = Conversation {
        id: ConversationId::new(),
        plan_id: plan.id,
        agent_id,
        title: "Drafting".to_string(),
        created_at: now,
    };
    let persona = PersonaProfile {
        agent_id,
        name: "Narrator".to_string(),
        summary: "A weary chronicler of the ash lands".to_string(),
        memories: vec!["The market burned once before".to_string()],
        world_notes: vec!["Ash falls every dusk".to_string()],
    };
    let blueprint = ChapterBlueprint {
        id: quill_types::BlueprintId::new(),
        plan_id: plan.id,
        title: "Cinder Road".to_string(),
        slug: "cinder-road".to_string(),
        description: String::new(),
        structure: StructuredValue::Null,
        created_at: now,
    };
    let scroll = ChapterScroll {
        id: quill_types::ScrollId::new(),
        blueprint_id: blueprint.id,
        version: 1,
        title: "Ashfall Prologue".to_string(),
        slug: "ashfall-prologue".to_string(),
        synopsis: String::new(),
        is_active: true,
        created_at: now,
    };
    let section = ChapterSection {
        id: quill_types::SectionId::new(),
        scroll_id: scroll.id,
        parent_section_id: None,
        order: 0,
        title: "Market Day".to_string(),
        slug: "market-day".to_string(),
        description: String::new(),
        summary: "Trade resumes".to_string(),
    };
    let scene = ChapterScene {
        id: quill_types::SceneId::new(),
        section_id: section.id,
        order: 0,
        title: "Hollow Market".to_string(),
        slug: "hollow-market".to_string(),
        description: String::new(),
        status: SceneStatus::Pending,
        content: None,
        updated_at: now,
    };

    let store = Arc::new(InMemoryStore::new());
    let mut tx = Transaction::new();
    tx.put(plan.clone())
        .put(conversation.clone())
        .put(persona)
        .put(blueprint.clone())
        .put(scroll.clone())
        .put(section.clone())
        .put(scene.clone());
    store.commit(tx).await.unwrap();

    StoryFixture {
        store,
        clock,
        plan,
        conversation,
        agent_id,
        blueprint,
        scroll,
        section,
        scene,
    }
}

/// Serialize a JSON value as a model reply
pub fn json_reply(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap()
}

/// A vision reply that passes the schema
pub fn vision_reply() -> String {
    json_reply(&serde_json::json!({
        "title": "Emberfall",
        "logline": "A chronicler walks the ash roads to record a dying empire.",
        "genre": "fantasy",
        "tone": "melancholic",
        "themes": ["memory", "decline"],
        "pillars": [
            { "name": "Ash", "description": "Every scene shows the cost of the fire." }
        ]
    }))
}
