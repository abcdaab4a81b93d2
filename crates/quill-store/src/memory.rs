//! In-memory store
//!
//! Commits stage every write on a copy of the state and swap it in only when
//! all writes succeed, so readers never observe a partial transaction.

use crate::error::StoreError;
use crate::store::Store;
use crate::transaction::{Transaction, Write};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use quill_types::{
    AgentId, BacklogItem, BacklogItemId, BlueprintId, ChapterBlueprint, ChapterScene,
    ChapterScroll, ChapterSection, Conversation, ConversationId, EntryId, ExecutionId,
    ObligationId, PersonaObligation, PersonaProfile, PhaseTemplate, Plan, PlanId,
    PlannerExecution, SceneId, ScrollId, SectionId, TemplateId, WorldBible, WorldBibleEntry,
    WorldBibleId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Serializable dump of every collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSnapshot {
    /// Plans
    pub plans: Vec<Plan>,
    /// Conversations
    pub conversations: Vec<Conversation>,
    /// Persona profiles
    pub personas: Vec<PersonaProfile>,
    /// Phase templates
    pub templates: Vec<PhaseTemplate>,
    /// Chapter blueprints
    pub blueprints: Vec<ChapterBlueprint>,
    /// Chapter scrolls
    pub scrolls: Vec<ChapterScroll>,
    /// Chapter sections
    pub sections: Vec<ChapterSection>,
    /// Chapter scenes
    pub scenes: Vec<ChapterScene>,
    /// World bibles
    pub world_bibles: Vec<WorldBible>,
    /// World bible entries
    pub entries: Vec<WorldBibleEntry>,
    /// Backlog items
    pub backlog_items: Vec<BacklogItem>,
    /// Persona obligations
    pub obligations: Vec<PersonaObligation>,
    /// Planner executions
    pub executions: Vec<PlannerExecution>,
}

impl StoreSnapshot {
    /// Read a JSON snapshot file
    ///
    /// # Errors
    ///
    /// Fails on IO errors or malformed JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write a pretty-printed JSON snapshot file
    ///
    /// # Errors
    ///
    /// Fails on IO errors.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    plans: BTreeMap<PlanId, Plan>,
    conversations: BTreeMap<ConversationId, Conversation>,
    personas: BTreeMap<AgentId, PersonaProfile>,
    templates: BTreeMap<TemplateId, PhaseTemplate>,
    blueprints: BTreeMap<BlueprintId, ChapterBlueprint>,
    scrolls: BTreeMap<ScrollId, ChapterScroll>,
    sections: BTreeMap<SectionId, ChapterSection>,
    scenes: BTreeMap<SceneId, ChapterScene>,
    world_bibles: BTreeMap<WorldBibleId, WorldBible>,
    entries: BTreeMap<EntryId, WorldBibleEntry>,
    backlog_items: BTreeMap<BacklogItemId, BacklogItem>,
    obligations: BTreeMap<ObligationId, PersonaObligation>,
    executions: BTreeMap<ExecutionId, PlannerExecution>,
}

fn missing(entity: &'static str, parent: &'static str, id: impl ToString) -> StoreError {
    StoreError::MissingReference {
        entity,
        parent,
        id: id.to_string(),
    }
}

impl State {
    fn apply(&mut self, write: Write) -> Result<(), StoreError> {
        match write {
            Write::Plan(plan) => {
                self.plans.insert(plan.id, plan);
            }
            Write::Conversation(conversation) => {
                self.conversations.insert(conversation.id, conversation);
            }
            Write::Persona(persona) => {
                self.personas.insert(persona.agent_id, persona);
            }
            Write::Template(template) => {
                self.templates.insert(template.id, template);
            }
            Write::Blueprint(blueprint) => {
                if !self.plans.contains_key(&blueprint.plan_id) {
                    return Err(missing("blueprint", "plan", blueprint.plan_id));
                }
                self.blueprints.insert(blueprint.id, blueprint);
            }
            Write::Scroll(scroll) => {
                if !self.blueprints.contains_key(&scroll.blueprint_id) {
                    return Err(missing("scroll", "blueprint", scroll.blueprint_id));
                }
                self.scrolls.insert(scroll.id, scroll);
            }
            Write::Section(section) => {
                if !self.scrolls.contains_key(&section.scroll_id) {
                    return Err(missing("section", "scroll", section.scroll_id));
                }
                self.sections.insert(section.id, section);
            }
            Write::Scene(scene) => {
                if !self.sections.contains_key(&scene.section_id) {
                    return Err(missing("scene", "section", scene.section_id));
                }
                self.scenes.insert(scene.id, scene);
            }
            Write::WorldBible(bible) => {
                let taken = self.world_bibles.values().any(|b| {
                    b.id != bible.id
                        && b.plan_id == bible.plan_id
                        && b.domain == bible.domain
                        && b.branch_slug == bible.branch_slug
                });
                if taken {
                    return Err(StoreError::Conflict {
                        entity: "world bible",
                        key: format!("{}/{}/{}", bible.plan_id, bible.domain, bible.branch_slug),
                    });
                }
                self.world_bibles.insert(bible.id, bible);
            }
            Write::Entry(entry) => {
                if !self.world_bibles.contains_key(&entry.bible_id) {
                    return Err(missing("world bible entry", "world bible", entry.bible_id));
                }
                self.check_entry(&entry)?;
                self.entries.insert(entry.id, entry);
            }
            Write::InsertBacklogItem(item) => {
                let taken = self.backlog_items.values().any(|existing| {
                    existing.plan_id == item.plan_id && existing.backlog_id == item.backlog_id
                });
                if taken {
                    return Err(StoreError::Conflict {
                        entity: "backlog item",
                        key: format!("{}/{}", item.plan_id, item.backlog_id),
                    });
                }
                self.backlog_items.insert(item.id, item);
            }
            Write::BacklogItem(item) => {
                if !self.backlog_items.contains_key(&item.id) {
                    return Err(missing("backlog update", "backlog item", item.id));
                }
                self.backlog_items.insert(item.id, item);
            }
            Write::Obligation(obligation) => {
                self.obligations.insert(obligation.id, obligation);
            }
            Write::Execution(execution) => {
                self.executions.insert(execution.id, execution);
            }
        }
        Ok(())
    }

    /// Reject entry writes built from a ledger that no longer matches the
    /// stored bible: a reused sequence or a second active entry for a slug
    fn check_entry(&self, entry: &WorldBibleEntry) -> Result<(), StoreError> {
        let concurrent = |key: String| StoreError::Concurrent {
            entity: "world bible entry",
            key,
        };
        let others = self
            .entries
            .values()
            .filter(|other| other.bible_id == entry.bible_id && other.id != entry.id);

        for other in others {
            if !self.entries.contains_key(&entry.id) && other.sequence == entry.sequence {
                return Err(concurrent(format!("{}#{}", entry.bible_id, entry.sequence)));
            }
            if entry.is_active && other.is_active && other.slug == entry.slug {
                return Err(concurrent(format!("{}/{}", entry.bible_id, entry.slug)));
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            plans: self.plans.values().cloned().collect(),
            conversations: self.conversations.values().cloned().collect(),
            personas: self.personas.values().cloned().collect(),
            templates: self.templates.values().cloned().collect(),
            blueprints: self.blueprints.values().cloned().collect(),
            scrolls: self.scrolls.values().cloned().collect(),
            sections: self.sections.values().cloned().collect(),
            scenes: self.scenes.values().cloned().collect(),
            world_bibles: self.world_bibles.values().cloned().collect(),
            entries: self.entries.values().cloned().collect(),
            backlog_items: self.backlog_items.values().cloned().collect(),
            obligations: self.obligations.values().cloned().collect(),
            executions: self.executions.values().cloned().collect(),
        }
    }
}

/// Process-local [`Store`] backed by ordered maps
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store loaded from a snapshot; writes are replayed in dependency order
    ///
    /// # Errors
    ///
    /// Fails when the snapshot violates a unique key or a parent reference.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let mut state = State::default();
        let writes = snapshot
            .plans
            .into_iter()
            .map(Write::from)
            .chain(snapshot.conversations.into_iter().map(Write::from))
            .chain(snapshot.personas.into_iter().map(Write::from))
            .chain(snapshot.templates.into_iter().map(Write::from))
            .chain(snapshot.blueprints.into_iter().map(Write::from))
            .chain(snapshot.scrolls.into_iter().map(Write::from))
            .chain(snapshot.sections.into_iter().map(Write::from))
            .chain(snapshot.scenes.into_iter().map(Write::from))
            .chain(snapshot.world_bibles.into_iter().map(Write::from))
            .chain(snapshot.entries.into_iter().map(Write::from))
            .chain(snapshot.backlog_items.into_iter().map(Write::InsertBacklogItem))
            .chain(snapshot.obligations.into_iter().map(Write::from))
            .chain(snapshot.executions.into_iter().map(Write::from));
        for write in writes {
            state.apply(write)?;
        }
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Dump every collection
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.read().snapshot()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        Ok(f(&self.state.read()))
    }
}

fn sorted_by_order<T>(items: impl Iterator<Item = T>, key: impl Fn(&T) -> u32) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(key);
    items
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn plan(&self, id: PlanId) -> Result<Option<Plan>, StoreError> {
        self.read(|s| s.plans.get(&id).cloned())
    }

    async fn plans(&self) -> Result<Vec<Plan>, StoreError> {
        self.read(|s| s.plans.values().cloned().collect())
    }

    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        self.read(|s| s.conversations.get(&id).cloned())
    }

    async fn persona(&self, agent_id: AgentId) -> Result<Option<PersonaProfile>, StoreError> {
        self.read(|s| s.personas.get(&agent_id).cloned())
    }

    async fn templates(&self) -> Result<Vec<PhaseTemplate>, StoreError> {
        self.read(|s| s.templates.values().cloned().collect())
    }

    async fn blueprint(&self, id: BlueprintId) -> Result<Option<ChapterBlueprint>, StoreError> {
        self.read(|s| s.blueprints.get(&id).cloned())
    }

    async fn blueprints_for_plan(
        &self,
        plan_id: PlanId,
    ) -> Result<Vec<ChapterBlueprint>, StoreError> {
        self.read(|s| {
            s.blueprints
                .values()
                .filter(|b| b.plan_id == plan_id)
                .cloned()
                .collect()
        })
    }

    async fn scroll(&self, id: ScrollId) -> Result<Option<ChapterScroll>, StoreError> {
        self.read(|s| s.scrolls.get(&id).cloned())
    }

    async fn scrolls_for_blueprint(
        &self,
        blueprint_id: BlueprintId,
    ) -> Result<Vec<ChapterScroll>, StoreError> {
        self.read(|s| {
            sorted_by_order(
                s.scrolls.values().filter(|c| c.blueprint_id == blueprint_id).cloned(),
                |c| c.version,
            )
        })
    }

    async fn section(&self, id: SectionId) -> Result<Option<ChapterSection>, StoreError> {
        self.read(|s| s.sections.get(&id).cloned())
    }

    async fn sections_for_scroll(
        &self,
        scroll_id: ScrollId,
    ) -> Result<Vec<ChapterSection>, StoreError> {
        self.read(|s| {
            sorted_by_order(
                s.sections.values().filter(|c| c.scroll_id == scroll_id).cloned(),
                |c| c.order,
            )
        })
    }

    async fn scene(&self, id: SceneId) -> Result<Option<ChapterScene>, StoreError> {
        self.read(|s| s.scenes.get(&id).cloned())
    }

    async fn scenes_for_section(
        &self,
        section_id: SectionId,
    ) -> Result<Vec<ChapterScene>, StoreError> {
        self.read(|s| {
            sorted_by_order(
                s.scenes.values().filter(|c| c.section_id == section_id).cloned(),
                |c| c.order,
            )
        })
    }

    async fn world_bibles(&self, plan_id: Option<PlanId>) -> Result<Vec<WorldBible>, StoreError> {
        self.read(|s| {
            s.world_bibles
                .values()
                .filter(|b| plan_id.map_or(true, |p| b.plan_id == p))
                .cloned()
                .collect()
        })
    }

    async fn find_world_bible(
        &self,
        plan_id: PlanId,
        domain: &str,
        branch_slug: &str,
    ) -> Result<Option<WorldBible>, StoreError> {
        self.read(|s| {
            s.world_bibles
                .values()
                .find(|b| {
                    b.plan_id == plan_id && b.domain == domain && b.branch_slug == branch_slug
                })
                .cloned()
        })
    }

    async fn world_bible_entries(
        &self,
        bible_id: WorldBibleId,
    ) -> Result<Vec<WorldBibleEntry>, StoreError> {
        self.read(|s| {
            let mut entries: Vec<WorldBibleEntry> = s
                .entries
                .values()
                .filter(|e| e.bible_id == bible_id)
                .cloned()
                .collect();
            entries.sort_by_key(|e| e.sequence);
            entries
        })
    }

    async fn backlog_items(&self, plan_id: Option<PlanId>) -> Result<Vec<BacklogItem>, StoreError> {
        self.read(|s| {
            s.backlog_items
                .values()
                .filter(|i| plan_id.map_or(true, |p| i.plan_id == p))
                .cloned()
                .collect()
        })
    }

    async fn obligations(
        &self,
        plan_id: Option<PlanId>,
    ) -> Result<Vec<PersonaObligation>, StoreError> {
        self.read(|s| {
            s.obligations
                .values()
                .filter(|o| plan_id.map_or(true, |p| o.plan_id == p))
                .cloned()
                .collect()
        })
    }

    async fn executions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlannerExecution>, StoreError> {
        self.read(|s| {
            s.executions
                .values()
                .filter(|e| since.map_or(true, |t| e.completed_at >= t))
                .cloned()
                .collect()
        })
    }

    async fn commit(&self, tx: Transaction) -> Result<(), StoreError> {
        let count = tx.len();
        let mut guard = self.state.write();
        let mut staged = guard.clone();
        for write in tx.into_writes() {
            staged.apply(write)?;
        }
        *guard = staged;
        tracing::trace!(writes = count, "transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ledger::{UpsertRequest, WorldBibleLedger};
    use quill_types::SceneStatus;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn failed_commit_leaves_state_untouched() {
        let store = InMemoryStore::new();
        let plan = Plan::new("Ashfall", "desc", now());
        let mut tx = Transaction::new();
        tx.put(plan.clone());
        tx.put(ChapterScene {
            id: SceneId::new(),
            section_id: SectionId::new(),
            order: 0,
            title: "Orphan".into(),
            slug: "orphan".into(),
            description: String::new(),
            status: SceneStatus::Pending,
            content: None,
            updated_at: now(),
        });

        let err = store.commit(tx).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { entity: "scene", .. }));
        assert!(store.plan(plan.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn backlog_key_is_unique_per_plan() {
        let store = InMemoryStore::new();
        let plan = PlanId::new();
        let mut tx = Transaction::new();
        tx.insert_backlog_item(BacklogItem::new(plan, "B-1", "first", now()));
        store.commit(tx).await.unwrap();

        let mut tx = Transaction::new();
        tx.insert_backlog_item(BacklogItem::new(plan, "B-1", "again", now()));
        assert!(matches!(
            store.commit(tx).await,
            Err(StoreError::Conflict { entity: "backlog item", .. })
        ));

        let mut tx = Transaction::new();
        tx.insert_backlog_item(BacklogItem::new(PlanId::new(), "B-1", "other plan", now()));
        store.commit(tx).await.unwrap();
        assert_eq!(store.backlog_items(None).await.unwrap().len(), 2);
        assert_eq!(store.backlog_items(Some(plan)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn world_bible_key_is_unique() {
        let store = InMemoryStore::new();
        let plan = PlanId::new();
        let mut tx = Transaction::new();
        tx.put(WorldBible::new(plan, "story", "main", now()));
        store.commit(tx).await.unwrap();

        let mut tx = Transaction::new();
        tx.put(WorldBible::new(plan, "story", "main", now()));
        assert!(store.commit(tx).await.is_err());
        assert!(store
            .find_world_bible(plan, "story", "main")
            .await
            .unwrap()
            .is_some());
    }

    async fn bible_store() -> (InMemoryStore, WorldBible) {
        let store = InMemoryStore::new();
        let plan = Plan::new("Ashfall", "desc", now());
        let bible = WorldBible::new(plan.id, "story", "main", now());
        let mut tx = Transaction::new();
        tx.put(plan).put(bible.clone());
        store.commit(tx).await.unwrap();
        (store, bible)
    }

    async fn pass_from(
        store: &InMemoryStore,
        entries: Vec<WorldBibleEntry>,
        bible: WorldBibleId,
        summary: &str,
    ) -> Result<(), StoreError> {
        let mut ledger = WorldBibleLedger::from_entries(bible, entries).unwrap();
        ledger
            .apply_pass([UpsertRequest::new("characters", "Mira", summary)], now())
            .unwrap();
        let mut tx = Transaction::new();
        for entry in ledger.take_changes() {
            tx.put(entry);
        }
        store.commit(tx).await
    }

    #[tokio::test]
    async fn concurrent_seed_passes_keep_one_active_entry() {
        let (store, bible) = bible_store().await;
        let read_a = store.world_bible_entries(bible.id).await.unwrap();
        let read_b = read_a.clone();

        pass_from(&store, read_a, bible.id, "A courier who knows the ash roads.")
            .await
            .unwrap();
        let err = pass_from(&store, read_b, bible.id, "A smuggler with a debt to pay.")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrent { entity: "world bible entry", .. }));
        assert!(err.is_transient());

        let entries = store.world_bible_entries(bible.id).await.unwrap();
        let active: Vec<(u32, u64)> = entries
            .iter()
            .filter(|e| e.is_active)
            .map(|e| (e.version, e.sequence))
            .collect();
        assert_eq!(active, vec![(1, 1)]);

        // the loser reloads and supersedes cleanly
        let reloaded = store.world_bible_entries(bible.id).await.unwrap();
        pass_from(&store, reloaded, bible.id, "A smuggler with a debt to pay.")
            .await
            .unwrap();
        let entries = store.world_bible_entries(bible.id).await.unwrap();
        let ledger = WorldBibleLedger::from_entries(bible.id, entries).unwrap();
        assert_eq!(ledger.active_entry("characters:mira").unwrap().version, 2);
    }

    #[tokio::test]
    async fn concurrent_supersede_of_one_version_is_rejected() {
        let (store, bible) = bible_store().await;
        pass_from(&store, Vec::new(), bible.id, "A courier who knows the ash roads.")
            .await
            .unwrap();
        let seeded = store.world_bible_entries(bible.id).await.unwrap();

        pass_from(&store, seeded.clone(), bible.id, "Mira joins the wardens.")
            .await
            .unwrap();
        assert!(matches!(
            pass_from(&store, seeded, bible.id, "Mira leaves the city.").await,
            Err(StoreError::Concurrent { .. })
        ));

        let entries = store.world_bible_entries(bible.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.iter().filter(|e| e.is_active).count(), 1);
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_records() {
        let store = InMemoryStore::new();
        let plan = Plan::new("Ashfall", "desc", now());
        let bible = WorldBible::new(plan.id, "story", "main", now());
        let mut tx = Transaction::new();
        tx.put(plan.clone()).put(bible.clone());
        tx.insert_backlog_item(BacklogItem::new(plan.id, "B-1", "first", now()));
        store.commit(tx).await.unwrap();

        let restored = InMemoryStore::from_snapshot(store.snapshot()).unwrap();
        assert_eq!(restored.snapshot(), store.snapshot());
        assert_eq!(restored.world_bibles(Some(plan.id)).await.unwrap(), vec![bible]);
    }
}
