//! Write batches
//!
//! A [`Transaction`] collects writes and is handed to [`crate::Store::commit`],
//! which applies all of them or none.

use quill_types::{
    BacklogItem, ChapterBlueprint, ChapterScene, ChapterScroll, ChapterSection, Conversation,
    PersonaObligation, PersonaProfile, PhaseTemplate, Plan, PlannerExecution, WorldBible,
    WorldBibleEntry,
};

/// One buffered write
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or replace a plan
    Plan(Plan),
    /// Create or replace a conversation
    Conversation(Conversation),
    /// Create or replace a persona profile
    Persona(PersonaProfile),
    /// Create or replace a phase template
    Template(PhaseTemplate),
    /// Create or replace a blueprint
    Blueprint(ChapterBlueprint),
    /// Create or replace a scroll
    Scroll(ChapterScroll),
    /// Create or replace a section
    Section(ChapterSection),
    /// Create or replace a scene
    Scene(ChapterScene),
    /// Create a world bible; `(plan, domain, branch)` must be unique
    WorldBible(WorldBible),
    /// Create or replace a world bible entry
    Entry(WorldBibleEntry),
    /// Create a backlog item; `(plan, backlog_id)` must be unique
    InsertBacklogItem(BacklogItem),
    /// Replace an existing backlog item
    BacklogItem(BacklogItem),
    /// Create or replace an obligation
    Obligation(PersonaObligation),
    /// Record an execution
    Execution(PlannerExecution),
}

macro_rules! impl_from_write {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Write {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_write! {
    Plan => Plan,
    Conversation => Conversation,
    PersonaProfile => Persona,
    PhaseTemplate => Template,
    ChapterBlueprint => Blueprint,
    ChapterScroll => Scroll,
    ChapterSection => Section,
    ChapterScene => Scene,
    WorldBible => WorldBible,
    WorldBibleEntry => Entry,
    BacklogItem => BacklogItem,
    PersonaObligation => Obligation,
    PlannerExecution => Execution,
}

/// Ordered batch of writes applied atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    writes: Vec<Write>,
}

impl Transaction {
    /// Empty transaction
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a create-or-replace write
    pub fn put(&mut self, value: impl Into<Write>) -> &mut Self {
        self.writes.push(value.into());
        self
    }

    /// Buffer a backlog item creation guarded by its unique key
    pub fn insert_backlog_item(&mut self, item: BacklogItem) -> &mut Self {
        self.writes.push(Write::InsertBacklogItem(item));
        self
    }

    /// Buffered writes in order
    #[inline]
    #[must_use]
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Number of buffered writes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing is buffered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Consume into the write list
    #[must_use]
    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}
