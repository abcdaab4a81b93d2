//! Quill Types
//!
//! The data model shared by every Quill crate:
//!
//! - [`Plan`] with its append-only [`PlanPass`] history
//! - The chapter hierarchy: [`ChapterBlueprint`] → [`ChapterScroll`] →
//!   [`ChapterSection`] → [`ChapterScene`]
//! - [`WorldBible`] and its versioned [`WorldBibleEntry`] records
//! - [`BacklogItem`] and [`PersonaObligation`] lifecycles
//! - [`PlannerExecution`] / [`TranscriptEntry`] telemetry
//! - [`StructuredValue`], a library-neutral nested value
//!
//! Nothing here performs IO; persistence lives in `quill-store`.

#![warn(unreachable_pub)]

pub mod backlog;
pub mod chapter;
pub mod clock;
pub mod execution;
pub mod id;
pub mod persona;
pub mod plan;
pub mod value;
pub mod world_bible;

pub use backlog::{BacklogItem, BacklogStatus, ObligationStatus, PersonaObligation};
pub use chapter::{ChapterBlueprint, ChapterScene, ChapterScroll, ChapterSection, SceneStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use execution::{
    snippet, CorrelationIds, CritiqueBudgetStatus, ExecutionOutcome, PhaseKind,
    PlannerExecution, TranscriptEntry, UnknownPhase, ValidationStatus,
};
pub use id::{
    AgentId, BacklogItemId, BlueprintId, ConversationId, EntryId, ExecutionId, IdParseError,
    ObligationId, PlanId, SceneId, ScrollId, SectionId, TemplateId, WorldBibleId,
};
pub use persona::{Conversation, PersonaProfile, PhaseTemplate};
pub use plan::{Plan, PlanPass};
pub use value::{StructuredMap, StructuredValue};
pub use world_bible::{ChangeType, EntryProvenance, WorldBible, WorldBibleEntry};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
