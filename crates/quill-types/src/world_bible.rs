//! World bible records
//!
//! A world bible is the canonical-fact ledger for one `(plan, domain, branch)`.
//! Its entries are append-only: superseded facts are deactivated, never deleted.

use crate::id::{AgentId, EntryId, ExecutionId, PlanId, WorldBibleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical-fact ledger header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldBible {
    /// Bible identifier
    pub id: WorldBibleId,
    /// Owning plan
    pub plan_id: PlanId,
    /// Fact domain (e.g. "canon")
    pub domain: String,
    /// Narrative branch slug
    pub branch_slug: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl WorldBible {
    /// Create a new bible
    #[must_use]
    pub fn new(
        plan_id: PlanId,
        domain: impl Into<String>,
        branch_slug: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WorldBibleId::new(),
            plan_id,
            domain: domain.into(),
            branch_slug: branch_slug.into(),
            created_at: now,
        }
    }
}

/// How an entry came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    /// First version of a slug
    Seed,
    /// Supersedes a prior version
    Update,
}

/// Where an entry's content originated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryProvenance {
    /// Producing execution
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    /// Producing agent
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    /// Plan pass the entry was produced in
    #[serde(default)]
    pub iteration_index: Option<u32>,
}

/// A single versioned fact keyed by `(bible, slug)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldBibleEntry {
    /// Entry identifier
    pub id: EntryId,
    /// Owning bible
    pub bible_id: WorldBibleId,
    /// Category-namespaced slug, e.g. `characters:john-doe`
    pub slug: String,
    /// Category (e.g. "characters")
    pub category: String,
    /// Display name
    pub name: String,
    /// Fact summary
    pub summary: String,
    /// In-world status (e.g. "active", "deceased")
    pub status: String,
    /// Continuity notes
    #[serde(default)]
    pub continuity_notes: Vec<String>,
    /// Per-slug version, starting at 1
    pub version: u32,
    /// Per-bible monotonically increasing sequence
    pub sequence: u64,
    /// Seed or update
    pub change_type: ChangeType,
    /// Prior version of this slug
    #[serde(default)]
    pub derived_from_entry_id: Option<EntryId>,
    /// Whether this is the slug's current version
    pub is_active: bool,
    /// Origin metadata
    #[serde(default)]
    pub provenance: EntryProvenance,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time (including deactivation)
    pub updated_at: DateTime<Utc>,
}
