//! Chapter hierarchy: blueprint → scroll → section → scene

use crate::id::{BlueprintId, PlanId, SceneId, ScrollId, SectionId};
use crate::value::StructuredValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structural plan for a chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterBlueprint {
    /// Blueprint identifier
    pub id: BlueprintId,
    /// Owning plan
    pub plan_id: PlanId,
    /// Chapter title
    pub title: String,
    /// URL-safe slug
    pub slug: String,
    /// Chapter description
    pub description: String,
    /// Raw structure payload accepted from the architect phase
    #[serde(default)]
    pub structure: StructuredValue,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// A versioned revision of a blueprint; one per blueprint is active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterScroll {
    /// Scroll identifier
    pub id: ScrollId,
    /// Parent blueprint
    pub blueprint_id: BlueprintId,
    /// Revision number, starting at 1
    pub version: u32,
    /// Scroll title
    pub title: String,
    /// URL-safe slug
    pub slug: String,
    /// Chapter synopsis at this revision
    pub synopsis: String,
    /// Whether this is the blueprint's current revision
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Section of a scroll; sections form a tree via `parent_section_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSection {
    /// Section identifier
    pub id: SectionId,
    /// Owning scroll
    pub scroll_id: ScrollId,
    /// Parent section, `None` for top-level sections
    #[serde(default)]
    pub parent_section_id: Option<SectionId>,
    /// Position among siblings
    pub order: u32,
    /// Section title
    pub title: String,
    /// URL-safe slug
    pub slug: String,
    /// Section description
    #[serde(default)]
    pub description: String,
    /// Section summary
    pub summary: String,
}

/// Generation status of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneStatus {
    /// Not yet drafted
    Pending,
    /// Draft in flight
    Drafting,
    /// Prose accepted
    Completed,
    /// Prose rejected, needs another pass
    RevisionNeeded,
    /// Retired; never rewritten
    Archived,
}

impl SceneStatus {
    /// Whether a scene in this status may receive new prose
    #[inline]
    #[must_use]
    pub fn accepts_prose(&self) -> bool {
        !matches!(self, Self::Archived)
    }
}

/// An individual narrative scene, ordered within its section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterScene {
    /// Scene identifier
    pub id: SceneId,
    /// Owning section
    pub section_id: SectionId,
    /// Position within the section
    pub order: u32,
    /// Scene title
    pub title: String,
    /// URL-safe slug
    pub slug: String,
    /// Scene description / beat
    pub description: String,
    /// Generation status
    pub status: SceneStatus,
    /// Accepted prose
    #[serde(default)]
    pub content: Option<String>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archived_scenes_reject_prose() {
        assert!(SceneStatus::Pending.accepts_prose());
        assert!(SceneStatus::RevisionNeeded.accepts_prose());
        assert!(!SceneStatus::Archived.accepts_prose());
    }
}
