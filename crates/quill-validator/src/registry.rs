//! Built-in phase schemas
//!
//! The registry is built once and never mutated afterwards; the default
//! instance is shared process-wide through [`SchemaRegistry::shared`].

use crate::schema::{FieldKind, FieldSpec, PhaseSchema};
use once_cell::sync::Lazy;
use quill_types::PhaseKind;
use std::collections::HashMap;
use std::sync::Arc;

/// Allowed in-world statuses for world bible entries
pub const ENTRY_STATUSES: &[&str] = &[
    "active", "inactive", "deceased", "destroyed", "missing", "unknown",
];

/// Allowed vision tones
pub const VISION_TONES: &[&str] = &[
    "hopeful", "bleak", "whimsical", "tense", "melancholic", "epic", "intimate",
];

/// Allowed backlog priorities
pub const BACKLOG_PRIORITIES: &[&str] = &["low", "medium", "high"];

/// Levels of nested `sections` a chapter outline may carry
pub const MAX_SECTION_DEPTH: usize = 3;

/// Backlog statuses a planning pass may move an existing item to
pub const BACKLOG_PROGRESS: &[&str] = &["in-progress", "complete"];

/// World bible categories, in the order they are applied
pub const WORLD_BIBLE_CATEGORIES: &[&str] =
    &["characters", "locations", "factions", "artifacts"];

static SHARED: Lazy<Arc<SchemaRegistry>> = Lazy::new(|| Arc::new(SchemaRegistry::builtin()));

/// Immutable map from phase to schema
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<PhaseKind, PhaseSchema>,
}

impl SchemaRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every structured phase's schema
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(vision_schema());
        registry.register(world_bible_schema());
        registry.register(iterative_schema());
        registry.register(blueprint_schema());
        registry.register(scroll_schema());
        registry
    }

    /// Process-wide built-in registry
    #[must_use]
    pub fn shared() -> Arc<SchemaRegistry> {
        Arc::clone(&SHARED)
    }

    /// Register (or replace) a schema; only used while building
    pub fn register(&mut self, schema: PhaseSchema) {
        self.schemas.insert(schema.phase, schema);
    }

    /// Schema for a phase
    #[must_use]
    pub fn get(&self, phase: PhaseKind) -> Option<&PhaseSchema> {
        self.schemas.get(&phase)
    }

    /// Phases with a registered schema
    #[must_use]
    pub fn phases(&self) -> Vec<PhaseKind> {
        let mut phases: Vec<_> = self.schemas.keys().copied().collect();
        phases.sort();
        phases
    }
}

fn vision_schema() -> PhaseSchema {
    PhaseSchema::new(
        PhaseKind::Vision,
        vec![
            FieldSpec::required("title", FieldKind::text(3)),
            FieldSpec::required("logline", FieldKind::text(20)),
            FieldSpec::required("genre", FieldKind::text(3)),
            FieldSpec::required("tone", FieldKind::Enum(VISION_TONES)),
            FieldSpec::required("themes", FieldKind::list_of(FieldKind::text(3), 1)),
            FieldSpec::required(
                "pillars",
                FieldKind::list_of(
                    FieldKind::Object(vec![
                        FieldSpec::required("name", FieldKind::text(3)),
                        FieldSpec::required("description", FieldKind::text(20)),
                    ]),
                    1,
                ),
            ),
            FieldSpec::optional("audience", FieldKind::text(3)),
        ],
    )
}

fn world_entry() -> FieldKind {
    FieldKind::Object(vec![
        FieldSpec::required("name", FieldKind::text(2)),
        FieldSpec::required("summary", FieldKind::text(20)),
        FieldSpec::required("status", FieldKind::Enum(ENTRY_STATUSES)),
        FieldSpec::optional("continuityNotes", FieldKind::list_of(FieldKind::text(3), 0)),
    ])
}

fn world_bible_schema() -> PhaseSchema {
    PhaseSchema::new(
        PhaseKind::WorldBible,
        vec![
            FieldSpec::required("characters", FieldKind::list_of(world_entry(), 0)),
            FieldSpec::required("locations", FieldKind::list_of(world_entry(), 0)),
            FieldSpec::optional("factions", FieldKind::list_of(world_entry(), 0)),
            FieldSpec::optional("artifacts", FieldKind::list_of(world_entry(), 0)),
        ],
    )
}

fn iterative_schema() -> PhaseSchema {
    PhaseSchema::new(
        PhaseKind::Iterative,
        vec![
            FieldSpec::required("passTitle", FieldKind::text(3)),
            FieldSpec::required("summary", FieldKind::text(40)),
            FieldSpec::required(
                "backlog",
                FieldKind::list_of(
                    FieldKind::Object(vec![
                        FieldSpec::required("id", FieldKind::text(1)),
                        FieldSpec::required("title", FieldKind::text(3)),
                        FieldSpec::optional("description", FieldKind::text(10)),
                        FieldSpec::required("priority", FieldKind::Enum(BACKLOG_PRIORITIES)),
                    ]),
                    1,
                ),
            ),
            FieldSpec::optional(
                "progress",
                FieldKind::list_of(
                    FieldKind::Object(vec![
                        FieldSpec::required("id", FieldKind::text(1)),
                        FieldSpec::required("status", FieldKind::Enum(BACKLOG_PROGRESS)),
                    ]),
                    0,
                ),
            ),
            FieldSpec::optional(
                "obligations",
                FieldKind::list_of(
                    FieldKind::Object(vec![
                        FieldSpec::required("persona", FieldKind::text(2)),
                        FieldSpec::required("description", FieldKind::text(10)),
                    ]),
                    0,
                ),
            ),
        ],
    )
}

fn scene_outline() -> FieldKind {
    FieldKind::Object(vec![
        FieldSpec::required("title", FieldKind::text(3)),
        FieldSpec::required("description", FieldKind::text(20)),
    ])
}

/// Section outline with optional nested `sections`, `depth` levels deep
fn blueprint_section(depth: usize) -> FieldKind {
    let mut fields = vec![
        FieldSpec::required("title", FieldKind::text(3)),
        FieldSpec::required("summary", FieldKind::text(20)),
        FieldSpec::optional("description", FieldKind::text(0)),
        FieldSpec::required("scenes", FieldKind::list_of(scene_outline(), 1)),
    ];
    if depth > 1 {
        fields.push(FieldSpec::optional(
            "sections",
            FieldKind::list_of(blueprint_section(depth - 1), 1),
        ));
    }
    FieldKind::Object(fields)
}

fn scroll_section(depth: usize) -> FieldKind {
    let mut fields = vec![
        FieldSpec::required("title", FieldKind::text(3)),
        FieldSpec::required("summary", FieldKind::text(20)),
        FieldSpec::optional("order", FieldKind::non_negative()),
        FieldSpec::optional("scenes", FieldKind::list_of(scene_outline(), 0)),
    ];
    if depth > 1 {
        fields.push(FieldSpec::optional(
            "sections",
            FieldKind::list_of(scroll_section(depth - 1), 1),
        ));
    }
    FieldKind::Object(fields)
}

fn blueprint_schema() -> PhaseSchema {
    PhaseSchema::new(
        PhaseKind::ChapterArchitect,
        vec![
            FieldSpec::required("title", FieldKind::text(3)),
            FieldSpec::required("description", FieldKind::text(20)),
            FieldSpec::required("synopsis", FieldKind::text(40)),
            FieldSpec::required(
                "sections",
                FieldKind::list_of(blueprint_section(MAX_SECTION_DEPTH), 1),
            ),
        ],
    )
}

fn scroll_schema() -> PhaseSchema {
    PhaseSchema::new(
        PhaseKind::ScrollRefiner,
        vec![
            FieldSpec::required("title", FieldKind::text(3)),
            FieldSpec::required("synopsis", FieldKind::text(40)),
            FieldSpec::optional("revisionNotes", FieldKind::text(10)),
            FieldSpec::required(
                "sections",
                FieldKind::list_of(scroll_section(MAX_SECTION_DEPTH), 1),
            ),
        ],
    )
}
