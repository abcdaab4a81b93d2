//! Strongly-typed identifiers
//!
//! Every entity in the pipeline is addressed by a ULID wrapped in its own
//! newtype, so a `SceneId` can never be passed where a `ScrollId` is expected.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an identifier from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id '{value}'")]
pub struct IdParseError {
    /// Identifier kind (e.g. "plan")
    pub kind: &'static str,
    /// Rejected input
    pub value: String,
}

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate a new identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Identifier kind used in diagnostics
            pub const KIND: &'static str = $kind;
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s.trim()).map(Self).map_err(|_| IdParseError {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

ulid_id!(
    /// Plan identifier
    PlanId,
    "plan"
);
ulid_id!(
    /// Conversation identifier
    ConversationId,
    "conversation"
);
ulid_id!(
    /// Agent (persona) identifier
    AgentId,
    "agent"
);
ulid_id!(
    /// Chapter blueprint identifier
    BlueprintId,
    "blueprint"
);
ulid_id!(
    /// Chapter scroll (blueprint revision) identifier
    ScrollId,
    "scroll"
);
ulid_id!(
    /// Chapter section identifier
    SectionId,
    "section"
);
ulid_id!(
    /// Chapter scene identifier
    SceneId,
    "scene"
);
ulid_id!(
    /// World bible identifier
    WorldBibleId,
    "world bible"
);
ulid_id!(
    /// World bible entry identifier
    EntryId,
    "world bible entry"
);
ulid_id!(
    /// Backlog item row identifier
    BacklogItemId,
    "backlog item"
);
ulid_id!(
    /// Persona obligation identifier
    ObligationId,
    "obligation"
);
ulid_id!(
    /// Planner execution identifier
    ExecutionId,
    "execution"
);
ulid_id!(
    /// Phase template identifier
    TemplateId,
    "template"
);
