//! Conversations, persona profiles and phase templates

use crate::execution::PhaseKind;
use crate::id::{AgentId, ConversationId, PlanId, TemplateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation thread with the generative backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation identifier
    pub id: ConversationId,
    /// Plan the conversation serves
    pub plan_id: PlanId,
    /// Agent speaking in the conversation
    pub agent_id: AgentId,
    /// Display title
    pub title: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Persona context rendered into scene prompts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaProfile {
    /// Agent the persona belongs to
    pub agent_id: AgentId,
    /// Persona name
    pub name: String,
    /// Voice / role summary
    #[serde(default)]
    pub summary: String,
    /// Remembered facts, most recent last
    #[serde(default)]
    pub memories: Vec<String>,
    /// Free-form world notes kept by the persona
    #[serde(default)]
    pub world_notes: Vec<String>,
}

/// Registered prompt template for a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTemplate {
    /// Template identifier
    pub id: TemplateId,
    /// Phase the template drives
    pub phase: PhaseKind,
    /// Template name
    pub name: String,
    /// Instruction preamble placed at the top of prompts
    pub body: String,
    /// Whether the template is enabled
    pub is_active: bool,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl PhaseTemplate {
    /// Create an active template
    #[must_use]
    pub fn new(
        phase: PhaseKind,
        name: impl Into<String>,
        body: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TemplateId::new(),
            phase,
            name: name.into(),
            body: body.into(),
            is_active: true,
            updated_at: now,
        }
    }

    /// Mark inactive
    #[inline]
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
