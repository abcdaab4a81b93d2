//! Phase kinds and planner execution telemetry
//!
//! Every phase invocation leaves behind an immutable [`PlannerExecution`]
//! holding one or more [`TranscriptEntry`] records. Health reporting is a
//! projection over these records.

use crate::id::{AgentId, BlueprintId, ConversationId, ExecutionId, PlanId, SceneId, ScrollId};
use crate::value::StructuredValue;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One stage of the generation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    /// Project vision
    Vision,
    /// Canonical world facts
    WorldBible,
    /// Iterative planning pass (backlog + obligations)
    Iterative,
    /// Chapter blueprint design
    ChapterArchitect,
    /// Blueprint revision
    ScrollRefiner,
    /// Scene prose
    SceneWeaver,
}

impl PhaseKind {
    /// All phases in pipeline order
    pub const ALL: [PhaseKind; 6] = [
        PhaseKind::Vision,
        PhaseKind::WorldBible,
        PhaseKind::Iterative,
        PhaseKind::ChapterArchitect,
        PhaseKind::ScrollRefiner,
        PhaseKind::SceneWeaver,
    ];

    /// Stable tag used for schemas, templates and alert ids
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::WorldBible => "world-bible",
            Self::Iterative => "iterative",
            Self::ChapterArchitect => "blueprint",
            Self::ScrollRefiner => "scroll",
            Self::SceneWeaver => "scene",
        }
    }

    /// Whether replies are validated against a structured schema
    /// (as opposed to the salient-term coverage gate)
    #[inline]
    #[must_use]
    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::SceneWeaver)
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Vision => "Vision",
            Self::WorldBible => "WorldBible",
            Self::Iterative => "Iterative",
            Self::ChapterArchitect => "ChapterArchitect",
            Self::ScrollRefiner => "ScrollRefiner",
            Self::SceneWeaver => "SceneWeaver",
        };
        f.write_str(s)
    }
}

/// Error returned for an unrecognized phase name or tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase: '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for PhaseKind {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        PhaseKind::ALL
            .into_iter()
            .find(|k| k.tag() == needle || k.to_string().to_ascii_lowercase() == needle)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

/// Final outcome of a phase invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    /// Artifacts fully persisted
    Completed,
    /// Artifacts partially persisted
    Blocked,
    /// Cooperatively cancelled
    Cancelled,
    /// Validation, IO or configuration failure
    Failed,
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "Completed",
            Self::Blocked => "Blocked",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Critique/retry budget bookkeeping attached by the critique loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CritiqueBudgetStatus {
    /// Invoked without a critique loop
    #[default]
    NotRequested,
    /// Attempt made while retries remained
    WithinBudget,
    /// Final attempt; budget spent
    Exhausted,
}

impl std::fmt::Display for CritiqueBudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotRequested => "NotRequested",
            Self::WithinBudget => "WithinBudget",
            Self::Exhausted => "Exhausted",
        };
        f.write_str(s)
    }
}

/// Outcome of reply validation as recorded on a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationStatus {
    /// Reply accepted
    Passed,
    /// Reply rejected
    Failed,
}

/// Correlation ids tying a transcript to conversation and chapter artifacts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationIds {
    /// Conversation the exchange happened in
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    /// Message id returned by the generative backend
    #[serde(default)]
    pub message_id: Option<String>,
    /// Scene under generation
    #[serde(default)]
    pub scene_id: Option<SceneId>,
    /// Scroll under generation
    #[serde(default)]
    pub scroll_id: Option<ScrollId>,
    /// Blueprint under generation
    #[serde(default)]
    pub blueprint_id: Option<BlueprintId>,
}

/// One prompt/reply exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    /// Phase the exchange belongs to
    pub phase: PhaseKind,
    /// Prompt text sent
    pub prompt: String,
    /// Reply text received
    pub reply: String,
    /// Generative call latency
    pub latency_ms: u64,
    /// Validation outcome
    pub validation_status: ValidationStatus,
    /// Human-readable validation details (violations, missing terms)
    #[serde(default)]
    pub validation_details: Vec<String>,
    /// Correlation ids
    #[serde(default)]
    pub correlation: CorrelationIds,
    /// Extra diagnostics
    #[serde(default)]
    pub diagnostics: IndexMap<String, StructuredValue>,
    /// Recording time
    pub recorded_at: DateTime<Utc>,
}

impl TranscriptEntry {
    /// Leading slice of the reply, for operator snippets
    #[must_use]
    pub fn reply_snippet(&self, max_chars: usize) -> String {
        snippet(&self.reply, max_chars)
    }
}

/// Truncate on a char boundary, appending an ellipsis when cut
#[must_use]
pub fn snippet(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Immutable record of one phase invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerExecution {
    /// Execution identifier
    pub id: ExecutionId,
    /// Plan the phase ran against
    pub plan_id: PlanId,
    /// Phase
    pub phase: PhaseKind,
    /// Invoking agent
    pub agent_id: AgentId,
    /// Plan pass / iteration index from the invocation context
    pub iteration_index: u32,
    /// Final outcome
    pub outcome: ExecutionOutcome,
    /// Critique budget status
    #[serde(default)]
    pub critique_status: CritiqueBudgetStatus,
    /// Transcripts (zero when cancelled before the reply)
    #[serde(default)]
    pub transcripts: Vec<TranscriptEntry>,
    /// Error text for failed runs
    #[serde(default)]
    pub error: Option<String>,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

impl PlannerExecution {
    /// Correlation ids of the last transcript, if any
    #[must_use]
    pub fn correlation(&self) -> Option<&CorrelationIds> {
        self.transcripts.last().map(|t| &t.correlation)
    }
}
