//! Error types for phase execution
//!
//! - **NotFound**: a required record is absent; fatal, never retried here
//! - **ValidationFailed**: the reply was rejected; carries the full result
//! - **Chat / Store**: transient IO from a collaborator, propagated unmodified
//! - **Configuration**: bad invocation metadata, raised before any network call
//! - **Persistence**: the reply passed but its artifacts could not be stored;
//!   wraps the underlying error and keeps the transcript

use quill_ledger::{LedgerError, TransitionError};
use quill_store::StoreError;
use quill_types::{PhaseKind, TranscriptEntry};
use quill_validator::{ValidationResult, ValidatorError};

/// Errors from the generative-call collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Network or transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider returned an error response
    #[error("provider error ({status}): {message}")]
    Provider {
        /// Provider status code
        status: u16,
        /// Provider message
        message: String,
    },

    /// The call observed cancellation
    #[error("chat call cancelled")]
    Cancelled,
}

/// Errors raised by [`crate::PhaseRunner::execute`]
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    /// A required record does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested id
        id: String,
    },

    /// The reply failed validation; nothing was persisted
    #[error("{} reply failed validation: {}", .result.phase.tag(), .result.details().join("; "))]
    ValidationFailed {
        /// Full validation outcome
        result: Box<ValidationResult>,
        /// Transcript of the rejected exchange
        transcript: Box<TranscriptEntry>,
    },

    /// Generative call failed
    #[error("chat failed: {0}")]
    Chat(#[from] ChatError),

    /// Store failed
    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    /// Invocation metadata is missing or invalid
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Cancellation was observed
    #[error("phase cancelled")]
    Cancelled {
        /// Present when the generative call had already returned
        transcript: Option<Box<TranscriptEntry>>,
    },

    /// The reply passed validation but writing its artifacts failed
    #[error("persisting {} artifacts failed: {source}", .transcript.phase.tag())]
    Persistence {
        /// Underlying store, ledger or lifecycle error
        source: Box<PhaseError>,
        /// Transcript of the accepted exchange
        transcript: Box<TranscriptEntry>,
    },

    /// A lifecycle transition was rejected
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The world bible ledger rejected an update
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The validator cannot handle this phase
    #[error(transparent)]
    Validator(#[from] ValidatorError),

    /// The context lacks an input this phase needs
    #[error("{phase} requires {input}")]
    MissingInput {
        /// Phase being run
        phase: PhaseKind,
        /// Missing context field
        input: &'static str,
    },

    /// No strategy registered for a phase
    #[error("no strategy registered for phase '{}'", .0.tag())]
    UnknownPhase(PhaseKind),
}

impl PhaseError {
    /// Not-found helper
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether an outer wrapper may retry the phase
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ValidationFailed { .. } => true,
            Self::Chat(e) => !matches!(e, ChatError::Cancelled),
            Self::Store(e) => e.is_transient(),
            Self::Persistence { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether this is cancellation, from the token or the chat collaborator
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::Chat(ChatError::Cancelled))
    }

    /// Transcript recorded before the failure, if any
    #[must_use]
    pub fn transcript(&self) -> Option<&TranscriptEntry> {
        match self {
            Self::ValidationFailed { transcript, .. } => Some(transcript.as_ref()),
            Self::Cancelled { transcript } => transcript.as_deref(),
            Self::Persistence { transcript, .. } => Some(transcript.as_ref()),
            _ => None,
        }
    }

    /// Validation result carried by a rejected reply
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationResult> {
        match self {
            Self::ValidationFailed { result, .. } => Some(result.as_ref()),
            _ => None,
        }
    }
}
