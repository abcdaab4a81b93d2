//! Validator errors
//!
//! Rejected replies are not errors (see [`crate::ValidationResult`]); these
//! cover misuse of the validator itself.

use quill_types::PhaseKind;

/// Errors raised by [`crate::ResponseValidator`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorError {
    /// No schema registered for a structured phase
    #[error("no schema registered for phase '{}'", .0.tag())]
    UnknownSchema(PhaseKind),

    /// Structured validation requested for the prose phase
    #[error("phase '{}' has no structured schema", .0.tag())]
    NotStructured(PhaseKind),
}
