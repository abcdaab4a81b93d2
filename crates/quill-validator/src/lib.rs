//! Quill Response Validator
//!
//! Pure validation of a phase's raw model reply.
//!
//! - Structured phases (vision, world-bible, iterative, blueprint, scroll) are
//!   parsed as JSON, optionally out of a Markdown code fence, and checked
//!   against an immutable [`SchemaRegistry`]. Every violation is reported.
//! - The scene phase is free prose and passes through the attentional gate:
//!   every [salient term](SalientTerms) must appear in the reply.
//!
//! # Example
//!
//! ```rust
//! use quill_validator::ResponseValidator;
//! use quill_types::PhaseKind;
//!
//! let validator = ResponseValidator::new();
//! let result = validator.validate_structured(PhaseKind::Vision, "not json").unwrap();
//! assert!(!result.is_passed());
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod extract;
pub mod registry;
pub mod result;
pub mod scene;
pub mod schema;

use quill_types::{PhaseKind, StructuredValue};
use std::sync::Arc;

pub use error::ValidatorError;
pub use extract::extract_structured_body;
pub use registry::{
    SchemaRegistry, BACKLOG_PRIORITIES, BACKLOG_PROGRESS, ENTRY_STATUSES, MAX_SECTION_DEPTH,
    VISION_TONES, WORLD_BIBLE_CATEGORIES,
};
pub use result::{SchemaViolation, ValidationFailure, ValidationResult};
pub use scene::{
    missing_terms, SalientTerms, MAX_SALIENT_TERMS, MIN_TERM_EXCLUSIVE, TOTAL_MISS_REPORT_LIMIT,
};
pub use schema::{FieldKind, FieldSpec, PhaseSchema};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Validates raw replies against the schema registry and the scene gate
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    registry: Arc<SchemaRegistry>,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseValidator {
    /// Validator over the process-wide built-in registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: SchemaRegistry::shared(),
        }
    }

    /// Validator over a custom registry
    #[inline]
    #[must_use]
    pub fn with_registry(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// Registry in use
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Parse and schema-check a structured reply
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError`] when `phase` is the prose phase or has no
    /// registered schema. Rejected replies are reported through the result.
    pub fn validate_structured(
        &self,
        phase: PhaseKind,
        raw: &str,
    ) -> Result<ValidationResult, ValidatorError> {
        if !phase.is_structured() {
            return Err(ValidatorError::NotStructured(phase));
        }
        let schema = self
            .registry
            .get(phase)
            .ok_or(ValidatorError::UnknownSchema(phase))?;

        let body = extract_structured_body(raw);
        let payload: StructuredValue = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(phase = %phase, error = %e, "reply is not parseable");
                return Ok(ValidationResult::failed(
                    phase,
                    ValidationFailure::Parse {
                        message: e.to_string(),
                    },
                ));
            }
        };

        let violations = schema.check(&payload);
        if violations.is_empty() {
            Ok(ValidationResult::passed(phase, Some(payload)))
        } else {
            tracing::debug!(phase = %phase, count = violations.len(), "reply violates schema");
            Ok(ValidationResult::failed(
                phase,
                ValidationFailure::Schema { violations },
            ))
        }
    }

    /// Apply the attentional gate to a scene reply
    #[must_use]
    pub fn validate_scene(&self, raw: &str, salient_terms: &[String]) -> ValidationResult {
        scene::validate_scene(raw, salient_terms)
    }

    /// Validate any phase; `salient_terms` is only consulted for scenes
    ///
    /// # Errors
    ///
    /// See [`ResponseValidator::validate_structured`].
    pub fn validate(
        &self,
        phase: PhaseKind,
        raw: &str,
        salient_terms: &[String],
    ) -> Result<ValidationResult, ValidatorError> {
        if phase.is_structured() {
            self.validate_structured(phase, raw)
        } else {
            Ok(self.validate_scene(raw, salient_terms))
        }
    }
}
