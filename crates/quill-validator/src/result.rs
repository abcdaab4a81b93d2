//! Validation outcomes
//!
//! A failed validation is data, not an error: the runner records it on the
//! transcript and raises `ValidationFailed` carrying the whole result.

use quill_types::{PhaseKind, StructuredValue, ValidationStatus};
use serde::{Deserialize, Serialize};

/// A single violated schema constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaViolation {
    /// Location in the payload, e.g. `$.characters[0].name`
    pub path: String,
    /// What was violated
    pub message: String,
}

impl SchemaViolation {
    /// Create a violation
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Why a reply was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationFailure {
    /// Reply is not parseable structured data
    Parse {
        /// Parser message
        message: String,
    },
    /// Reply parsed but violates the phase schema
    Schema {
        /// Every violated constraint
        violations: Vec<SchemaViolation>,
    },
    /// Prose reply does not reference every salient term
    #[serde(rename_all = "camelCase")]
    MissingTerms {
        /// Reported missing terms (capped when every term is missing)
        missing: Vec<String>,
        /// Number of terms actually missing
        total_missing: usize,
        /// Number of terms checked
        total_terms: usize,
    },
}

impl ValidationFailure {
    /// Human-readable detail lines
    #[must_use]
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Parse { message } => vec![format!("parse error: {message}")],
            Self::Schema { violations } => violations.iter().map(ToString::to_string).collect(),
            Self::MissingTerms {
                missing,
                total_missing,
                total_terms,
            } => {
                let mut lines: Vec<String> = missing
                    .iter()
                    .map(|term| format!("missing salient term: {term}"))
                    .collect();
                if *total_missing > missing.len() {
                    lines.push(format!(
                        "all {total_terms} salient terms missing; reporting first {}",
                        missing.len()
                    ));
                }
                lines
            }
        }
    }
}

/// Result of validating a phase reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Phase validated for
    pub phase: PhaseKind,
    /// Passed or failed
    pub status: ValidationStatus,
    /// Parsed payload (structured phases, on success)
    #[serde(default)]
    pub payload: Option<StructuredValue>,
    /// Failure description
    #[serde(default)]
    pub failure: Option<ValidationFailure>,
}

impl ValidationResult {
    /// Successful result
    #[must_use]
    pub fn passed(phase: PhaseKind, payload: Option<StructuredValue>) -> Self {
        Self {
            phase,
            status: ValidationStatus::Passed,
            payload,
            failure: None,
        }
    }

    /// Failed result
    #[must_use]
    pub fn failed(phase: PhaseKind, failure: ValidationFailure) -> Self {
        Self {
            phase,
            status: ValidationStatus::Failed,
            payload: None,
            failure: Some(failure),
        }
    }

    /// Whether the reply was accepted
    #[inline]
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }

    /// Detail lines for transcripts and critique feedback
    #[must_use]
    pub fn details(&self) -> Vec<String> {
        self.failure
            .as_ref()
            .map(ValidationFailure::details)
            .unwrap_or_default()
    }

    /// Reported missing salient terms
    #[must_use]
    pub fn missing_terms(&self) -> &[String] {
        match &self.failure {
            Some(ValidationFailure::MissingTerms { missing, .. }) => missing,
            _ => &[],
        }
    }

    /// Reported schema violations
    #[must_use]
    pub fn violations(&self) -> &[SchemaViolation] {
        match &self.failure {
            Some(ValidationFailure::Schema { violations }) => violations,
            _ => &[],
        }
    }
}
