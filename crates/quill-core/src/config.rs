//! Runner configuration and per-invocation provider settings

use crate::error::PhaseError;
use quill_types::{StructuredMap, StructuredValue};
use serde::{Deserialize, Serialize};

/// Metadata key holding the provider id
pub const PROVIDER_ID_KEY: &str = "providerId";

/// Metadata key holding the optional model id
pub const MODEL_ID_KEY: &str = "modelId";

/// Provider and model for one phase invocation
///
/// Resolved once from the context metadata; the rest of the runner never
/// looks at the raw map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseInvocationConfig {
    /// Generative backend identifier
    pub provider_id: String,
    /// Model override
    #[serde(default)]
    pub model_id: Option<String>,
}

fn valid_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/'))
}

impl PhaseInvocationConfig {
    /// Create directly
    #[must_use]
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: None,
        }
    }

    /// With a model override
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Resolve from invocation metadata
    ///
    /// # Errors
    ///
    /// [`PhaseError::Configuration`] when `providerId` is absent, not a
    /// string, blank or not an identifier, or when `modelId` is present but
    /// malformed.
    pub fn from_metadata(metadata: &StructuredMap) -> Result<Self, PhaseError> {
        let provider_id = match metadata.get(PROVIDER_ID_KEY) {
            None | Some(StructuredValue::Null) => {
                return Err(PhaseError::Configuration(format!(
                    "metadata is missing '{PROVIDER_ID_KEY}'"
                )))
            }
            Some(value) => value
                .as_str()
                .map(str::trim)
                .filter(|s| valid_identifier(s))
                .ok_or_else(|| {
                    PhaseError::Configuration(format!(
                        "'{PROVIDER_ID_KEY}' must be a non-blank identifier"
                    ))
                })?,
        };

        let model_id = match metadata.get(MODEL_ID_KEY) {
            None | Some(StructuredValue::Null) => None,
            Some(value) => match value.as_str().map(str::trim) {
                Some("") => None,
                Some(model) if valid_identifier(model) => Some(model.to_string()),
                _ => {
                    return Err(PhaseError::Configuration(format!(
                        "'{MODEL_ID_KEY}' must be an identifier"
                    )))
                }
            },
        };

        Ok(Self {
            provider_id: provider_id.to_string(),
            model_id,
        })
    }
}

/// Prompt assembly limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Persona memories included in scene prompts
    pub max_persona_memories: usize,
    /// Persona world notes included in scene prompts
    pub max_world_notes: usize,
    /// Active world bible entries quoted in prompts
    pub max_world_entries: usize,
    /// Characters kept from a reply in logs and failure summaries
    pub snippet_chars: usize,
    /// Domain under which world bibles are created
    pub world_bible_domain: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_persona_memories: 8,
            max_world_notes: 8,
            max_world_entries: 40,
            snippet_chars: 240,
            world_bible_domain: "story".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With persona memory limit
    #[inline]
    #[must_use]
    pub fn with_max_persona_memories(mut self, max: usize) -> Self {
        self.max_persona_memories = max;
        self
    }

    /// With world-note limit
    #[inline]
    #[must_use]
    pub fn with_max_world_notes(mut self, max: usize) -> Self {
        self.max_world_notes = max;
        self
    }

    /// With the reply snippet length used in failure summaries; zero omits it
    #[inline]
    #[must_use]
    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    /// With world bible domain
    #[inline]
    #[must_use]
    pub fn with_world_bible_domain(mut self, domain: impl Into<String>) -> Self {
        self.world_bible_domain = domain.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, StructuredValue)]) -> StructuredMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn resolves_provider_and_model() {
        let config = PhaseInvocationConfig::from_metadata(&metadata(&[
            ("providerId", "openai".into()),
            ("modelId", " gpt-4o ".into()),
        ]))
        .unwrap();
        assert_eq!(config, PhaseInvocationConfig::new("openai").with_model("gpt-4o"));
    }

    #[test]
    fn missing_provider_is_configuration_error() {
        let err = PhaseInvocationConfig::from_metadata(&StructuredMap::new()).unwrap_err();
        assert!(matches!(err, PhaseError::Configuration(_)));
    }

    #[test]
    fn malformed_provider_is_rejected() {
        for bad in [
            StructuredValue::from("  "),
            StructuredValue::from(42i64),
            StructuredValue::from("has space"),
        ] {
            let err = PhaseInvocationConfig::from_metadata(&metadata(&[("providerId", bad)]))
                .unwrap_err();
            assert!(matches!(err, PhaseError::Configuration(_)));
        }
    }

    #[test]
    fn blank_model_means_default() {
        let config = PhaseInvocationConfig::from_metadata(&metadata(&[
            ("providerId", "anthropic".into()),
            ("modelId", "".into()),
        ]))
        .unwrap();
        assert!(config.model_id.is_none());
    }
}
