//! Operator configuration file

use anyhow::Context;
use quill_core::RunnerConfig;
use quill_health::{AlertConfig, HealthConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything the `quill` binary can be configured with
///
/// ```toml
/// [health]
/// backlogSlaMinutes = 45
///
/// [alerts]
/// defaultRoute = "ops"
/// endpoint = "https://alerts.example/hook"
///
/// [alerts.sloMinutes]
/// "worldbible:stale" = 120
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct QuillConfig {
    /// Prompt assembly limits
    pub(crate) runner: RunnerConfig,
    /// Health thresholds
    pub(crate) health: HealthConfig,
    /// Alert routing
    pub(crate) alerts: AlertConfig,
}

impl QuillConfig {
    /// Load from a TOML file; no path, or a path that does not exist, yields
    /// the defaults
    pub(crate) fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
