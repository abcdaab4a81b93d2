//! Alert delivery

use crate::config::AlertConfig;
use crate::error::SinkError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::alert::AlertSeverity;

/// An alert as delivered to a receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotice {
    /// Alert id
    pub id: String,
    /// Severity
    pub severity: AlertSeverity,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// When the condition began
    #[serde(rename = "observedAtUtc")]
    pub observed_at: DateTime<Utc>,
    /// SLO threshold, present when breached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slo_minutes: Option<u64>,
    /// Whether the condition has outlived its SLO
    #[serde(default)]
    pub slo_breached: bool,
}

/// One batch for one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    /// Alerts in the batch
    pub alerts: Vec<AlertNotice>,
    /// Destination
    pub routing_key: String,
}

/// Receiver of alert batches
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one batch
    async fn send(&self, payload: &AlertPayload) -> Result<(), SinkError>;
}

/// Posts batches as JSON to a webhook per routing key
#[derive(Debug, Clone)]
pub struct HttpAlertSink {
    client: reqwest::Client,
    default_url: Option<String>,
    endpoints: BTreeMap<String, String>,
}

impl HttpAlertSink {
    /// Sink posting every routing key to `url`
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            default_url: Some(url.into()),
            endpoints: BTreeMap::new(),
        })
    }

    /// Sink configured from [`AlertConfig`] endpoints
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn from_config(config: &AlertConfig) -> Result<Self, SinkError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            default_url: config.endpoint.clone(),
            endpoints: config.endpoints.clone(),
        })
    }

    /// Dedicated webhook for a routing key
    #[must_use]
    pub fn with_endpoint(mut self, routing_key: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(routing_key.into(), url.into());
        self
    }

    fn url_for(&self, routing_key: &str) -> Option<&str> {
        self.endpoints
            .get(routing_key)
            .or(self.default_url.as_ref())
            .map(String::as_str)
    }
}

#[async_trait::async_trait]
impl AlertSink for HttpAlertSink {
    async fn send(&self, payload: &AlertPayload) -> Result<(), SinkError> {
        let url = self
            .url_for(&payload.routing_key)
            .ok_or_else(|| SinkError::NoEndpoint(payload.routing_key.clone()))?;
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }
        tracing::debug!(
            routing_key = %payload.routing_key,
            alerts = payload.alerts.len(),
            %status,
            "alert batch delivered"
        );
        Ok(())
    }
}

/// In-memory sink for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    payloads: Mutex<Vec<AlertPayload>>,
}

impl MemoryAlertSink {
    /// Create a new memory sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches received so far
    #[must_use]
    pub fn payloads(&self) -> Vec<AlertPayload> {
        self.payloads.lock().clone()
    }

    /// All delivered alert ids
    #[must_use]
    pub fn alert_ids(&self) -> Vec<String> {
        self.payloads
            .lock()
            .iter()
            .flat_map(|p| p.alerts.iter().map(|a| a.id.clone()))
            .collect()
    }

    /// Forget everything received
    pub fn clear(&self) {
        self.payloads.lock().clear();
    }
}

#[async_trait::async_trait]
impl AlertSink for MemoryAlertSink {
    async fn send(&self, payload: &AlertPayload) -> Result<(), SinkError> {
        self.payloads.lock().push(payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_wire_shape() {
        let payload = AlertPayload {
            alerts: vec![AlertNotice {
                id: "backlog:stale".into(),
                severity: AlertSeverity::Warning,
                title: "Stale backlog".into(),
                description: "1 item".into(),
                observed_at: Utc::now(),
                slo_minutes: None,
                slo_breached: false,
            }],
            routing_key: "ops".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["routingKey"], "ops");
        let alert = &json["alerts"][0];
        assert!(alert.get("sloMinutes").is_none());
        assert_eq!(alert["sloBreached"], false);
        assert!(alert.get("observedAtUtc").is_some());
    }

    #[test]
    fn endpoint_per_routing_key_falls_back_to_default() {
        let sink = HttpAlertSink::new("http://alerts.local/default", Duration::from_secs(1))
            .unwrap()
            .with_endpoint("planning", "http://alerts.local/planning");
        assert_eq!(sink.url_for("planning"), Some("http://alerts.local/planning"));
        assert_eq!(sink.url_for("ops"), Some("http://alerts.local/default"));
    }
}
