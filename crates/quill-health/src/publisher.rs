//! Alert fan-out
//!
//! Each alert is debounced by id, routed to a routing key, annotated with its
//! SLO threshold and batched with every other alert bound for the same key.
//! Delivery failures are logged and reported in the summary, never returned
//! as errors.

use crate::alert::Alert;
use crate::config::{minutes, AlertConfig};
use crate::error::PublishError;
use crate::sink::{AlertNotice, AlertPayload, AlertSink};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use quill_types::{Clock, SystemClock};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What one [`AlertPublisher::publish`] call did
#[derive(Debug, Default)]
pub struct PublishSummary {
    /// Alert ids delivered
    pub published: Vec<String>,
    /// Alert ids held back by the debounce window
    pub suppressed: Vec<String>,
    /// Batches that could not be delivered
    pub failures: Vec<PublishError>,
}

impl PublishSummary {
    /// Whether every batch was delivered
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Publishes health alerts to an [`AlertSink`]
///
/// The debounce cache lives in this process only. Separate instances
/// re-alert independently.
pub struct AlertPublisher {
    config: AlertConfig,
    sink: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    last_sent: DashMap<String, DateTime<Utc>>,
}

impl std::fmt::Debug for AlertPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertPublisher")
            .field("config", &self.config)
            .field("debounced", &self.last_sent.len())
            .finish_non_exhaustive()
    }
}

impl AlertPublisher {
    /// Publisher over a sink, using the wall clock
    #[must_use]
    pub fn new(config: AlertConfig, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            config,
            sink,
            clock: Arc::new(SystemClock),
            last_sent: DashMap::new(),
        }
    }

    /// With a time source
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// When an alert id was last delivered
    #[must_use]
    pub fn last_sent(&self, alert_id: &str) -> Option<DateTime<Utc>> {
        self.last_sent.get(alert_id).map(|t| *t)
    }

    fn is_debounced(&self, alert_id: &str, now: DateTime<Utc>) -> bool {
        self.last_sent
            .get(alert_id)
            .is_some_and(|sent| now - *sent < self.config.debounce_window())
    }

    /// Payload entry; the SLO threshold rides along only once it is breached
    fn notice(&self, alert: &Alert, now: DateTime<Utc>) -> AlertNotice {
        let slo_minutes = self
            .config
            .slo_for(&alert.id)
            .filter(|m| now - alert.observed_at > minutes(*m));
        let slo_breached = slo_minutes.is_some();
        AlertNotice {
            id: alert.id.clone(),
            severity: alert.severity,
            title: alert.title.clone(),
            description: alert.description.clone(),
            observed_at: alert.observed_at,
            slo_minutes,
            slo_breached,
        }
    }

    /// Deliver alerts, one batch per routing key
    #[instrument(skip(self, alerts), fields(alerts = alerts.len()))]
    pub async fn publish(&self, alerts: &[Alert]) -> PublishSummary {
        let mut summary = PublishSummary::default();
        if !self.config.enabled {
            debug!("alert publishing disabled");
            return summary;
        }

        let now = self.clock.now();
        let mut seen = HashSet::new();
        let mut batches: BTreeMap<String, Vec<AlertNotice>> = BTreeMap::new();
        for alert in alerts {
            if !seen.insert(alert.id.as_str()) || self.is_debounced(&alert.id, now) {
                summary.suppressed.push(alert.id.clone());
                continue;
            }
            batches
                .entry(self.config.route_for(&alert.id).to_string())
                .or_default()
                .push(self.notice(alert, now));
        }

        let payloads: Vec<AlertPayload> = batches
            .into_iter()
            .map(|(routing_key, alerts)| AlertPayload { alerts, routing_key })
            .collect();
        let results = futures::future::join_all(payloads.iter().map(|p| self.sink.send(p))).await;

        for (payload, result) in payloads.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    for notice in payload.alerts {
                        self.last_sent.insert(notice.id.clone(), now);
                        summary.published.push(notice.id);
                    }
                }
                Err(source) => {
                    let error = PublishError {
                        routing_key: payload.routing_key,
                        count: payload.alerts.len(),
                        source,
                    };
                    warn!(error = %error, "alert batch not delivered");
                    summary.failures.push(error);
                }
            }
        }

        info!(
            published = summary.published.len(),
            suppressed = summary.suppressed.len(),
            failed = summary.failures.len(),
            "alerts published"
        );
        summary
    }
}
