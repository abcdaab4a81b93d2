//! Error types for health aggregation and alert delivery

use quill_store::StoreError;

/// Errors from [`crate::HealthAggregator::compute`]
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    /// Store read failed
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors from an [`crate::AlertSink`]
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Transport failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Receiver answered with a non-success status
    #[error("alert receiver returned status {0}")]
    Status(u16),

    /// No webhook configured for the routing key
    #[error("no endpoint configured for routing key '{0}'")]
    NoEndpoint(String),

    /// Sink unavailable
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// A batch that could not be delivered
#[derive(Debug, thiserror::Error)]
#[error("failed to publish {count} alert(s) to '{routing_key}': {source}")]
pub struct PublishError {
    /// Destination
    pub routing_key: String,
    /// Alerts in the batch
    pub count: usize,
    /// Underlying sink error
    #[source]
    pub source: SinkError,
}
