//! Quill Health - pipeline health and alerting
//!
//! - [`HealthAggregator`] projects the store into a [`HealthReport`]:
//!   template coverage, backlog staleness, world bible freshness and
//!   execution telemetry, with one [`Alert`] per anomaly
//! - [`AlertPublisher`] debounces, routes and SLO-annotates alerts and
//!   delivers them through an [`AlertSink`]
//!
//! # Example
//!
//! ```rust,ignore
//! use quill_health::{AlertConfig, AlertPublisher, HealthAggregator, HttpAlertSink};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     store: Arc<dyn quill_store::Store>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let report = HealthAggregator::new(store).compute().await?;
//! let config = AlertConfig::new().with_default_route("ops");
//! let timeout = std::time::Duration::from_secs(5);
//! let sink = Arc::new(HttpAlertSink::new("http://alerts.local/hook", timeout)?);
//! let summary = AlertPublisher::new(config, sink).publish(&report.alerts).await;
//! println!("{}: {} alert(s) sent", report.status, summary.published.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod aggregator;
pub mod alert;
pub mod config;
pub mod error;
pub mod publisher;
pub mod report;
pub mod sink;

pub use aggregator::HealthAggregator;
pub use alert::{
    id_has_prefix, scoped_id, Alert, AlertSeverity, BACKLOG_ORPHANED, BACKLOG_STALE,
    PLANNER_RECENT_FAILURES, TEMPLATE_MISSING, WORLD_BIBLE_MISSING, WORLD_BIBLE_STALE,
};
pub use config::{AlertConfig, HealthConfig};
pub use error::{HealthError, PublishError, SinkError};
pub use publisher::{AlertPublisher, PublishSummary};
pub use report::{
    ActionLog, BacklogHealth, BibleState, FailureSummary, HealthReport, HealthStatus,
    OrphanedBacklogItem, PlanBacklog, PlanWorldBible, PlannerStatus, StaleBacklogItem,
    TelemetryEvent, TelemetryHealth, TemplateState, WorldBibleHealth,
};
pub use sink::{AlertNotice, AlertPayload, AlertSink, HttpAlertSink, MemoryAlertSink};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for health reporting
    pub use crate::{
        Alert, AlertConfig, AlertPublisher, AlertSink, HealthAggregator, HealthConfig,
        HealthReport, HealthStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
