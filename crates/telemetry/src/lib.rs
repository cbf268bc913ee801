//! In-process observability for HiveCore agents.
//!
//! Collects token usage, agent executions, and timeline events into a
//! thread-safe [`ObservabilityHub`], prices LLM calls with a built-in model
//! table, and exports aggregates as Prometheus text, JSON, or webhook pushes
//! to an external collector.

pub mod collector;
pub mod export;
pub mod hub;
pub mod model;
pub mod pricing;
pub mod timeline;
pub mod webhook;

pub use collector::{CallContext, LlmUsage, UsageCollector, UsageSource};
pub use export::{JsonExporter, MetricsExport, PrometheusExporter, TimelineExport};
pub use hub::{ObservabilityHub, RecordSink};
pub use model::{
    AgentExecution, EventType, ExecutionStatus, HubStats, Metadata, ProjectSummary, TimeRange,
    TimelineEvent, UsageRecord,
};
pub use pricing::{ModelPricing, PriceSource, PricingTable, calculate_cost, get_model_pricing};
pub use timeline::TimelineTracker;
pub use webhook::{WebhookConfig, WebhookExporter};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("not an acceptance event type: {0}")]
    InvalidEventType(EventType),

    #[error("webhook delivery to {endpoint} failed: {reason}")]
    Delivery { endpoint: String, reason: String },

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
