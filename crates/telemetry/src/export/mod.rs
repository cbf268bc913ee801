//! Read-only renderings of hub data for pull-based consumers.

pub mod json;
pub mod prometheus;

pub use json::{
    AgentAggregate, ExecutionView, JsonExporter, MetricsExport, TimelineEventView, TimelineExport,
};
pub use prometheus::{PrometheusExporter, escape_label_value};
