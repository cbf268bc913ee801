//! JSON export of hub aggregates and timelines.

use crate::hub::ObservabilityHub;
use crate::model::{
    AgentExecution, EventType, ExecutionStatus, Metadata, ProjectSummary, TimelineEvent,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Usage totals for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentAggregate {
    pub agent_name: String,
    /// Model used by the agent's most recent call.
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub llm_calls: u64,
}

/// Flattened view of an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionView {
    pub execution_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub node_id: String,
    pub project_id: Option<String>,
    pub round_index: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub success: bool,
    pub status: ExecutionStatus,
}

impl From<&AgentExecution> for ExecutionView {
    fn from(e: &AgentExecution) -> Self {
        Self {
            execution_id: e.execution_id.clone(),
            agent_id: e.agent_id.clone(),
            agent_name: e.agent_name.clone(),
            node_id: e.node_id.clone(),
            project_id: e.project_id.clone(),
            round_index: e.round_index,
            start_time: e.start_time,
            end_time: e.end_time,
            duration_ms: e.duration_ms,
            success: e.success,
            status: e.status(),
        }
    }
}

/// Full metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsExport {
    pub generated_at: DateTime<Utc>,
    /// Keyed by agent id.
    pub agents: BTreeMap<String, AgentAggregate>,
    pub executions: Vec<ExecutionView>,
    /// Keyed by project id.
    pub projects: BTreeMap<String, ProjectSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEventView {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub agent_id: Option<String>,
    pub node_id: Option<String>,
    pub metadata: Metadata,
}

impl From<TimelineEvent> for TimelineEventView {
    fn from(e: TimelineEvent) -> Self {
        Self {
            timestamp: e.timestamp,
            event_type: e.event_type,
            agent_id: e.agent_id,
            node_id: e.node_id,
            metadata: e.metadata,
        }
    }
}

/// Timeline of one project (or of everything when `project_id` is `None`),
/// sorted ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineExport {
    pub project_id: Option<String>,
    pub events: Vec<TimelineEventView>,
}

/// Builds serializable snapshots from the hub.
pub struct JsonExporter {
    hub: Arc<ObservabilityHub>,
}

impl JsonExporter {
    pub fn new(hub: Arc<ObservabilityHub>) -> Self {
        Self { hub }
    }

    /// Snapshot of per-agent aggregates, executions, and project summaries.
    pub fn export(&self) -> MetricsExport {
        let mut agents: BTreeMap<String, AgentAggregate> = BTreeMap::new();
        let mut latest: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        for record in self.hub.get_all_usage() {
            let agg = agents.entry(record.agent_id.clone()).or_default();
            agg.input_tokens = agg.input_tokens.saturating_add(record.input_tokens);
            agg.output_tokens = agg.output_tokens.saturating_add(record.output_tokens);
            agg.total_tokens = agg.total_tokens.saturating_add(record.total_tokens);
            agg.cost_usd += record.cost_usd;
            agg.llm_calls = agg.llm_calls.saturating_add(1);

            let seen = latest.get(&record.agent_id).copied();
            if seen.is_none_or(|ts| record.timestamp >= ts) {
                agg.agent_name = record.agent_name;
                agg.model = record.model_name;
                latest.insert(record.agent_id, record.timestamp);
            }
        }

        let executions = self
            .hub
            .get_all_executions()
            .iter()
            .map(ExecutionView::from)
            .collect();

        let projects = self
            .hub
            .get_all_projects()
            .into_iter()
            .map(|id| {
                let summary = self.hub.get_project_summary(&id);
                (id, summary)
            })
            .collect();

        MetricsExport {
            generated_at: Utc::now(),
            agents,
            executions,
            projects,
        }
    }

    pub fn export_timeline(&self, project_id: Option<&str>) -> TimelineExport {
        let events = self
            .hub
            .get_timeline(project_id, None)
            .into_iter()
            .map(TimelineEventView::from)
            .collect();
        TimelineExport {
            project_id: project_id.map(str::to_string),
            events,
        }
    }

    /// [`Self::export`] rendered as pretty JSON.
    pub fn render(&self) -> String {
        to_json(&self.export())
    }

    /// [`Self::export_timeline`] rendered as pretty JSON.
    pub fn render_timeline(&self, project_id: Option<&str>) -> String {
        to_json(&self.export_timeline(project_id))
    }
}

/// Serialization failures are logged and render as an empty object.
fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to serialize metrics export");
        "{}".into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UsageRecord;
    use chrono::Duration;

    fn hub() -> Arc<ObservabilityHub> {
        Arc::new(ObservabilityHub::new())
    }

    #[test]
    fn agents_aggregate_usage_and_keep_latest_model() {
        let hub = hub();
        let t0 = Utc::now();
        hub.record_usage(
            UsageRecord::new("a1", "Coder", "gpt-4o", 10, 5, 0.5, 10)
                .at(t0 + Duration::seconds(5)),
        );
        hub.record_usage(UsageRecord::new("a1", "Coder", "gpt-4o-mini", 20, 10, 0.25, 10).at(t0));

        let export = JsonExporter::new(hub).export();
        let a1 = &export.agents["a1"];
        assert_eq!(a1.model, "gpt-4o");
        assert_eq!(a1.total_tokens, 45);
        assert_eq!(a1.llm_calls, 2);
        assert!((a1.cost_usd - 0.75).abs() < 1e-12);
    }

    #[test]
    fn executions_and_projects_are_exported() {
        let hub = hub();
        let mut exec = AgentExecution::new("a1", "Coder", "n1", Some("p1".into()), 2);
        exec.finish("ok".into(), true, None);
        let id = exec.execution_id.clone();
        hub.record_execution(exec);

        let export = JsonExporter::new(hub).export();
        assert_eq!(export.executions.len(), 1);
        assert_eq!(export.executions[0].execution_id, id);
        assert_eq!(export.executions[0].round_index, 2);
        assert_eq!(export.executions[0].status, ExecutionStatus::Completed);
        assert_eq!(export.projects["p1"].agent_executions, 1);
        assert_eq!(export.projects["p1"].success_rate, 1.0);
    }

    #[test]
    fn execution_status_is_exported() {
        let hub = hub();
        let mut failed = AgentExecution::new("a1", "Coder", "n1", None, 0);
        failed.finish(String::new(), false, Some("boom".into()));
        hub.record_execution(failed);
        hub.record_execution(AgentExecution::new("a2", "Reviewer", "n2", None, 0));

        let export = JsonExporter::new(hub.clone()).export();
        let statuses: Vec<_> = export.executions.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![ExecutionStatus::Failed, ExecutionStatus::Running]);

        let value: serde_json::Value =
            serde_json::from_str(&JsonExporter::new(hub).render()).unwrap();
        assert_eq!(value["executions"][0]["status"], "failed");
        assert_eq!(value["executions"][1]["status"], "running");
    }

    #[test]
    fn agent_totals_saturate_instead_of_overflowing() {
        let hub = hub();
        hub.record_usage(UsageRecord::new("a1", "Coder", "gpt-4o", u64::MAX, 0, 0.0, 1));
        hub.record_usage(UsageRecord::new("a1", "Coder", "gpt-4o", 5, 5, 0.0, 1));

        let export = JsonExporter::new(hub).export();
        assert_eq!(export.agents["a1"].input_tokens, u64::MAX);
        assert_eq!(export.agents["a1"].total_tokens, u64::MAX);
        assert_eq!(export.agents["a1"].llm_calls, 2);
    }

    #[test]
    fn timeline_is_sorted_and_iso_formatted() {
        let hub = hub();
        let t0 = Utc::now();
        hub.record_timeline_event(
            TimelineEvent::new(EventType::AgentEnd)
                .with_project("p1")
                .at(t0 + Duration::seconds(3)),
        );
        hub.record_timeline_event(
            TimelineEvent::new(EventType::AgentStart)
                .with_project("p1")
                .with_agent("a1")
                .at(t0),
        );

        let exporter = JsonExporter::new(hub);
        let timeline = exporter.export_timeline(Some("p1"));
        assert_eq!(timeline.project_id.as_deref(), Some("p1"));
        assert_eq!(timeline.events[0].event_type, EventType::AgentStart);
        assert_eq!(timeline.events[1].event_type, EventType::AgentEnd);

        let value: serde_json::Value =
            serde_json::from_str(&exporter.render_timeline(Some("p1"))).unwrap();
        assert_eq!(value["events"][0]["event_type"], "agent_start");
        let ts = value["events"][0]["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn empty_hub_renders_empty_collections() {
        let value: serde_json::Value =
            serde_json::from_str(&JsonExporter::new(hub()).render()).unwrap();
        assert_eq!(value["agents"], serde_json::json!({}));
        assert_eq!(value["executions"], serde_json::json!([]));
        assert_eq!(value["projects"], serde_json::json!({}));
    }
}
