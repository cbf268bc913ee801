//! Data model for usage records, agent executions, timeline events, and
//! aggregated summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form metadata attached to timeline events.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ── Usage ─────────────────────────────────────────────────────────────────

/// A single LLM call's token, cost, and latency snapshot.
///
/// Immutable once recorded. `total_tokens` is always
/// `input_tokens + output_tokens`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// When the call completed.
    pub timestamp: DateTime<Utc>,
    /// Project the call was made for, if any.
    pub project_id: Option<String>,
    /// Agent that made the call.
    pub agent_id: String,
    /// Display name of the agent.
    pub agent_name: String,
    /// Model name as reported by the provider.
    pub model_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// Estimated cost in USD.
    pub cost_usd: f64,
    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: u64,
    /// Trace or span id correlating the call with an external trace.
    pub trace_id: Option<String>,
}

impl UsageRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        model_name: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        duration_ms: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            project_id: None,
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            model_name: model_name.into(),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            cost_usd,
            duration_ms,
            trace_id: None,
        }
    }

    /// Set the owning project.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Set the correlating trace id.
    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Override the timestamp (replay and tests).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ── Execution ─────────────────────────────────────────────────────────────

/// Lifecycle status of an execution as seen by external consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One timed unit of agent work, bounded by start and end.
///
/// `end_time` and `duration_ms` are set together when the execution ends;
/// the running totals only grow while it is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentExecution {
    /// Unique identifier, generated at start.
    pub execution_id: String,
    pub agent_id: String,
    pub agent_name: String,
    /// Task or graph node the agent worked on.
    pub node_id: String,
    pub project_id: Option<String>,
    /// Ordinal of this run within a multi-round execution.
    pub round_index: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    /// Final output produced by the agent.
    pub content: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub llm_calls: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

impl AgentExecution {
    /// Create an active execution starting now.
    pub fn new(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        node_id: impl Into<String>,
        project_id: Option<String>,
        round_index: u32,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            node_id: node_id.into(),
            project_id,
            round_index,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            content: String::new(),
            success: false,
            error_message: None,
            llm_calls: 0,
            total_tokens: 0,
            total_cost_usd: 0.0,
        }
    }

    /// Accumulate one LLM call into the running totals.
    pub fn add_llm_usage(&mut self, tokens: u64, cost_usd: f64) {
        self.llm_calls = self.llm_calls.saturating_add(1);
        self.total_tokens = self.total_tokens.saturating_add(tokens);
        self.total_cost_usd += cost_usd;
    }

    /// Stamp the end time and outcome.
    ///
    /// The end time never precedes the start time, even if the wall clock
    /// stepped backwards while the execution ran.
    pub fn finish(&mut self, content: String, success: bool, error_message: Option<String>) {
        let end = Utc::now().max(self.start_time);
        self.end_time = Some(end);
        self.duration_ms = Some(
            end.signed_duration_since(self.start_time)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.content = content;
        self.success = success;
        self.error_message = error_message;
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn status(&self) -> ExecutionStatus {
        match (self.end_time, self.success) {
            (None, _) => ExecutionStatus::Running,
            (Some(_), true) => ExecutionStatus::Completed,
            (Some(_), false) => ExecutionStatus::Failed,
        }
    }
}

// ── Timeline ──────────────────────────────────────────────────────────────

/// The kind of a timeline entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentStart,
    AgentEnd,
    LlmCall,
    TaskStatus,
    AcceptanceStart,
    AcceptanceEnd,
    AcceptanceStep,
    AcceptanceCheck,
}

impl EventType {
    pub fn is_acceptance(&self) -> bool {
        matches!(
            self,
            Self::AcceptanceStart
                | Self::AcceptanceEnd
                | Self::AcceptanceStep
                | Self::AcceptanceCheck
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AgentStart => write!(f, "agent_start"),
            Self::AgentEnd => write!(f, "agent_end"),
            Self::LlmCall => write!(f, "llm_call"),
            Self::TaskStatus => write!(f, "task_status"),
            Self::AcceptanceStart => write!(f, "acceptance_start"),
            Self::AcceptanceEnd => write!(f, "acceptance_end"),
            Self::AcceptanceStep => write!(f, "acceptance_step"),
            Self::AcceptanceCheck => write!(f, "acceptance_check"),
        }
    }
}

/// An append-only, timestamped log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub project_id: Option<String>,
    pub agent_id: Option<String>,
    pub node_id: Option<String>,
    pub metadata: Metadata,
}

impl TimelineEvent {
    /// Create an event of the given kind stamped now.
    pub fn new(event_type: EventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            project_id: None,
            agent_id: None,
            node_id: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Set or clear the owning project.
    pub fn in_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Insert one metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Merge a metadata map; existing keys are overwritten.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ── Queries ───────────────────────────────────────────────────────────────

/// Inclusive `[start, end]` timestamp window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

// ── Aggregated views ──────────────────────────────────────────────────────

/// Per-project aggregate over usage records and executions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub llm_calls: u64,
    pub agent_executions: u64,
    /// Distinct agents seen in usage records or executions.
    pub agents_used: u64,
    /// Successful executions over all executions; 0.0 when there are none.
    pub success_rate: f64,
    /// Mean duration of finished executions; 0.0 when there are none.
    pub avg_execution_time_ms: f64,
}

/// Record counts held by the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    pub usage_records: usize,
    pub executions: usize,
    pub timeline_events: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn usage_total_is_sum() {
        let record = UsageRecord::new("a1", "Planner", "gpt-4o", 100, 50, 0.001, 1200);
        assert_eq!(record.total_tokens, 150);
        assert!(record.project_id.is_none());

        let record = record.with_project("p1").with_trace("t-9");
        assert_eq!(record.project_id.as_deref(), Some("p1"));
        assert_eq!(record.trace_id.as_deref(), Some("t-9"));
    }

    #[test]
    fn execution_lifecycle() {
        let mut exec = AgentExecution::new("a1", "Planner", "node-1", Some("p1".into()), 2);
        assert!(!exec.is_finished());
        assert_eq!(exec.status(), ExecutionStatus::Running);
        assert!(exec.duration_ms.is_none());

        exec.add_llm_usage(150, 0.002);
        exec.add_llm_usage(280, 0.003);
        assert_eq!(exec.llm_calls, 2);
        assert_eq!(exec.total_tokens, 430);

        exec.finish("done".into(), true, None);
        assert!(exec.is_finished());
        assert!(exec.duration_ms.is_some());
        assert_eq!(exec.status(), ExecutionStatus::Completed);
    }

    #[test]
    fn duration_matches_timestamps() {
        let mut exec = AgentExecution::new("a1", "Planner", "n", None, 0);
        exec.start_time = exec.start_time - Duration::milliseconds(250);
        exec.finish(String::new(), false, Some("boom".into()));

        let end = exec.end_time.unwrap();
        let expected = (end - exec.start_time).num_milliseconds() as u64;
        assert_eq!(exec.duration_ms, Some(expected));
        assert!(expected >= 250);
        assert_eq!(exec.status(), ExecutionStatus::Failed);
    }

    #[test]
    fn end_time_never_precedes_start_time() {
        let mut exec = AgentExecution::new("a1", "Planner", "n", None, 0);
        exec.start_time = Utc::now() + Duration::seconds(60);
        exec.finish(String::new(), true, None);

        assert_eq!(exec.end_time, Some(exec.start_time));
        assert_eq!(exec.duration_ms, Some(0));
    }

    #[test]
    fn token_totals_saturate() {
        let record = UsageRecord::new("a1", "Planner", "gpt-4o", u64::MAX, 1, 0.0, 0);
        assert_eq!(record.total_tokens, u64::MAX);

        let mut exec = AgentExecution::new("a1", "Planner", "n", None, 0);
        exec.add_llm_usage(u64::MAX, 0.0);
        exec.add_llm_usage(10, 0.0);
        assert_eq!(exec.total_tokens, u64::MAX);
        assert_eq!(exec.llm_calls, 2);
    }

    #[test]
    fn execution_ids_are_unique() {
        let a = AgentExecution::new("a", "A", "n", None, 0);
        let b = AgentExecution::new("a", "A", "n", None, 0);
        assert_ne!(a.execution_id, b.execution_id);
    }

    #[test]
    fn event_type_display_matches_serde() {
        let all = [
            EventType::AgentStart,
            EventType::AgentEnd,
            EventType::LlmCall,
            EventType::TaskStatus,
            EventType::AcceptanceStart,
            EventType::AcceptanceEnd,
            EventType::AcceptanceStep,
            EventType::AcceptanceCheck,
        ];
        for kind in all {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json.as_str().unwrap(), kind.to_string());
        }
        assert!(EventType::AcceptanceCheck.is_acceptance());
        assert!(!EventType::LlmCall.is_acceptance());
    }

    #[test]
    fn timeline_event_builder() {
        let event = TimelineEvent::new(EventType::TaskStatus)
            .with_project("p1")
            .with_node("n1")
            .with_meta("status", "done");
        assert_eq!(event.project_id.as_deref(), Some("p1"));
        assert_eq!(event.metadata["status"], "done");
        assert!(event.agent_id.is_none());

        let cleared = event.in_project(None);
        assert!(cleared.project_id.is_none());
        let kept = TimelineEvent::new(EventType::AgentEnd).in_project(Some("p2".into()));
        assert_eq!(kept.project_id.as_deref(), Some("p2"));
    }

    #[test]
    fn time_range_is_inclusive() {
        let now = Utc::now();
        let range = TimeRange::new(now, now + Duration::seconds(10));
        assert!(range.contains(now));
        assert!(range.contains(now + Duration::seconds(10)));
        assert!(!range.contains(now - Duration::milliseconds(1)));
    }
}
