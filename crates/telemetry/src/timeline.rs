//! Execution lifecycle tracking.
//!
//! The tracker owns in-flight executions until they end, then hands the
//! finalized record to the hub. Every transition is mirrored as a
//! [`TimelineEvent`].

use crate::TelemetryError;
use crate::hub::ObservabilityHub;
use crate::model::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Tracks active executions and emits lifecycle events to the hub.
pub struct TimelineTracker {
    hub: Arc<ObservabilityHub>,
    active: Mutex<HashMap<String, AgentExecution>>,
}

impl TimelineTracker {
    pub fn new(hub: Arc<ObservabilityHub>) -> Self {
        Self {
            hub,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn hub(&self) -> &Arc<ObservabilityHub> {
        &self.hub
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, AgentExecution>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin an execution and return its id.
    pub fn start_execution(
        &self,
        agent_id: &str,
        agent_name: &str,
        node_id: &str,
        project_id: Option<&str>,
        round_index: u32,
    ) -> String {
        let execution = AgentExecution::new(
            agent_id,
            agent_name,
            node_id,
            project_id.map(str::to_string),
            round_index,
        );
        let execution_id = execution.execution_id.clone();
        let event = TimelineEvent::new(EventType::AgentStart)
            .at(execution.start_time)
            .in_project(execution.project_id.clone())
            .with_agent(agent_id)
            .with_node(node_id)
            .with_meta("execution_id", execution_id.clone())
            .with_meta("agent_name", agent_name)
            .with_meta("round", round_index);

        self.active().insert(execution_id.clone(), execution);
        info!(
            execution_id = %execution_id,
            agent_id = %agent_id,
            node_id = %node_id,
            round = round_index,
            "Agent execution started"
        );

        self.hub.record_timeline_event(event);
        execution_id
    }

    /// Add one LLM call to an active execution's totals.
    ///
    /// Unknown or already-ended ids are ignored: usage reports may arrive
    /// after the execution has completed.
    pub fn update_llm_usage(&self, execution_id: &str, tokens: u64, cost_usd: f64) {
        match self.active().get_mut(execution_id) {
            Some(execution) => execution.add_llm_usage(tokens, cost_usd),
            None => {
                debug!(execution_id = %execution_id, "Usage update for inactive execution ignored")
            }
        }
    }

    /// Finalize an active execution and store it in the hub.
    ///
    /// Fails with [`TelemetryError::ExecutionNotFound`] when the id was
    /// never started or has already ended.
    pub fn end_execution(
        &self,
        execution_id: &str,
        content: impl Into<String>,
        success: bool,
        error_message: Option<String>,
    ) -> Result<AgentExecution, TelemetryError> {
        let mut execution = self
            .active()
            .remove(execution_id)
            .ok_or_else(|| TelemetryError::ExecutionNotFound(execution_id.to_string()))?;

        execution.finish(content.into(), success, error_message);
        let end_time = execution.end_time.unwrap_or(execution.start_time);

        let mut event = TimelineEvent::new(EventType::AgentEnd)
            .at(end_time)
            .in_project(execution.project_id.clone())
            .with_agent(execution.agent_id.clone())
            .with_node(execution.node_id.clone())
            .with_meta("execution_id", execution.execution_id.clone())
            .with_meta("success", execution.success)
            .with_meta("duration_ms", execution.duration_ms.unwrap_or(0));
        if let Some(error) = &execution.error_message {
            event = event.with_meta("error", error.clone());
        }

        info!(
            execution_id = %execution.execution_id,
            success = execution.success,
            duration_ms = execution.duration_ms.unwrap_or(0),
            llm_calls = execution.llm_calls,
            "Agent execution ended"
        );

        self.hub.record_execution(execution.clone());
        self.hub.record_timeline_event(event);
        Ok(execution)
    }

    /// Snapshot of in-flight executions keyed by id.
    pub fn get_active_executions(&self) -> HashMap<String, AgentExecution> {
        self.active().clone()
    }

    pub fn is_active(&self, execution_id: &str) -> bool {
        self.active().contains_key(execution_id)
    }

    // ── Auxiliary events ──────────────────────────────────────────────

    /// Fold a recorded LLM call into its execution and log an `llm_call`
    /// event. Ignored, like [`update_llm_usage`](Self::update_llm_usage),
    /// when the execution is not active.
    pub fn record_llm_call(&self, execution_id: &str, record: &UsageRecord) {
        let (project_id, node_id) = {
            let mut active = self.active();
            let Some(execution) = active.get_mut(execution_id) else {
                debug!(execution_id = %execution_id, "LLM call for inactive execution ignored");
                return;
            };
            execution.add_llm_usage(record.total_tokens, record.cost_usd);
            (execution.project_id.clone(), execution.node_id.clone())
        };

        let event = TimelineEvent::new(EventType::LlmCall)
            .at(record.timestamp)
            .in_project(project_id)
            .with_agent(record.agent_id.clone())
            .with_node(node_id)
            .with_meta("execution_id", execution_id)
            .with_meta("model", record.model_name.clone())
            .with_meta("input_tokens", record.input_tokens)
            .with_meta("output_tokens", record.output_tokens)
            .with_meta("cost_usd", record.cost_usd)
            .with_meta("duration_ms", record.duration_ms);
        self.hub.record_timeline_event(event);
    }

    /// Log a task status transition for a graph node.
    pub fn record_task_status(
        &self,
        project_id: Option<&str>,
        node_id: &str,
        status: &str,
        metadata: Metadata,
    ) {
        let event = TimelineEvent::new(EventType::TaskStatus)
            .in_project(project_id.map(str::to_string))
            .with_node(node_id)
            .with_metadata(metadata)
            .with_meta("status", status);
        self.hub.record_timeline_event(event);
    }

    /// Log one of the `acceptance_*` events.
    pub fn record_acceptance_event(
        &self,
        kind: EventType,
        project_id: Option<&str>,
        node_id: Option<&str>,
        metadata: Metadata,
    ) -> Result<(), TelemetryError> {
        if !kind.is_acceptance() {
            return Err(TelemetryError::InvalidEventType(kind));
        }
        let mut event = TimelineEvent::new(kind)
            .in_project(project_id.map(str::to_string))
            .with_metadata(metadata);
        if let Some(node) = node_id {
            event = event.with_node(node);
        }
        self.hub.record_timeline_event(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (Arc<ObservabilityHub>, TimelineTracker) {
        let hub = Arc::new(ObservabilityHub::new());
        (hub.clone(), TimelineTracker::new(hub))
    }

    #[test]
    fn start_registers_active_execution_and_event() {
        let (hub, tracker) = tracker();
        let id = tracker.start_execution("a1", "Planner", "node-1", Some("p1"), 3);

        assert!(tracker.is_active(&id));
        assert!(hub.get_executions_by_project("p1").is_empty());

        let events = hub.get_timeline(Some("p1"), None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::AgentStart);
        assert_eq!(events[0].metadata["execution_id"], id.as_str());
        assert_eq!(events[0].metadata["agent_name"], "Planner");
        assert_eq!(events[0].metadata["round"], 3);
    }

    #[test]
    fn end_moves_execution_to_hub() {
        let (hub, tracker) = tracker();
        let id = tracker.start_execution("a1", "Planner", "node-1", Some("p1"), 0);
        tracker.update_llm_usage(&id, 150, 0.001);
        tracker.update_llm_usage(&id, 280, 0.002);

        let done = tracker.end_execution(&id, "result", true, None).unwrap();
        assert!(!tracker.is_active(&id));
        assert_eq!(done.llm_calls, 2);
        assert_eq!(done.total_tokens, 430);
        assert_eq!(done.content, "result");

        let end = done.end_time.unwrap();
        assert_eq!(done.duration_ms, Some((end - done.start_time).num_milliseconds() as u64));

        assert_eq!(hub.get_executions_by_project("p1"), vec![done]);

        let events = hub.get_timeline(Some("p1"), None);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, EventType::AgentEnd);
        assert_eq!(events[1].metadata["success"], true);
        assert!(events[1].metadata.get("error").is_none());
    }

    #[test]
    fn failed_execution_carries_error() {
        let (hub, tracker) = tracker();
        let id = tracker.start_execution("a1", "Planner", "n", None, 0);
        let done = tracker
            .end_execution(&id, "", false, Some("tool crashed".into()))
            .unwrap();
        assert_eq!(done.status(), ExecutionStatus::Failed);

        let end_event = hub
            .get_timeline(None, None)
            .into_iter()
            .find(|e| e.event_type == EventType::AgentEnd)
            .unwrap();
        assert_eq!(end_event.metadata["error"], "tool crashed");
        assert_eq!(end_event.metadata["success"], false);
    }

    #[test]
    fn ending_unknown_execution_fails() {
        let (_, tracker) = tracker();
        let err = tracker.end_execution("never-started", "", true, None).unwrap_err();
        assert!(matches!(err, TelemetryError::ExecutionNotFound(ref id) if id == "never-started"));
    }

    #[test]
    fn ending_twice_fails() {
        let (hub, tracker) = tracker();
        let id = tracker.start_execution("a1", "Planner", "n", None, 0);
        tracker.end_execution(&id, "", true, None).unwrap();
        assert!(tracker.end_execution(&id, "", true, None).is_err());
        assert_eq!(hub.stats().executions, 1);
    }

    #[test]
    fn usage_update_for_unknown_execution_is_noop() {
        let (hub, tracker) = tracker();
        let id = tracker.start_execution("a1", "Planner", "n", None, 0);
        let before = tracker.get_active_executions();
        let stats_before = hub.stats();

        tracker.update_llm_usage("never-started", 100, 1.0);

        assert_eq!(tracker.get_active_executions(), before);
        assert_eq!(hub.stats(), stats_before);
        assert_eq!(tracker.get_active_executions()[&id].llm_calls, 0);
    }

    #[test]
    fn usage_update_after_end_does_not_touch_stored_record() {
        let (hub, tracker) = tracker();
        let id = tracker.start_execution("a1", "Planner", "n", Some("p1"), 0);
        tracker.update_llm_usage(&id, 10, 0.1);
        tracker.end_execution(&id, "", true, None).unwrap();

        tracker.update_llm_usage(&id, 999, 9.0);
        let stored = hub.get_executions_by_project("p1");
        assert_eq!(stored[0].total_tokens, 10);
        assert_eq!(stored[0].llm_calls, 1);
    }

    #[test]
    fn active_snapshot_is_a_copy() {
        let (_, tracker) = tracker();
        let id = tracker.start_execution("a1", "Planner", "n", None, 0);

        let mut snapshot = tracker.get_active_executions();
        snapshot.get_mut(&id).unwrap().total_tokens = 1_000_000;
        snapshot.clear();

        assert!(tracker.is_active(&id));
        assert_eq!(tracker.get_active_executions()[&id].total_tokens, 0);
    }

    #[test]
    fn llm_call_updates_totals_and_logs_event() {
        let (hub, tracker) = tracker();
        let id = tracker.start_execution("a1", "Planner", "n", Some("p1"), 0);
        let record =
            UsageRecord::new("a1", "Planner", "gpt-4o", 100, 20, 0.05, 300).with_project("p1");

        tracker.record_llm_call(&id, &record);
        tracker.record_llm_call("unknown", &record);

        assert_eq!(tracker.get_active_executions()[&id].total_tokens, 120);
        let calls: Vec<_> = hub
            .get_timeline(Some("p1"), None)
            .into_iter()
            .filter(|e| e.event_type == EventType::LlmCall)
            .collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].metadata["model"], "gpt-4o");
    }

    #[test]
    fn task_status_and_acceptance_events() {
        let (hub, tracker) = tracker();
        tracker.record_task_status(Some("p1"), "node-7", "completed", Metadata::new());
        tracker
            .record_acceptance_event(
                EventType::AcceptanceCheck,
                Some("p1"),
                Some("node-7"),
                Metadata::new(),
            )
            .unwrap();
        assert!(matches!(
            tracker.record_acceptance_event(EventType::AgentStart, None, None, Metadata::new()),
            Err(TelemetryError::InvalidEventType(EventType::AgentStart))
        ));

        let events = hub.get_timeline(Some("p1"), None);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].metadata["status"], "completed");
        assert_eq!(events[1].node_id.as_deref(), Some("node-7"));
    }

    #[test]
    fn concurrent_updates_and_end_race_safely() {
        let hub = Arc::new(ObservabilityHub::new());
        let tracker = Arc::new(TimelineTracker::new(hub.clone()));
        let id = tracker.start_execution("a1", "Planner", "n", Some("p1"), 0);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let tracker = tracker.clone();
                let id = id.clone();
                scope.spawn(move || {
                    for _ in 0..250 {
                        tracker.update_llm_usage(&id, 1, 0.0);
                    }
                });
            }
            let tracker = tracker.clone();
            let id = id.clone();
            scope.spawn(move || {
                std::thread::yield_now();
                tracker.end_execution(&id, "", true, None).unwrap();
            });
        });

        let stored = &hub.get_executions_by_project("p1")[0];
        assert!(stored.total_tokens <= 1000);
        assert_eq!(stored.total_tokens, stored.llm_calls);
        assert!(!tracker.is_active(&id));
    }
}
