//! Thread-safe observability hub. Owns every usage record, execution, and
//! timeline event, indexes them by project and agent, and serves queries.

use crate::model::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Downstream receiver of hub mutations.
///
/// The hub forwards every recorded entity to at most one sink, after the
/// write lock has been released. Implementations must not block for long;
/// the return value reports whether the push was accepted and is only
/// logged by the hub.
pub trait RecordSink: Send + Sync {
    fn push_usage(&self, record: &UsageRecord) -> bool;
    fn push_execution(&self, execution: &AgentExecution) -> bool;
    fn push_timeline_event(&self, event: &TimelineEvent) -> bool;
}

/// Primary lists plus positional secondary indices.
///
/// Index entries are positions into the owning `Vec`, appended in the same
/// critical section as the record itself.
#[derive(Default)]
struct HubState {
    usage: Vec<UsageRecord>,
    executions: Vec<AgentExecution>,
    timeline: Vec<TimelineEvent>,
    usage_by_project: HashMap<String, Vec<usize>>,
    usage_by_agent: HashMap<String, Vec<usize>>,
    executions_by_project: HashMap<String, Vec<usize>>,
    executions_by_agent: HashMap<String, Vec<usize>>,
    timeline_by_project: HashMap<String, Vec<usize>>,
}

fn index(map: &mut HashMap<String, Vec<usize>>, key: &str, position: usize) {
    map.entry(key.to_string()).or_default().push(position);
}

fn materialize<T: Clone>(items: &[T], positions: Option<&Vec<usize>>) -> Vec<T> {
    positions
        .map(|ps| ps.iter().filter_map(|&i| items.get(i).cloned()).collect())
        .unwrap_or_default()
}

fn within<T>(
    records: Vec<T>,
    range: Option<TimeRange>,
    at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>,
) -> Vec<T> {
    match range {
        Some(range) => records.into_iter().filter(|r| range.contains(at(r))).collect(),
        None => records,
    }
}

static GLOBAL: RwLock<Option<Arc<ObservabilityHub>>> = RwLock::new(None);

/// The in-memory store for all observability data.
///
/// One `RwLock` guards the records and their indices. Writers hold it only
/// for append + index update; readers hold it only long enough to clone a
/// snapshot. Filtering, aggregation, and sink delivery run unlocked.
pub struct ObservabilityHub {
    state: RwLock<HubState>,
    sink: RwLock<Option<Arc<dyn RecordSink>>>,
}

impl ObservabilityHub {
    /// Create an empty hub with no sink attached.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            sink: RwLock::new(None),
        }
    }

    /// Process-wide shared hub, created on first access.
    ///
    /// Prefer passing an explicit `Arc<ObservabilityHub>`; this accessor
    /// exists for call sites that cannot be threaded through.
    pub fn global() -> Arc<ObservabilityHub> {
        if let Some(hub) = GLOBAL.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return hub.clone();
        }
        let mut slot = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have initialized it between the two locks.
        slot.get_or_insert_with(|| {
            debug!("Initializing global observability hub");
            Arc::new(ObservabilityHub::new())
        })
        .clone()
    }

    /// Drop the process-wide hub so the next `global()` builds a fresh one.
    /// Test utility; existing `Arc` holders keep their instance.
    pub fn reset_global() {
        GLOBAL.write().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn read(&self) -> RwLockReadGuard<'_, HubState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HubState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_sink(&self) -> Option<Arc<dyn RecordSink>> {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Sink management ───────────────────────────────────────────────

    /// Attach the sink every mutation is forwarded to, replacing any
    /// previous one.
    pub fn set_webhook(&self, sink: Arc<dyn RecordSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// Detach the sink, returning it.
    pub fn clear_webhook(&self) -> Option<Arc<dyn RecordSink>> {
        self.sink.write().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn has_webhook(&self) -> bool {
        self.current_sink().is_some()
    }

    // ── Recording ─────────────────────────────────────────────────────

    /// Store a usage record and forward it to the sink.
    pub fn record_usage(&self, record: UsageRecord) {
        let forward = self.current_sink().map(|sink| (sink, record.clone()));
        {
            let mut state = self.write();
            let position = state.usage.len();
            if let Some(project) = &record.project_id {
                index(&mut state.usage_by_project, project, position);
            }
            index(&mut state.usage_by_agent, &record.agent_id, position);
            state.usage.push(record);
        }

        if let Some((sink, record)) = forward {
            if !sink.push_usage(&record) {
                debug!(agent_id = %record.agent_id, "Sink rejected usage record");
            }
        }
    }

    /// Store a finished (or externally built) execution and forward it.
    pub fn record_execution(&self, execution: AgentExecution) {
        let forward = self.current_sink().map(|sink| (sink, execution.clone()));
        {
            let mut state = self.write();
            let position = state.executions.len();
            if let Some(project) = &execution.project_id {
                index(&mut state.executions_by_project, project, position);
            }
            index(&mut state.executions_by_agent, &execution.agent_id, position);
            state.executions.push(execution);
        }

        if let Some((sink, execution)) = forward {
            if !sink.push_execution(&execution) {
                debug!(execution_id = %execution.execution_id, "Sink rejected execution");
            }
        }
    }

    /// Append a timeline event and forward it.
    pub fn record_timeline_event(&self, event: TimelineEvent) {
        let forward = self.current_sink().map(|sink| (sink, event.clone()));
        {
            let mut state = self.write();
            let position = state.timeline.len();
            if let Some(project) = &event.project_id {
                index(&mut state.timeline_by_project, project, position);
            }
            state.timeline.push(event);
        }

        if let Some((sink, event)) = forward {
            if !sink.push_timeline_event(&event) {
                debug!(event_type = %event.event_type, "Sink rejected timeline event");
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Usage records for a project, optionally restricted to a time window.
    pub fn get_usage_by_project(
        &self,
        project_id: &str,
        range: Option<TimeRange>,
    ) -> Vec<UsageRecord> {
        let snapshot = {
            let state = self.read();
            materialize(&state.usage, state.usage_by_project.get(project_id))
        };
        within(snapshot, range, |r| r.timestamp)
    }

    /// Usage records for an agent, optionally restricted to a time window.
    pub fn get_usage_by_agent(&self, agent_id: &str, range: Option<TimeRange>) -> Vec<UsageRecord> {
        let snapshot = {
            let state = self.read();
            materialize(&state.usage, state.usage_by_agent.get(agent_id))
        };
        within(snapshot, range, |r| r.timestamp)
    }

    pub fn get_executions_by_project(&self, project_id: &str) -> Vec<AgentExecution> {
        let state = self.read();
        materialize(&state.executions, state.executions_by_project.get(project_id))
    }

    pub fn get_executions_by_agent(&self, agent_id: &str) -> Vec<AgentExecution> {
        let state = self.read();
        materialize(&state.executions, state.executions_by_agent.get(agent_id))
    }

    /// Every usage record in insertion order.
    pub fn get_all_usage(&self) -> Vec<UsageRecord> {
        self.read().usage.clone()
    }

    /// Every recorded execution in insertion order.
    pub fn get_all_executions(&self) -> Vec<AgentExecution> {
        self.read().executions.clone()
    }

    /// Aggregate usage and executions for a project.
    ///
    /// A project with no data yields an all-zero summary.
    pub fn get_project_summary(&self, project_id: &str) -> ProjectSummary {
        let usage = self.get_usage_by_project(project_id, None);
        let executions = self.get_executions_by_project(project_id);

        let total_tokens = usage
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.total_tokens));
        let total_cost_usd = usage.iter().map(|r| r.cost_usd).sum();

        let agents: HashSet<&str> = usage
            .iter()
            .map(|r| r.agent_id.as_str())
            .chain(executions.iter().map(|e| e.agent_id.as_str()))
            .collect();

        let success_rate = if executions.is_empty() {
            0.0
        } else {
            executions.iter().filter(|e| e.success).count() as f64 / executions.len() as f64
        };

        let durations: Vec<u64> = executions.iter().filter_map(|e| e.duration_ms).collect();
        let avg_execution_time_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().map(|d| *d as f64).sum::<f64>() / durations.len() as f64
        };

        ProjectSummary {
            total_tokens,
            total_cost_usd,
            llm_calls: usage.len() as u64,
            agent_executions: executions.len() as u64,
            agents_used: agents.len() as u64,
            success_rate,
            avg_execution_time_ms,
        }
    }

    /// Timeline events in ascending timestamp order. Storage keeps arrival
    /// order; sorting happens on read.
    pub fn get_timeline(
        &self,
        project_id: Option<&str>,
        range: Option<TimeRange>,
    ) -> Vec<TimelineEvent> {
        let snapshot = {
            let state = self.read();
            match project_id {
                Some(project) => {
                    materialize(&state.timeline, state.timeline_by_project.get(project))
                }
                None => state.timeline.clone(),
            }
        };
        let mut events = within(snapshot, range, |e| e.timestamp);
        events.sort_by_key(|e| e.timestamp);
        events
    }

    /// Distinct agent ids seen in usage records or executions, sorted.
    pub fn get_all_agents(&self) -> Vec<String> {
        let state = self.read();
        state
            .usage_by_agent
            .keys()
            .chain(state.executions_by_agent.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct project ids seen in any collection, sorted.
    pub fn get_all_projects(&self) -> Vec<String> {
        let state = self.read();
        state
            .usage_by_project
            .keys()
            .chain(state.executions_by_project.keys())
            .chain(state.timeline_by_project.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn stats(&self) -> HubStats {
        let state = self.read();
        HubStats {
            usage_records: state.usage.len(),
            executions: state.executions.len(),
            timeline_events: state.timeline.len(),
        }
    }

    /// Wipe every record and index. The sink stays attached.
    pub fn clear(&self) {
        *self.write() = HubState::default();
        debug!("Observability hub cleared");
    }
}

impl Default for ObservabilityHub {
    fn default() -> Self {
        Self::new()
    }
}
