//! `hivecore demo`: Run a synthetic two-agent workload and print its export.

use clap::ValueEnum;
use hivecore_telemetry::{
    CallContext, EventType, JsonExporter, LlmUsage, Metadata, ObservabilityHub,
    PrometheusExporter, TelemetryError, TimelineTracker, UsageCollector,
};
use std::sync::Arc;

/// Project id the demo workload records under.
pub const DEMO_PROJECT: &str = "demo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Prometheus,
    Json,
}

/// A planner that makes two calls and a coder that makes one and fails,
/// followed by an acceptance check on the coder's node.
pub fn simulate(hub: &Arc<ObservabilityHub>) -> Result<(), TelemetryError> {
    let tracker = TimelineTracker::new(hub.clone());
    let collector = UsageCollector::new(hub.clone());

    let workload: [(&str, &str, &str, &str, &[(u64, u64)], bool); 2] = [
        ("planner", "Planner", "plan", "gpt-4o", &[(820, 240), (1100, 310)], true),
        ("coder", "Coder", "implement", "claude-3-5-sonnet-20241022", &[(2400, 900)], false),
    ];

    for (agent_id, agent_name, node_id, model, calls, success) in workload {
        let execution_id =
            tracker.start_execution(agent_id, agent_name, node_id, Some(DEMO_PROJECT), 0);
        let ctx = CallContext::new(agent_id, agent_name, model).with_project(DEMO_PROJECT);
        for &(input, output) in calls {
            let record = collector.record(&ctx, &LlmUsage::new(input, output, 1.5));
            tracker.record_llm_call(&execution_id, &record);
        }
        let error = (!success).then(|| "tests failed".to_string());
        tracker.end_execution(&execution_id, format!("{agent_name} finished"), success, error)?;

        let mut status = Metadata::new();
        status.insert("agent_id".into(), agent_id.into());
        let label = if success { "completed" } else { "failed" };
        tracker.record_task_status(Some(DEMO_PROJECT), node_id, label, status);
    }

    tracker.record_acceptance_event(
        EventType::AcceptanceCheck,
        Some(DEMO_PROJECT),
        Some("implement"),
        Metadata::new(),
    )?;
    Ok(())
}

pub fn render(hub: &Arc<ObservabilityHub>, format: ExportFormat) -> String {
    match format {
        ExportFormat::Prometheus => {
            let exporter = PrometheusExporter::new(hub.clone());
            let mut out = exporter.export();
            out.push_str(&exporter.export_projects());
            out
        }
        ExportFormat::Json => JsonExporter::new(hub.clone()).render(),
    }
}

pub fn run(format: ExportFormat) -> Result<(), Box<dyn std::error::Error>> {
    let hub = Arc::new(ObservabilityHub::new());
    simulate(&hub)?;
    print!("{}", render(&hub, format));
    if format == ExportFormat::Json {
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_workload_summary() {
        let hub = Arc::new(ObservabilityHub::new());
        simulate(&hub).unwrap();

        let summary = hub.get_project_summary(DEMO_PROJECT);
        assert_eq!(summary.agent_executions, 2);
        assert_eq!(summary.llm_calls, 3);
        assert_eq!(summary.agents_used, 2);
        assert_eq!(summary.success_rate, 0.5);
        assert_eq!(summary.total_tokens, 820 + 240 + 1100 + 310 + 2400 + 900);
    }

    #[test]
    fn demo_renders_both_formats() {
        let hub = Arc::new(ObservabilityHub::new());
        simulate(&hub).unwrap();

        let text = render(&hub, ExportFormat::Prometheus);
        assert!(text.contains("hivecore_llm_calls_total{agent_id=\"planner\""));
        assert!(text.contains("hivecore_project_success_rate{project_id=\"demo\"} 0.5"));

        let json: serde_json::Value =
            serde_json::from_str(&render(&hub, ExportFormat::Json)).unwrap();
        assert_eq!(json["agents"]["coder"]["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(json["executions"].as_array().unwrap().len(), 2);
    }
}
