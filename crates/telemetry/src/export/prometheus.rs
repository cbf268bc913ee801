//! Prometheus text exposition of usage, cost, and execution metrics.

use crate::hub::ObservabilityHub;
use crate::model::{AgentExecution, ProjectSummary};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Upper bounds (ms) of the execution duration histogram buckets.
const DURATION_BUCKETS_MS: &[f64] = &[
    100.0, 500.0, 1_000.0, 5_000.0, 10_000.0, 30_000.0, 60_000.0, 300_000.0, 600_000.0,
];

/// Escape a label value: backslash, double quote, and newline.
pub fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn labels(pairs: &[(&str, &str)]) -> String {
    let body: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
        .collect();
    format!("{{{}}}", body.join(","))
}

fn family(out: &mut String, name: &str, help: &str, kind: &str) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} {kind}\n"));
}

#[derive(Default)]
struct AgentModelTotals {
    input_tokens: u64,
    output_tokens: u64,
    total_tokens: u64,
    cost_usd: f64,
    calls: u64,
}

#[derive(Default)]
struct DurationHistogram {
    buckets: Vec<u64>,
    sum: u64,
    count: u64,
}

impl DurationHistogram {
    fn observe(&mut self, duration_ms: u64) {
        if self.buckets.is_empty() {
            self.buckets = vec![0; DURATION_BUCKETS_MS.len()];
        }
        for (slot, bound) in self.buckets.iter_mut().zip(DURATION_BUCKETS_MS) {
            if duration_ms as f64 <= *bound {
                *slot += 1;
            }
        }
        self.sum = self.sum.saturating_add(duration_ms);
        self.count += 1;
    }
}

/// Renders hub aggregates in the Prometheus text format.
pub struct PrometheusExporter {
    hub: Arc<ObservabilityHub>,
}

impl PrometheusExporter {
    pub fn new(hub: Arc<ObservabilityHub>) -> Self {
        Self { hub }
    }

    /// Token, cost, and call counters per agent and model, plus the
    /// execution duration histogram.
    pub fn export(&self) -> String {
        // (agent_id, agent_name, model) -> totals
        let mut usage: BTreeMap<(String, String, String), AgentModelTotals> = BTreeMap::new();
        for agent_id in self.hub.get_all_agents() {
            for record in self.hub.get_usage_by_agent(&agent_id, None) {
                let totals = usage
                    .entry((agent_id.clone(), record.agent_name, record.model_name))
                    .or_default();
                totals.input_tokens = totals.input_tokens.saturating_add(record.input_tokens);
                totals.output_tokens = totals.output_tokens.saturating_add(record.output_tokens);
                totals.total_tokens = totals.total_tokens.saturating_add(record.total_tokens);
                totals.cost_usd += record.cost_usd;
                totals.calls = totals.calls.saturating_add(1);
            }
        }

        let mut out = String::new();

        family(&mut out, "hivecore_tokens_total", "Tokens consumed by LLM calls", "counter");
        for ((agent_id, agent_name, model), totals) in &usage {
            for (kind, value) in [
                ("input", totals.input_tokens),
                ("output", totals.output_tokens),
                ("total", totals.total_tokens),
            ] {
                let l = labels(&[
                    ("agent_id", agent_id.as_str()),
                    ("agent_name", agent_name.as_str()),
                    ("model", model.as_str()),
                    ("type", kind),
                ]);
                out.push_str(&format!("hivecore_tokens_total{l} {value}\n"));
            }
        }

        family(&mut out, "hivecore_cost_usd_total", "Estimated LLM cost in USD", "counter");
        for ((agent_id, agent_name, model), totals) in &usage {
            let l = labels(&[
                ("agent_id", agent_id.as_str()),
                ("agent_name", agent_name.as_str()),
                ("model", model.as_str()),
            ]);
            out.push_str(&format!("hivecore_cost_usd_total{l} {}\n", totals.cost_usd));
        }

        family(&mut out, "hivecore_llm_calls_total", "Number of LLM calls", "counter");
        for ((agent_id, agent_name, model), totals) in &usage {
            let l = labels(&[
                ("agent_id", agent_id.as_str()),
                ("agent_name", agent_name.as_str()),
                ("model", model.as_str()),
            ]);
            out.push_str(&format!("hivecore_llm_calls_total{l} {}\n", totals.calls));
        }

        self.render_durations(&mut out, &self.hub.get_all_executions());
        out
    }

    fn render_durations(&self, out: &mut String, executions: &[AgentExecution]) {
        // (agent_id, agent_name, node_id, success) -> histogram
        let mut histograms: BTreeMap<(String, String, String, bool), DurationHistogram> =
            BTreeMap::new();
        for execution in executions {
            let Some(duration_ms) = execution.duration_ms else {
                continue;
            };
            histograms
                .entry((
                    execution.agent_id.clone(),
                    execution.agent_name.clone(),
                    execution.node_id.clone(),
                    execution.success,
                ))
                .or_default()
                .observe(duration_ms);
        }

        let name = "hivecore_agent_execution_duration_ms";
        family(out, name, "Agent execution duration in milliseconds", "histogram");
        for ((agent_id, agent_name, node_id, success), histogram) in &histograms {
            let success = success.to_string();
            let base = [
                ("agent_id", agent_id.as_str()),
                ("agent_name", agent_name.as_str()),
                ("node_id", node_id.as_str()),
                ("success", success.as_str()),
            ];
            for (bound, count) in DURATION_BUCKETS_MS.iter().zip(&histogram.buckets) {
                let le = bound.to_string();
                let mut pairs = base.to_vec();
                pairs.push(("le", le.as_str()));
                out.push_str(&format!("{name}_bucket{} {count}\n", labels(&pairs)));
            }
            let mut pairs = base.to_vec();
            pairs.push(("le", "+Inf"));
            out.push_str(&format!("{name}_bucket{} {}\n", labels(&pairs), histogram.count));
            out.push_str(&format!("{name}_sum{} {}\n", labels(&base), histogram.sum));
            out.push_str(&format!("{name}_count{} {}\n", labels(&base), histogram.count));
        }
    }

    /// Project-scoped series for a single project.
    pub fn export_project(&self, project_id: &str) -> String {
        let summary = self.hub.get_project_summary(project_id);
        render_projects(&[(project_id.to_string(), summary)])
    }

    /// Project-scoped series for every known project.
    pub fn export_projects(&self) -> String {
        let projects: Vec<(String, ProjectSummary)> = self
            .hub
            .get_all_projects()
            .into_iter()
            .map(|id| {
                let summary = self.hub.get_project_summary(&id);
                (id, summary)
            })
            .collect();
        render_projects(&projects)
    }
}

fn render_projects(projects: &[(String, ProjectSummary)]) -> String {
    type Getter = fn(&ProjectSummary) -> String;
    let series: [(&str, &str, &str, Getter); 6] = [
        ("hivecore_project_tokens_total", "Tokens consumed by the project", "counter", |s| {
            s.total_tokens.to_string()
        }),
        ("hivecore_project_cost_usd_total", "Estimated project cost in USD", "counter", |s| {
            s.total_cost_usd.to_string()
        }),
        ("hivecore_project_llm_calls_total", "LLM calls made for the project", "counter", |s| {
            s.llm_calls.to_string()
        }),
        ("hivecore_project_executions_total", "Agent executions in the project", "counter", |s| {
            s.agent_executions.to_string()
        }),
        ("hivecore_project_success_rate", "Fraction of successful executions", "gauge", |s| {
            s.success_rate.to_string()
        }),
        (
            "hivecore_project_avg_execution_time_ms",
            "Mean execution duration in milliseconds",
            "gauge",
            |s| s.avg_execution_time_ms.to_string(),
        ),
    ];

    let mut out = String::new();
    for (name, help, kind, value) in series {
        family(&mut out, name, help, kind);
        for (project_id, summary) in projects {
            let l = labels(&[("project_id", project_id.as_str())]);
            out.push_str(&format!("{name}{l} {}\n", value(summary)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UsageRecord;

    fn hub_with_usage() -> Arc<ObservabilityHub> {
        let hub = Arc::new(ObservabilityHub::new());
        hub.record_usage(
            UsageRecord::new("a1", "Coder", "gpt-4o", 100, 50, 0.25, 10).with_project("p1"),
        );
        hub.record_usage(
            UsageRecord::new("a1", "Coder", "gpt-4o", 200, 80, 0.5, 10).with_project("p1"),
        );
        hub
    }

    fn finished(agent: &str, node: &str, success: bool, duration_ms: u64) -> AgentExecution {
        let mut exec = AgentExecution::new(agent, agent, node, Some("p1".into()), 0);
        exec.finish(String::new(), success, None);
        exec.duration_ms = Some(duration_ms);
        exec
    }

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape_label_value(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_label_value("a\nb"), r"a\nb");
        assert_eq!(escape_label_value(r"a\b"), r"a\\b");
        assert_eq!(escape_label_value("plain"), "plain");
    }

    #[test]
    fn agent_counters() {
        let text = PrometheusExporter::new(hub_with_usage()).export();

        assert!(text.contains("# HELP hivecore_tokens_total"));
        assert!(text.contains("# TYPE hivecore_tokens_total counter"));
        assert!(text.contains(
            r#"hivecore_tokens_total{agent_id="a1",agent_name="Coder",model="gpt-4o",type="input"} 300"#
        ));
        assert!(text.contains(r#"type="output"} 130"#));
        assert!(text.contains(r#"type="total"} 430"#));
        assert!(text.contains(
            r#"hivecore_cost_usd_total{agent_id="a1",agent_name="Coder",model="gpt-4o"} 0.75"#
        ));
        assert!(text.contains(
            r#"hivecore_llm_calls_total{agent_id="a1",agent_name="Coder",model="gpt-4o"} 2"#
        ));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn huge_token_counts_saturate() {
        let hub = Arc::new(ObservabilityHub::new());
        hub.record_usage(UsageRecord::new("a1", "Coder", "gpt-4o", u64::MAX, 0, 0.0, 1));
        hub.record_usage(UsageRecord::new("a1", "Coder", "gpt-4o", 1, 1, 0.0, 1));
        let text = PrometheusExporter::new(hub).export();

        assert!(text.contains(&format!(r#"type="input"}} {}"#, u64::MAX)));
        assert!(text.contains(&format!(r#"type="total"}} {}"#, u64::MAX)));
        assert!(text.contains(r#"type="output"} 1"#));
    }

    #[test]
    fn hostile_model_name_stays_on_one_line() {
        let hub = Arc::new(ObservabilityHub::new());
        hub.record_usage(UsageRecord::new("a1", "Co\"der", "evil\"model\nname", 1, 1, 0.0, 1));
        let text = PrometheusExporter::new(hub).export();

        assert!(text.contains(r#"model="evil\"model\nname""#));
        assert!(text.contains(r#"agent_name="Co\"der""#));
        for line in text.lines() {
            assert!(
                line.starts_with('#') || line.starts_with("hivecore_"),
                "malformed line: {line}"
            );
        }
    }

    #[test]
    fn duration_histogram() {
        let hub = Arc::new(ObservabilityHub::new());
        hub.record_execution(finished("a1", "n1", true, 50));
        hub.record_execution(finished("a1", "n1", true, 700));
        hub.record_execution(finished("a1", "n1", false, 20_000));
        let mut running = AgentExecution::new("a2", "a2", "n2", None, 0);
        running.duration_ms = None;
        hub.record_execution(running);

        let text = PrometheusExporter::new(hub).export();
        let ok = r#"agent_id="a1",agent_name="a1",node_id="n1",success="true""#;
        let name = "hivecore_agent_execution_duration_ms";
        assert!(text.contains(&format!("# TYPE {name} histogram")));
        assert!(text.contains(&format!("{name}_bucket{{{ok},le=\"100\"}} 1")));
        assert!(text.contains(&format!("{name}_bucket{{{ok},le=\"1000\"}} 2")));
        assert!(text.contains(&format!("{name}_bucket{{{ok},le=\"+Inf\"}} 2")));
        assert!(text.contains(&format!("{name}_sum{{{ok}}} 750")));
        assert!(text.contains(&format!("{name}_count{{{ok}}} 2")));
        assert!(text.contains(r#"success="false"} 1"#));
        assert!(!text.contains(r#"agent_id="a2""#));
    }

    #[test]
    fn project_series() {
        let hub = hub_with_usage();
        hub.record_execution(finished("a1", "n1", true, 400));
        let text = PrometheusExporter::new(hub).export_project("p1");

        assert!(text.contains("# TYPE hivecore_project_tokens_total counter"));
        assert!(text.contains(r#"hivecore_project_tokens_total{project_id="p1"} 430"#));
        assert!(text.contains(r#"hivecore_project_llm_calls_total{project_id="p1"} 2"#));
        assert!(text.contains(r#"hivecore_project_executions_total{project_id="p1"} 1"#));
        assert!(text.contains(r#"hivecore_project_success_rate{project_id="p1"} 1"#));
        assert!(text.contains(r#"hivecore_project_avg_execution_time_ms{project_id="p1"} 400"#));
        assert_eq!(text.matches("# TYPE").count(), 6);
    }

    #[test]
    fn all_projects_share_families() {
        let hub = hub_with_usage();
        hub.record_usage(
            UsageRecord::new("a2", "Tester", "gpt-4o", 1, 1, 0.0, 1).with_project("p\"2"),
        );
        let text = PrometheusExporter::new(hub).export_projects();
        assert_eq!(text.matches("# TYPE hivecore_project_tokens_total").count(), 1);
        assert!(text.contains(r#"hivecore_project_tokens_total{project_id="p\"2"} 2"#));
    }

    #[test]
    fn empty_hub_renders_headers_only() {
        let text = PrometheusExporter::new(Arc::new(ObservabilityHub::new())).export();
        assert!(text.lines().all(|l| l.starts_with('#')));
    }
}
