//! Usage collection: turns provider usage data into priced
//! [`UsageRecord`]s and stores them in the hub.

use crate::hub::ObservabilityHub;
use crate::model::UsageRecord;
use crate::pricing::PricingTable;
use std::sync::Arc;
use tracing::debug;

/// Anything that can report the token usage and latency of one LLM call.
pub trait UsageSource {
    fn input_tokens(&self) -> u64;
    fn output_tokens(&self) -> u64;
    /// Wall-clock duration of the call in seconds.
    fn elapsed_secs(&self) -> f64;
}

/// Plain token counts plus latency.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_secs: f64,
}

impl LlmUsage {
    pub fn new(input_tokens: u64, output_tokens: u64, elapsed_secs: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            elapsed_secs,
        }
    }
}

impl UsageSource for LlmUsage {
    fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }
}

/// Reads a non-negative integer field; absent, negative, or non-numeric
/// values count as zero.
fn count_field(value: &serde_json::Value, keys: &[&str]) -> u64 {
    let usage = value.get("usage").unwrap_or(value);
    keys.iter()
        .find_map(|k| usage.get(*k))
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().filter(|f| *f > 0.0).map(|f| f as u64)))
        .unwrap_or(0)
}

/// Provider response JSON. Accepts OpenAI-style
/// (`prompt_tokens` / `completion_tokens`) and Anthropic-style
/// (`input_tokens` / `output_tokens`) usage objects, either bare or nested
/// under `"usage"`.
impl UsageSource for serde_json::Value {
    fn input_tokens(&self) -> u64 {
        count_field(self, &["input_tokens", "prompt_tokens"])
    }

    fn output_tokens(&self) -> u64 {
        count_field(self, &["output_tokens", "completion_tokens"])
    }

    fn elapsed_secs(&self) -> f64 {
        ["elapsed_secs", "duration_secs"]
            .iter()
            .find_map(|k| self.get(*k).and_then(|v| v.as_f64()))
            .filter(|secs| *secs > 0.0)
            .unwrap_or(0.0)
    }
}

/// Who made a call and in which context.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub agent_id: String,
    pub agent_name: String,
    pub model_name: String,
    pub project_id: Option<String>,
    pub trace_id: Option<String>,
}

impl CallContext {
    pub fn new(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            model_name: model_name.into(),
            project_id: None,
            trace_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// Builds usage records, prices them, and stores them in the hub.
pub struct UsageCollector {
    hub: Arc<ObservabilityHub>,
    pricing: Arc<PricingTable>,
}

impl UsageCollector {
    /// Create a collector pricing calls with the built-in table.
    pub fn new(hub: Arc<ObservabilityHub>) -> Self {
        Self::with_pricing(hub, Arc::new(PricingTable::with_defaults()))
    }

    /// Create a collector with a custom pricing table.
    pub fn with_pricing(hub: Arc<ObservabilityHub>, pricing: Arc<PricingTable>) -> Self {
        Self { hub, pricing }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Record a call described by any [`UsageSource`].
    pub fn record(&self, ctx: &CallContext, usage: &impl UsageSource) -> UsageRecord {
        self.record_raw(ctx, usage.input_tokens(), usage.output_tokens(), usage.elapsed_secs())
    }

    /// Record a call from raw token counts and elapsed seconds.
    pub fn record_raw(
        &self,
        ctx: &CallContext,
        input_tokens: u64,
        output_tokens: u64,
        elapsed_secs: f64,
    ) -> UsageRecord {
        let cost_usd = self
            .pricing
            .compute_cost(&ctx.model_name, input_tokens, output_tokens);
        let duration_ms = (elapsed_secs.max(0.0) * 1000.0).round() as u64;

        let mut record = UsageRecord::new(
            ctx.agent_id.clone(),
            ctx.agent_name.clone(),
            ctx.model_name.clone(),
            input_tokens,
            output_tokens,
            cost_usd,
            duration_ms,
        );
        record.project_id = ctx.project_id.clone();
        record.trace_id = ctx.trace_id.clone();

        debug!(
            agent_id = %record.agent_id,
            model = %record.model_name,
            tokens = record.total_tokens,
            cost_usd = record.cost_usd,
            "Recording LLM usage"
        );
        self.hub.record_usage(record.clone());
        record
    }
}
