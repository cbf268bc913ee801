//! Best-effort HTTP delivery of hub mutations to an external collector.
//!
//! Every record is POSTed as JSON to `{api_url}/ingest/{usage|execution|timeline}/`.
//! Only a `201 Created` response counts as delivered. Failures are logged
//! and dropped; nothing is retried or persisted.

use crate::TelemetryError;
use crate::hub::RecordSink;
use crate::model::{AgentExecution, ExecutionStatus, TimelineEvent, UsageRecord};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Header carrying the collector API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Size of the background delivery pool.
const WORKERS: usize = 2;

/// Extra time a synchronous push waits beyond the request timeout.
const SYNC_GRACE: Duration = Duration::from_secs(1);

/// Webhook exporter settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Collector base URL, e.g. `http://localhost:8000/api`.
    pub api_url: String,
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Deliver from the worker pool instead of blocking the caller.
    pub background: bool,
    /// Pending pushes the background queue holds before new ones are dropped.
    pub queue_capacity: usize,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api".into(),
            api_key: None,
            timeout: Duration::from_secs(10),
            background: true,
            queue_capacity: 1024,
            headers: BTreeMap::new(),
        }
    }
}

impl WebhookConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ExecutionPayload<'a> {
    execution_id: &'a str,
    agent_id: &'a str,
    agent_name: &'a str,
    node_id: &'a str,
    project_id: Option<&'a str>,
    round_index: u32,
    start_time: String,
    end_time: Option<String>,
    duration_ms: Option<u64>,
    content: &'a str,
    success: bool,
    error_message: Option<&'a str>,
    llm_calls: u64,
    total_tokens: u64,
    total_cost_usd: f64,
    status: ExecutionStatus,
}

impl<'a> From<&'a AgentExecution> for ExecutionPayload<'a> {
    fn from(e: &'a AgentExecution) -> Self {
        Self {
            execution_id: &e.execution_id,
            agent_id: &e.agent_id,
            agent_name: &e.agent_name,
            node_id: &e.node_id,
            project_id: e.project_id.as_deref(),
            round_index: e.round_index,
            start_time: e.start_time.to_rfc3339(),
            end_time: e.end_time.map(|t| t.to_rfc3339()),
            duration_ms: e.duration_ms,
            content: &e.content,
            success: e.success,
            error_message: e.error_message.as_deref(),
            llm_calls: e.llm_calls,
            total_tokens: e.total_tokens,
            total_cost_usd: e.total_cost_usd,
            status: e.status(),
        }
    }
}

/// Usage records and timeline events already serialize flat with RFC 3339
/// timestamps; executions additionally carry a derived `status`.
pub fn usage_payload(record: &UsageRecord) -> Result<serde_json::Value, TelemetryError> {
    Ok(serde_json::to_value(record)?)
}

pub fn execution_payload(execution: &AgentExecution) -> Result<serde_json::Value, TelemetryError> {
    Ok(serde_json::to_value(ExecutionPayload::from(execution))?)
}

pub fn timeline_payload(event: &TimelineEvent) -> Result<serde_json::Value, TelemetryError> {
    Ok(serde_json::to_value(event)?)
}

// ── Transport ─────────────────────────────────────────────────────────────

struct Transport {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl Transport {
    async fn deliver(&self, kind: &str, body: &serde_json::Value) -> bool {
        let url = endpoint(&self.base_url, kind);
        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().as_u16() == 201 => {
                debug!(endpoint = %url, "Webhook push delivered");
                true
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                warn!(endpoint = %url, status, body = %body, "Webhook push rejected");
                false
            }
            Err(e) => {
                warn!(endpoint = %url, error = %e, "Webhook push failed");
                false
            }
        }
    }
}

fn endpoint(base_url: &str, kind: &str) -> String {
    format!("{base_url}/ingest/{kind}/")
}

fn build_headers(config: &WebhookConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let extra = config
        .api_key
        .iter()
        .map(|key| (API_KEY_HEADER, key.as_str()))
        .chain(config.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    for (name, value) in extra {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid webhook header"),
        }
    }
    headers
}

// ── Exporter ──────────────────────────────────────────────────────────────

struct Job {
    kind: &'static str,
    body: serde_json::Value,
}

struct Dispatcher {
    runtime: tokio::runtime::Runtime,
    transport: Arc<Transport>,
    /// Present only in background mode.
    queue: Option<mpsc::Sender<Job>>,
}

/// Pushes hub records to a remote collector.
///
/// Owns a small dedicated runtime so it can be used from plain threads as
/// well as from inside another tokio runtime. In background mode pushes go
/// through a bounded queue drained by two workers and the caller never
/// waits; in synchronous mode the caller waits for the HTTP outcome.
pub struct WebhookExporter {
    config: WebhookConfig,
    base_url: String,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl WebhookExporter {
    pub fn new(config: WebhookConfig) -> Result<Self, TelemetryError> {
        let setup_error = |reason: String| TelemetryError::Delivery {
            endpoint: config.api_url.clone(),
            reason,
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(WORKERS)
            .thread_name("hivecore-webhook")
            .enable_all()
            .build()
            .map_err(|e| setup_error(e.to_string()))?;

        let client = {
            let _guard = runtime.enter();
            reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| setup_error(e.to_string()))?
        };

        let transport = Arc::new(Transport {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            headers: build_headers(&config),
        });

        let queue = config.background.then(|| {
            let (tx, rx) = mpsc::channel::<Job>(config.queue_capacity.max(1));
            let rx = Arc::new(tokio::sync::Mutex::new(rx));
            for _ in 0..WORKERS {
                let rx = rx.clone();
                let transport = transport.clone();
                runtime.spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        transport.deliver(job.kind, &job.body).await;
                    }
                });
            }
            tx
        });

        info!(
            api_url = %transport.base_url,
            background = config.background,
            "Webhook exporter started"
        );

        Ok(Self {
            config,
            base_url: transport.base_url.clone(),
            dispatcher: Mutex::new(Some(Dispatcher {
                runtime,
                transport,
                queue,
            })),
        })
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Full URL records of `kind` are posted to.
    pub fn endpoint(&self, kind: &str) -> String {
        endpoint(&self.base_url, kind)
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop accepting pushes, shut the worker pool down without waiting for
    /// in-flight requests, and release the HTTP client. Idempotent.
    pub fn close(&self) {
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Dispatcher {
            runtime,
            transport,
            queue,
        }) = dispatcher
        {
            drop(queue);
            drop(transport);
            runtime.shutdown_background();
            info!("Webhook exporter closed");
        }
    }

    fn submit(
        &self,
        kind: &'static str,
        payload: Result<serde_json::Value, TelemetryError>,
    ) -> bool {
        let body = match payload {
            Ok(body) => body,
            Err(e) => {
                warn!(kind, error = %e, "Failed to serialize webhook payload");
                return false;
            }
        };

        let (handle, transport) = {
            let guard = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(dispatcher) = guard.as_ref() else {
                debug!(kind, "Webhook exporter closed, dropping push");
                return false;
            };
            if let Some(queue) = &dispatcher.queue {
                return match queue.try_send(Job { kind, body }) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        warn!(kind, "Webhook queue full, dropping push");
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                };
            }
            (dispatcher.runtime.handle().clone(), dispatcher.transport.clone())
        };

        let (done_tx, done_rx) = std::sync::mpsc::sync_channel(1);
        handle.spawn(async move {
            let delivered = transport.deliver(kind, &body).await;
            let _ = done_tx.send(delivered);
        });
        done_rx
            .recv_timeout(self.config.timeout + SYNC_GRACE)
            .unwrap_or_else(|_| {
                warn!(kind, "Webhook push did not complete");
                false
            })
    }
}

impl RecordSink for WebhookExporter {
    fn push_usage(&self, record: &UsageRecord) -> bool {
        self.submit("usage", usage_payload(record))
    }

    fn push_execution(&self, execution: &AgentExecution) -> bool {
        self.submit("execution", execution_payload(execution))
    }

    fn push_timeline_event(&self, event: &TimelineEvent) -> bool {
        self.submit("timeline", timeline_payload(event))
    }
}

impl Drop for WebhookExporter {
    fn drop(&mut self) {
        self.close();
    }
}
