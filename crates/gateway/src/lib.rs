//! HTTP gateway for HiveCore observability data.
//!
//! Serves pull-based exports of the hub: Prometheus text for scrapers, JSON
//! snapshots and timelines for dashboards, and project summaries.
//!
//! Built on Axum.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Json},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use hivecore_telemetry::export::ExecutionView;
use hivecore_telemetry::{
    JsonExporter, MetricsExport, ObservabilityHub, ProjectSummary, PrometheusExporter,
    TimelineExport, TimelineTracker,
};

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub hub: Arc<ObservabilityHub>,
    pub tracker: Arc<TimelineTracker>,
    pub prometheus: PrometheusExporter,
    pub json: JsonExporter,
    pub start_time: DateTime<Utc>,
}

impl GatewayState {
    pub fn new(hub: Arc<ObservabilityHub>, tracker: Arc<TimelineTracker>) -> Self {
        Self {
            prometheus: PrometheusExporter::new(hub.clone()),
            json: JsonExporter::new(hub.clone()),
            hub,
            tracker,
            start_time: Utc::now(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/json", get(metrics_json_handler))
        .route("/metrics/projects/{project_id}", get(project_metrics_handler))
        .route("/projects", get(list_projects_handler))
        .route("/projects/{project_id}/summary", get(project_summary_handler))
        .route("/timeline", get(timeline_handler))
        .route("/executions/active", get(active_executions_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server on the configured address.
///
/// Runs until Ctrl-C.
pub async fn start(
    config: &hivecore_config::HubConfig,
    hub: Arc<ObservabilityHub>,
    tracker: Arc<TimelineTracker>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let app = build_router(Arc::new(GatewayState::new(hub, tracker)));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: i64,
    usage_records: usize,
    executions: usize,
    timeline_events: usize,
    active_executions: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let stats = state.hub.stats();
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: (Utc::now() - state.start_time).num_seconds(),
        usage_records: stats.usage_records,
        executions: stats.executions,
        timeline_events: stats.timeline_events,
        active_executions: state.tracker.get_active_executions().len(),
    })
}

fn prometheus_text(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body)
}

async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let mut body = state.prometheus.export();
    body.push_str(&state.prometheus.export_projects());
    prometheus_text(body)
}

async fn metrics_json_handler(State(state): State<SharedState>) -> Json<MetricsExport> {
    Json(state.json.export())
}

fn known_project(state: &GatewayState, project_id: &str) -> Result<(), StatusCode> {
    if state.hub.get_all_projects().iter().any(|p| p == project_id) {
        Ok(())
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn project_metrics_handler(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    known_project(&state, &project_id)?;
    Ok(prometheus_text(state.prometheus.export_project(&project_id)))
}

#[derive(Serialize, Deserialize)]
struct ProjectListResponse {
    count: usize,
    projects: Vec<String>,
}

async fn list_projects_handler(State(state): State<SharedState>) -> Json<ProjectListResponse> {
    let projects = state.hub.get_all_projects();
    Json(ProjectListResponse {
        count: projects.len(),
        projects,
    })
}

async fn project_summary_handler(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectSummary>, StatusCode> {
    known_project(&state, &project_id)?;
    Ok(Json(state.hub.get_project_summary(&project_id)))
}

#[derive(Deserialize)]
struct TimelineQuery {
    project_id: Option<String>,
}

async fn timeline_handler(
    State(state): State<SharedState>,
    Query(query): Query<TimelineQuery>,
) -> Json<TimelineExport> {
    Json(state.json.export_timeline(query.project_id.as_deref()))
}

#[derive(Serialize, Deserialize)]
struct ActiveExecutionsResponse {
    count: usize,
    executions: Vec<ExecutionView>,
}

async fn active_executions_handler(
    State(state): State<SharedState>,
) -> Json<ActiveExecutionsResponse> {
    let mut executions: Vec<ExecutionView> = state
        .tracker
        .get_active_executions()
        .values()
        .map(ExecutionView::from)
        .collect();
    executions.sort_by_key(|e| e.start_time);
    Json(ActiveExecutionsResponse {
        count: executions.len(),
        executions,
    })
}
