//! HTTP trigger surface
//!
//! `POST /` (and `POST /run`) starts a batch in the background and answers
//! as soon as it has started. The batch outcome is only visible in logs and
//! metrics.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::task::TaskTracker;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn, Level};

use crate::context::PipelineContext;
use crate::error::AppError;

/// Shared state of the trigger server
#[derive(Clone)]
pub struct AppState {
    pipeline: Result<Arc<PipelineContext>, Arc<str>>,
    batches: TaskTracker,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn ready(pipeline: Arc<PipelineContext>) -> Self {
        Self {
            pipeline: Ok(pipeline),
            batches: TaskTracker::new(),
            metrics: None,
        }
    }

    /// State for a process whose startup initialisation failed
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            pipeline: Err(Arc::from(reason.into())),
            batches: TaskTracker::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn batches(&self) -> &TaskTracker {
        &self.batches
    }

    pub fn pipeline(&self) -> Option<&Arc<PipelineContext>> {
        self.pipeline.as_ref().ok()
    }

    /// Wait up to `timeout` for running batches, then close the pipeline's
    /// clients. New triggers are refused from the moment this is called.
    pub async fn drain(&self, timeout: Duration) {
        self.batches.close();
        info!(in_flight = self.batches.len(), "Waiting for running batches");
        if tokio::time::timeout(timeout, self.batches.wait()).await.is_err() {
            warn!(
                in_flight = self.batches.len(),
                "Batches still running after {:?}, closing clients anyway",
                timeout
            );
        }
        if let Some(pipeline) = self.pipeline() {
            pipeline.shutdown().await;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TriggerRequest {
    subreddits: Option<String>,
    limit: Option<i64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(trigger))
        .route("/run", post(trigger))
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(tower_http::LatencyUnit::Micros),
                ),
        )
}

async fn trigger(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let pipeline = match &state.pipeline {
        Ok(pipeline) => Arc::clone(pipeline),
        Err(reason) => return Err(AppError::NotInitialized(reason.to_string())),
    };

    let request: TriggerRequest = if body.iter().all(u8::is_ascii_whitespace) {
        TriggerRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?
    };

    let batch = pipeline.resolve_request(request.subreddits.as_deref(), request.limit)?;

    if state.batches.is_closed() {
        return Err(AppError::Internal("Server is shutting down".to_string()));
    }

    info!(collections = ?batch.collections, limit = batch.limit, "Batch triggered");

    let response = json!({
        "status": "started",
        "subreddits": batch.collections,
        "limit": batch.limit,
    });

    state.batches.spawn(async move {
        pipeline.run_batch(&batch).await;
    });

    Ok((StatusCode::OK, Json(response)).into_response())
}

async fn health_check(State(state): State<AppState>) -> Response {
    match &state.pipeline {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "running_batches": state.batches.len(),
            })),
        )
            .into_response(),
        Err(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "reason": reason.to_string(),
            })),
        )
            .into_response(),
    }
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Resolves on Ctrl-C or SIGTERM. The server then stops accepting
/// connections; running batches are left to [`AppState::drain`].
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!(signal = received, "Shutdown requested, no longer accepting triggers");
}
