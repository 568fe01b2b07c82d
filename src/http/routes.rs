use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::core::{Job, JobStatus};
use crate::dispatch::{JobDispatcher, SubmitOptions};
use crate::error::{DispatchError, Result};
use crate::tasks::ADD_TOGETHER;

pub type AppState = Arc<JobDispatcher>;

#[derive(Debug, Deserialize)]
pub struct AddQuery {
    pub a: Option<String>,
    pub b: Option<String>,
}

/// Public view of a job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub operation: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            status: job.status(),
            result: job.result().cloned(),
            error: job.error().map(str::to_string),
            id: job.id,
            operation: job.operation,
        }
    }
}

/// Create the router for the dispatch API
pub fn create_router(dispatcher: AppState) -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/add", get(add))
        .route("/jobs/:id", get(get_job))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

async fn hello() -> &'static str {
    "hello world"
}

/// Enqueue `add_together(a, b)` and answer with the job handle
async fn add(
    Query(params): Query<AddQuery>,
    State(dispatcher): State<AppState>,
) -> Result<String> {
    let a = parse_operand("a", params.a.as_deref())?;
    let b = parse_operand("b", params.b.as_deref())?;

    // The handle is only useful if the sum is kept.
    let handle = dispatcher
        .submit_with(ADD_TOGETHER, (a, b), SubmitOptions::new().ignore_result(false))
        .await?;

    Ok(format!("result:{}", handle))
}

async fn get_job(
    Path(job_id): Path<String>,
    State(dispatcher): State<AppState>,
) -> Result<Json<JobView>> {
    let job = dispatcher.get_status(&job_id).await?;
    Ok(Json(JobView::from(job)))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn parse_operand(name: &str, raw: Option<&str>) -> Result<f64> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DispatchError::invalid_argument(format!("missing parameter '{}'", name)))?;

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(DispatchError::invalid_argument(format!(
            "parameter '{}' must be a finite number, got '{}'",
            name, raw
        ))),
    }
}
