//! Task API handlers.
//!
//! `POST /tasks` enqueues on the in-process dispatcher. `POST /tasks/run`
//! executes inline and answers non-2xx on failure, so an external push
//! queue delivering to it retries with its own backoff.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use patchwatch_core::{EnqueueOptions, Task};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for task operations
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub action: String,
    pub status: String,
}

impl TaskResponse {
    fn new(task: &Task, status: &str) -> Self {
        Self {
            action: task.name().to_string(),
            status: status.to_string(),
        }
    }
}

/// Query parameters for queueing a postsubmit run
#[derive(Debug, Deserialize)]
pub struct PostsubmitParams {
    /// Commit to test; the branch head when absent
    pub revision: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct TaskErrorResponse {
    pub action: String,
    pub error: String,
}

type TaskResult = Result<(StatusCode, Json<TaskResponse>), (StatusCode, Json<TaskErrorResponse>)>;

// ============================================================================
// Handlers
// ============================================================================

/// Enqueue a task
pub async fn enqueue_task(
    State(state): State<Arc<AppState>>,
    Json(task): Json<Task>,
) -> TaskResult {
    enqueue(&state, task).await
}

/// Execute a task inline
pub async fn run_task(State(state): State<Arc<AppState>>, Json(task): Json<Task>) -> TaskResult {
    let response = TaskResponse::new(&task, "ok");
    match state.controller().handle(task).await {
        Ok(()) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            warn!(action = %response.action, error = %e, "Inline task failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TaskErrorResponse {
                    action: response.action,
                    error: e.to_string(),
                }),
            ))
        }
    }
}

/// Queue postsubmit jobs for a branch
pub async fn queue_postsubmit(
    State(state): State<Arc<AppState>>,
    Path(branch): Path<String>,
    Query(params): Query<PostsubmitParams>,
) -> TaskResult {
    if branch.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(TaskErrorResponse {
                action: "queue_postsubmit".to_string(),
                error: "branch must not be empty".to_string(),
            }),
        ));
    }
    enqueue(
        &state,
        Task::QueuePostsubmit {
            branch,
            revision: params.revision,
        },
    )
    .await
}

async fn enqueue(state: &AppState, task: Task) -> TaskResult {
    let response = TaskResponse::new(&task, "queued");
    match state.dispatcher().enqueue(task, EnqueueOptions::new()).await {
        Ok(()) => Ok((StatusCode::ACCEPTED, Json(response))),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(TaskErrorResponse {
                action: response.action,
                error: e.to_string(),
            }),
        )),
    }
}
