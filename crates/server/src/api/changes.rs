//! Change status API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use patchwatch_core::model::{paths, ChangeKey, ChangeRecord, JobRecord, JobStatus};
use patchwatch_core::store::{decode, StoreError};

use crate::state::AppState;

/// Response for a change and its jobs
#[derive(Debug, Serialize)]
pub struct ChangeResponse {
    pub change: u64,
    pub patchset: u32,
    pub change_id: String,
    pub revision_id: String,
    pub time_queued: DateTime<Utc>,
    pub time_ended: Option<DateTime<Utc>>,
    pub wants_vote: bool,
    pub voted: bool,
    pub jobs: Vec<JobSummary>,
}

/// One job of a change. `status` is null when the record is gone.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub job_type: Option<String>,
    pub status: Option<JobStatus>,
    pub time_started: Option<DateTime<Utc>>,
    pub time_ended: Option<DateTime<Utc>>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ChangeErrorResponse {
    pub error: String,
}

/// Get a change revision and the status of its jobs
pub async fn get_change(
    State(state): State<Arc<AppState>>,
    Path((change, patchset)): Path<(u64, u32)>,
) -> Result<Json<ChangeResponse>, impl IntoResponse> {
    let key = ChangeKey::new(change, patchset);
    match load_change(&state, key).await {
        Ok(Some(response)) => Ok(Json(response)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ChangeErrorResponse {
                error: format!("Change not found: {}", key),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ChangeErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

async fn load_change(
    state: &AppState,
    key: ChangeKey,
) -> Result<Option<ChangeResponse>, StoreError> {
    let store = state.controller().store();
    let path = paths::change(key);
    let Some(record) = decode::<ChangeRecord>(&path, store.get(&path).await?)? else {
        return Ok(None);
    };

    let mut jobs = Vec::with_capacity(record.jobs.len());
    for id in record.job_ids() {
        let job_path = paths::job(id);
        let job = decode::<JobRecord>(&job_path, store.get(&job_path).await?)?;
        jobs.push(JobSummary {
            id: id.to_string(),
            job_type: job.as_ref().map(|job| job.job_type.clone()),
            status: job.as_ref().map(|job| job.status),
            time_started: job.as_ref().and_then(|job| job.time_started),
            time_ended: job.as_ref().and_then(|job| job.time_ended),
        });
    }

    Ok(Some(ChangeResponse {
        change: key.change,
        patchset: key.patchset,
        voted: record.is_voted(),
        change_id: record.change_id,
        revision_id: record.revision_id,
        time_queued: record.time_queued,
        time_ended: record.time_ended,
        wants_vote: record.wants_vote,
        jobs,
    }))
}
