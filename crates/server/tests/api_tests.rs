//! HTTP API tests against an in-process router with mock collaborators.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, TestFixture};
use patchwatch_core::model::JobStatus;
use patchwatch_core::review::ReviewError;
use patchwatch_core::Task;

// =============================================================================
// Health and config
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["runner"]["running"], false);
}

#[tokio::test]
async fn test_config_hides_credentials() {
    let mut config = fixtures::config();
    config.review.username = Some("ci-bot".to_string());
    config.review.password = Some("hunter2".to_string());
    let fixture = TestFixture::with_config(config);

    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["review"]["credentials_configured"], true);
    assert_eq!(response.body["review"]["project"], "platform/widgets");
    assert!(!response.body.to_string().contains("hunter2"));
    assert_eq!(response.body["jobs"].as_array().map(Vec::len), Some(3));
}

// =============================================================================
// Tasks
// =============================================================================

#[tokio::test]
async fn test_enqueue_task() {
    let fixture = TestFixture::new();
    let response = fixture
        .post(
            "/api/v1/tasks",
            json!({ "action": "reconcile", "change": 12, "patchset": 3 }),
        )
        .await;

    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["action"], "reconcile");
    assert_eq!(response.body["status"], "queued");
    assert_eq!(
        fixture.dispatcher.queued().await,
        vec![Task::Reconcile {
            change: 12,
            patchset: 3
        }]
    );
}

#[tokio::test]
async fn test_enqueue_unknown_action_is_rejected() {
    let fixture = TestFixture::new();
    let response = fixture
        .post("/api/v1/tasks", json!({ "action": "launch_rockets" }))
        .await;

    assert!(response.status.is_client_error());
    assert!(fixture.dispatcher.queued().await.is_empty());
}

#[tokio::test]
async fn test_run_task_inline() {
    let fixture = TestFixture::new();
    fixture
        .review
        .set_changes(vec![fixtures::ready_change(5, 1, "rev-5", "dev@example.com")])
        .await;

    let response = fixture
        .post("/api/v1/tasks/run", json!({ "action": "scan_changes" }))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");

    // scan_changes only dispatches; the intake runs when the queue is pumped.
    fixture.dispatcher.pump(&fixture.controller).await.unwrap();

    let change = fixture.get("/api/v1/changes/5/1").await;
    assert_status!(change, StatusCode::OK);
    assert_eq!(change.body["revision_id"], "rev-5");
    assert_eq!(change.body["wants_vote"], true);
    assert_eq!(change.body["jobs"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_run_task_failure_is_server_error() {
    let fixture = TestFixture::new();
    fixture
        .review
        .set_next_error(ReviewError::ConnectionFailed("down".into()))
        .await;

    let response = fixture
        .post("/api/v1/tasks/run", json!({ "action": "scan_changes" }))
        .await;

    assert_status!(response, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["action"], "scan_changes");
    assert!(response.body["error"]
        .as_str()
        .is_some_and(|e| e.contains("down")));
}

#[tokio::test]
async fn test_queue_postsubmit() {
    let fixture = TestFixture::new();
    let response = fixture
        .post_empty("/api/v1/postsubmit/release-2?revision=abc123")
        .await;

    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["action"], "queue_postsubmit");
    assert_eq!(
        fixture.dispatcher.queued().await,
        vec![Task::QueuePostsubmit {
            branch: "release-2".to_string(),
            revision: Some("abc123".to_string()),
        }]
    );
}

#[tokio::test]
async fn test_queue_postsubmit_without_revision() {
    let fixture = TestFixture::new();
    let response = fixture.post_empty("/api/v1/postsubmit/main").await;

    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(
        fixture.dispatcher.queued().await,
        vec![Task::QueuePostsubmit {
            branch: "main".to_string(),
            revision: None,
        }]
    );
}

// =============================================================================
// Changes
// =============================================================================

#[tokio::test]
async fn test_get_missing_change() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/changes/404/1").await;

    assert_status!(response, StatusCode::NOT_FOUND);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_get_change_reports_job_statuses() {
    let fixture = TestFixture::new();
    fixture
        .review
        .set_changes(vec![fixtures::change_info(8, 2, "rev-8", "dev@example.com")])
        .await;
    fixture.controller.handle(Task::ScanChanges).await.unwrap();
    fixture.dispatcher.pump(&fixture.controller).await.unwrap();

    let ids = fixture.worker.queued_jobs().await.unwrap();
    fixture.worker.run(&ids[0], JobStatus::Failed).await.unwrap();

    let response = fixture.get("/api/v1/changes/8/2").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["wants_vote"], false);
    assert_eq!(response.body["voted"], false);
    let jobs = response.body["jobs"].as_array().cloned().unwrap_or_default();
    assert_eq!(jobs.len(), 3);
    let failed: Vec<_> = jobs.iter().filter(|j| j["status"] == "FAILED").collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["id"], ids[0].as_str());
}

// =============================================================================
// Metrics
// =============================================================================

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("patchwatch_http_requests_total"));
    assert!(body.contains("patchwatch_runner_running"));
}
