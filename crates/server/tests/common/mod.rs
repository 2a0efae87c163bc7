//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! over a controller with mock collaborators, so the HTTP surface can be
//! exercised without a review server or CI workers.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use patchwatch_core::testing::{
    start_time, ManualClock, MockMetricsSink, MockReviewClient, MockWorker, RecordingDispatcher,
};
use patchwatch_core::{Config, Controller, ControllerDeps, MemoryStateStore};
use patchwatch_server::state::AppState;

/// Re-export fixtures for test convenience
pub use patchwatch_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_run_task() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/tasks/run", json!({
///         "action": "scan_pending"
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub controller: Arc<Controller>,
    pub store: Arc<MemoryStateStore>,
    /// Mock review system - configure changes, record posted reviews
    pub review: Arc<MockReviewClient>,
    /// Dispatcher behind `POST /tasks`; pump it to run what was enqueued
    pub dispatcher: Arc<RecordingDispatcher>,
    /// Simulated CI worker over the same store
    pub worker: MockWorker,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with the default test config.
    pub fn new() -> Self {
        Self::with_config(fixtures::config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStateStore::new());
        let review = Arc::new(MockReviewClient::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let clock = Arc::new(ManualClock::new(start_time()));

        let controller = Arc::new(
            Controller::new(
                &config,
                ControllerDeps {
                    store: store.clone(),
                    review: review.clone(),
                    dispatcher: dispatcher.clone(),
                    metrics: Arc::new(MockMetricsSink::new()),
                    clock: clock.clone(),
                },
            )
            .expect("Failed to create controller"),
        );
        let worker = MockWorker::new(store.clone(), clock);

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&controller),
            dispatcher.clone(),
            None,
        ));
        let router = patchwatch_server::api::create_router(state);

        Self {
            router,
            controller,
            store,
            review,
            dispatcher,
            worker,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
