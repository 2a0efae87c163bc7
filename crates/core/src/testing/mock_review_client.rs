//! Mock review system client for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::review::{ChangeInfo, CommitInfo, ReviewClient, ReviewError, ReviewInput};

/// A review posted through the mock, for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedReview {
    pub change_id: String,
    pub revision_id: String,
    pub review: ReviewInput,
}

impl RecordedReview {
    pub fn score(&self) -> Option<i32> {
        self.review.score()
    }
}

/// Mock implementation of the ReviewClient trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable open changes, branch heads and commits
/// - Record posted reviews for assertions
/// - Simulate failures
#[derive(Debug)]
pub struct MockReviewClient {
    /// Changes returned by `list_open_changes`.
    changes: Arc<RwLock<Vec<ChangeInfo>>>,
    /// Branch name -> head revision.
    heads: Arc<RwLock<HashMap<String, String>>>,
    /// Revision -> commit info.
    commits: Arc<RwLock<HashMap<String, CommitInfo>>>,
    /// Posted reviews.
    reviews: Arc<RwLock<Vec<RecordedReview>>>,
    /// `since` of every change query.
    queries: Arc<RwLock<Vec<DateTime<Utc>>>>,
    /// If set, the next call will fail with this error.
    next_error: Arc<RwLock<Option<ReviewError>>>,
}

impl Default for MockReviewClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockReviewClient {
    pub fn new() -> Self {
        Self {
            changes: Arc::new(RwLock::new(Vec::new())),
            heads: Arc::new(RwLock::new(HashMap::new())),
            commits: Arc::new(RwLock::new(HashMap::new())),
            reviews: Arc::new(RwLock::new(Vec::new())),
            queries: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the open changes returned by subsequent queries.
    pub async fn set_changes(&self, changes: Vec<ChangeInfo>) {
        *self.changes.write().await = changes;
    }

    pub async fn add_change(&self, change: ChangeInfo) {
        self.changes.write().await.push(change);
    }

    pub async fn set_branch_head(&self, branch: &str, revision: &str) {
        self.heads
            .write()
            .await
            .insert(branch.to_string(), revision.to_string());
    }

    pub async fn set_commit(&self, revision: &str, commit: CommitInfo) {
        self.commits
            .write()
            .await
            .insert(revision.to_string(), commit);
    }

    /// Get posted reviews.
    pub async fn posted_reviews(&self) -> Vec<RecordedReview> {
        self.reviews.read().await.clone()
    }

    /// Get the `since` bound of every change query made.
    pub async fn recorded_queries(&self) -> Vec<DateTime<Utc>> {
        self.queries.read().await.clone()
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: ReviewError) {
        *self.next_error.write().await = Some(error);
    }

    /// Clear any pending error.
    pub async fn clear_next_error(&self) {
        *self.next_error.write().await = None;
    }

    async fn take_error(&self) -> Option<ReviewError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl ReviewClient for MockReviewClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_open_changes(
        &self,
        _project: &str,
        _branch: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChangeInfo>, ReviewError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        self.queries.write().await.push(since);
        Ok(self.changes.read().await.clone())
    }

    async fn branch_head(&self, _project: &str, branch: &str) -> Result<String, ReviewError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        self.heads
            .read()
            .await
            .get(branch)
            .cloned()
            .ok_or_else(|| ReviewError::NotFound(format!("branch {}", branch)))
    }

    async fn commit_info(
        &self,
        _project: &str,
        revision: &str,
    ) -> Result<CommitInfo, ReviewError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        self.commits
            .read()
            .await
            .get(revision)
            .cloned()
            .ok_or_else(|| ReviewError::NotFound(format!("commit {}", revision)))
    }

    async fn post_review(
        &self,
        change_id: &str,
        revision_id: &str,
        review: &ReviewInput,
    ) -> Result<(), ReviewError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        self.reviews.write().await.push(RecordedReview {
            change_id: change_id.to_string(),
            revision_id: revision_id.to_string(),
            review: review.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_records_reviews() {
        let client = MockReviewClient::new();
        client
            .post_review("I1", "abc", &ReviewInput::scored("ok", 1))
            .await
            .unwrap();

        let reviews = client.posted_reviews().await;
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].score(), Some(1));
    }

    #[tokio::test]
    async fn test_error_injection_is_one_shot() {
        let client = MockReviewClient::new();
        client.set_branch_head("main", "abc").await;
        client
            .set_next_error(ReviewError::ConnectionFailed("down".into()))
            .await;

        assert!(client.branch_head("proj", "main").await.is_err());
        assert_eq!(client.branch_head("proj", "main").await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_returns_configured_changes() {
        let client = MockReviewClient::new();
        client
            .add_change(fixtures::change_info(1, 1, "rev1", "dev@example.com"))
            .await;
        let changes = client
            .list_open_changes("proj", "main", Utc::now())
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(client.recorded_queries().await.len(), 1);
    }
}
