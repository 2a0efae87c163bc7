//! Types for the code-review system.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label used to post the presubmit score.
pub const CODE_REVIEW_LABEL: &str = "Code-Review";

/// Timestamp format used by the review system (`2026-10-18 12:34:56.000000000`).
const REVIEW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Errors that can occur talking to the review system.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout")]
    Timeout,
}

/// An account as reported with detailed accounts enabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "_account_id", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl AccountInfo {
    /// The identity matched against the trusted-account pattern.
    pub fn identity(&self) -> Option<&str> {
        self.email.as_deref().or(self.username.as_deref())
    }
}

/// One vote on a label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalInfo {
    #[serde(flatten)]
    pub account: AccountInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
}

/// Detailed label state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelInfo {
    #[serde(default)]
    pub all: Vec<ApprovalInfo>,
}

/// One patchset of a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionInfo {
    #[serde(rename = "_number")]
    pub number: u32,
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub uploader: AccountInfo,
}

/// An open change with its revisions and labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeInfo {
    /// Triplet id (`project~branch~Change-Id`), accepted when posting reviews.
    pub id: String,
    #[serde(rename = "_number")]
    pub number: u64,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub revisions: HashMap<String, RevisionInfo>,
    #[serde(default)]
    pub labels: HashMap<String, LabelInfo>,
}

/// Author or committer of a commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitPerson {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub date: String,
}

impl GitPerson {
    /// Parse the review system's UTC timestamp.
    pub fn parsed_date(&self) -> Result<DateTime<Utc>, ReviewError> {
        parse_timestamp(&self.date)
    }
}

/// Commit metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    #[serde(default)]
    pub subject: String,
    pub author: GitPerson,
    pub committer: GitPerson,
}

/// Body of a review post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewInput {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, i32>>,
}

impl ReviewInput {
    /// Comment-only review.
    pub fn comment(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            labels: None,
        }
    }

    /// Comment plus a `Code-Review` score.
    pub fn scored(message: impl Into<String>, score: i32) -> Self {
        Self {
            message: message.into(),
            labels: Some(BTreeMap::from([(CODE_REVIEW_LABEL.to_string(), score)])),
        }
    }

    pub fn score(&self) -> Option<i32> {
        self.labels
            .as_ref()
            .and_then(|labels| labels.get(CODE_REVIEW_LABEL).copied())
    }
}

/// Parse a review-system timestamp (always UTC, nanosecond fraction).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ReviewError> {
    NaiveDateTime::parse_from_str(raw, REVIEW_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ReviewError::InvalidResponse(format!("bad timestamp {:?}: {}", raw, e)))
}

/// Format a timestamp for use in a change query (`after:"..."`).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Trait for code-review system backends.
#[async_trait]
pub trait ReviewClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Open changes on `project`/`branch` updated after `since`, with current
    /// revision, detailed accounts and detailed labels.
    async fn list_open_changes(
        &self,
        project: &str,
        branch: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChangeInfo>, ReviewError>;

    /// Current head revision of `branch`.
    async fn branch_head(&self, project: &str, branch: &str) -> Result<String, ReviewError>;

    /// Metadata of `revision`.
    async fn commit_info(&self, project: &str, revision: &str)
        -> Result<CommitInfo, ReviewError>;

    /// Post a comment (and optionally a score) on a revision.
    async fn post_review(
        &self,
        change_id: &str,
        revision_id: &str,
        review: &ReviewInput,
    ) -> Result<(), ReviewError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp() {
        let parsed = parse_timestamp("2026-10-18 12:34:56.000000000").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 10, 18, 12, 34, 56).unwrap());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_change_info_deserialize() {
        let json = serde_json::json!({
            "id": "proj~main~I0123",
            "_number": 100,
            "project": "proj",
            "branch": "main",
            "revisions": {
                "abc123": {
                    "_number": 2,
                    "ref": "refs/changes/00/100/2",
                    "uploader": {"_account_id": 7, "email": "dev@example.com"}
                }
            },
            "labels": {
                "Presubmit-Ready": {
                    "all": [{"_account_id": 9, "email": "lead@example.com", "value": 1}]
                }
            }
        });
        let change: ChangeInfo = serde_json::from_value(json).unwrap();
        assert_eq!(change.number, 100);
        let rev = &change.revisions["abc123"];
        assert_eq!(rev.number, 2);
        assert_eq!(rev.uploader.identity(), Some("dev@example.com"));
        let approval = &change.labels["Presubmit-Ready"].all[0];
        assert_eq!(approval.value, Some(1));
        assert_eq!(approval.account.email.as_deref(), Some("lead@example.com"));
    }

    #[test]
    fn test_review_input_serialization() {
        let comment = serde_json::to_value(ReviewInput::comment("hi")).unwrap();
        assert!(comment.get("labels").is_none());

        let scored = ReviewInput::scored("bad", -1);
        assert_eq!(scored.score(), Some(-1));
        let value = serde_json::to_value(&scored).unwrap();
        assert_eq!(value["labels"]["Code-Review"], -1);
    }
}
