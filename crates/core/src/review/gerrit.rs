//! Gerrit REST backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::ReviewConfig;

use super::types::format_timestamp;
use super::{ChangeInfo, CommitInfo, ReviewClient, ReviewError, ReviewInput};

/// Gerrit prefixes every JSON body with this line to defeat XSSI.
const XSSI_PREFIX: &str = ")]}'";

#[derive(Debug, Deserialize)]
struct BranchInfo {
    revision: String,
}

/// Gerrit REST client.
pub struct GerritClient {
    client: Client,
    config: ReviewConfig,
}

impl GerritClient {
    pub fn new(config: ReviewConfig) -> Result<Self, ReviewError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReviewError::ConnectionFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn authenticated(&self) -> bool {
        self.config.username.is_some()
    }

    /// Build an endpoint URL. Authenticated requests go through `/a/`.
    fn url(&self, endpoint: &str) -> String {
        let base = self.config.url.trim_end_matches('/');
        if self.authenticated() {
            format!("{}/a/{}", base, endpoint)
        } else {
            format!("{}/{}", base, endpoint)
        }
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_deref()),
            None => request,
        }
    }

    fn changes_query(&self, project: &str, branch: &str, since: DateTime<Utc>) -> String {
        let query = format!(
            "status:open project:{} branch:{} after:\"{}\"",
            project,
            branch,
            format_timestamp(since)
        );
        format!(
            "changes/?q={}&o=CURRENT_REVISION&o=DETAILED_ACCOUNTS&o=DETAILED_LABELS",
            urlencoding::encode(&query)
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ReviewError> {
        let response = self.with_auth(request).send().await.map_err(map_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ReviewError::AuthenticationFailed(format!("HTTP {}: {}", status, body))
            }
            StatusCode::NOT_FOUND => ReviewError::NotFound(body),
            _ => ReviewError::ApiError(format!("HTTP {}: {}", status, body)),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ReviewError> {
        let url = self.url(endpoint);
        debug!(url = %url, "Gerrit request");
        let response = self.send(self.client.get(&url)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ReviewError::InvalidResponse(e.to_string()))?;
        parse_body(&body)
    }
}

fn map_transport(e: reqwest::Error) -> ReviewError {
    if e.is_timeout() {
        ReviewError::Timeout
    } else if e.is_connect() {
        ReviewError::ConnectionFailed(e.to_string())
    } else {
        ReviewError::ApiError(e.to_string())
    }
}

/// Strip the XSSI guard and decode.
fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ReviewError> {
    let json = body.trim_start().strip_prefix(XSSI_PREFIX).unwrap_or(body);
    serde_json::from_str(json)
        .map_err(|e| ReviewError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

#[async_trait]
impl ReviewClient for GerritClient {
    fn name(&self) -> &str {
        "gerrit"
    }

    async fn list_open_changes(
        &self,
        project: &str,
        branch: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChangeInfo>, ReviewError> {
        self.get_json(&self.changes_query(project, branch, since))
            .await
    }

    async fn branch_head(&self, project: &str, branch: &str) -> Result<String, ReviewError> {
        let endpoint = format!(
            "projects/{}/branches/{}",
            urlencoding::encode(project),
            urlencoding::encode(branch)
        );
        let info: BranchInfo = self.get_json(&endpoint).await?;
        Ok(info.revision)
    }

    async fn commit_info(
        &self,
        project: &str,
        revision: &str,
    ) -> Result<CommitInfo, ReviewError> {
        let endpoint = format!(
            "projects/{}/commits/{}",
            urlencoding::encode(project),
            urlencoding::encode(revision)
        );
        self.get_json(&endpoint).await
    }

    async fn post_review(
        &self,
        change_id: &str,
        revision_id: &str,
        review: &ReviewInput,
    ) -> Result<(), ReviewError> {
        let url = self.url(&format!(
            "changes/{}/revisions/{}/review",
            urlencoding::encode(change_id),
            urlencoding::encode(revision_id)
        ));
        debug!(url = %url, score = ?review.score(), "Posting review");
        self.send(self.client.post(&url).json(review)).await?;
        Ok(())
    }
}
