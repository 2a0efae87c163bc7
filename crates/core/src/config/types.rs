use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::controller::ControllerConfig;
use crate::dispatch::DispatcherConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub review: ReviewConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// State store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("patchwatch.db")
}

/// Available state store backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Review system configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewConfig {
    /// Review server URL (e.g., "https://review.example.com")
    pub url: String,
    /// Project whose changes are watched
    pub project: String,
    /// Target branch for presubmit
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// One entry of the CI job table
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct JobConfig {
    /// Job type, used in job ids and metric labels
    pub name: String,
    /// Environment handed to the worker
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Whether a failure of this job turns the vote negative
    #[serde(default = "default_affects_vote")]
    pub affects_vote: bool,
}

fn default_affects_vote() -> bool {
    true
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub review: SanitizedReviewConfig,
    pub controller: ControllerConfig,
    pub dispatcher: DispatcherConfig,
    pub jobs: Vec<JobConfig>,
}

/// Sanitized review config (credentials hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedReviewConfig {
    pub url: String,
    pub project: String,
    pub branch: String,
    pub timeout_secs: u64,
    pub credentials_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            store: config.store.clone(),
            review: SanitizedReviewConfig {
                url: config.review.url.clone(),
                project: config.review.project.clone(),
                branch: config.review.branch.clone(),
                timeout_secs: config.review.timeout_secs,
                credentials_configured: config.review.username.is_some(),
            },
            controller: config.controller.clone(),
            dispatcher: config.dispatcher.clone(),
            jobs: config.jobs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::CancelledVotePolicy;

    const MINIMAL: &str = r#"
[review]
url = "https://review.example.com"
project = "proj"
"#;

    #[test]
    fn test_deserialize_minimal_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.path.to_str().unwrap(), "patchwatch.db");
        assert_eq!(config.review.branch, "main");
        assert_eq!(config.review.timeout_secs, 30);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_deserialize_missing_review_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_job_table() {
        let toml = r#"
[review]
url = "https://review.example.com"
project = "proj"

[controller]
cancelled_vote_policy = "leave_unvoted"

[[jobs]]
name = "linux-x64"
env = { TARGET = "x86_64-unknown-linux-gnu" }

[[jobs]]
name = "docs"
affects_vote = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].env["TARGET"], "x86_64-unknown-linux-gnu");
        assert!(config.jobs[0].affects_vote);
        assert!(!config.jobs[1].affects_vote);
        assert_eq!(
            config.controller.cancelled_vote_policy,
            CancelledVotePolicy::LeaveUnvoted
        );
    }

    #[test]
    fn test_sanitized_config_hides_credentials() {
        let toml = r#"
[review]
url = "https://review.example.com"
project = "proj"
username = "ci-bot"
password = "hunter2"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.review.credentials_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("ci-bot"));
    }
}
