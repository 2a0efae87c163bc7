//! Controller configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound of `lookback_hours` (one year).
pub const MAX_LOOKBACK_HOURS: u64 = 24 * 366;

/// Upper bound of `log_retention_days` (ten years).
pub const MAX_LOG_RETENTION_DAYS: u64 = 3660;

/// Upper bound of every `*_secs` interval and timeout (thirty days).
pub const MAX_INTERVAL_SECS: u64 = 30 * 24 * 3600;

/// What to do with a change whose comment was posted without a score
/// because one of its jobs was cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledVotePolicy {
    /// Mark the change voted; it never receives a score.
    #[default]
    MarkVoted,
    /// Leave the change unvoted; a later reconcile posts again.
    LeaveUnvoted,
}

/// Branches that get postsubmit runs on every new head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsubmitConfig {
    #[serde(default)]
    pub branches: Vec<String>,

    /// How often the runner re-queues postsubmit for each branch (seconds).
    #[serde(default = "default_head_poll_interval")]
    pub head_poll_interval_secs: u64,
}

/// Configuration for the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// How often the intake poller runs (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Only changes modified within this window are considered.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,

    /// A job started longer than twice this is reaped.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// A change pending longer than this has its jobs cancelled.
    #[serde(default = "default_change_timeout")]
    pub change_timeout_secs: u64,

    #[serde(default = "default_log_retention")]
    pub log_retention_days: u64,

    /// How often the reapers run (seconds).
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,

    /// Post reviews (comment and score) for changes that want a vote.
    #[serde(default)]
    pub voting_enabled: bool,

    /// Regex matched against uploader and label-voter identities.
    #[serde(default = "default_trusted_accounts")]
    pub trusted_accounts: String,

    /// Label a trusted account applies to request a run and a vote.
    #[serde(default = "default_ready_label")]
    pub ready_label: String,

    #[serde(default)]
    pub artifact_base_url: Option<String>,

    #[serde(default)]
    pub ci_page_url: Option<String>,

    #[serde(default)]
    pub cancelled_vote_policy: CancelledVotePolicy,

    #[serde(default)]
    pub postsubmit: PostsubmitConfig,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_lookback_hours() -> u64 {
    24
}

fn default_job_timeout() -> u64 {
    3600 // 1 hour
}

fn default_change_timeout() -> u64 {
    3 * 3600
}

fn default_log_retention() -> u64 {
    30
}

fn default_reap_interval() -> u64 {
    300
}

fn default_head_poll_interval() -> u64 {
    300
}

fn default_trusted_accounts() -> String {
    // Matches nothing until configured.
    "$^".to_string()
}

fn default_ready_label() -> String {
    "Presubmit-Ready".to_string()
}

impl Default for PostsubmitConfig {
    fn default() -> Self {
        Self {
            branches: Vec::new(),
            head_poll_interval_secs: default_head_poll_interval(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            lookback_hours: default_lookback_hours(),
            job_timeout_secs: default_job_timeout(),
            change_timeout_secs: default_change_timeout(),
            log_retention_days: default_log_retention(),
            reap_interval_secs: default_reap_interval(),
            voting_enabled: false,
            trusted_accounts: default_trusted_accounts(),
            ready_label: default_ready_label(),
            artifact_base_url: None,
            ci_page_url: None,
            cancelled_vote_policy: CancelledVotePolicy::default(),
            postsubmit: PostsubmitConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Reject durations large enough to overflow time arithmetic.
    pub fn check_bounds(&self) -> Result<(), String> {
        if self.lookback_hours > MAX_LOOKBACK_HOURS {
            return Err(format!(
                "controller.lookback_hours must be at most {}",
                MAX_LOOKBACK_HOURS
            ));
        }
        if self.log_retention_days > MAX_LOG_RETENTION_DAYS {
            return Err(format!(
                "controller.log_retention_days must be at most {}",
                MAX_LOG_RETENTION_DAYS
            ));
        }
        for (name, secs) in [
            ("controller.poll_interval_secs", self.poll_interval_secs),
            ("controller.job_timeout_secs", self.job_timeout_secs),
            ("controller.change_timeout_secs", self.change_timeout_secs),
            ("controller.reap_interval_secs", self.reap_interval_secs),
            (
                "controller.postsubmit.head_poll_interval_secs",
                self.postsubmit.head_poll_interval_secs,
            ),
        ] {
            if secs > MAX_INTERVAL_SECS {
                return Err(format!("{} must be at most {}", name, MAX_INTERVAL_SECS));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours as i64)
    }

    pub fn job_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.job_timeout_secs as i64)
    }

    pub fn change_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.change_timeout_secs as i64)
    }

    pub fn log_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.log_retention_days as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.lookback_hours, 24);
        assert_eq!(config.change_timeout_secs, 10800);
        assert!(!config.voting_enabled);
        assert_eq!(config.ready_label, "Presubmit-Ready");
        assert_eq!(config.cancelled_vote_policy, CancelledVotePolicy::MarkVoted);
        assert!(config.postsubmit.branches.is_empty());
        assert_eq!(config.postsubmit.head_poll_interval_secs, 300);
        assert!(config.check_bounds().is_ok());
    }

    #[test]
    fn test_check_bounds_rejects_overflowing_durations() {
        let config = ControllerConfig {
            lookback_hours: u64::MAX,
            ..Default::default()
        };
        assert!(config.check_bounds().unwrap_err().contains("lookback_hours"));

        let config = ControllerConfig {
            log_retention_days: MAX_LOG_RETENTION_DAYS + 1,
            ..Default::default()
        };
        assert!(config
            .check_bounds()
            .unwrap_err()
            .contains("log_retention_days"));

        let config = ControllerConfig {
            job_timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert!(config.check_bounds().unwrap_err().contains("job_timeout_secs"));

        let config = ControllerConfig {
            lookback_hours: MAX_LOOKBACK_HOURS,
            log_retention_days: MAX_LOG_RETENTION_DAYS,
            ..Default::default()
        };
        assert!(config.check_bounds().is_ok());
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            poll_interval_secs = 30
            job_timeout_secs = 600
            voting_enabled = true
            trusted_accounts = ".*@example\\.com"
            artifact_base_url = "https://artifacts.example.com"
            cancelled_vote_policy = "leave_unvoted"

            [postsubmit]
            branches = ["main", "release/1.x"]
        "#;
        let config: ControllerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.job_timeout(), chrono::Duration::minutes(10));
        assert!(config.voting_enabled);
        assert_eq!(
            config.cancelled_vote_policy,
            CancelledVotePolicy::LeaveUnvoted
        );
        assert_eq!(config.postsubmit.branches, vec!["main", "release/1.x"]);
        assert_eq!(config.postsubmit.head_poll_interval_secs, 300);
    }
}
