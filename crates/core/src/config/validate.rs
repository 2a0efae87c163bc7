use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Review URL and project are set
/// - Job names are non-empty, unique and usable inside a job id
/// - Trusted-account pattern compiles
/// - Intervals and timeouts are longer than a second
/// - Lookback, retention, intervals and timeouts fit in time arithmetic
/// - Dispatcher backoff is ordered
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.review.url.trim().is_empty() {
        return Err(invalid("review.url cannot be empty"));
    }
    if config.review.project.trim().is_empty() {
        return Err(invalid("review.project cannot be empty"));
    }

    let mut seen = HashSet::new();
    for job in &config.jobs {
        if job.name.trim().is_empty() {
            return Err(invalid("jobs.name cannot be empty"));
        }
        if job.name.contains('/') || job.name.contains("--") {
            return Err(invalid(format!(
                "jobs.name {:?} cannot contain '/' or '--'",
                job.name
            )));
        }
        if !seen.insert(job.name.as_str()) {
            return Err(invalid(format!("duplicate job name {:?}", job.name)));
        }
    }

    let controller = &config.controller;
    regex_lite::Regex::new(&controller.trusted_accounts).map_err(|e| {
        invalid(format!("controller.trusted_accounts is not a valid regex: {}", e))
    })?;

    for (name, secs) in [
        ("controller.poll_interval_secs", controller.poll_interval_secs),
        ("controller.job_timeout_secs", controller.job_timeout_secs),
        ("controller.change_timeout_secs", controller.change_timeout_secs),
        ("controller.reap_interval_secs", controller.reap_interval_secs),
        (
            "controller.postsubmit.head_poll_interval_secs",
            controller.postsubmit.head_poll_interval_secs,
        ),
    ] {
        if secs <= 1 {
            return Err(invalid(format!("{} must be greater than 1", name)));
        }
    }
    controller.check_bounds().map_err(invalid)?;
    if controller.ready_label.trim().is_empty() {
        return Err(invalid("controller.ready_label cannot be empty"));
    }

    let dispatcher = &config.dispatcher;
    if dispatcher.max_attempts == 0 {
        return Err(invalid("dispatcher.max_attempts cannot be 0"));
    }
    if dispatcher.initial_backoff_ms == 0
        || dispatcher.initial_backoff_ms > dispatcher.max_backoff_ms
    {
        return Err(invalid(
            "dispatcher.initial_backoff_ms must be non-zero and at most max_backoff_ms",
        ));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_from_str, JobConfig};

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[review]
url = "https://review.example.com"
project = "proj"

[controller]
trusted_accounts = ".*@example\\.com"

[[jobs]]
name = "linux-x64"

[[jobs]]
name = "docs"
affects_vote = false
"#,
        )
        .unwrap()
    }

    fn job(name: &str) -> JobConfig {
        JobConfig {
            name: name.to_string(),
            env: Default::default(),
            affects_vote: true,
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base_config();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_duplicate_job_fails() {
        let mut config = base_config();
        config.jobs.push(job("linux-x64"));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_bad_job_names_fail() {
        for name in ["", "linux/x64", "a--b"] {
            let mut config = base_config();
            config.jobs.push(job(name));
            assert!(validate_config(&config).is_err(), "{:?} accepted", name);
        }
    }

    #[test]
    fn test_validate_bad_regex_fails() {
        let mut config = base_config();
        config.controller.trusted_accounts = "(unclosed".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_short_interval_fails() {
        let mut config = base_config();
        config.controller.poll_interval_secs = 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_huge_windows_fail() {
        let mut config = base_config();
        config.controller.lookback_hours = u64::MAX;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(msg)) if msg.contains("lookback_hours")
        ));

        let mut config = base_config();
        config.controller.log_retention_days = u64::MAX;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(msg)) if msg.contains("log_retention_days")
        ));

        let mut config = base_config();
        config.controller.change_timeout_secs = u64::MAX;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_backoff_ordering() {
        let mut config = base_config();
        config.dispatcher.initial_backoff_ms = 10_000;
        config.dispatcher.max_backoff_ms = 1_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_job_table_is_allowed() {
        let mut config = base_config();
        config.jobs.clear();
        assert!(validate_config(&config).is_ok());
    }
}
