//! Testing utilities and mock implementations.
//!
//! Mock implementations of every collaborator the controller talks to, so
//! whole change lifecycles can run without a review server or CI workers.
//!
//! # Example
//!
//! ```rust,ignore
//! use patchwatch_core::testing::{fixtures, TestHarness};
//!
//! let h = TestHarness::new(fixtures::config());
//! h.review.add_change(fixtures::change_info(1, 1, "rev1", "dev@example.com")).await;
//! h.sweep().await?;
//! for id in h.worker.queued_jobs().await? {
//!     h.worker.run(&id, JobStatus::Completed).await?;
//! }
//! ```

mod harness;
mod manual_clock;
mod mock_metrics_sink;
mod mock_review_client;
mod mock_worker;
mod recording_dispatcher;

pub use harness::{start_time, TestHarness};
pub use manual_clock::ManualClock;
pub use mock_metrics_sink::MockMetricsSink;
pub use mock_review_client::{MockReviewClient, RecordedReview};
pub use mock_worker::MockWorker;
pub use recording_dispatcher::RecordingDispatcher;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::{BTreeMap, HashMap};

    use chrono::{DateTime, Utc};

    use crate::config::{Config, JobConfig, ReviewConfig};
    use crate::controller::ControllerConfig;
    use crate::review::{
        format_timestamp, AccountInfo, ApprovalInfo, ChangeInfo, CommitInfo, GitPerson,
        LabelInfo, RevisionInfo,
    };

    /// Pattern trusting every `@example.com` account.
    pub const TRUSTED: &str = r"^[^@]+@example\.com$";

    /// Job table used by most tests: two voting jobs and one non-voting.
    pub fn job_table() -> Vec<JobConfig> {
        vec![
            job("linux-x64", true),
            job("mac-arm64", true),
            job("lint", false),
        ]
    }

    pub fn job(name: &str, affects_vote: bool) -> JobConfig {
        let mut env = BTreeMap::new();
        env.insert("JOB_TYPE".to_string(), name.to_string());
        JobConfig {
            name: name.to_string(),
            env,
            affects_vote,
        }
    }

    /// Config with voting on, the default job table and [`TRUSTED`].
    pub fn config() -> Config {
        config_with_jobs(job_table())
    }

    pub fn config_with_jobs(jobs: Vec<JobConfig>) -> Config {
        Config {
            server: Default::default(),
            store: Default::default(),
            review: ReviewConfig {
                url: "https://review.example.com".to_string(),
                project: "platform/widgets".to_string(),
                branch: "main".to_string(),
                timeout_secs: 30,
                username: None,
                password: None,
            },
            controller: ControllerConfig {
                voting_enabled: true,
                trusted_accounts: TRUSTED.to_string(),
                artifact_base_url: Some("https://ci.example.com/logs".to_string()),
                ci_page_url: Some("https://ci.example.com".to_string()),
                ..Default::default()
            },
            dispatcher: Default::default(),
            jobs,
        }
    }

    pub fn account(email: &str) -> AccountInfo {
        AccountInfo {
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    /// Open change with a single revision uploaded by `uploader_email`.
    pub fn change_info(
        number: u64,
        patchset: u32,
        revision: &str,
        uploader_email: &str,
    ) -> ChangeInfo {
        let mut revisions = HashMap::new();
        revisions.insert(
            revision.to_string(),
            RevisionInfo {
                number: patchset,
                ref_name: format!("refs/changes/{:02}/{}/{}", number % 100, number, patchset),
                uploader: account(uploader_email),
            },
        );
        ChangeInfo {
            id: format!("platform%2Fwidgets~main~I{:040x}", number),
            number,
            project: "platform/widgets".to_string(),
            branch: "main".to_string(),
            revisions,
            labels: HashMap::new(),
        }
    }

    /// Add another revision to a change.
    pub fn with_revision(
        mut change: ChangeInfo,
        patchset: u32,
        revision: &str,
        uploader_email: &str,
    ) -> ChangeInfo {
        change.revisions.insert(
            revision.to_string(),
            RevisionInfo {
                number: patchset,
                ref_name: format!(
                    "refs/changes/{:02}/{}/{}",
                    change.number % 100,
                    change.number,
                    patchset
                ),
                uploader: account(uploader_email),
            },
        );
        change
    }

    /// Apply `label` with `value` from `voter_email`.
    pub fn with_label(
        mut change: ChangeInfo,
        label: &str,
        voter_email: &str,
        value: i32,
    ) -> ChangeInfo {
        change
            .labels
            .entry(label.to_string())
            .or_insert_with(LabelInfo::default)
            .all
            .push(ApprovalInfo {
                account: account(voter_email),
                value: Some(value),
            });
        change
    }

    /// Change marked ready by a trusted reviewer.
    pub fn ready_change(
        number: u64,
        patchset: u32,
        revision: &str,
        uploader_email: &str,
    ) -> ChangeInfo {
        with_label(
            change_info(number, patchset, revision, uploader_email),
            "Presubmit-Ready",
            "reviewer@example.com",
            1,
        )
    }

    pub fn commit_info(subject: &str, author_email: &str, date: DateTime<Utc>) -> CommitInfo {
        let person = GitPerson {
            name: "Dev".to_string(),
            email: author_email.to_string(),
            date: format_timestamp(date),
        };
        CommitInfo {
            subject: subject.to_string(),
            author: person.clone(),
            committer: person,
        }
    }
}
