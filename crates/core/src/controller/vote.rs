//! Vote aggregation: one review per finished change.

use serde_json::Value;
use tracing::info;

use crate::config::JobConfig;
use crate::metrics::VOTES_TOTAL;
use crate::model::{paths, split_job_id, ChangeKey, ChangeRecord, JobRecord, JobStatus};
use crate::review::ReviewInput;
use crate::store::Patch;

use super::config::{CancelledVotePolicy, ControllerConfig};
use super::handler::Controller;
use super::types::{ControllerError, VoteOutcome};

/// Status shown for a job whose record is gone.
const MISSING_STATUS: &str = "MISSING";

/// One job line of a review comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLine {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
}

/// Jobs of a change grouped for voting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteSummary {
    pub passed: Vec<JobLine>,
    /// Failures of jobs that affect the vote.
    pub failed: Vec<JobLine>,
    /// Failures of jobs that opted out of voting.
    pub non_voting: Vec<JobLine>,
    pub cancelled: bool,
}

impl VoteSummary {
    /// Group jobs by outcome. Jobs missing from the job table vote.
    pub fn classify(jobs: &[(String, Option<JobRecord>)], table: &[JobConfig]) -> Self {
        let mut summary = Self::default();
        for (job_id, job) in jobs {
            let (job_type, status) = match job {
                Some(job) => (job.job_type.clone(), Some(job.status)),
                None => (
                    split_job_id(job_id)
                        .map(|(_, _, job_type)| job_type.to_string())
                        .unwrap_or_default(),
                    None,
                ),
            };
            let line = JobLine {
                job_id: job_id.clone(),
                job_type: job_type.clone(),
                status: status.map_or(MISSING_STATUS, |s| s.as_str()).to_string(),
            };

            if status == Some(JobStatus::Cancelled) {
                summary.cancelled = true;
            }
            if status == Some(JobStatus::Completed) {
                summary.passed.push(line);
                continue;
            }
            let affects_vote = table
                .iter()
                .find(|entry| entry.name == job_type)
                .map_or(true, |entry| entry.affects_vote);
            if affects_vote {
                summary.failed.push(line);
            } else {
                summary.non_voting.push(line);
            }
        }
        summary
    }

    /// `None` when a job was cancelled, otherwise -1 on any voting failure.
    pub fn score(&self) -> Option<i32> {
        if self.cancelled {
            None
        } else if self.failed.is_empty() {
            Some(1)
        } else {
            Some(-1)
        }
    }

    /// Render the review comment.
    pub fn comment(&self, config: &ControllerConfig) -> String {
        let mut out = String::new();
        out.push_str(match self.score() {
            Some(1) => "Presubmit passed.",
            Some(_) => "Presubmit failed.",
            None => "Presubmit incomplete: some jobs were cancelled, so no score is given.",
        });
        out.push('\n');

        let sections = [
            ("Failed jobs", &self.failed),
            ("Failed non-voting jobs", &self.non_voting),
            ("Passed jobs", &self.passed),
        ];
        for (title, lines) in sections {
            if lines.is_empty() {
                continue;
            }
            out.push_str(&format!("\n{}:\n", title));
            for line in lines {
                out.push_str(&format!("- {} ({})", line.job_type, line.status));
                if let Some(base) = &config.artifact_base_url {
                    out.push_str(&format!(
                        " {}/{}/",
                        base.trim_end_matches('/'),
                        line.job_id
                    ));
                }
                out.push('\n');
            }
        }

        if let Some(url) = &config.ci_page_url {
            out.push_str(&format!("\nCI results: {}\n", url));
        }
        out
    }
}

impl Controller {
    /// Post the aggregated review for a finished change, at most once.
    ///
    /// `voted` is written last, together with the removal of the pending
    /// marker, so a failure anywhere before it retries the whole vote on the
    /// next sweep; a crash between posting and marking can post twice.
    pub async fn vote(&self, key: ChangeKey) -> Result<VoteOutcome, ControllerError> {
        let Some(record) = self.read::<ChangeRecord>(&paths::change(key)).await? else {
            return Ok(VoteOutcome::Missing);
        };
        if record.is_voted() {
            return Ok(VoteOutcome::AlreadyVoted);
        }
        if !self.owes_vote(&record) {
            return Ok(VoteOutcome::NotWanted);
        }

        let jobs = self.load_jobs(record.job_ids()).await?;
        let summary = VoteSummary::classify(&jobs, &self.jobs);
        let score = summary.score();
        let message = summary.comment(&self.config);
        let review = match score {
            Some(score) => ReviewInput::scored(message, score),
            None => ReviewInput::comment(message),
        };

        self.review
            .post_review(&record.change_id, &record.revision_id, &review)
            .await?;
        VOTES_TOTAL
            .with_label_values(&[match score {
                Some(1) => "+1",
                Some(_) => "-1",
                None => "none",
            }])
            .inc();
        info!(
            change = %key,
            score = ?score,
            failed = summary.failed.len(),
            cancelled = summary.cancelled,
            "Posted review"
        );

        let mark = score.is_some()
            || self.config.cancelled_vote_policy == CancelledVotePolicy::MarkVoted;
        let mut patch = Patch::new();
        if mark {
            patch = patch.set(paths::change_field(key, "voted"), Value::Bool(true));
        }
        if record.time_ended.is_some() {
            patch = patch.delete(paths::pending_change(key));
        }
        if !patch.is_empty() {
            self.store.patch("", &patch).await?;
        }
        Ok(VoteOutcome::Posted { score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job(job_type: &str, status: JobStatus) -> JobRecord {
        let mut job = JobRecord::queued("cls/1-1", job_type, Default::default(), Utc::now());
        job.status = status;
        job
    }

    fn table() -> Vec<JobConfig> {
        vec![
            JobConfig {
                name: "linux".to_string(),
                env: Default::default(),
                affects_vote: true,
            },
            JobConfig {
                name: "docs".to_string(),
                env: Default::default(),
                affects_vote: false,
            },
        ]
    }

    #[test]
    fn test_all_passed_scores_plus_one() {
        let jobs = vec![("a".to_string(), Some(job("linux", JobStatus::Completed)))];
        let summary = VoteSummary::classify(&jobs, &table());
        assert_eq!(summary.score(), Some(1));
    }

    #[test]
    fn test_non_voting_failure_keeps_plus_one() {
        let jobs = vec![
            ("a".to_string(), Some(job("linux", JobStatus::Completed))),
            ("b".to_string(), Some(job("docs", JobStatus::Failed))),
        ];
        let summary = VoteSummary::classify(&jobs, &table());
        assert_eq!(summary.score(), Some(1));
        assert_eq!(summary.non_voting.len(), 1);
        assert!(summary
            .comment(&ControllerConfig::default())
            .contains("Failed non-voting jobs:\n- docs (FAILED)"));
    }

    #[test]
    fn test_voting_failure_scores_minus_one() {
        let jobs = vec![("a".to_string(), Some(job("linux", JobStatus::Failed)))];
        let summary = VoteSummary::classify(&jobs, &table());
        assert_eq!(summary.score(), Some(-1));
    }

    #[test]
    fn test_cancelled_suppresses_score() {
        let jobs = vec![
            ("a".to_string(), Some(job("linux", JobStatus::Cancelled))),
            ("b".to_string(), Some(job("docs", JobStatus::Completed))),
        ];
        let summary = VoteSummary::classify(&jobs, &table());
        assert!(summary.cancelled);
        assert_eq!(summary.score(), None);
        assert_eq!(summary.failed[0].status, "CANCELLED");
    }

    #[test]
    fn test_missing_job_counts_as_failure() {
        let jobs = vec![("2026-01-01-000000-000--cls_1-1--linux".to_string(), None)];
        let summary = VoteSummary::classify(&jobs, &table());
        assert_eq!(summary.failed[0].job_type, "linux");
        assert_eq!(summary.failed[0].status, "MISSING");
        assert_eq!(summary.score(), Some(-1));
    }

    #[test]
    fn test_comment_links() {
        let jobs = vec![("job-1".to_string(), Some(job("linux", JobStatus::Failed)))];
        let summary = VoteSummary::classify(&jobs, &table());
        let config = ControllerConfig {
            artifact_base_url: Some("https://artifacts.example.com/".to_string()),
            ci_page_url: Some("https://ci.example.com".to_string()),
            ..Default::default()
        };
        let comment = summary.comment(&config);
        assert!(comment.starts_with("Presubmit failed."));
        assert!(comment.contains("- linux (FAILED) https://artifacts.example.com/job-1/"));
        assert!(comment.ends_with("CI results: https://ci.example.com\n"));
    }
}
