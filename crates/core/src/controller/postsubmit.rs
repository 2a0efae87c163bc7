//! Postsubmit queuing: fan out jobs for new branch heads.

use tracing::{debug, info};

use crate::dispatch::Task;
use crate::metrics::FANOUTS_TOTAL;
use crate::model::{paths, BranchRecord};
use crate::store::Patch;

use super::fanout::with_jobs;
use super::handler::Controller;
use super::types::{ControllerError, PostsubmitOutcome};

impl Controller {
    /// Queue postsubmit jobs for `branch` at `revision`.
    ///
    /// Without a revision the branch head is resolved first and the task is
    /// re-dispatched with it, so the commit lookup and fan-out retry on their
    /// own. The entry is keyed by commit time, so a head seen twice fans out
    /// once.
    pub async fn queue_postsubmit(
        &self,
        branch: &str,
        revision: Option<&str>,
    ) -> Result<PostsubmitOutcome, ControllerError> {
        if branch.trim().is_empty() {
            return Err(ControllerError::InvalidData(
                "postsubmit branch is empty".to_string(),
            ));
        }

        let Some(revision) = revision else {
            let head = self.review.branch_head(&self.project, branch).await?;
            debug!(branch, revision = %head, "Resolved branch head");
            self.dispatch(Task::QueuePostsubmit {
                branch: branch.to_string(),
                revision: Some(head.clone()),
            })
            .await?;
            return Ok(PostsubmitOutcome::Resolved { revision: head });
        };

        let commit = self.review.commit_info(&self.project, revision).await?;
        let commit_time = commit
            .committer
            .parsed_date()
            .map_err(|e| ControllerError::InvalidData(e.to_string()))?;

        let key = paths::branch_key(branch, commit_time);
        let path = format!("{}/{}", paths::BRANCHES, key);
        if self.store.get(&path).await?.is_some() {
            return Ok(PostsubmitOutcome::AlreadyQueued { key });
        }

        let now = self.clock.now();
        let jobs = self.new_jobs(&path, now);
        let record = BranchRecord {
            revision_id: revision.to_string(),
            author: commit.author.email.clone(),
            subject: commit.subject.clone(),
            time_queued: now,
            time_ended: None,
            jobs: jobs.keys().map(|id| (id.clone(), 0)).collect(),
        };

        let patch = with_jobs(Patch::new().set_json(&path, &record)?, &jobs)?;
        self.store.patch("", &patch).await?;

        FANOUTS_TOTAL.with_label_values(&["postsubmit"]).inc();
        info!(
            branch,
            revision,
            key = %key,
            jobs = jobs.len(),
            "Fanned out postsubmit"
        );
        Ok(PostsubmitOutcome::Created {
            key,
            jobs: jobs.len(),
        })
    }
}
