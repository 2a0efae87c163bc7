//! Intake poller: periodic sweep scheduling and change discovery.

use tracing::{debug, info};

use crate::dispatch::{EnqueueOptions, IntakeRequest, Task};
use crate::review::ChangeInfo;

use super::handler::Controller;
use super::types::{ControllerError, PollOutcome};

impl Controller {
    /// Schedule the next poll and dispatch this round's sweeps.
    ///
    /// Polls closer together than `poll_interval - 1s` are skipped. The
    /// last-poll timestamp lives in this process only, so the de-dup is
    /// best-effort; every sweep is idempotent anyway.
    pub async fn poll(&self) -> Result<PollOutcome, ControllerError> {
        let now = self.clock.now();
        let interval = self.config.poll_interval();
        let window = chrono::Duration::seconds(interval.as_secs() as i64 - 1);

        let last = *self
            .last_poll
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(last) = last {
            if now - last < window {
                debug!(last_poll = %last, "Skipping poll, previous one is recent");
                return Ok(PollOutcome::Skipped);
            }
        }

        self.dispatcher
            .enqueue(Task::Poll, EnqueueOptions::new().with_delay(interval))
            .await?;
        self.dispatch_all([Task::ScanChanges, Task::ScanPending, Task::EmitQueueMetrics])
            .await?;

        *self
            .last_poll
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(now);
        Ok(PollOutcome::Dispatched)
    }

    /// Find eligible revisions of recently modified open changes and
    /// dispatch an intake for each. Returns the number dispatched.
    pub async fn scan_changes(&self) -> Result<usize, ControllerError> {
        let since = self.clock.now() - self.config.lookback();
        let changes = self
            .review
            .list_open_changes(&self.project, &self.branch, since)
            .await?;

        let mut requests = Vec::new();
        for change in &changes {
            requests.extend(self.eligible_revisions(change));
        }

        info!(
            changes = changes.len(),
            eligible = requests.len(),
            "Scanned open changes"
        );
        self.dispatch_all(requests.into_iter().map(Task::Intake))
            .await
    }

    /// Whether a trusted account applied the ready label with a positive value.
    fn ready_by_trusted(&self, change: &ChangeInfo) -> bool {
        change
            .labels
            .get(&self.config.ready_label)
            .is_some_and(|label| {
                label.all.iter().any(|approval| {
                    approval.value.unwrap_or(0) > 0 && self.is_trusted(approval.account.identity())
                })
            })
    }

    fn eligible_revisions(&self, change: &ChangeInfo) -> Vec<IntakeRequest> {
        let wants_vote = self.ready_by_trusted(change);

        let mut revisions: Vec<_> = change.revisions.iter().collect();
        revisions.sort_by_key(|(_, info)| info.number);

        revisions
            .into_iter()
            .filter(|(revision, info)| {
                let eligible = wants_vote || self.is_trusted(info.uploader.identity());
                if !eligible {
                    debug!(
                        change = change.number,
                        patchset = info.number,
                        revision = %revision,
                        "Skipping revision from untrusted uploader"
                    );
                }
                eligible
            })
            .map(|(revision, info)| IntakeRequest {
                change: change.number,
                patchset: info.number,
                change_id: change.id.clone(),
                revision: revision.clone(),
                ref_name: info.ref_name.clone(),
                uploader: info.uploader.identity().map(String::from),
                wants_vote,
            })
            .collect()
    }
}
