//! Supersession: cancel the jobs of patchsets a newer one replaced.

use tracing::info;

use crate::dispatch::Task;
use crate::model::{paths, ChangeKey, ChangeRecord};
use crate::store::{decode, KeyFilter};

use super::handler::Controller;
use super::types::ControllerError;

impl Controller {
    /// Dispatch `cancel` for every job of an unfinished earlier patchset of
    /// the same change. Returns the number of cancels dispatched.
    pub async fn supersede(&self, key: ChangeKey) -> Result<usize, ControllerError> {
        let entries = self
            .store
            .list(
                paths::CHANGES,
                &KeyFilter::new().with_prefix(format!("{}-", key.change)),
            )
            .await?;

        let mut cancels = Vec::new();
        for (entry_key, value) in entries {
            let Some(older) = ChangeKey::parse(&entry_key) else {
                continue;
            };
            if older.change != key.change || older.patchset >= key.patchset {
                continue;
            }
            let path = format!("{}/{}", paths::CHANGES, entry_key);
            let Some(record) = decode::<ChangeRecord>(&path, Some(value))? else {
                continue;
            };
            if record.time_ended.is_some() {
                continue;
            }
            info!(superseded = %older, by = %key, jobs = record.jobs.len(), "Superseding patchset");
            cancels.extend(record.job_ids().map(|id| Task::cancel(id)));
        }

        self.dispatch_all(cancels).await
    }
}
