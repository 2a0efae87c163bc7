//! Change (presubmit) and branch (postsubmit) records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A change revision under test, stored at `cls/{change}-{patchset}`.
///
/// Immutable once written except for `time_ended`, `wants_vote` (false to
/// true only) and `voted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Review-system change id used when posting reviews.
    pub change_id: String,
    /// Revision (commit) hash of the patchset.
    pub revision_id: String,
    pub time_queued: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ended: Option<DateTime<Utc>>,
    #[serde(default)]
    pub wants_vote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voted: Option<bool>,
    /// Job ids of this change; the values are always 0.
    #[serde(default)]
    pub jobs: BTreeMap<String, u8>,
}

impl ChangeRecord {
    pub fn is_voted(&self) -> bool {
        self.voted.unwrap_or(false)
    }

    pub fn job_ids(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }
}

/// A branch head under postsubmit test, stored at
/// `branches/{branch}-{commit_time}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub revision_id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subject: String,
    pub time_queued: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ended: Option<DateTime<Utc>>,
    #[serde(default)]
    pub jobs: BTreeMap<String, u8>,
}

/// Identity of a change revision: `(change number, patchset number)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeKey {
    pub change: u64,
    pub patchset: u32,
}

impl ChangeKey {
    pub fn new(change: u64, patchset: u32) -> Self {
        Self { change, patchset }
    }

    /// Parse a `{change}-{patchset}` store key.
    pub fn parse(key: &str) -> Option<Self> {
        let (change, patchset) = key.split_once('-')?;
        Some(Self {
            change: change.parse().ok()?,
            patchset: patchset.parse().ok()?,
        })
    }
}

impl std::fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.change, self.patchset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_change_key_roundtrip() {
        let key = ChangeKey::new(100, 3);
        assert_eq!(key.to_string(), "100-3");
        assert_eq!(ChangeKey::parse("100-3"), Some(key));
    }

    #[test]
    fn test_change_key_rejects_garbage() {
        assert_eq!(ChangeKey::parse("100"), None);
        assert_eq!(ChangeKey::parse("abc-1"), None);
        assert_eq!(ChangeKey::parse("100-x"), None);
        assert_eq!(ChangeKey::parse("100-1-2"), None);
    }

    #[test]
    fn test_change_record_defaults() {
        let json = serde_json::json!({
            "change_id": "I123",
            "revision_id": "abc",
            "time_queued": "2026-01-01T00:00:00Z",
        });
        let record: ChangeRecord = serde_json::from_value(json).unwrap();
        assert!(!record.wants_vote);
        assert!(!record.is_voted());
        assert!(record.jobs.is_empty());
        assert_eq!(
            record.time_queued,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
    }
}
