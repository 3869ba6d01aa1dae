//! Pure sync rules shared by the client and the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::ProfileData;
use crate::types::ReviewLogEntry;

/// What a sync round should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDecision {
    Push,
    Pull,
    None,
    Conflict,
}

/// How the server should treat an uploaded profile snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Regular push after a sync decision.
    #[default]
    Normal,
    /// Local snapshot sent as a backup before a forced pull.
    Pull,
    /// Forced overwrite of the remote snapshot.
    Push,
}

impl UploadMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Pull => "pull",
            Self::Push => "push",
        }
    }
}

/// Identity of the signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Timestamps behind a conflict, for the user to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflictInfo {
    pub local_modified_at: DateTime<Utc>,
    pub remote_modified_at: DateTime<Utc>,
    pub last_sync_time: DateTime<Utc>,
}

/// Decide from modification times relative to the last successful sync.
pub fn decide(
    local_modified_at: DateTime<Utc>,
    remote_modified_at: DateTime<Utc>,
    last_sync_time: DateTime<Utc>,
) -> SyncDecision {
    let local_modified = local_modified_at > last_sync_time;
    let remote_modified = remote_modified_at > last_sync_time;
    match (local_modified, remote_modified) {
        (true, true) => SyncDecision::Conflict,
        (true, false) => SyncDecision::Push,
        (false, true) => SyncDecision::Pull,
        (false, false) => SyncDecision::None,
    }
}

/// Decide for two snapshots. Identical content never transfers.
pub fn decide_for(
    local: &ProfileData,
    remote: &ProfileData,
    last_sync_time: DateTime<Utc>,
) -> SyncDecision {
    if local.same_content(remote) {
        return SyncDecision::None;
    }
    decide(
        local.meta.modified_at_or_epoch(),
        remote.meta.modified_at_or_epoch(),
        last_sync_time,
    )
}

pub fn conflict_info(
    local: &ProfileData,
    remote: &ProfileData,
    last_sync_time: DateTime<Utc>,
) -> SyncConflictInfo {
    SyncConflictInfo {
        local_modified_at: local.meta.modified_at_or_epoch(),
        remote_modified_at: remote.meta.modified_at_or_epoch(),
        last_sync_time,
    }
}

/// Entries newer than `cutover`.
///
/// Scans from the end for the newest entry at or before the cutover and
/// returns everything after it. With no cutover the whole slice is returned.
pub fn entries_after(
    logs: &[ReviewLogEntry],
    cutover: Option<DateTime<Utc>>,
) -> &[ReviewLogEntry] {
    let Some(cutover) = cutover else {
        return logs;
    };
    match logs.iter().rposition(|entry| entry.reviewed_at() <= cutover) {
        Some(index) => &logs[index + 1..],
        None => logs,
    }
}

pub fn latest_review_time(logs: &[ReviewLogEntry]) -> Option<DateTime<Utc>> {
    logs.last().map(ReviewLogEntry::reviewed_at)
}
