//! Account records and API types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export shared wire types from wenbun-core
pub use wenbun_core::{ProfileData, ProfileInfo, ReviewLogEntry, UploadMode};

// === Store Entity Types ===

/// One registered account and everything synced to it
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub token: String,
    pub email: String,
    pub name: String,
    pub profile: Option<ProfileData>,
    /// Snapshots replaced by a later upload or sent ahead of a forced pull
    pub backups: Vec<ProfileBackup>,
    pub review_logs: Vec<ReviewLogEntry>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Account {
    pub fn info(&self) -> ProfileInfo {
        ProfileInfo {
            id: self.id.to_string(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileBackup {
    pub mode: UploadMode,
    pub profile: ProfileData,
    pub stored_at: DateTime<Utc>,
}

// === API Request/Response Types ===

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DeviceRegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceRegisterResponse {
    pub token: String,
    pub profile: ProfileInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileDataQuery {
    pub decision: Option<UploadMode>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewLogPushQuery {
    pub force: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewLogPushResponse {
    pub synced_count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewLogQuery {
    pub from: Option<DateTime<Utc>>,
}
