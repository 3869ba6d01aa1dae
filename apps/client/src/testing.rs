//! In-process `SyncApi` backed by a mutex, for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use wenbun_core::sync::entries_after;
use wenbun_core::{ProfileData, ProfileInfo, ReviewLogEntry, UploadMode};

use crate::api::SyncApi;
use crate::error::SyncError;

type Result<T> = std::result::Result<T, SyncError>;

#[derive(Default)]
pub(crate) struct Remote {
    pub signed_in: bool,
    pub offline: bool,
    pub profile: Option<ProfileData>,
    pub logs: Vec<ReviewLogEntry>,
    pub uploads: Vec<UploadMode>,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    remote: Mutex<Remote>,
}

impl FakeApi {
    pub fn signed_in(profile: Option<ProfileData>, logs: Vec<ReviewLogEntry>) -> Arc<Self> {
        Arc::new(Self {
            remote: Mutex::new(Remote {
                signed_in: true,
                profile,
                logs,
                ..Remote::default()
            }),
        })
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut Remote) -> T) -> T {
        f(&mut self.remote.lock().unwrap())
    }

    fn online(&self) -> Result<()> {
        if self.with(|r| r.offline) {
            return Err(SyncError::Network("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncApi for FakeApi {
    async fn profile_info(&self) -> Result<Option<ProfileInfo>> {
        self.online()?;
        Ok(self.with(|r| {
            r.signed_in.then(|| ProfileInfo {
                id: "1".to_string(),
                email: "learner@example.com".to_string(),
                name: "Learner".to_string(),
            })
        }))
    }

    async fn get_profile_data(&self) -> Result<Option<ProfileData>> {
        self.online()?;
        Ok(self.with(|r| r.profile.clone()))
    }

    async fn update_profile_data(&self, profile: &ProfileData, mode: UploadMode) -> Result<()> {
        self.online()?;
        self.with(|r| {
            r.uploads.push(mode);
            if mode != UploadMode::Pull {
                r.profile = Some(profile.clone());
            }
        });
        Ok(())
    }

    async fn latest_review_log(&self) -> Result<Option<ReviewLogEntry>> {
        self.online()?;
        Ok(self.with(|r| r.logs.last().cloned()))
    }

    async fn push_review_logs(&self, entries: &[ReviewLogEntry], force: bool) -> Result<usize> {
        self.online()?;
        self.with(|r| {
            if force {
                r.logs = entries.to_vec();
            } else {
                r.logs.extend_from_slice(entries);
            }
        });
        Ok(entries.len())
    }

    async fn review_logs_since(&self, from: Option<DateTime<Utc>>) -> Result<Vec<ReviewLogEntry>> {
        self.online()?;
        Ok(self.with(|r| entries_after(&r.logs, from).to_vec()))
    }

    fn set_token(&self, token: Option<String>) {
        self.with(|r| r.signed_in = token.is_some());
    }
}
