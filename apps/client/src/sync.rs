//! Profile sync coordinator.
//!
//! Works on snapshots of the local profile and returns what the caller has to
//! apply, so it never holds on to application state across a network call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use wenbun_core::sync::{conflict_info, decide_for, entries_after, latest_review_time};
use wenbun_core::{
    Clock, ProfileData, ProfileInfo, ReviewLogEntry, SyncConflictInfo, SyncDecision, UploadMode,
};

use crate::api::SyncApi;
use crate::error::SyncError;

type Result<T> = std::result::Result<T, SyncError>;

/// Session-level sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SyncState {
    NotLoggedIn,
    Idle,
    Syncing,
    /// Both sides changed; waits for a forced pull or push.
    Conflict { info: SyncConflictInfo },
}

/// How pulled review logs combine with the local history.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewLogUpdate {
    Append(Vec<ReviewLogEntry>),
    Replace(Vec<ReviewLogEntry>),
}

/// What a finished sync round asks the application to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    NotLoggedIn,
    Unchanged,
    Pushed {
        synced_at: DateTime<Utc>,
        /// Modification time of the uploaded snapshot.
        pushed_modified_at: DateTime<Utc>,
    },
    Pulled {
        profile: ProfileData,
        review_logs: ReviewLogUpdate,
        synced_at: DateTime<Utc>,
    },
    Conflict(SyncConflictInfo),
}

impl SyncOutcome {
    pub fn decision(&self) -> SyncDecision {
        match self {
            Self::NotLoggedIn | Self::Unchanged => SyncDecision::None,
            Self::Pushed { .. } => SyncDecision::Push,
            Self::Pulled { .. } => SyncDecision::Pull,
            Self::Conflict(_) => SyncDecision::Conflict,
        }
    }
}

/// Result of a background sync, as shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Completed(SyncOutcome),
    Failed { error: String },
}

pub struct SyncCoordinator {
    api: Arc<dyn SyncApi>,
    clock: Arc<dyn Clock>,
    state: Mutex<SyncState>,
    profile_info: Mutex<Option<ProfileInfo>>,
}

impl SyncCoordinator {
    pub fn new(api: Arc<dyn SyncApi>, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            clock,
            state: Mutex::new(SyncState::NotLoggedIn),
            profile_info: Mutex::new(None),
        }
    }

    /// Fetch the remote identity.
    pub async fn init(&self) -> bool {
        let info = match self.api.profile_info().await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("profile lookup failed: {}", e);
                None
            }
        };
        let logged_in = info.is_some();
        *self.profile_info.lock().await = info;
        *self.state.lock().await = if logged_in {
            SyncState::Idle
        } else {
            SyncState::NotLoggedIn
        };
        logged_in
    }

    pub async fn state(&self) -> SyncState {
        self.state.lock().await.clone()
    }

    pub async fn profile_info(&self) -> Option<ProfileInfo> {
        self.profile_info.lock().await.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        !matches!(*self.state.lock().await, SyncState::NotLoggedIn)
    }

    pub async fn login(&self, token: String) -> bool {
        self.api.set_token(Some(token));
        self.init().await
    }

    pub async fn logout(&self) {
        self.api.set_token(None);
        *self.profile_info.lock().await = None;
        *self.state.lock().await = SyncState::NotLoggedIn;
    }

    /// Regular sync round.
    ///
    /// `local` must carry the full review history. On error the state is
    /// left as it was so the next round retries cleanly.
    pub async fn try_sync(
        &self,
        local: &ProfileData,
        last_sync_time: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        let Some(previous) = self.begin().await? else {
            return Ok(SyncOutcome::NotLoggedIn);
        };
        let result = self.sync_round(local, last_sync_time).await;
        self.finish(previous, &result).await;
        result
    }

    /// Adopt the remote snapshot and history after backing up the local one.
    pub async fn force_pull(&self, local: &ProfileData) -> Result<SyncOutcome> {
        let Some(previous) = self.begin().await? else {
            return Err(SyncError::NotAuthenticated);
        };
        let result = self.force_pull_round(local).await;
        self.finish(previous, &result).await;
        result
    }

    /// Overwrite the remote snapshot and history with the local ones.
    pub async fn force_push(&self, local: &ProfileData) -> Result<SyncOutcome> {
        let Some(previous) = self.begin().await? else {
            return Err(SyncError::NotAuthenticated);
        };
        let result = self.force_push_round(local).await;
        self.finish(previous, &result).await;
        result
    }

    /// Enter `Syncing`, returning the state to restore on failure.
    /// `None` when not logged in.
    async fn begin(&self) -> Result<Option<SyncState>> {
        let mut state = self.state.lock().await;
        match &*state {
            SyncState::NotLoggedIn => Ok(None),
            SyncState::Syncing => Err(SyncError::AlreadyInProgress),
            _ => Ok(Some(std::mem::replace(&mut *state, SyncState::Syncing))),
        }
    }

    async fn finish(&self, previous: SyncState, result: &Result<SyncOutcome>) {
        let next = match result {
            Ok(SyncOutcome::Conflict(info)) => SyncState::Conflict { info: *info },
            Ok(_) => SyncState::Idle,
            Err(SyncError::NotAuthenticated) => SyncState::NotLoggedIn,
            Err(e) => {
                tracing::error!("sync failed: {}", e);
                previous
            }
        };
        *self.state.lock().await = next;
    }

    async fn sync_round(
        &self,
        local: &ProfileData,
        last_sync_time: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        let (remote, latest_remote_log) =
            tokio::try_join!(self.api.get_profile_data(), self.api.latest_review_log())?;
        let snapshot = local.export(false);

        let Some(remote) = remote else {
            // First sync from this account
            tracing::info!("No remote profile, uploading local profile");
            let (_, pushed) = tokio::try_join!(
                self.api.update_profile_data(&snapshot, UploadMode::Normal),
                self.api.push_review_logs(&local.review_logs, true),
            )?;
            tracing::info!("Uploaded {} review log entries", pushed);
            return Ok(self.pushed(&snapshot));
        };

        let decision = decide_for(&snapshot, &remote, last_sync_time);
        tracing::info!("Sync decision: {:?}", decision);

        match decision {
            SyncDecision::None => Ok(SyncOutcome::Unchanged),
            SyncDecision::Conflict => Ok(SyncOutcome::Conflict(conflict_info(
                &snapshot,
                &remote,
                last_sync_time,
            ))),
            SyncDecision::Push => {
                let cutover = latest_remote_log.as_ref().map(ReviewLogEntry::reviewed_at);
                let newer = entries_after(&local.review_logs, cutover);
                let (_, pushed) = tokio::try_join!(
                    self.api.update_profile_data(&snapshot, UploadMode::Normal),
                    self.api.push_review_logs(newer, false),
                )?;
                tracing::info!("Pushed profile and {} review log entries", pushed);
                Ok(self.pushed(&snapshot))
            }
            SyncDecision::Pull => {
                remote.validate()?;
                let from = latest_review_time(&local.review_logs);
                let pulled = self.api.review_logs_since(from).await?;
                tracing::info!("Pulled profile and {} review log entries", pulled.len());
                Ok(SyncOutcome::Pulled {
                    profile: remote,
                    review_logs: ReviewLogUpdate::Append(pulled),
                    synced_at: self.clock.now(),
                })
            }
        }
    }

    async fn force_pull_round(&self, local: &ProfileData) -> Result<SyncOutcome> {
        let remote = self
            .api
            .get_profile_data()
            .await?
            .ok_or(SyncError::NoRemoteProfile)?;
        remote.validate()?;

        let snapshot = local.export(false);
        let (_, history) = tokio::try_join!(
            self.api.update_profile_data(&snapshot, UploadMode::Pull),
            self.api.review_logs_since(None),
        )?;
        tracing::info!(
            "Force pulled profile and {} review log entries",
            history.len()
        );
        Ok(SyncOutcome::Pulled {
            profile: remote,
            review_logs: ReviewLogUpdate::Replace(history),
            synced_at: self.clock.now(),
        })
    }

    async fn force_push_round(&self, local: &ProfileData) -> Result<SyncOutcome> {
        let snapshot = local.export(false);
        let (_, pushed) = tokio::try_join!(
            self.api.update_profile_data(&snapshot, UploadMode::Push),
            self.api.push_review_logs(&local.review_logs, true),
        )?;
        tracing::info!("Force pushed profile and {} review log entries", pushed);
        Ok(self.pushed(&snapshot))
    }

    fn pushed(&self, snapshot: &ProfileData) -> SyncOutcome {
        SyncOutcome::Pushed {
            synced_at: self.clock.now(),
            pushed_modified_at: snapshot.meta.modified_at_or_epoch(),
        }
    }
}

/// Outcome of a background round, tagged with the local revision it started from.
#[derive(Debug)]
pub struct SyncReport {
    pub revision: u64,
    pub status: SyncStatus,
}

/// Fire-and-forget sync rounds whose results come back through a queue.
pub struct BackgroundSync {
    coordinator: Arc<SyncCoordinator>,
    tx: mpsc::UnboundedSender<SyncReport>,
    rx: mpsc::UnboundedReceiver<SyncReport>,
}

impl BackgroundSync {
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            coordinator,
            tx,
            rx,
        }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    /// Start a round on a snapshot. Errors are logged and reported, never returned.
    pub fn spawn(&self, snapshot: ProfileData, last_sync_time: DateTime<Utc>, revision: u64) {
        let coordinator = Arc::clone(&self.coordinator);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let status = match coordinator.try_sync(&snapshot, last_sync_time).await {
                Ok(outcome) => SyncStatus::Completed(outcome),
                Err(e) => {
                    tracing::error!("background sync failed: {}", e);
                    SyncStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            // The receiver is gone once the application is dropped
            let _ = tx.send(SyncReport { revision, status });
        });
    }

    /// Reports that have arrived so far.
    pub fn drain(&mut self) -> Vec<SyncReport> {
        let mut reports = Vec::new();
        while let Ok(report) = self.rx.try_recv() {
            reports.push(report);
        }
        reports
    }

    /// Wait for the next report.
    pub async fn next_report(&mut self) -> Option<SyncReport> {
        self.rx.recv().await
    }
}
