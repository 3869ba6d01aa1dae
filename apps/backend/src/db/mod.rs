//! In-memory account store

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;
use wenbun_core::sync::{entries_after, latest_review_time};

use crate::error::{ApiError, Result};
use crate::models::*;

/// Oldest backups are dropped past this many per account
pub const MAX_BACKUPS: usize = 10;

#[derive(Default)]
struct Accounts {
    by_id: HashMap<Uuid, Account>,
    tokens: HashMap<String, Uuid>,
}

/// Account store shared by every request
#[derive(Default)]
pub struct Database {
    inner: RwLock<Accounts>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    // === Account Repository ===

    /// Create a new account with a generated token
    pub async fn create_account(&self, name: Option<&str>, email: Option<&str>) -> Account {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let account = Account {
            id,
            token: Uuid::new_v4().to_string(),
            email: email.unwrap_or_default().to_string(),
            name: name.unwrap_or("WenBun learner").to_string(),
            profile: None,
            backups: Vec::new(),
            review_logs: Vec::new(),
            created_at: now,
            last_seen_at: now,
        };

        let mut accounts = self.inner.write().await;
        accounts.tokens.insert(account.token.clone(), id);
        accounts.by_id.insert(id, account.clone());
        account
    }

    /// Get account by token
    pub async fn get_account_by_token(&self, token: &str) -> Option<Account> {
        let accounts = self.inner.read().await;
        let id = accounts.tokens.get(token)?;
        accounts.by_id.get(id).cloned()
    }

    pub async fn update_last_seen(&self, account_id: Uuid) -> Result<()> {
        self.with_account(account_id, |account| {
            account.last_seen_at = Utc::now();
        })
        .await
    }

    // === Profile Repository ===

    pub async fn get_profile(&self, account_id: Uuid) -> Result<Option<ProfileData>> {
        let accounts = self.inner.read().await;
        let account = accounts
            .by_id
            .get(&account_id)
            .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;
        Ok(account.profile.clone())
    }

    /// Store an uploaded snapshot.
    ///
    /// A `Pull` upload is only kept as a backup. Any other mode replaces the
    /// live snapshot and backs up the one it replaced.
    pub async fn store_profile(
        &self,
        account_id: Uuid,
        profile: ProfileData,
        mode: UploadMode,
    ) -> Result<()> {
        self.with_account(account_id, |account| {
            let stored_at = Utc::now();
            let backup = match mode {
                UploadMode::Pull => Some(profile),
                UploadMode::Normal | UploadMode::Push => account.profile.replace(profile),
            };
            if let Some(profile) = backup {
                account.backups.push(ProfileBackup {
                    mode,
                    profile,
                    stored_at,
                });
                if account.backups.len() > MAX_BACKUPS {
                    let excess = account.backups.len() - MAX_BACKUPS;
                    account.backups.drain(..excess);
                }
            }
        })
        .await
    }

    pub async fn get_backups(&self, account_id: Uuid) -> Result<Vec<ProfileBackup>> {
        let accounts = self.inner.read().await;
        accounts
            .by_id
            .get(&account_id)
            .map(|account| account.backups.clone())
            .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))
    }

    // === Review Log Repository ===

    pub async fn get_most_recent_review(&self, account_id: Uuid) -> Result<Option<ReviewLogEntry>> {
        let accounts = self.inner.read().await;
        let account = accounts
            .by_id
            .get(&account_id)
            .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;
        Ok(account.review_logs.last().cloned())
    }

    /// Append entries, or replace the whole history when `force` is set.
    /// Returns the number of entries written.
    pub async fn insert_reviews(
        &self,
        account_id: Uuid,
        entries: Vec<ReviewLogEntry>,
        force: bool,
    ) -> Result<usize> {
        let count = entries.len();
        self.with_account(account_id, move |account| {
            if force {
                account.review_logs = entries;
            } else {
                let in_order = match (latest_review_time(&account.review_logs), entries.first()) {
                    (Some(latest), Some(first)) => first.reviewed_at() >= latest,
                    _ => true,
                };
                account.review_logs.extend(entries);
                if !in_order {
                    account.review_logs.sort_by_key(ReviewLogEntry::reviewed_at);
                }
            }
        })
        .await?;
        Ok(count)
    }

    /// Entries with event time strictly after `from`, or all of them
    pub async fn get_reviews_since(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReviewLogEntry>> {
        let accounts = self.inner.read().await;
        let account = accounts
            .by_id
            .get(&account_id)
            .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;
        Ok(entries_after(&account.review_logs, from).to_vec())
    }

    async fn with_account<F>(&self, account_id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Account),
    {
        let mut accounts = self.inner.write().await;
        let account = accounts
            .by_id
            .get_mut(&account_id)
            .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;
        f(account);
        Ok(())
    }
}
