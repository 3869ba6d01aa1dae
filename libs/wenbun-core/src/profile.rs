//! Profile snapshot: every deck, the config, the review history and metadata.
//!
//! This is both the import/export format and the payload exchanged with the
//! sync server.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::deck::DeckData;
use crate::error::{CoreError, Result};
use crate::types::ReviewLogEntry;

/// Schema version written into every saved profile.
pub const PROFILE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMeta {
    #[serde(rename = "_profileVersion", default, skip_serializing_if = "Option::is_none")]
    pub profile_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ProfileMeta {
    /// Modification time, with a missing value treated as the epoch.
    pub fn modified_at_or_epoch(&self) -> DateTime<Utc> {
        self.modified_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Stamp a fresh modification.
    pub fn touch(&mut self, at: DateTime<Utc>, client_version: &str) {
        self.modified_at = Some(at);
        self.profile_version = Some(PROFILE_VERSION);
        self.client_version = Some(client_version.to_string());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileData {
    #[serde(default)]
    pub config: Config,
    pub decks: Vec<String>,
    pub deck_data: BTreeMap<String, DeckData>,
    #[serde(default)]
    pub review_logs: Vec<ReviewLogEntry>,
    #[serde(default)]
    pub meta: ProfileMeta,
}

impl ProfileData {
    /// Parse and validate a hand-provided or remote payload.
    pub fn from_json(json: &str) -> Result<Self> {
        let profile: Self = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Copy of the profile, optionally without its review history.
    pub fn export(&self, include_review_logs: bool) -> Self {
        Self {
            config: self.config.clone(),
            decks: self.decks.clone(),
            deck_data: self.deck_data.clone(),
            review_logs: if include_review_logs {
                self.review_logs.clone()
            } else {
                Vec::new()
            },
            meta: self.meta.clone(),
        }
    }

    /// Same decks, deck data and config, ignoring logs and metadata.
    pub fn same_content(&self, other: &Self) -> bool {
        self.decks == other.decks
            && self.deck_data == other.deck_data
            && self.config == other.config
    }

    pub fn deck(&self, deck_id: &str) -> Result<&DeckData> {
        self.deck_data
            .get(deck_id)
            .ok_or_else(|| CoreError::DeckNotFound(deck_id.to_string()))
    }

    pub fn deck_mut(&mut self, deck_id: &str) -> Result<&mut DeckData> {
        self.deck_data
            .get_mut(deck_id)
            .ok_or_else(|| CoreError::DeckNotFound(deck_id.to_string()))
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;

        let mut seen = HashSet::new();
        for id in &self.decks {
            if !seen.insert(id.as_str()) {
                return Err(CoreError::InvalidProfile(format!("duplicate deck '{id}'")));
            }
            if !self.deck_data.contains_key(id) {
                return Err(CoreError::InvalidProfile(format!(
                    "deck '{id}' has no deck data"
                )));
            }
        }
        if let Some(orphan) = self.deck_data.keys().find(|k| !seen.contains(k.as_str())) {
            return Err(CoreError::InvalidProfile(format!(
                "deck data '{orphan}' is not in the deck list"
            )));
        }
        for (id, deck) in &self.deck_data {
            deck.check_consistency()
                .map_err(|e| CoreError::InvalidProfile(format!("deck '{id}': {e}")))?;
        }
        Ok(())
    }
}
