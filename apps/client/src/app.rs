//! The application object that owns the profile.
//!
//! All scheduling mutations are synchronous. Only loading, saving and sync
//! suspend, and none of them sits in the middle of a multi-step mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::{json, Value};
use wenbun_core::deck::DEFAULT_GROUP_CONTENT_COUNT;
use wenbun_core::extra_study::{build_working_set, describe};
use wenbun_core::quota::{apply_daily_reset, needs_daily_reset};
use wenbun_core::{
    AutoGradeLog, CardId, Clock, Config, CoreError, CustomState, DailyQuota, DeckData, DeckProgress,
    ExtraStudy, ExtraStudyDescription, ExtraStudyRequest, GradePreview, GradingMethod,
    ProfileData, ProfileMeta, Rating, RecallEngines, ReviewLogEntry, StrokeResult, SystemClock,
};

use crate::api::HttpSyncApi;
use crate::content::{ContentSource, DeckContent, DirectoryContentSource};
use crate::error::{AppError, ContentError, Result, SyncError};
use crate::settings::ClientSettings;
use crate::storage::{self, SqliteStorage, Storage};
use crate::sync::{
    BackgroundSync, ReviewLogUpdate, SyncCoordinator, SyncOutcome, SyncReport, SyncState, SyncStatus,
};

pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value).map_err(CoreError::from)?)
}

/// What `save` does about sync once the profile is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveSync {
    Skip,
    /// Fire and forget; the outcome is applied on a later call.
    #[default]
    Background,
    /// Wait for the sync round to finish.
    Await,
}

pub struct Wenbun {
    profile: ProfileData,
    auto_grade_log: Vec<AutoGradeLog>,
    last_sync_time: DateTime<Utc>,
    engines: RecallEngines,
    extra_study: ExtraStudy,
    storage: Arc<dyn Storage>,
    content: Arc<dyn ContentSource>,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    sync: Option<BackgroundSync>,
    auto_sync: bool,
    /// Bumped on every write so stale background pulls can be recognized.
    revision: u64,
    /// Set when pulled data awaits its first write.
    adopted_pull: bool,
    last_sync_status: Option<SyncStatus>,
}

impl Wenbun {
    pub fn new(
        storage: Arc<dyn Storage>,
        content: Arc<dyn ContentSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            profile: ProfileData::default(),
            auto_grade_log: Vec::new(),
            last_sync_time: DateTime::<Utc>::UNIX_EPOCH,
            engines: RecallEngines::default(),
            extra_study: ExtraStudy::new(),
            storage,
            content,
            clock,
            rng: StdRng::from_entropy(),
            sync: None,
            auto_sync: true,
            revision: 0,
            adopted_pull: false,
            last_sync_status: None,
        }
    }

    pub fn with_sync(mut self, sync: BackgroundSync) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Disable the sync that normally follows every save.
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    /// On-disk store, deck directory and HTTP sync as configured.
    pub fn open(settings: &ClientSettings) -> Result<Self> {
        let storage = SqliteStorage::open(&settings.store_path)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let api = Arc::new(HttpSyncApi::new(
            &settings.server_url,
            settings.token.clone(),
        ));
        let coordinator = Arc::new(SyncCoordinator::new(api, Arc::clone(&clock)));
        tracing::info!("Opened profile store at {}", settings.store_path.display());

        Ok(Self::new(
            Arc::new(storage),
            Arc::new(DirectoryContentSource::new(&settings.content_dir)),
            clock,
        )
        .with_sync(BackgroundSync::new(coordinator)))
    }

    /// Load persisted state and run the daily reset.
    pub async fn init(&mut self) -> Result<()> {
        self.load().await;
        self.extra_study.deactivate();
        if self.needs_daily_reset() {
            self.process_today_schedule().await?;
        }
        Ok(())
    }

    /// Check the sync session and sync once if logged in.
    ///
    /// Returns whether the local profile changed.
    pub async fn init_profile(&mut self) -> Result<bool> {
        let Some(sync) = &self.sync else {
            return Ok(false);
        };
        if !sync.coordinator().init().await {
            return Ok(false);
        }
        let outcome = self.sync_now().await?;
        Ok(matches!(outcome, SyncOutcome::Pulled { .. }))
    }

    // === Persistence ===

    /// Read every key concurrently. Anything unreadable starts from defaults.
    pub async fn load(&mut self) {
        let store = self.storage.as_ref();
        let (decks, deck_data, config, review_logs, auto_grade_log, meta, last_sync_time) = tokio::join!(
            storage::load::<Vec<String>>(store, storage::KEY_DECKS),
            storage::load::<BTreeMap<String, DeckData>>(store, storage::KEY_DECK_DATA),
            storage::load::<Value>(store, storage::KEY_CONFIG),
            storage::load::<Vec<ReviewLogEntry>>(store, storage::KEY_REVIEW_LOGS),
            storage::load::<Vec<AutoGradeLog>>(store, storage::KEY_AUTO_REVIEW_GRADE_LOG),
            storage::load::<ProfileMeta>(store, storage::KEY_META),
            storage::load::<DateTime<Utc>>(store, storage::KEY_LAST_SYNC_TIME),
        );

        let config = Config::from_stored(config).unwrap_or_else(|e| {
            tracing::warn!("stored config rejected, using defaults: {}", e);
            Config::default()
        });
        self.profile = ProfileData {
            config,
            decks: decks.unwrap_or_default(),
            deck_data: deck_data.unwrap_or_default(),
            review_logs: review_logs.unwrap_or_default(),
            meta: meta.unwrap_or_else(|| ProfileMeta {
                client_version: Some(CLIENT_VERSION.to_string()),
                ..ProfileMeta::default()
            }),
        };
        self.auto_grade_log = auto_grade_log.unwrap_or_default();
        self.last_sync_time = last_sync_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        self.rebuild_engines();
    }

    /// Whether the in-memory profile differs from what is persisted.
    ///
    /// A missing key counts as its default, the same way `load` reads it.
    pub async fn is_data_changed(&self) -> Result<bool> {
        let store = self.storage.as_ref();
        let (decks, deck_data, config, review_logs, auto_grade_log) = tokio::try_join!(
            store.load_value(storage::KEY_DECKS),
            store.load_value(storage::KEY_DECK_DATA),
            store.load_value(storage::KEY_CONFIG),
            store.load_value(storage::KEY_REVIEW_LOGS),
            store.load_value(storage::KEY_AUTO_REVIEW_GRADE_LOG),
        )?;
        let pairs = [
            (decks, to_value(&self.profile.decks)?, json!([])),
            (deck_data, to_value(&self.profile.deck_data)?, json!({})),
            (
                config,
                to_value(&self.profile.config)?,
                to_value(&Config::default())?,
            ),
            (review_logs, to_value(&self.profile.review_logs)?, json!([])),
            (auto_grade_log, to_value(&self.auto_grade_log)?, json!([])),
        ];

        Ok(pairs
            .into_iter()
            .any(|(stored, current, default)| stored.unwrap_or(default) != current))
    }

    /// Write every key if anything changed, then sync as requested.
    ///
    /// Returns whether anything was written.
    pub async fn save(&mut self, sync: SaveSync) -> Result<bool> {
        self.poll_sync().await?;
        if !self.persist().await? {
            return Ok(false);
        }

        match sync {
            SaveSync::Skip => {}
            SaveSync::Background if self.auto_sync => self.spawn_sync(),
            SaveSync::Background => {}
            SaveSync::Await if self.sync.is_some() => {
                if let Err(e) = self.sync_now().await {
                    tracing::warn!("sync after save failed: {}", e);
                }
            }
            SaveSync::Await => {}
        }
        Ok(true)
    }

    async fn persist(&mut self) -> Result<bool> {
        let adopted_pull = std::mem::take(&mut self.adopted_pull);
        if !self.is_data_changed().await? {
            return Ok(false);
        }

        self.profile.meta.touch(self.clock.now(), CLIENT_VERSION);
        self.revision += 1;
        if adopted_pull {
            // Writing pulled data is not a local edit
            self.last_sync_time = self.last_sync_time.max(self.profile.meta.modified_at_or_epoch());
        }

        let store = self.storage.as_ref();
        tokio::try_join!(
            storage::save(store, storage::KEY_DECKS, &self.profile.decks),
            storage::save(store, storage::KEY_DECK_DATA, &self.profile.deck_data),
            storage::save(store, storage::KEY_CONFIG, &self.profile.config),
            storage::save(store, storage::KEY_REVIEW_LOGS, &self.profile.review_logs),
            storage::save(store, storage::KEY_AUTO_REVIEW_GRADE_LOG, &self.auto_grade_log),
            storage::save(store, storage::KEY_META, &self.profile.meta),
            storage::save(store, storage::KEY_LAST_SYNC_TIME, &self.last_sync_time),
        )?;
        tracing::debug!("Saved profile revision {}", self.revision);
        Ok(true)
    }

    pub async fn update_last_sync_time(&mut self, time: DateTime<Utc>) -> Result<()> {
        self.last_sync_time = time;
        storage::save(self.storage.as_ref(), storage::KEY_LAST_SYNC_TIME, &time).await?;
        Ok(())
    }

    pub fn last_sync_time(&self) -> DateTime<Utc> {
        self.last_sync_time
    }

    // === Import / export ===

    pub fn export_profile(&self, include_review_logs: bool) -> ProfileData {
        self.profile.export(include_review_logs)
    }

    pub fn export_profile_str(&self, include_review_logs: bool) -> Result<String> {
        Ok(self.export_profile(include_review_logs).to_json()?)
    }

    /// Import a hand-provided payload. Malformed input leaves state untouched.
    pub async fn try_import_profile_str(&mut self, json: &str, include_review_logs: bool) -> bool {
        match ProfileData::from_json(json) {
            Ok(profile) => self.try_import_profile(profile, include_review_logs, false).await,
            Err(e) => {
                tracing::warn!("profile import rejected: {}", e);
                false
            }
        }
    }

    /// Replace config and decks (and optionally the history) with `profile`.
    ///
    /// Returns false without touching anything if the payload is invalid or
    /// cannot be persisted.
    pub async fn try_import_profile(
        &mut self,
        profile: ProfileData,
        include_review_logs: bool,
        skip_sync: bool,
    ) -> bool {
        let engines = match profile
            .validate()
            .and_then(|_| RecallEngines::from_config(&profile.config))
        {
            Ok(engines) => engines,
            Err(e) => {
                tracing::warn!("profile import rejected: {}", e);
                return false;
            }
        };

        let previous = self.profile.clone();
        let previous_engines = std::mem::replace(&mut self.engines, engines);
        self.profile.config = profile.config;
        self.profile.decks = profile.decks;
        self.profile.deck_data = profile.deck_data;
        if include_review_logs {
            self.profile.review_logs = profile.review_logs;
        }

        let sync = if skip_sync {
            SaveSync::Skip
        } else {
            SaveSync::Background
        };
        match self.save(sync).await {
            Ok(_) => {
                tracing::info!("Imported profile with {} decks", self.profile.decks.len());
                true
            }
            Err(e) => {
                tracing::error!("failed to save imported profile: {}", e);
                self.profile = previous;
                self.engines = previous_engines;
                false
            }
        }
    }

    // === Daily schedule ===

    pub fn needs_daily_reset(&self) -> bool {
        needs_daily_reset(self.profile.deck_data.values(), self.clock.as_ref())
    }

    pub async fn process_today_schedule(&mut self) -> Result<()> {
        let clock = self.clock.as_ref();
        let reset = self
            .profile
            .deck_data
            .values_mut()
            .map(|deck| apply_daily_reset(deck, clock))
            .filter(|&applied| applied)
            .count();
        tracing::info!("Daily reset applied to {} decks", reset);
        self.save(SaveSync::Background).await?;
        Ok(())
    }

    // === Decks ===

    pub fn decks(&self) -> &[String] {
        &self.profile.decks
    }

    pub fn has_deck(&self, deck_id: &str) -> bool {
        self.profile.decks.iter().any(|d| d == deck_id)
    }

    pub fn deck(&self, deck_id: &str) -> Result<&DeckData> {
        Ok(self.profile.deck(deck_id)?)
    }

    fn deck_mut(&mut self, deck_id: &str) -> Result<&mut DeckData> {
        Ok(self.profile.deck_mut(deck_id)?)
    }

    /// Load a deck from the content source and add it.
    ///
    /// Nothing is registered if the content cannot be loaded.
    pub async fn add_deck_by_id(&mut self, deck_id: &str) -> Result<()> {
        let content = self.content.load_deck(deck_id).await?;
        self.add_deck(deck_id, DeckData::new(content.items, content.tags))
            .await
    }

    /// Build a deck from user text, one item per non-blank line.
    pub async fn add_custom_deck(&mut self, name: &str, text: &str) -> Result<()> {
        let content = DeckContent::parse(text);
        if content.items.is_empty() {
            return Err(ContentError::NotFound(name.to_string()).into());
        }
        self.add_deck(name, DeckData::new(content.items, content.tags))
            .await
    }

    /// Register a deck. Existing decks are left alone.
    pub async fn add_deck(&mut self, deck_id: &str, mut deck: DeckData) -> Result<()> {
        if self.profile.deck_data.contains_key(deck_id) {
            return Ok(());
        }
        deck.split_into_groups(DEFAULT_GROUP_CONTENT_COUNT);
        apply_daily_reset(&mut deck, self.clock.as_ref());
        self.profile.deck_data.insert(deck_id.to_string(), deck);
        if !self.has_deck(deck_id) {
            self.profile.decks.push(deck_id.to_string());
        }
        tracing::info!("Added deck {}", deck_id);
        self.save(SaveSync::Background).await?;
        Ok(())
    }

    /// Delete a deck. Does nothing unless `confirmed`.
    pub async fn delete_deck(&mut self, deck_id: &str, confirmed: bool) -> Result<bool> {
        if !confirmed {
            return Ok(false);
        }
        let existed = self.profile.deck_data.remove(deck_id).is_some();
        self.profile.decks.retain(|d| d != deck_id);
        if existed {
            tracing::info!("Deleted deck {}", deck_id);
            self.save(SaveSync::Background).await?;
        }
        Ok(existed)
    }

    // === Configuration ===

    pub fn config(&self) -> &Config {
        &self.profile.config
    }

    pub async fn save_config(&mut self, config: Config) -> Result<()> {
        config.validate()?;
        self.engines = RecallEngines::from_config(&config)?;
        self.profile.config = config;
        self.save(SaveSync::Background).await?;
        Ok(())
    }

    pub async fn reset_config_to_default(&mut self) -> Result<()> {
        self.save_config(Config::default()).await
    }

    fn rebuild_engines(&mut self) {
        self.engines = RecallEngines::from_config(&self.profile.config).unwrap_or_else(|e| {
            tracing::warn!("invalid recall settings, using defaults: {}", e);
            RecallEngines::default()
        });
    }

    // === Studying ===

    /// Next card to show: the extra-study set when active, else the daily plan.
    pub fn next_card(&mut self, deck_id: &str) -> Result<Option<CardId>> {
        if self.extra_study.is_active() {
            return Ok(self.extra_study.next(&mut self.rng));
        }
        let deck = self.profile.deck(deck_id)?;
        Ok(wenbun_core::next_card(
            deck,
            &self.profile.config,
            self.clock.as_ref(),
            &mut self.rng,
        ))
    }

    /// Grade a card now. Inside extra study only the drill is advanced.
    ///
    /// Nothing is persisted; call [`Wenbun::save`] afterwards.
    pub fn rate_card(&mut self, deck_id: &str, card_id: CardId, rating: Rating) -> Result<()> {
        let now = self.clock.now();
        self.rate_card_at(deck_id, card_id, rating, now)
    }

    pub fn rate_card_at(
        &mut self,
        deck_id: &str,
        card_id: CardId,
        rating: Rating,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.extra_study.is_active() {
            self.extra_study.record(card_id, rating);
            return Ok(());
        }
        let engines = &self.engines;
        let deck = self.profile.deck_mut(deck_id)?;
        let entry = wenbun_core::rate_card(deck, deck_id, card_id, rating, engines, at)?;
        self.profile.review_logs.push(entry);
        Ok(())
    }

    pub fn daily_quota(&self, deck_id: &str) -> Result<DailyQuota> {
        Ok(DailyQuota::compute(
            self.deck(deck_id)?,
            &self.profile.config,
            self.clock.as_ref(),
        ))
    }

    pub fn custom_state(&self, deck_id: &str, card_id: CardId) -> Result<CustomState> {
        Ok(self.deck(deck_id)?.custom_state(card_id))
    }

    pub fn card_due_label(&self, deck_id: &str, card_id: CardId) -> Result<String> {
        Ok(self.deck(deck_id)?.card_due_label(card_id, self.clock.now()))
    }

    /// Due date and delta each grade would give, without changing anything.
    pub fn grade_previews(&self, deck_id: &str, card_id: CardId) -> Result<Vec<GradePreview>> {
        let deck = self.deck(deck_id)?;
        Ok(self
            .engines
            .preview_all_grades(deck, card_id, self.clock.now()))
    }

    pub fn deck_progress(&self, deck_id: &str) -> Result<DeckProgress> {
        Ok(self.deck(deck_id)?.progress())
    }

    // === Warm-up and marks ===

    pub fn start_warm_up(&mut self, deck_id: &str, card_id: CardId) -> Result<bool> {
        Ok(self.deck_mut(deck_id)?.start_warm_up(card_id))
    }

    pub fn warm_up_next(&mut self, deck_id: &str, card_id: CardId) -> Result<()> {
        self.deck_mut(deck_id)?.warm_up_next(card_id);
        Ok(())
    }

    pub fn skip_warm_up(&mut self, deck_id: &str, card_id: CardId) -> Result<bool> {
        Ok(self.deck_mut(deck_id)?.skip_warm_up(card_id))
    }

    pub fn stop_warm_up(&mut self, deck_id: &str, card_id: CardId) -> Result<()> {
        self.deck_mut(deck_id)?.stop_warm_up(card_id);
        Ok(())
    }

    pub fn warm_up_count(&self, deck_id: &str, card_id: CardId) -> Result<Option<u32>> {
        Ok(self.deck(deck_id)?.warm_up_count(card_id))
    }

    pub fn add_previously_studied_mark(&mut self, deck_id: &str, card_id: CardId) -> Result<bool> {
        Ok(self.deck_mut(deck_id)?.add_previously_studied_mark(card_id))
    }

    pub fn remove_previously_studied_mark(
        &mut self,
        deck_id: &str,
        card_id: CardId,
    ) -> Result<bool> {
        Ok(self.deck_mut(deck_id)?.remove_previously_studied_mark(card_id))
    }

    pub fn add_ignored_mark(&mut self, deck_id: &str, card_id: CardId) -> Result<bool> {
        Ok(self.deck_mut(deck_id)?.add_ignored_mark(card_id))
    }

    pub fn remove_ignored_mark(&mut self, deck_id: &str, card_id: CardId) -> Result<bool> {
        Ok(self.deck_mut(deck_id)?.remove_ignored_mark(card_id))
    }

    // === Extra study ===

    /// Start a drill over the requested cards. Returns the working-set size.
    pub fn start_extra_study(&mut self, deck_id: &str, request: &ExtraStudyRequest) -> Result<usize> {
        let deck = self.profile.deck(deck_id)?;
        let ids = build_working_set(deck, request, &mut self.rng)?;
        let count = ids.len();
        self.extra_study.activate(ids);
        Ok(count)
    }

    pub fn stop_extra_study(&mut self) {
        self.extra_study.deactivate();
    }

    pub fn is_extra_study(&self) -> bool {
        self.extra_study.is_active()
    }

    pub fn extra_study_remaining(&self) -> usize {
        self.extra_study.remaining()
    }

    pub fn describe_extra_study(
        &self,
        deck_id: &str,
        request: &ExtraStudyRequest,
    ) -> Result<ExtraStudyDescription> {
        Ok(describe(self.deck(deck_id)?, request)?)
    }

    // === Auto grading ===

    pub fn is_auto_grading(&self) -> bool {
        self.profile.config.grading_method == GradingMethod::Auto
    }

    /// Grade from handwriting strokes and record the automatic grade.
    pub fn auto_grade(&mut self, strokes: StrokeResult) -> Rating {
        let rating = strokes.grade();
        self.auto_grade_log.push(AutoGradeLog::new(
            strokes.correct_stroke_count,
            strokes.incorrect_stroke_count,
            rating,
        ));
        rating
    }

    pub fn auto_grade_log(&self) -> &[AutoGradeLog] {
        &self.auto_grade_log
    }

    // === Sync ===

    pub fn profile(&self) -> &ProfileData {
        &self.profile
    }

    pub fn last_sync_status(&self) -> Option<&SyncStatus> {
        self.last_sync_status.as_ref()
    }

    pub async fn sync_state(&self) -> SyncState {
        match &self.sync {
            Some(sync) => sync.coordinator().state().await,
            None => SyncState::NotLoggedIn,
        }
    }

    fn coordinator(&self) -> Result<Arc<SyncCoordinator>> {
        self.sync
            .as_ref()
            .map(|sync| Arc::clone(sync.coordinator()))
            .ok_or(AppError::SyncUnavailable)
    }

    /// Adopt a session token. The next sync starts from scratch.
    pub async fn login(&mut self, token: String) -> Result<bool> {
        let coordinator = self.coordinator()?;
        self.update_last_sync_time(DateTime::<Utc>::UNIX_EPOCH).await?;
        let logged_in = coordinator.login(token).await;
        storage::save(self.storage.as_ref(), storage::KEY_LOGIN_STATUS, &logged_in).await?;
        Ok(logged_in)
    }

    pub async fn logout(&mut self) -> Result<()> {
        let coordinator = self.coordinator()?;
        self.update_last_sync_time(DateTime::<Utc>::UNIX_EPOCH).await?;
        coordinator.logout().await;
        storage::save(self.storage.as_ref(), storage::KEY_LOGIN_STATUS, &false).await?;
        Ok(())
    }

    /// Run a sync round and wait for it.
    pub async fn sync_now(&mut self) -> Result<SyncOutcome> {
        let coordinator = self.prepare_sync().await?;
        let snapshot = self.profile.export(true);
        let result = coordinator.try_sync(&snapshot, self.last_sync_time).await;
        self.finish_sync(result).await
    }

    /// Adopt the remote profile and history, backing up the local profile first.
    pub async fn force_pull(&mut self) -> Result<SyncOutcome> {
        let coordinator = self.prepare_sync().await?;
        let snapshot = self.profile.export(true);
        let result = coordinator.force_pull(&snapshot).await;
        self.finish_sync(result).await
    }

    /// Overwrite the remote profile and history with the local ones.
    pub async fn force_push(&mut self) -> Result<SyncOutcome> {
        let coordinator = self.prepare_sync().await?;
        let snapshot = self.profile.export(true);
        let result = coordinator.force_push(&snapshot).await;
        self.finish_sync(result).await
    }

    /// Apply background results that have arrived so far.
    pub async fn poll_sync(&mut self) -> Result<()> {
        let reports = match self.sync.as_mut() {
            Some(sync) => sync.drain(),
            None => return Ok(()),
        };
        for report in reports {
            self.apply_report(report).await?;
        }
        Ok(())
    }

    /// Wait for the next background round and apply it.
    pub async fn wait_for_background_sync(&mut self) -> Result<Option<SyncStatus>> {
        let Some(sync) = self.sync.as_mut() else {
            return Ok(None);
        };
        let Some(report) = sync.next_report().await else {
            return Ok(None);
        };
        let status = report.status.clone();
        self.apply_report(report).await?;
        Ok(Some(status))
    }

    /// Settle pending results and unsaved edits before a foreground round.
    async fn prepare_sync(&mut self) -> Result<Arc<SyncCoordinator>> {
        let coordinator = self.coordinator()?;
        self.poll_sync().await?;
        self.persist().await?;
        Ok(coordinator)
    }

    async fn finish_sync(
        &mut self,
        result: std::result::Result<SyncOutcome, SyncError>,
    ) -> Result<SyncOutcome> {
        match result {
            Ok(outcome) => {
                self.last_sync_status = Some(SyncStatus::Completed(outcome.clone()));
                self.apply_outcome(outcome.clone(), true).await?;
                Ok(outcome)
            }
            Err(e) => {
                self.last_sync_status = Some(SyncStatus::Failed {
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    fn spawn_sync(&self) {
        if let Some(sync) = &self.sync {
            sync.spawn(self.profile.export(true), self.last_sync_time, self.revision);
        }
    }

    async fn apply_report(&mut self, report: SyncReport) -> Result<()> {
        self.last_sync_status = Some(report.status.clone());
        let SyncStatus::Completed(outcome) = report.status else {
            return Ok(());
        };
        // Edits made after the round started make its result stale
        let current = report.revision == self.revision && !self.is_data_changed().await?;
        self.apply_outcome(outcome, current).await
    }

    /// `current` is false when local edits happened after the round started.
    async fn apply_outcome(&mut self, outcome: SyncOutcome, current: bool) -> Result<()> {
        match outcome {
            SyncOutcome::NotLoggedIn | SyncOutcome::Unchanged | SyncOutcome::Conflict(_) => {
                return Ok(());
            }
            SyncOutcome::Pushed {
                synced_at,
                pushed_modified_at,
            } => {
                // A stale push only covers edits up to the uploaded snapshot
                self.last_sync_time = if current {
                    synced_at
                } else {
                    pushed_modified_at
                };
            }
            SyncOutcome::Pulled {
                profile,
                review_logs,
                synced_at,
            } => {
                if !current {
                    tracing::warn!("discarding pull computed from an outdated snapshot");
                    return Ok(());
                }
                self.engines = RecallEngines::from_config(&profile.config)?;
                self.profile.config = profile.config;
                self.profile.decks = profile.decks;
                self.profile.deck_data = profile.deck_data;
                match review_logs {
                    ReviewLogUpdate::Append(entries) => self.profile.review_logs.extend(entries),
                    ReviewLogUpdate::Replace(entries) => self.profile.review_logs = entries,
                }
                self.last_sync_time = synced_at;
                self.adopted_pull = true;
                self.persist().await?;
            }
        }
        storage::save(
            self.storage.as_ref(),
            storage::KEY_LAST_SYNC_TIME,
            &self.last_sync_time,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryContentSource;
    use crate::storage::MemoryStorage;
    use crate::testing::FakeApi;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use wenbun_core::{FixedClock, SyncDecision};

    const DECK: &str = "hsk1";
    const ITEMS: [&str; 10] = ["爱", "八", "爸爸", "杯子", "北京", "本", "不", "菜", "茶", "吃"];

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    struct Harness {
        app: Wenbun,
        storage: Arc<MemoryStorage>,
        clock: Arc<FixedClock>,
    }

    async fn harness_with(storage: Arc<MemoryStorage>) -> Harness {
        let clock = Arc::new(FixedClock::utc(now()));
        let content = MemoryContentSource::new().with_deck(DECK, &ITEMS);
        let mut app = Wenbun::new(storage.clone(), Arc::new(content), clock.clone())
            .with_rng(StdRng::seed_from_u64(7));
        app.init().await.unwrap();
        Harness {
            app,
            storage,
            clock,
        }
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(MemoryStorage::new())).await
    }

    async fn synced_harness(api: Arc<FakeApi>, auto_sync: bool) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(FixedClock::utc(now()));
        let coordinator = Arc::new(SyncCoordinator::new(api, clock.clone()));
        assert!(coordinator.init().await);

        let content = MemoryContentSource::new().with_deck(DECK, &ITEMS);
        let mut app = Wenbun::new(storage.clone(), Arc::new(content), clock.clone())
            .with_sync(BackgroundSync::new(coordinator))
            .with_auto_sync(auto_sync)
            .with_rng(StdRng::seed_from_u64(7));
        app.init().await.unwrap();
        Harness {
            app,
            storage,
            clock,
        }
    }

    /// Apply the outstanding background report, unless a save already drained it.
    async fn settle_background_sync(app: &mut Wenbun) -> SyncStatus {
        if app.last_sync_status.is_none() {
            app.wait_for_background_sync().await.unwrap();
        }
        app.last_sync_status.clone().unwrap()
    }

    fn other_device_profile(modified_at: DateTime<Utc>) -> ProfileData {
        let deck = DeckData::new(vec!["二".to_string(), "三".to_string()], vec![]);
        ProfileData {
            decks: vec!["hsk2".to_string()],
            deck_data: BTreeMap::from([("hsk2".to_string(), deck)]),
            meta: ProfileMeta {
                modified_at: Some(modified_at),
                ..ProfileMeta::default()
            },
            ..ProfileData::default()
        }
    }

    #[tokio::test]
    async fn test_new_card_quota_ends_the_day() {
        let Harness { mut app, .. } = harness().await;
        app.save_config(Config {
            new_card_per_day: 3,
            ..Config::default()
        })
        .await
        .unwrap();
        app.add_deck_by_id(DECK).await.unwrap();

        for expected in 0..3 {
            let id = app.next_card(DECK).unwrap().unwrap();
            assert_eq!(id, expected);
            app.rate_card(DECK, id, Rating::Good).unwrap();
            assert_ne!(app.custom_state(DECK, id).unwrap(), CustomState::New);
        }

        assert_eq!(app.next_card(DECK).unwrap(), None);
        assert_eq!(app.profile().review_logs.len(), 3);
        assert_eq!(app.deck(DECK).unwrap().done_today_new_card_count, 3);
    }

    #[tokio::test]
    async fn test_save_without_changes_writes_nothing() {
        let Harness {
            mut app, storage, ..
        } = harness().await;
        app.add_deck_by_id(DECK).await.unwrap();
        let writes = storage.write_count();
        assert!(writes > 0);

        assert!(!app.save(SaveSync::Skip).await.unwrap());
        assert_eq!(storage.write_count(), writes);

        app.rate_card(DECK, 0, Rating::Good).unwrap();
        assert!(app.is_data_changed().await.unwrap());
        assert!(app.save(SaveSync::Skip).await.unwrap());
        assert!(!app.is_data_changed().await.unwrap());
    }

    #[tokio::test]
    async fn test_save_stamps_meta() {
        let Harness { mut app, .. } = harness().await;
        app.add_deck_by_id(DECK).await.unwrap();

        let meta = &app.profile().meta;
        assert_eq!(meta.modified_at, Some(now()));
        assert_eq!(meta.client_version.as_deref(), Some(CLIENT_VERSION));
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let storage = Arc::new(MemoryStorage::new());
        let Harness { mut app, .. } = harness_with(storage.clone()).await;
        app.add_deck_by_id(DECK).await.unwrap();
        app.rate_card(DECK, 0, Rating::Good).unwrap();
        app.auto_grade(StrokeResult {
            correct_stroke_count: 5,
            incorrect_stroke_count: 1,
            total_stroke_count: 6,
        });
        app.save(SaveSync::Skip).await.unwrap();

        let reloaded = harness_with(storage).await.app;
        assert!(reloaded.profile().same_content(app.profile()));
        assert_eq!(reloaded.profile().review_logs, app.profile().review_logs);
        assert_eq!(reloaded.auto_grade_log(), app.auto_grade_log());
    }

    #[tokio::test]
    async fn test_missing_deck_leaves_state_untouched() {
        let Harness {
            mut app, storage, ..
        } = harness().await;

        let result = app.add_deck_by_id("hsk9").await;

        assert!(matches!(result, Err(AppError::DeckLoadFailed(_))));
        assert!(app.decks().is_empty());
        assert!(app.profile().deck_data.is_empty());
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_add_deck_twice_keeps_progress() {
        let Harness { mut app, .. } = harness().await;
        app.add_deck_by_id(DECK).await.unwrap();
        app.rate_card(DECK, 0, Rating::Good).unwrap();

        app.add_deck_by_id(DECK).await.unwrap();

        assert_eq!(app.decks(), [DECK.to_string()]);
        assert!(app.deck(DECK).unwrap().card(0).is_some());
    }

    #[tokio::test]
    async fn test_custom_deck_from_text() {
        let Harness { mut app, .. } = harness().await;
        app.add_custom_deck("mine", "你好\n\n谢谢\n").await.unwrap();
        assert_eq!(app.deck("mine").unwrap().deck, vec!["你好", "谢谢"]);

        let empty = app.add_custom_deck("blank", "\n  \n").await;
        assert!(matches!(empty, Err(AppError::DeckLoadFailed(_))));
        assert!(!app.has_deck("blank"));
    }

    #[tokio::test]
    async fn test_delete_deck_requires_confirmation() {
        let Harness { mut app, .. } = harness().await;
        app.add_deck_by_id(DECK).await.unwrap();

        assert!(!app.delete_deck(DECK, false).await.unwrap());
        assert!(app.has_deck(DECK));

        assert!(app.delete_deck(DECK, true).await.unwrap());
        assert!(!app.has_deck(DECK));
        assert!(app.profile().deck_data.is_empty());
    }

    #[tokio::test]
    async fn test_daily_reset_next_day() {
        let Harness {
            mut app, clock, ..
        } = harness().await;
        app.add_deck_by_id(DECK).await.unwrap();
        app.rate_card(DECK, 0, Rating::Good).unwrap();
        assert!(!app.needs_daily_reset());

        clock.advance(Duration::days(1));
        assert!(app.needs_daily_reset());
        app.process_today_schedule().await.unwrap();

        let deck = app.deck(DECK).unwrap();
        assert_eq!(deck.done_today_new_card_count, 0);
        assert_eq!(
            deck.last_schedule_check_date,
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()
        );
        assert!(!app.needs_daily_reset());
    }

    #[tokio::test]
    async fn test_export_import_roundtrip() {
        let Harness { mut app, .. } = harness().await;
        app.add_deck_by_id(DECK).await.unwrap();
        app.add_previously_studied_mark(DECK, 4).unwrap();
        app.rate_card(DECK, 0, Rating::Good).unwrap();
        let exported = app.export_profile_str(true).unwrap();

        let Harness { app: mut fresh, .. } = harness().await;
        assert!(fresh.try_import_profile_str(&exported, true).await);
        assert!(fresh.profile().same_content(app.profile()));
        assert_eq!(fresh.profile().review_logs, app.profile().review_logs);

        let Harness {
            app: mut without_logs,
            ..
        } = harness().await;
        let profile = app.export_profile(false);
        assert!(without_logs.try_import_profile(profile, false, true).await);
        assert!(without_logs.profile().same_content(app.profile()));
        assert!(without_logs.profile().review_logs.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_import_is_rejected() {
        let Harness { mut app, .. } = harness().await;
        app.add_deck_by_id(DECK).await.unwrap();
        let before = app.export_profile(true);

        assert!(!app.try_import_profile_str("{\"decks\": [", true).await);
        assert!(
            !app.try_import_profile_str(r#"{"decks":["x"],"deckData":{}}"#, true)
                .await
        );
        assert!(
            !app.try_import_profile_str(r#"{"decks":[],"deckData":{},"extra":1}"#, true)
                .await
        );

        assert_eq!(app.export_profile(true), before);
    }

    #[tokio::test]
    async fn test_extra_study_does_not_touch_schedule() {
        let Harness { mut app, .. } = harness().await;
        app.add_deck_by_id(DECK).await.unwrap();
        let before = app.deck(DECK).unwrap().clone();

        let count = app
            .start_extra_study(DECK, &ExtraStudyRequest::NewCards { count: 2 })
            .unwrap();
        assert_eq!(count, 2);
        assert!(app.is_extra_study());

        let id = app.next_card(DECK).unwrap().unwrap();
        assert!(id < 2);
        app.rate_card(DECK, id, Rating::Good).unwrap();
        assert_eq!(app.extra_study_remaining(), 1);

        assert_eq!(app.deck(DECK).unwrap(), &before);
        assert!(app.profile().review_logs.is_empty());

        app.stop_extra_study();
        assert_eq!(app.next_card(DECK).unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_auto_grade_is_logged() {
        let Harness { mut app, .. } = harness().await;
        assert!(app.is_auto_grading());

        let rating = app.auto_grade(StrokeResult {
            correct_stroke_count: 2,
            incorrect_stroke_count: 8,
            total_stroke_count: 10,
        });

        assert_eq!(rating, Rating::Again);
        assert_eq!(app.auto_grade_log(), [AutoGradeLog::new(2, 8, Rating::Again)]);
    }

    #[tokio::test]
    async fn test_save_config_rejects_bad_steps() {
        let Harness { mut app, .. } = harness().await;
        let bad = Config {
            learning_steps: vec!["soon".to_string()],
            ..Config::default()
        };

        assert!(app.save_config(bad).await.is_err());
        assert_eq!(app.config(), &Config::default());
    }

    #[tokio::test]
    async fn test_sync_without_coordinator() {
        let Harness { mut app, .. } = harness().await;
        assert!(matches!(
            app.sync_now().await,
            Err(AppError::SyncUnavailable)
        ));
        assert_eq!(app.sync_state().await, SyncState::NotLoggedIn);
    }

    #[tokio::test]
    async fn test_new_deck_quota_survives_same_day_restart() {
        let storage = Arc::new(MemoryStorage::new());
        let Harness { mut app, .. } = harness_with(storage.clone()).await;
        app.add_deck_by_id(DECK).await.unwrap();
        assert_eq!(
            app.deck(DECK).unwrap().last_schedule_check_date,
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        app.rate_card(DECK, 0, Rating::Good).unwrap();
        app.rate_card(DECK, 1, Rating::Good).unwrap();
        app.save(SaveSync::Skip).await.unwrap();

        let reloaded = harness_with(storage).await.app;
        assert!(!reloaded.needs_daily_reset());
        assert_eq!(reloaded.deck(DECK).unwrap().done_today_new_card_count, 2);
    }

    #[tokio::test]
    async fn test_import_with_oversized_steps_is_rejected() {
        let Harness { mut app, .. } = harness().await;
        app.add_deck_by_id(DECK).await.unwrap();
        let before = app.export_profile(true);

        let mut value: Value = serde_json::from_str(&app.export_profile_str(true).unwrap()).unwrap();
        value["config"]["learningSteps"] = json!(["999999999999999d"]);
        assert!(!app.try_import_profile_str(&value.to_string(), true).await);
        value["config"]["learningSteps"] = json!(["100000000d"]);
        assert!(!app.try_import_profile_str(&value.to_string(), true).await);

        assert_eq!(app.export_profile(true), before);
        app.rate_card(DECK, 0, Rating::Again).unwrap();
    }

    #[tokio::test]
    async fn test_background_pull_from_outdated_snapshot_is_discarded() {
        let api = FakeApi::signed_in(None, vec![]);
        let Harness {
            mut app, clock, ..
        } = synced_harness(api.clone(), false).await;
        app.add_deck_by_id(DECK).await.unwrap();
        clock.advance(Duration::minutes(1));
        assert_eq!(app.sync_now().await.unwrap().decision(), SyncDecision::Push);
        let synced_at = app.last_sync_time();

        clock.advance(Duration::minutes(1));
        api.with(|r| r.profile = Some(other_device_profile(clock.now())));
        clock.advance(Duration::minutes(1));

        // The round sees an untouched local profile and decides to pull
        app.last_sync_status = None;
        app.spawn_sync();
        app.rate_card(DECK, 0, Rating::Good).unwrap();
        app.save(SaveSync::Skip).await.unwrap();

        let status = settle_background_sync(&mut app).await;
        assert!(
            matches!(status, SyncStatus::Completed(SyncOutcome::Pulled { .. })),
            "{status:?}"
        );
        assert_eq!(app.decks(), [DECK.to_string()]);
        assert!(app.deck(DECK).unwrap().card(0).is_some());
        assert_eq!(app.profile().review_logs.len(), 1);
        assert_eq!(app.last_sync_time(), synced_at);

        clock.advance(Duration::minutes(1));
        assert!(matches!(
            app.sync_now().await.unwrap(),
            SyncOutcome::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_background_push_of_outdated_snapshot_leaves_later_edits_unsynced() {
        let api = FakeApi::signed_in(None, vec![]);
        let Harness {
            mut app, clock, ..
        } = synced_harness(api.clone(), true).await;
        app.add_deck_by_id(DECK).await.unwrap();
        let uploaded_at = app.profile().meta.modified_at_or_epoch();
        assert_eq!(uploaded_at, now());

        clock.advance(Duration::minutes(1));
        app.rate_card(DECK, 0, Rating::Good).unwrap();
        app.save(SaveSync::Skip).await.unwrap();

        let status = settle_background_sync(&mut app).await;
        assert!(
            matches!(
                &status,
                SyncStatus::Completed(SyncOutcome::Pushed { pushed_modified_at, .. })
                    if *pushed_modified_at == uploaded_at
            ),
            "{status:?}"
        );
        assert_eq!(app.last_sync_time(), uploaded_at);

        clock.advance(Duration::minutes(1));
        assert_eq!(app.sync_now().await.unwrap().decision(), SyncDecision::Push);
        assert_eq!(api.with(|r| r.logs.clone()), app.profile().review_logs);
    }
}
