//! Recall engine trait and the per-deck engine selection.

pub mod fsrs;
pub mod steps;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::deck::DeckData;
use crate::error::Result;
use crate::types::{Card, CardId, Rating, ReviewLog};

/// Card and log produced by grading.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeOutcome {
    pub card: Card,
    pub log: ReviewLog,
}

/// Outcome for every possible grade of one card.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLog {
    pub again: GradeOutcome,
    pub hard: GradeOutcome,
    pub good: GradeOutcome,
    pub easy: GradeOutcome,
}

impl RecordLog {
    pub fn get(&self, rating: Rating) -> &GradeOutcome {
        match rating {
            Rating::Again => &self.again,
            Rating::Hard => &self.hard,
            Rating::Good => &self.good,
            Rating::Easy => &self.easy,
        }
    }

    pub fn into_outcome(self, rating: Rating) -> GradeOutcome {
        match rating {
            Rating::Again => self.again,
            Rating::Hard => self.hard,
            Rating::Good => self.good,
            Rating::Easy => self.easy,
        }
    }
}

/// Trait for recall-strength calculators.
pub trait RecallEngine: Send + Sync {
    /// Engine identifier.
    fn name(&self) -> &'static str;

    /// Outcome of every grade, computed without mutating `card`.
    fn repeat(&self, card: &Card, now: DateTime<Utc>) -> RecordLog;

    /// Current probability of recall.
    fn retrievability(&self, card: &Card, now: DateTime<Utc>) -> f64;

    fn empty_card(&self, now: DateTime<Utc>) -> Card {
        Card::new(now)
    }

    fn next(&self, card: &Card, now: DateTime<Utc>, rating: Rating) -> GradeOutcome {
        self.repeat(card, now).into_outcome(rating)
    }
}

/// Which calculator a card is graded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Standard,
    PreviouslyStudied,
}

impl EngineKind {
    /// Cards currently marked previously-studied use the dedicated steps.
    pub fn for_card(deck: &DeckData, card_id: CardId) -> Self {
        if deck.is_previously_studied(card_id) {
            Self::PreviouslyStudied
        } else {
            Self::Standard
        }
    }
}

/// Due date and human-readable delta for one grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradePreview {
    pub rating: Rating,
    pub due: DateTime<Utc>,
    pub delta: String,
}

/// The two configured calculators.
pub struct RecallEngines {
    standard: Box<dyn RecallEngine>,
    previously_studied: Box<dyn RecallEngine>,
}

impl RecallEngines {
    pub fn new(standard: Box<dyn RecallEngine>, previously_studied: Box<dyn RecallEngine>) -> Self {
        Self {
            standard,
            previously_studied,
        }
    }

    /// Build both FSRS instances from the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Box::new(fsrs::Fsrs::from_config(config, &config.learning_steps)?),
            Box::new(fsrs::Fsrs::from_config(
                config,
                &config.previously_studied_learning_steps,
            )?),
        ))
    }

    pub fn engine(&self, kind: EngineKind) -> &dyn RecallEngine {
        match kind {
            EngineKind::Standard => self.standard.as_ref(),
            EngineKind::PreviouslyStudied => self.previously_studied.as_ref(),
        }
    }

    pub fn select(&self, deck: &DeckData, card_id: CardId) -> &dyn RecallEngine {
        self.engine(EngineKind::for_card(deck, card_id))
    }

    /// Outcome of grading `card` without touching any state.
    pub fn grade(
        &self,
        kind: EngineKind,
        card: &Card,
        rating: Rating,
        at: DateTime<Utc>,
    ) -> GradeOutcome {
        self.engine(kind).next(card, at, rating)
    }

    /// What each grade would do to a card right now.
    pub fn preview_all_grades(
        &self,
        deck: &DeckData,
        card_id: CardId,
        at: DateTime<Utc>,
    ) -> Vec<GradePreview> {
        let engine = self.select(deck, card_id);
        let card = deck
            .card(card_id)
            .cloned()
            .unwrap_or_else(|| engine.empty_card(at));
        let log = engine.repeat(&card, at);

        Rating::ALL
            .iter()
            .map(|&rating| {
                let due = log.get(rating).card.due;
                GradePreview {
                    rating,
                    due,
                    delta: format_delta(at, due),
                }
            })
            .collect()
    }
}

impl Default for RecallEngines {
    fn default() -> Self {
        Self::new(
            Box::new(fsrs::Fsrs::default()),
            Box::new(fsrs::Fsrs::default()),
        )
    }
}

impl std::fmt::Debug for RecallEngines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallEngines")
            .field("standard", &self.standard.name())
            .field("previously_studied", &self.previously_studied.name())
            .finish()
    }
}

/// Compact delta such as `<1m`, `10m`, `3h`, `4d`, `1.5mo` or `2.1y`.
pub fn format_delta(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    let minutes = (to - from).num_minutes();
    if minutes < 1 {
        return "<1m".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h");
    }
    let days = hours / 24;
    if days < 30 {
        return format!("{days}d");
    }
    if days < 365 {
        return format!("{:.1}mo", days as f64 / 30.0);
    }
    format!("{:.1}y", days as f64 / 365.0)
}
