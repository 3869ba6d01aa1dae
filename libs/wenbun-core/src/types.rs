//! Core types shared by the scheduler, the client and the sync server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable index of an item inside a deck's content list.
pub type CardId = u32;

/// Card lifecycle state as tracked by the recall engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    New,
    Learning,
    Review,
    Relearning,
}

impl Default for CardStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Rating for a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    /// Every gradeable rating, in ascending order.
    pub const ALL: [Rating; 4] = [Self::Again, Self::Hard, Self::Good, Self::Easy];

    /// Convert to 4-point numeric value (1-4).
    pub fn to_value(self) -> u8 {
        match self {
            Self::Again => 1,
            Self::Hard => 2,
            Self::Good => 3,
            Self::Easy => 4,
        }
    }

    /// Create from 4-point numeric value.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Again),
            2 => Some(Self::Hard),
            3 => Some(Self::Good),
            4 => Some(Self::Easy),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Again => "Again",
            Self::Hard => "Hard",
            Self::Good => "Good",
            Self::Easy => "Easy",
        }
    }
}

/// Recall state of one studyable item.
///
/// Produced and replaced only by the recall engine; the scheduler swaps the
/// whole record after grading and never edits individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub due: DateTime<Utc>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: u32,
    pub scheduled_days: u32,
    /// Index into the active learning/relearning step list.
    pub learning_steps: u32,
    pub reps: u32,
    pub lapses: u32,
    pub state: CardStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_review: Option<DateTime<Utc>>,
}

impl Card {
    /// A never-studied card, due immediately.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            due: now,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            scheduled_days: 0,
            learning_steps: 0,
            reps: 0,
            lapses: 0,
            state: CardStatus::New,
            last_review: None,
        }
    }
}

/// One grading event as recorded by the recall engine.
///
/// Memory fields describe the card as it was before the review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLog {
    pub rating: Rating,
    pub state: CardStatus,
    pub due: DateTime<Utc>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: u32,
    pub last_elapsed_days: u32,
    pub scheduled_days: u32,
    pub learning_steps: u32,
    /// Event time of the review.
    pub review: DateTime<Utc>,
}

/// Entry of the profile-wide, append-only review history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLogEntry {
    pub deck_id: String,
    pub card_id: CardId,
    pub log: ReviewLog,
}

impl ReviewLogEntry {
    /// Event time used for ordering and incremental transfer.
    pub fn reviewed_at(&self) -> DateTime<Utc> {
        self.log.review
    }
}

/// Scheduler-level view of a card, combining pool membership and lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomState {
    New,
    WarmUp,
    Learning,
    #[serde(rename = "Young")]
    ReviewYoung,
    #[serde(rename = "Mature")]
    ReviewMature,
    Relearning,
    #[serde(rename = "Previously Studied")]
    PreviouslyStudied,
    Ignored,
}

/// Placement of a card pool relative to today's due reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterleaveOrder {
    Mix,
    #[serde(rename = "After Reviews")]
    AfterReviews,
    #[serde(rename = "Before Reviews")]
    BeforeReviews,
}

impl Default for InterleaveOrder {
    fn default() -> Self {
        Self::Mix
    }
}

/// How a review answer is turned into a grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingMethod {
    Auto,
    Manual,
}

impl Default for GradingMethod {
    fn default() -> Self {
        Self::Auto
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_value_round_trip() {
        for rating in Rating::ALL {
            assert_eq!(Rating::from_value(rating.to_value()), Some(rating));
        }
        assert_eq!(Rating::from_value(0), None);
        assert_eq!(Rating::from_value(5), None);
    }

    #[test]
    fn test_custom_state_wire_names() {
        let json = serde_json::to_string(&CustomState::PreviouslyStudied).unwrap();
        assert_eq!(json, "\"Previously Studied\"");
        let json = serde_json::to_string(&CustomState::ReviewMature).unwrap();
        assert_eq!(json, "\"Mature\"");
    }

    #[test]
    fn test_interleave_order_wire_names() {
        let order: InterleaveOrder = serde_json::from_str("\"Before Reviews\"").unwrap();
        assert_eq!(order, InterleaveOrder::BeforeReviews);
        assert_eq!(InterleaveOrder::default(), InterleaveOrder::Mix);
    }

    #[test]
    fn test_new_card_is_due_immediately() {
        let now = Utc::now();
        let card = Card::new(now);
        assert_eq!(card.due, now);
        assert_eq!(card.state, CardStatus::New);
        assert_eq!(card.reps, 0);
        assert!(card.last_review.is_none());
    }
}
