//! Test fixtures and factory functions for creating test data.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use wenbun_core::{
    CardStatus, DeckData, ProfileData, ProfileMeta, Rating, ReviewLog, ReviewLogEntry,
};

/// Fixed base instant for review timestamps.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

/// Create a device registration request body.
pub fn device_register_request(name: Option<&str>) -> serde_json::Value {
    match name {
        Some(n) => json!({ "name": n, "email": "learner@example.com" }),
        None => json!({}),
    }
}

/// Create a valid profile with one deck of `items` characters.
pub fn sample_profile(deck_id: &str, items: &[&str]) -> ProfileData {
    let deck = DeckData::new(items.iter().map(|s| s.to_string()).collect(), vec![]);
    ProfileData {
        decks: vec![deck_id.to_string()],
        deck_data: BTreeMap::from([(deck_id.to_string(), deck)]),
        meta: ProfileMeta {
            modified_at: Some(base_time()),
            ..ProfileMeta::default()
        },
        ..ProfileData::default()
    }
}

/// Create a review log entry `minutes` after the base time.
pub fn review_entry(card_id: u32, minutes: i64) -> ReviewLogEntry {
    let at = base_time() + Duration::minutes(minutes);
    ReviewLogEntry {
        deck_id: "hsk1".to_string(),
        card_id,
        log: ReviewLog {
            rating: Rating::Good,
            state: CardStatus::New,
            due: at,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            last_elapsed_days: 0,
            scheduled_days: 0,
            learning_steps: 0,
            review: at,
        },
    }
}
