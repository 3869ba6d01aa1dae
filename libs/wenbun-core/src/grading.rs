//! Applying a grade to a card and updating the day's counters.

use chrono::{DateTime, Utc};

use crate::algorithm::{EngineKind, RecallEngines};
use crate::deck::DeckData;
use crate::error::{CoreError, Result};
use crate::types::{CardId, CardStatus, Rating, ReviewLogEntry};

/// Grade one card.
///
/// Stops any warm-up, replaces the card with the engine's result and bumps
/// exactly one daily counter based on the card's pool before grading:
/// previously-studied first, then New, then Review. Learning and relearning
/// steps count toward nothing.
pub fn rate_card(
    deck: &mut DeckData,
    deck_id: &str,
    card_id: CardId,
    rating: Rating,
    engines: &RecallEngines,
    at: DateTime<Utc>,
) -> Result<ReviewLogEntry> {
    if !deck.contains(card_id) {
        return Err(CoreError::CardNotFound {
            deck_id: deck_id.to_string(),
            card_id,
        });
    }

    deck.stop_warm_up(card_id);

    let kind = EngineKind::for_card(deck, card_id);
    let engine = engines.engine(kind);
    let card = deck
        .card(card_id)
        .cloned()
        .unwrap_or_else(|| engine.empty_card(at));
    let prior_state = card.state;
    let outcome = engine.next(&card, at, rating);
    deck.set_card(card_id, outcome.card);

    if kind == EngineKind::PreviouslyStudied {
        deck.remove_previously_studied_mark(card_id);
        deck.done_today_previously_studied_card_count += 1;
    } else if prior_state == CardStatus::New {
        deck.done_today_new_card_count += 1;
    } else if prior_state == CardStatus::Review {
        deck.done_today_review_count += 1;
    }

    Ok(ReviewLogEntry {
        deck_id: deck_id.to_string(),
        card_id,
        log: outcome.log,
    })
}
