//! Extra-study sessions that override normal scheduling.
//!
//! A session drills a fixed working set. Cards leave the set when answered
//! correctly and the same card is never served twice in a row unless it is
//! the last one left. Grades given during a session do not touch the
//! card's schedule.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::deck::DeckData;
use crate::error::{CoreError, Result};
use crate::types::{CardId, CustomState, Rating};

/// Which cards an extra-study session draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExtraStudyRequest {
    /// Random sample of cards that have been studied.
    #[serde(rename = "Studied Cards")]
    StudiedCards { count: usize },
    /// Highest-difficulty studied cards.
    #[serde(rename = "Hard Cards")]
    HardCards { count: usize },
    /// Next not-yet-studied cards in group order.
    #[serde(rename = "New Cards")]
    NewCards { count: usize },
    #[serde(rename = "Young Cards")]
    YoungCards { count: usize },
    #[serde(rename = "Mature Cards")]
    MatureCards { count: usize },
    /// Every card of one named group.
    Group { group: String },
}

/// Summary shown before starting a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraStudyDescription {
    pub desc: String,
    pub subdesc: String,
}

/// Session-scoped drill state; never persisted.
#[derive(Debug, Clone, Default)]
pub struct ExtraStudy {
    working_set: Option<Vec<CardId>>,
    last_served: Option<CardId>,
}

impl ExtraStudy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&mut self, card_ids: Vec<CardId>) {
        self.working_set = Some(card_ids);
        self.last_served = None;
    }

    pub fn deactivate(&mut self) {
        self.working_set = None;
        self.last_served = None;
    }

    pub fn is_active(&self) -> bool {
        self.working_set.is_some()
    }

    pub fn remaining(&self) -> usize {
        self.working_set.as_ref().map_or(0, Vec::len)
    }

    pub fn card_ids(&self) -> &[CardId] {
        self.working_set.as_deref().unwrap_or(&[])
    }

    /// Random card from the set, avoiding the one served last.
    pub fn next<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<CardId> {
        let set = self.working_set.as_ref()?;
        if let [only] = set.as_slice() {
            return Some(*only);
        }
        let candidates: Vec<CardId> = set
            .iter()
            .copied()
            .filter(|id| Some(*id) != self.last_served)
            .collect();
        candidates.choose(rng).copied()
    }

    /// Keep the card in the set but avoid serving it next.
    pub fn on_again(&mut self, card_id: CardId) {
        self.last_served = Some(card_id);
    }

    /// Graduate the card out of the set.
    pub fn on_good(&mut self, card_id: CardId) {
        self.last_served = Some(card_id);
        if let Some(set) = self.working_set.as_mut() {
            set.retain(|&id| id != card_id);
        }
    }

    /// Record a grade: Again keeps the card, anything else graduates it.
    pub fn record(&mut self, card_id: CardId, rating: Rating) {
        match rating {
            Rating::Again => self.on_again(card_id),
            _ => self.on_good(card_id),
        }
    }
}

fn studied_ids(deck: &DeckData) -> Vec<CardId> {
    deck.schedule
        .keys()
        .copied()
        .filter(|id| !deck.is_ignored(*id))
        .collect()
}

fn ids_in_state(deck: &DeckData, state: CustomState) -> Vec<CardId> {
    deck.all_non_ignored_ids()
        .into_iter()
        .filter(|&id| deck.custom_state(id) == state)
        .collect()
}

fn sample<R: Rng + ?Sized>(ids: &[CardId], count: usize, rng: &mut R) -> Vec<CardId> {
    ids.choose_multiple(rng, count.min(ids.len()))
        .copied()
        .collect()
}

/// Materialize the working set for a request.
pub fn build_working_set<R: Rng + ?Sized>(
    deck: &DeckData,
    request: &ExtraStudyRequest,
    rng: &mut R,
) -> Result<Vec<CardId>> {
    let ids = match request {
        ExtraStudyRequest::StudiedCards { count } => sample(&studied_ids(deck), *count, rng),
        ExtraStudyRequest::HardCards { count } => {
            let mut cards: Vec<(CardId, f64)> = deck
                .schedule
                .iter()
                .filter(|(id, _)| !deck.is_ignored(**id))
                .map(|(id, card)| (*id, card.difficulty))
                .collect();
            cards.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            cards.into_iter().take(*count).map(|(id, _)| id).collect()
        }
        ExtraStudyRequest::NewCards { count } => {
            deck.new_cards().into_iter().take(*count).collect()
        }
        ExtraStudyRequest::YoungCards { count } => {
            sample(&ids_in_state(deck, CustomState::ReviewYoung), *count, rng)
        }
        ExtraStudyRequest::MatureCards { count } => {
            sample(&ids_in_state(deck, CustomState::ReviewMature), *count, rng)
        }
        ExtraStudyRequest::Group { group } => deck
            .group(group)
            .map(|g| g.card_ids.clone())
            .ok_or_else(|| CoreError::GroupNotFound(group.clone()))?,
    };
    Ok(ids)
}

/// Describe what a request would study.
pub fn describe(deck: &DeckData, request: &ExtraStudyRequest) -> Result<ExtraStudyDescription> {
    let (desc, subdesc) = match request {
        ExtraStudyRequest::StudiedCards { count } => {
            let all = studied_ids(deck).len();
            (
                format!("Study {} cards", (*count).min(all)),
                format!("(out of {all} cards that have been studied in this deck)"),
            )
        }
        ExtraStudyRequest::HardCards { count } => {
            let all = studied_ids(deck).len();
            (
                format!("Study {} hardest cards", (*count).min(all)),
                format!("(out of {all} cards that have been studied in this deck)"),
            )
        }
        ExtraStudyRequest::NewCards { count } => {
            let all = deck.new_card_count();
            (
                format!("Study the next {} new cards", (*count).min(all)),
                format!("(out of {all} new cards)"),
            )
        }
        ExtraStudyRequest::YoungCards { count } => {
            let all = ids_in_state(deck, CustomState::ReviewYoung).len();
            (
                format!("Study {} young cards", (*count).min(all)),
                format!("(out of {all} young cards)"),
            )
        }
        ExtraStudyRequest::MatureCards { count } => {
            let all = ids_in_state(deck, CustomState::ReviewMature).len();
            (
                format!("Study {} mature cards", (*count).min(all)),
                format!("(out of {all} mature cards)"),
            )
        }
        ExtraStudyRequest::Group { group } => {
            let found = deck
                .group(group)
                .ok_or_else(|| CoreError::GroupNotFound(group.clone()))?;
            (
                format!("Study {} cards from {group}", found.card_ids.len()),
                format!("(out of {} cards)", found.card_ids.len()),
            )
        }
    };
    Ok(ExtraStudyDescription { desc, subdesc })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Card, CardStatus};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn studied(difficulty: f64, scheduled_days: u32) -> Card {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        Card {
            state: CardStatus::Review,
            difficulty,
            stability: 5.0,
            scheduled_days,
            reps: 3,
            last_review: Some(now),
            ..Card::new(now)
        }
    }

    fn deck() -> DeckData {
        let mut deck = DeckData::new((0..40).map(|i| i.to_string()).collect(), Vec::new());
        deck.split_into_groups(30);
        deck.set_card(0, studied(3.0, 2));
        deck.set_card(1, studied(9.0, 2));
        deck.set_card(2, studied(6.0, 30));
        deck.set_card(3, studied(7.5, 45));
        deck
    }

    #[test]
    fn test_next_never_repeats_last_served() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut study = ExtraStudy::new();
        study.activate(vec![1, 2, 3]);

        let mut previous = None;
        for _ in 0..50 {
            let id = study.next(&mut rng).unwrap();
            assert_ne!(Some(id), previous);
            study.on_again(id);
            previous = Some(id);
        }
    }

    #[test]
    fn test_last_card_may_repeat() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut study = ExtraStudy::new();
        study.activate(vec![5, 6]);

        study.on_good(5);
        assert_eq!(study.remaining(), 1);
        study.on_again(6);
        assert_eq!(study.next(&mut rng), Some(6));
        assert_eq!(study.next(&mut rng), Some(6));

        study.record(6, Rating::Good);
        assert_eq!(study.next(&mut rng), None);
        assert!(study.is_active());

        study.deactivate();
        assert!(!study.is_active());
    }

    #[test]
    fn test_hard_cards_sorted_by_difficulty() {
        let mut rng = StdRng::seed_from_u64(0);
        let ids =
            build_working_set(&deck(), &ExtraStudyRequest::HardCards { count: 3 }, &mut rng)
                .unwrap();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn test_counts_clamped_to_pool() {
        let mut rng = StdRng::seed_from_u64(0);
        let deck = deck();

        let studied =
            build_working_set(&deck, &ExtraStudyRequest::StudiedCards { count: 99 }, &mut rng)
                .unwrap();
        assert_eq!(studied.len(), 4);

        let mut young =
            build_working_set(&deck, &ExtraStudyRequest::YoungCards { count: 10 }, &mut rng)
                .unwrap();
        young.sort();
        assert_eq!(young, vec![0, 1]);

        let mature =
            build_working_set(&deck, &ExtraStudyRequest::MatureCards { count: 1 }, &mut rng)
                .unwrap();
        assert_eq!(mature.len(), 1);
        assert!(mature[0] == 2 || mature[0] == 3);
    }

    #[test]
    fn test_new_cards_in_group_order() {
        let mut rng = StdRng::seed_from_u64(0);
        let ids = build_working_set(&deck(), &ExtraStudyRequest::NewCards { count: 3 }, &mut rng)
            .unwrap();
        assert_eq!(ids, vec![4, 5, 6]);
    }

    #[test]
    fn test_group_request() {
        let mut rng = StdRng::seed_from_u64(0);
        let deck = deck();
        let ids = build_working_set(
            &deck,
            &ExtraStudyRequest::Group { group: "group-2".into() },
            &mut rng,
        )
        .unwrap();
        assert_eq!(ids, (30..40).collect::<Vec<_>>());

        let missing = ExtraStudyRequest::Group { group: "group-9".into() };
        assert!(matches!(
            build_working_set(&deck, &missing, &mut rng),
            Err(CoreError::GroupNotFound(_))
        ));
        assert!(describe(&deck, &missing).is_err());
    }

    #[test]
    fn test_describe() {
        let description = describe(&deck(), &ExtraStudyRequest::YoungCards { count: 5 }).unwrap();
        assert_eq!(description.desc, "Study 2 young cards");
        assert_eq!(description.subdesc, "(out of 2 young cards)");
    }

    #[test]
    fn test_request_wire_format() {
        let request: ExtraStudyRequest =
            serde_json::from_str(r#"{"type":"Hard Cards","count":5}"#).unwrap();
        assert_eq!(request, ExtraStudyRequest::HardCards { count: 5 });
    }
}
