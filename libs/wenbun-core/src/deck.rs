//! Per-deck scheduler state: content, groups, schedule, marks and counters.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::algorithm::format_delta;
use crate::clock::Clock;
use crate::types::{Card, CardId, CardStatus, CustomState};

pub const DEFAULT_GROUP_CONTENT_COUNT: usize = 30;
pub const MAX_WARM_UP_COUNT: u32 = 3;
/// Review cards scheduled at least this many days out count as mature.
pub const MATURE_INTERVAL_DAYS: u32 = 21;
pub const UNGROUPED_GROUP: &str = "__ungrouped__";

/// An ordered, labeled slice of a deck's ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Group {
    pub label: String,
    pub card_ids: Vec<CardId>,
}

/// Everything the scheduler tracks for one deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeckData {
    pub deck: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub previously_studied: Vec<CardId>,
    #[serde(default)]
    pub ignored_ids: BTreeSet<CardId>,
    #[serde(default)]
    pub warm_up_ids: BTreeMap<CardId, u32>,
    pub groups: Vec<Group>,
    #[serde(default)]
    pub schedule: BTreeMap<CardId, Card>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_schedule_check_date: DateTime<Utc>,
    #[serde(default)]
    pub done_today_new_card_count: u32,
    #[serde(default)]
    pub done_today_previously_studied_card_count: u32,
    #[serde(default)]
    pub done_today_review_count: u32,
}

/// Absolute progress counts for a deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckProgress {
    pub total_count: usize,
    pub previously_studied_count: usize,
    pub young_count: usize,
    pub mature_count: usize,
    pub ignored_count: usize,
}

/// Progress as percentages of the deck size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeckProgressPercent {
    pub young: f64,
    pub mature: f64,
    pub previously_studied: f64,
    pub ignored: f64,
    pub rest: f64,
}

impl DeckProgress {
    pub fn normalized(&self) -> DeckProgressPercent {
        let total = self.total_count.max(1) as f64;
        let pct = |n: usize| n as f64 / total * 100.0;
        let rest = self.total_count.saturating_sub(
            self.young_count + self.mature_count + self.previously_studied_count + self.ignored_count,
        );
        DeckProgressPercent {
            young: pct(self.young_count),
            mature: pct(self.mature_count),
            previously_studied: pct(self.previously_studied_count),
            ignored: pct(self.ignored_count),
            rest: pct(rest),
        }
    }
}

impl DeckData {
    /// Fresh deck: one ungrouped group, empty schedule, stale check date.
    pub fn new(items: Vec<String>, tags: Vec<String>) -> Self {
        let ids = (0..items.len() as CardId).collect();
        Self {
            deck: items,
            tags,
            previously_studied: Vec::new(),
            ignored_ids: BTreeSet::new(),
            warm_up_ids: BTreeMap::new(),
            groups: vec![Group {
                label: UNGROUPED_GROUP.to_string(),
                card_ids: ids,
            }],
            schedule: BTreeMap::new(),
            last_schedule_check_date: DateTime::<Utc>::UNIX_EPOCH,
            done_today_new_card_count: 0,
            done_today_previously_studied_card_count: 0,
            done_today_review_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.deck.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deck.is_empty()
    }

    pub fn contains(&self, card_id: CardId) -> bool {
        (card_id as usize) < self.deck.len()
    }

    pub fn item(&self, card_id: CardId) -> Option<&str> {
        self.deck.get(card_id as usize).map(String::as_str)
    }

    pub fn card(&self, card_id: CardId) -> Option<&Card> {
        self.schedule.get(&card_id)
    }

    pub fn set_card(&mut self, card_id: CardId, card: Card) {
        self.schedule.insert(card_id, card);
    }

    pub fn custom_state(&self, card_id: CardId) -> CustomState {
        if self.warm_up_ids.contains_key(&card_id) {
            return CustomState::WarmUp;
        }
        if self.is_previously_studied(card_id) {
            return CustomState::PreviouslyStudied;
        }
        if self.is_ignored(card_id) {
            return CustomState::Ignored;
        }
        match self.card(card_id) {
            Some(card) => match card.state {
                CardStatus::New => CustomState::New,
                CardStatus::Learning => CustomState::Learning,
                CardStatus::Relearning => CustomState::Relearning,
                CardStatus::Review if card.scheduled_days >= MATURE_INTERVAL_DAYS => {
                    CustomState::ReviewMature
                }
                CardStatus::Review => CustomState::ReviewYoung,
            },
            None => CustomState::New,
        }
    }

    /// Ids in the New pool, in group order.
    pub fn new_cards(&self) -> Vec<CardId> {
        self.grouped_ids()
            .filter(|&id| self.custom_state(id) == CustomState::New)
            .collect()
    }

    pub fn next_new_card(&self) -> Option<CardId> {
        self.grouped_ids()
            .find(|&id| self.custom_state(id) == CustomState::New)
    }

    pub fn new_card_count(&self) -> usize {
        self.new_cards().len()
    }

    fn grouped_ids(&self) -> impl Iterator<Item = CardId> + '_ {
        self.groups.iter().flat_map(|g| g.card_ids.iter().copied())
    }

    // Warm-up

    /// Begin drilling a card. Previously-studied and ignored cards are refused.
    pub fn start_warm_up(&mut self, card_id: CardId) -> bool {
        if !self.contains(card_id) || self.is_previously_studied(card_id) || self.is_ignored(card_id)
        {
            return false;
        }
        self.warm_up_ids.insert(card_id, 0);
        true
    }

    pub fn warm_up_next(&mut self, card_id: CardId) {
        if let Some(count) = self.warm_up_ids.get_mut(&card_id) {
            *count += 1;
        }
    }

    /// Jump a card straight to a completed warm-up.
    pub fn skip_warm_up(&mut self, card_id: CardId) -> bool {
        if !self.start_warm_up(card_id) {
            return false;
        }
        self.warm_up_ids.insert(card_id, MAX_WARM_UP_COUNT);
        true
    }

    pub fn stop_warm_up(&mut self, card_id: CardId) {
        self.warm_up_ids.remove(&card_id);
    }

    pub fn warm_up_count(&self, card_id: CardId) -> Option<u32> {
        self.warm_up_ids.get(&card_id).copied()
    }

    pub fn is_warm_up(&self, card_id: CardId) -> bool {
        self.warm_up_ids.contains_key(&card_id)
    }

    pub fn is_warm_up_complete(&self, card_id: CardId) -> bool {
        self.warm_up_count(card_id)
            .is_some_and(|count| count >= MAX_WARM_UP_COUNT)
    }

    pub fn warm_up_card_count(&self) -> usize {
        self.warm_up_ids.len()
    }

    // Previously studied

    pub fn is_previously_studied(&self, card_id: CardId) -> bool {
        self.previously_studied.contains(&card_id)
    }

    /// Only cards still in the New pool can be marked.
    pub fn add_previously_studied_mark(&mut self, card_id: CardId) -> bool {
        if !self.contains(card_id) || self.custom_state(card_id) != CustomState::New {
            return false;
        }
        self.previously_studied.push(card_id);
        true
    }

    pub fn remove_previously_studied_mark(&mut self, card_id: CardId) -> bool {
        match self.previously_studied.iter().position(|&id| id == card_id) {
            Some(index) => {
                self.previously_studied.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn previously_studied_card(&self, from_back: bool) -> Option<CardId> {
        if from_back {
            self.previously_studied.last().copied()
        } else {
            self.previously_studied.first().copied()
        }
    }

    pub fn previously_studied_count(&self) -> usize {
        self.previously_studied.len()
    }

    // Ignored

    pub fn is_ignored(&self, card_id: CardId) -> bool {
        self.ignored_ids.contains(&card_id)
    }

    /// Ignoring a card drops any warm-up or previously-studied mark.
    pub fn add_ignored_mark(&mut self, card_id: CardId) -> bool {
        if !self.contains(card_id) {
            return false;
        }
        self.stop_warm_up(card_id);
        self.remove_previously_studied_mark(card_id);
        self.ignored_ids.insert(card_id)
    }

    pub fn remove_ignored_mark(&mut self, card_id: CardId) -> bool {
        self.ignored_ids.remove(&card_id)
    }

    pub fn all_non_ignored_ids(&self) -> Vec<CardId> {
        (0..self.deck.len() as CardId)
            .filter(|id| !self.is_ignored(*id))
            .collect()
    }

    // Today's cards

    /// Non-ignored cards due by the end of today, plus every learning or
    /// relearning card, sorted by due time.
    pub fn todays_scheduled_cards(&self, clock: &dyn Clock) -> Vec<CardId> {
        let tomorrow = clock.day_index(clock.now()) + 1;
        let mut cards: Vec<(CardId, DateTime<Utc>)> = self
            .schedule
            .iter()
            .filter(|(id, _)| !self.is_ignored(**id))
            .filter(|(_, card)| match card.state {
                CardStatus::Review => clock.day_index(card.due) < tomorrow,
                CardStatus::Learning | CardStatus::Relearning => true,
                CardStatus::New => false,
            })
            .map(|(id, card)| (*id, card.due))
            .collect();
        cards.sort_by_key(|&(id, due)| (due, id));
        cards.into_iter().map(|(id, _)| id).collect()
    }

    pub fn todays_review_cards(&self, clock: &dyn Clock) -> Vec<CardId> {
        self.todays_scheduled_cards(clock)
            .into_iter()
            .filter(|id| {
                self.card(*id)
                    .is_some_and(|card| card.state == CardStatus::Review)
            })
            .collect()
    }

    pub fn learning_relearning_count(&self) -> usize {
        self.schedule
            .values()
            .filter(|c| matches!(c.state, CardStatus::Learning | CardStatus::Relearning))
            .count()
    }

    /// Human-readable due label for a card.
    pub fn card_due_label(&self, card_id: CardId, now: DateTime<Utc>) -> String {
        if self.is_warm_up(card_id) {
            return "Warm Up".to_string();
        }
        match self.card(card_id) {
            Some(card) => format_delta(now, card.due),
            None => "Not Started".to_string(),
        }
    }

    // Groups

    /// Re-partition all ids into consecutive `group-N` chunks.
    pub fn split_into_groups(&mut self, size: usize) {
        let size = size.max(1);
        let ids: Vec<CardId> = (0..self.deck.len() as CardId).collect();
        self.groups = ids
            .chunks(size)
            .enumerate()
            .map(|(i, chunk)| Group {
                label: format!("group-{}", i + 1),
                card_ids: chunk.to_vec(),
            })
            .collect();
    }

    pub fn group_labels(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.label.as_str()).collect()
    }

    pub fn group(&self, label: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.label == label)
    }

    pub fn progress(&self) -> DeckProgress {
        let ids = self.all_non_ignored_ids();
        let count = |state: CustomState| {
            ids.iter()
                .filter(|&&id| self.custom_state(id) == state)
                .count()
        };
        DeckProgress {
            total_count: self.deck.len(),
            previously_studied_count: self.previously_studied.len(),
            young_count: count(CustomState::ReviewYoung),
            mature_count: count(CustomState::ReviewMature),
            ignored_count: self.ignored_ids.len(),
        }
    }

    /// Every id referenced by groups, marks and schedule is in range, and no
    /// id carries two custom marks.
    pub fn check_consistency(&self) -> Result<(), String> {
        let len = self.deck.len();
        let in_range = |id: &CardId| (*id as usize) < len;

        if let Some(id) = self
            .groups
            .iter()
            .flat_map(|g| g.card_ids.iter())
            .chain(self.previously_studied.iter())
            .chain(self.ignored_ids.iter())
            .chain(self.warm_up_ids.keys())
            .chain(self.schedule.keys())
            .find(|id| !in_range(id))
        {
            return Err(format!("card id {id} out of range for {len} items"));
        }

        for id in self.warm_up_ids.keys() {
            if self.is_previously_studied(*id) || self.is_ignored(*id) {
                return Err(format!("card {id} is both warm-up and marked"));
            }
        }
        if let Some(id) = self.previously_studied.iter().find(|id| self.is_ignored(**id)) {
            return Err(format!("card {id} is both previously studied and ignored"));
        }
        Ok(())
    }
}
