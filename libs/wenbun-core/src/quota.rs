//! Daily quota tracking.
//!
//! Counters reset once per local calendar day. Remaining quotas are clamped
//! at zero so lowering a limit mid-day never produces a negative count.

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::Config;
use crate::deck::DeckData;

/// Whether any deck was last checked on an earlier local day.
pub fn needs_daily_reset<'a>(
    decks: impl IntoIterator<Item = &'a DeckData>,
    clock: &dyn Clock,
) -> bool {
    let today = clock.day_index(clock.now());
    decks
        .into_iter()
        .any(|deck| clock.day_index(deck.last_schedule_check_date) < today)
}

/// Zero the day's counters if the deck's check date is stale.
///
/// Returns whether the deck was reset.
pub fn apply_daily_reset(deck: &mut DeckData, clock: &dyn Clock) -> bool {
    let now = clock.now();
    if clock.day_index(deck.last_schedule_check_date) >= clock.day_index(now) {
        return false;
    }
    deck.done_today_new_card_count = 0;
    deck.done_today_previously_studied_card_count = 0;
    deck.done_today_review_count = 0;
    deck.last_schedule_check_date = clock.start_of_day(clock.local_date(now));
    true
}

fn remaining(pool: usize, limit: u32, done: u32) -> usize {
    let left = i64::from(limit) - i64::from(done);
    (pool as i64).min(left).max(0) as usize
}

pub fn scheduled_new_or_warm_up_count(deck: &DeckData, config: &Config) -> usize {
    remaining(
        deck.new_card_count() + deck.warm_up_card_count(),
        config.new_card_per_day,
        deck.done_today_new_card_count,
    )
}

/// New-card share of the new-or-warm-up quota, may be negative when warm-up
/// cards alone exceed it.
pub fn scheduled_new_count(deck: &DeckData, config: &Config) -> i64 {
    scheduled_new_or_warm_up_count(deck, config) as i64 - deck.warm_up_card_count() as i64
}

pub fn scheduled_previously_studied_count(deck: &DeckData, config: &Config) -> usize {
    remaining(
        deck.previously_studied_count(),
        config.new_previously_studied_card_per_day,
        deck.done_today_previously_studied_card_count,
    )
}

pub fn scheduled_review_count(deck: &DeckData, config: &Config, clock: &dyn Clock) -> usize {
    remaining(
        deck.todays_review_cards(clock).len(),
        config.max_reviews_per_day,
        deck.done_today_review_count,
    )
}

/// Snapshot of today's remaining quotas for one deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyQuota {
    pub new_or_warm_up: usize,
    pub previously_studied: usize,
    pub review: usize,
    pub learning: usize,
}

impl DailyQuota {
    pub fn compute(deck: &DeckData, config: &Config, clock: &dyn Clock) -> Self {
        Self {
            new_or_warm_up: scheduled_new_or_warm_up_count(deck, config),
            previously_studied: scheduled_previously_studied_count(deck, config),
            review: scheduled_review_count(deck, config, clock),
            learning: deck.learning_relearning_count(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.new_or_warm_up == 0 && self.previously_studied == 0 && self.review == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::types::{Card, CardStatus};
    use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn deck(n: usize) -> DeckData {
        DeckData::new((0..n).map(|i| i.to_string()).collect(), Vec::new())
    }

    fn due_review(due: DateTime<Utc>) -> Card {
        Card {
            state: CardStatus::Review,
            stability: 4.0,
            difficulty: 5.0,
            scheduled_days: 4,
            reps: 3,
            last_review: Some(due - Duration::days(4)),
            ..Card::new(due)
        }
    }

    #[test]
    fn test_reset_zeroes_counters_and_moves_check_date() {
        let offset = FixedOffset::east_opt(-5 * 3600).unwrap();
        let clock = FixedClock::new(now(), offset);
        let mut deck = deck(3);
        deck.done_today_new_card_count = 4;
        deck.done_today_previously_studied_card_count = 2;
        deck.done_today_review_count = 9;

        assert!(needs_daily_reset([&deck], &clock));
        assert!(apply_daily_reset(&mut deck, &clock));

        assert_eq!(deck.done_today_new_card_count, 0);
        assert_eq!(deck.done_today_previously_studied_card_count, 0);
        assert_eq!(deck.done_today_review_count, 0);
        assert_eq!(clock.local_date(deck.last_schedule_check_date), clock.today());
        assert_eq!(
            deck.last_schedule_check_date,
            Utc.with_ymd_and_hms(2024, 5, 1, 5, 0, 0).unwrap()
        );
        assert!(!needs_daily_reset([&deck], &clock));
    }

    #[test]
    fn test_reset_is_noop_on_same_day() {
        let clock = FixedClock::utc(now());
        let mut deck = deck(3);
        apply_daily_reset(&mut deck, &clock);
        deck.done_today_new_card_count = 2;

        clock.advance(Duration::hours(10));
        assert!(!apply_daily_reset(&mut deck, &clock));
        assert_eq!(deck.done_today_new_card_count, 2);

        clock.advance(Duration::hours(6));
        assert!(apply_daily_reset(&mut deck, &clock));
        assert_eq!(deck.done_today_new_card_count, 0);
    }

    #[test]
    fn test_quotas_never_negative() {
        let clock = FixedClock::utc(now());
        let config = Config {
            new_card_per_day: 2,
            new_previously_studied_card_per_day: 1,
            max_reviews_per_day: 1,
            ..Config::default()
        };
        let mut deck = deck(10);
        deck.add_previously_studied_mark(9);
        deck.set_card(0, due_review(now()));
        deck.done_today_new_card_count = 7;
        deck.done_today_previously_studied_card_count = 3;
        deck.done_today_review_count = 5;

        let quota = DailyQuota::compute(&deck, &config, &clock);
        assert_eq!(quota.new_or_warm_up, 0);
        assert_eq!(quota.previously_studied, 0);
        assert_eq!(quota.review, 0);
        assert!(quota.is_done());
    }

    #[test]
    fn test_quotas_bounded_by_pool_size() {
        let clock = FixedClock::utc(now());
        let config = Config::default();
        let mut deck = deck(3);
        deck.add_previously_studied_mark(2);
        deck.set_card(0, due_review(now() - Duration::days(1)));

        assert_eq!(scheduled_new_or_warm_up_count(&deck, &config), 1);
        assert_eq!(scheduled_previously_studied_count(&deck, &config), 1);
        assert_eq!(scheduled_review_count(&deck, &config, &clock), 1);
    }

    #[test]
    fn test_scheduled_new_count_excludes_warm_up() {
        let config = Config {
            new_card_per_day: 3,
            ..Config::default()
        };
        let mut deck = deck(10);
        deck.start_warm_up(0);
        deck.start_warm_up(1);

        assert_eq!(scheduled_new_or_warm_up_count(&deck, &config), 3);
        assert_eq!(scheduled_new_count(&deck, &config), 1);
    }

    #[test]
    fn test_learning_cards_do_not_count_as_reviews() {
        let clock = FixedClock::utc(now());
        let mut deck = deck(2);
        deck.set_card(
            0,
            Card {
                state: CardStatus::Learning,
                ..Card::new(now())
            },
        );
        assert_eq!(scheduled_review_count(&deck, &Config::default(), &clock), 0);
        assert_eq!(DailyQuota::compute(&deck, &Config::default(), &clock).learning, 1);
    }
}
