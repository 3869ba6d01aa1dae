//! Next-card selection.
//!
//! Draws at most one candidate from each pool (new or warm-up, previously
//! studied, due today) and orders them by the configured interleave policy.

use std::collections::VecDeque;

use rand::Rng;

use crate::clock::Clock;
use crate::config::Config;
use crate::deck::DeckData;
use crate::quota::{scheduled_new_count, DailyQuota};
use crate::types::{CardId, InterleaveOrder};

/// Pick the next card to study, or `None` when today's work is done.
pub fn next_card<R: Rng + ?Sized>(
    deck: &DeckData,
    config: &Config,
    clock: &dyn Clock,
    rng: &mut R,
) -> Option<CardId> {
    let quota = DailyQuota::compute(deck, config, clock);

    let new_or_warm_up = if quota.new_or_warm_up > 0 {
        new_or_warm_up_card(deck, config, rng)
    } else {
        None
    };
    let previously_studied = if quota.previously_studied > 0 {
        deck.previously_studied_card(config.start_previously_studied_card_from_the_back)
    } else {
        None
    };
    let due_today = if quota.review > 0 {
        deck.todays_scheduled_cards(clock).first().copied()
    } else {
        None
    };

    let mut head = Vec::new();
    let mut mid = VecDeque::from([due_today]);
    let mut tail = Vec::new();

    let pools = [
        (config.new_card_order, new_or_warm_up, quota.new_or_warm_up),
        (
            config.new_previously_studied_card_order,
            previously_studied,
            quota.previously_studied,
        ),
    ];
    for (order, candidate, pool_count) in pools {
        match order {
            InterleaveOrder::BeforeReviews => head.push(candidate),
            InterleaveOrder::AfterReviews => tail.push(candidate),
            InterleaveOrder::Mix => {
                if rng.gen::<f64>() < mix_probability(pool_count, quota.review) {
                    mid.push_front(candidate);
                } else {
                    mid.push_back(candidate);
                }
            }
        }
    }

    head.into_iter().chain(mid).chain(tail).flatten().next()
}

/// Chance of placing a pool's candidate ahead of today's reviews.
fn mix_probability(pool_count: usize, due_count: usize) -> f64 {
    let total = pool_count + due_count;
    if total == 0 {
        return 0.0;
    }
    pool_count as f64 / total as f64
}

/// Next New card or a random warm-up card, weighted by pool sizes.
///
/// Once the new-card share of the quota is used up, only warm-up cards are
/// served.
pub fn new_or_warm_up_card<R: Rng + ?Sized>(
    deck: &DeckData,
    config: &Config,
    rng: &mut R,
) -> Option<CardId> {
    let new_card = deck.next_new_card();
    let warm_up_ids: Vec<CardId> = deck.warm_up_ids.keys().copied().collect();
    if warm_up_ids.is_empty() {
        return new_card;
    }
    let warm_up = warm_up_ids[rng.gen_range(0..warm_up_ids.len())];

    if scheduled_new_count(deck, config) <= 0 {
        return Some(warm_up);
    }

    let new_count = deck.new_card_count();
    let share = new_count as f64 / (new_count + warm_up_ids.len()) as f64;
    if rng.gen::<f64>() < share {
        new_card
    } else {
        Some(warm_up)
    }
}
