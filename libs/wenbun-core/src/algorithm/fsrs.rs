//! FSRS-6 (Free Spaced Repetition Scheduler).
//!
//! Memory model using three variables:
//! - Difficulty (D): card difficulty 1-10
//! - Stability (S): days until retrievability decays to 90%
//! - Retrievability (R): probability of recall after `t` days
//!
//! New, learning and relearning cards walk through minute/hour based steps
//! before graduating to day-based review intervals.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::steps::parse_steps;
use super::{GradeOutcome, RecallEngine, RecordLog};
use crate::config::Config;
use crate::error::Result;
use crate::types::{Card, CardStatus, Rating, ReviewLog};

/// Default FSRS-6 weights.
pub const DEFAULT_PARAMS: [f64; 21] = [
    0.212, 1.2931, 2.3065, 8.2956, // w[0-3]: initial stability for Again, Hard, Good, Easy
    6.4133, // w[4]: initial difficulty base
    0.8334, // w[5]: initial difficulty slope
    3.0194, // w[6]: difficulty delta per grade
    0.001,  // w[7]: mean reversion weight
    1.8722, // w[8]: recall stability exp base
    0.1666, // w[9]: recall stability decay
    0.796,  // w[10]: retrievability effect on recall
    1.4835, // w[11]: forget stability base
    0.0614, // w[12]: difficulty effect on forget
    0.2629, // w[13]: stability effect on forget
    1.6483, // w[14]: retrievability effect on forget
    0.6014, // w[15]: hard penalty
    1.8729, // w[16]: easy bonus
    0.5425, // w[17]: short-term stability rate
    0.0912, // w[18]: short-term grade offset
    0.0658, // w[19]: short-term stability decay
    0.1542, // w[20]: forgetting curve decay
];

pub const DEFAULT_MAXIMUM_INTERVAL: u32 = 36500;

const MIN_STABILITY: f64 = 0.01;

/// Interval ranges and their fuzz factor.
const FUZZ_RANGES: [(f64, f64, f64); 3] = [
    (2.5, 7.0, 0.15),
    (7.0, 20.0, 0.1),
    (20.0, f64::INFINITY, 0.05),
];

/// FSRS-6 engine with its parameters and step lists.
#[derive(Debug, Clone)]
pub struct Fsrs {
    pub request_retention: f64,
    pub maximum_interval: u32,
    pub w: [f64; 21],
    pub enable_fuzz: bool,
    pub enable_short_term: bool,
    pub learning_steps: Vec<Duration>,
    pub relearning_steps: Vec<Duration>,
}

impl Default for Fsrs {
    fn default() -> Self {
        Self {
            request_retention: 0.9,
            maximum_interval: DEFAULT_MAXIMUM_INTERVAL,
            w: DEFAULT_PARAMS,
            enable_fuzz: false,
            enable_short_term: false,
            learning_steps: vec![Duration::minutes(1), Duration::minutes(10)],
            relearning_steps: vec![Duration::minutes(10)],
        }
    }
}

/// Stability and difficulty after a grade.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MemoryState {
    stability: f64,
    difficulty: f64,
}

/// Where a grade sends the card next.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Next {
    /// Stay in (re)learning at `step`, due after `after`.
    Step {
        state: CardStatus,
        step: u32,
        after: Duration,
    },
    /// Review state, due after `days`.
    Review { days: u32 },
}

impl Fsrs {
    /// Build an engine from the user config and a learning-step list.
    pub fn from_config(config: &Config, learning_steps: &[String]) -> Result<Self> {
        config.validate()?;
        let mut w = DEFAULT_PARAMS;
        w.copy_from_slice(&config.fsrs_params);
        Ok(Self {
            request_retention: config.desired_retention,
            w,
            enable_fuzz: config.enable_fuzz,
            enable_short_term: config.enable_short_term,
            learning_steps: parse_steps(learning_steps)?,
            ..Self::default()
        })
    }

    fn decay(&self) -> f64 {
        -self.w[20]
    }

    fn factor(&self) -> f64 {
        0.9f64.powf(1.0 / self.decay()) - 1.0
    }

    /// R(t, S) = (1 + factor * t / S)^decay
    pub fn forgetting_curve(&self, elapsed_days: f64, stability: f64) -> f64 {
        if stability <= 0.0 {
            return 0.0;
        }
        (1.0 + self.factor() * elapsed_days / stability).powf(self.decay())
    }

    /// S0(G) = w[G-1]
    fn initial_stability(&self, rating: Rating) -> f64 {
        let index = usize::from(rating.to_value() - 1);
        self.w[index].max(0.1)
    }

    /// D0(G) = w[4] - e^((G-1) * w[5]) + 1, unclamped.
    fn raw_initial_difficulty(&self, rating: Rating) -> f64 {
        let g = f64::from(rating.to_value());
        self.w[4] - ((g - 1.0) * self.w[5]).exp() + 1.0
    }

    fn initial_difficulty(&self, rating: Rating) -> f64 {
        self.raw_initial_difficulty(rating).clamp(1.0, 10.0)
    }

    /// Linear damping toward 10, then mean reversion toward D0(Easy).
    fn next_difficulty(&self, difficulty: f64, rating: Rating) -> f64 {
        let g = f64::from(rating.to_value());
        let delta = -self.w[6] * (g - 3.0);
        let damped = difficulty + delta * (10.0 - difficulty) / 9.0;
        let reverted = self.w[7] * self.raw_initial_difficulty(Rating::Easy)
            + (1.0 - self.w[7]) * damped;
        reverted.clamp(1.0, 10.0)
    }

    /// S' = S * (e^w[8] * (11 - D) * S^-w[9] * (e^(w[10] * (1 - R)) - 1) * modifier + 1)
    fn next_recall_stability(&self, s: f64, d: f64, r: f64, rating: Rating) -> f64 {
        let modifier = match rating {
            Rating::Hard => self.w[15],
            Rating::Easy => self.w[16],
            _ => 1.0,
        };
        let growth = self.w[8].exp()
            * (11.0 - d)
            * s.powf(-self.w[9])
            * (((1.0 - r) * self.w[10]).exp() - 1.0)
            * modifier;
        s * (1.0 + growth)
    }

    /// S' = w[11] * D^-w[12] * ((S + 1)^w[13] - 1) * e^(w[14] * (1 - R)),
    /// capped by the short-term floor.
    fn next_forget_stability(&self, s: f64, d: f64, r: f64) -> f64 {
        let forgotten = self.w[11]
            * d.powf(-self.w[12])
            * ((s + 1.0).powf(self.w[13]) - 1.0)
            * ((1.0 - r) * self.w[14]).exp();
        let cap = s / (self.w[17] * self.w[18]).exp();
        forgotten.min(cap)
    }

    /// Same-day review: S' = S * e^(w[17] * (G - 3 + w[18])) * S^-w[19]
    fn next_short_term_stability(&self, s: f64, rating: Rating) -> f64 {
        let g = f64::from(rating.to_value());
        let mut increase = (self.w[17] * (g - 3.0 + self.w[18])).exp() * s.powf(-self.w[19]);
        if rating >= Rating::Good {
            increase = increase.max(1.0);
        }
        s * increase
    }

    fn next_memory_state(&self, card: &Card, elapsed_days: u32, rating: Rating) -> MemoryState {
        if card.state == CardStatus::New || card.stability <= 0.0 {
            return MemoryState {
                stability: self.initial_stability(rating),
                difficulty: self.initial_difficulty(rating),
            };
        }

        let s = card.stability;
        let d = card.difficulty.clamp(1.0, 10.0);
        let r = self.forgetting_curve(f64::from(elapsed_days), s);
        let stability = if elapsed_days == 0 && self.enable_short_term {
            self.next_short_term_stability(s, rating)
        } else if rating == Rating::Again {
            self.next_forget_stability(s, d, r)
        } else {
            self.next_recall_stability(s, d, r, rating)
        };

        MemoryState {
            stability: stability.max(MIN_STABILITY),
            difficulty: self.next_difficulty(d, rating),
        }
    }

    /// Optimal interval in days for `stability` at the requested retention.
    fn raw_interval(&self, stability: f64) -> f64 {
        stability / self.factor() * (self.request_retention.powf(1.0 / self.decay()) - 1.0)
    }

    fn next_interval(&self, stability: f64, elapsed_days: u32, fuzz: f64) -> u32 {
        let max = f64::from(self.maximum_interval);
        let interval = self.raw_interval(stability).round().clamp(1.0, max);
        let days = if self.enable_fuzz {
            self.apply_fuzz(interval, elapsed_days, fuzz)
        } else {
            interval
        };
        days.clamp(1.0, max) as u32
    }

    fn apply_fuzz(&self, interval: f64, elapsed_days: u32, fuzz: f64) -> f64 {
        if interval < 2.5 {
            return interval;
        }
        let delta = FUZZ_RANGES.iter().fold(1.0, |acc, &(start, end, factor)| {
            acc + factor * (interval.min(end) - start).max(0.0)
        });
        let elapsed = f64::from(elapsed_days);
        let mut min_ivl = (interval - delta).round().max(2.0);
        let max_ivl = (interval + delta).round().min(f64::from(self.maximum_interval));
        if interval > elapsed {
            min_ivl = min_ivl.max(elapsed + 1.0);
        }
        min_ivl = min_ivl.min(max_ivl);
        (fuzz * (max_ivl - min_ivl + 1.0) + min_ivl).floor()
    }

    /// Deterministic fuzz factor in [0, 1) for a card at a given review time.
    fn fuzz_factor(card: &Card, now: DateTime<Utc>) -> f64 {
        let seed = (now.timestamp_millis() as u64)
            ^ (u64::from(card.reps) << 40)
            ^ (card.difficulty * 1000.0) as u64
            ^ ((card.stability * 1000.0) as u64).rotate_left(20);
        StdRng::seed_from_u64(seed).gen::<f64>()
    }

    fn elapsed_days(card: &Card, now: DateTime<Utc>) -> u32 {
        match card.last_review {
            Some(last) if card.state != CardStatus::New => {
                u32::try_from((now - last).num_days().max(0)).unwrap_or(u32::MAX)
            }
            _ => 0,
        }
    }

    /// Step transition for new/learning/relearning cards. `None` graduates.
    fn step_transition(&self, card: &Card, rating: Rating) -> Option<Next> {
        let steps = match card.state {
            CardStatus::Relearning => &self.relearning_steps,
            _ => &self.learning_steps,
        };
        if steps.is_empty() {
            return None;
        }
        let (state, current) = match card.state {
            CardStatus::New => (CardStatus::Learning, 0),
            other => (other, card.learning_steps as usize),
        };

        match rating {
            Rating::Again => Some(Next::Step {
                state,
                step: 0,
                after: steps[0],
            }),
            Rating::Hard => {
                let current = current.min(steps.len() - 1);
                let after = match (current, steps.len()) {
                    (0, 1) => (steps[0] * 3 / 2).min(steps[0] + Duration::days(1)),
                    (0, _) => (steps[0] + steps[1]) / 2,
                    (i, _) => steps[i],
                };
                Some(Next::Step {
                    state,
                    step: current as u32,
                    after,
                })
            }
            Rating::Good => {
                let next = current + 1;
                (next < steps.len()).then(|| Next::Step {
                    state,
                    step: next as u32,
                    after: steps[next],
                })
            }
            Rating::Easy => None,
        }
    }

    fn transitions(
        &self,
        card: &Card,
        memory: &[MemoryState; 4],
        elapsed_days: u32,
        fuzz: f64,
    ) -> [Next; 4] {
        let graduate = |rating: Rating| Next::Review {
            days: self.next_interval(memory[index(rating)].stability, elapsed_days, fuzz),
        };

        let mut next = Rating::ALL.map(|rating| match card.state {
            CardStatus::Review if rating == Rating::Again => match self.relearning_steps.first() {
                Some(&after) => Next::Step {
                    state: CardStatus::Relearning,
                    step: 0,
                    after,
                },
                None => graduate(rating),
            },
            CardStatus::Review => graduate(rating),
            _ => self
                .step_transition(card, rating)
                .unwrap_or_else(|| graduate(rating)),
        });

        // Keep hard <= good < easy among day intervals.
        let [_, hard, good, easy] = &mut next;
        if let (Next::Review { days: h }, Next::Review { days: g }) = (&mut *hard, &mut *good) {
            *h = (*h).min(*g);
            *g = (*g).max(*h + 1).min(self.maximum_interval);
        }
        if let (Next::Review { days: g }, Next::Review { days: e }) = (&*good, &mut *easy) {
            *e = (*e).max(*g + 1).min(self.maximum_interval);
        }
        next
    }

    fn outcome(
        card: &Card,
        rating: Rating,
        memory: MemoryState,
        next: Next,
        elapsed_days: u32,
        now: DateTime<Utc>,
    ) -> GradeOutcome {
        let (state, learning_steps, due, scheduled_days) = match next {
            Next::Step { state, step, after } => {
                let days = u32::try_from(after.num_days()).unwrap_or(0);
                (state, step, due_after(now, after), days)
            }
            Next::Review { days } => (
                CardStatus::Review,
                0,
                due_after(now, Duration::days(i64::from(days))),
                days,
            ),
        };
        let lapses = if card.state == CardStatus::Review && rating == Rating::Again {
            card.lapses + 1
        } else {
            card.lapses
        };

        GradeOutcome {
            card: Card {
                due,
                stability: memory.stability,
                difficulty: memory.difficulty,
                elapsed_days,
                scheduled_days,
                learning_steps,
                reps: card.reps + 1,
                lapses,
                state,
                last_review: Some(now),
            },
            log: ReviewLog {
                rating,
                state: card.state,
                due: card.due,
                stability: card.stability,
                difficulty: card.difficulty,
                elapsed_days,
                last_elapsed_days: card.elapsed_days,
                scheduled_days: card.scheduled_days,
                learning_steps: card.learning_steps,
                review: now,
            },
        }
    }
}

/// `now + after`, clamped to the longest interval when the sum leaves chrono's range.
fn due_after(now: DateTime<Utc>, after: Duration) -> DateTime<Utc> {
    now.checked_add_signed(after)
        .or_else(|| now.checked_add_signed(Duration::days(i64::from(DEFAULT_MAXIMUM_INTERVAL))))
        .unwrap_or(now)
}

fn index(rating: Rating) -> usize {
    usize::from(rating.to_value() - 1)
}

impl RecallEngine for Fsrs {
    fn name(&self) -> &'static str {
        "fsrs"
    }

    fn repeat(&self, card: &Card, now: DateTime<Utc>) -> RecordLog {
        let elapsed_days = Self::elapsed_days(card, now);
        let fuzz = Self::fuzz_factor(card, now);
        let memory = Rating::ALL.map(|rating| self.next_memory_state(card, elapsed_days, rating));
        let next = self.transitions(card, &memory, elapsed_days, fuzz);

        let [again, hard, good, easy] = Rating::ALL.map(|rating| {
            let i = index(rating);
            Self::outcome(card, rating, memory[i], next[i], elapsed_days, now)
        });
        RecordLog {
            again,
            hard,
            good,
            easy,
        }
    }

    fn retrievability(&self, card: &Card, now: DateTime<Utc>) -> f64 {
        if card.state == CardStatus::New {
            return 0.0;
        }
        let elapsed = card
            .last_review
            .map(|last| ((now - last).num_seconds() as f64 / 86400.0).max(0.0))
            .unwrap_or(0.0);
        self.forgetting_curve(elapsed, card.stability)
    }
}
