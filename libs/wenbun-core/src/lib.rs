//! Scheduling core shared by the WenBun client and sync server.
//!
//! Provides:
//! - FSRS-6 recall engine with per-deck engine selection
//! - Deck state: groups, marks, warm-up, daily counters
//! - Daily quotas and next-card selection
//! - Extra-study sessions
//! - Profile snapshots and the pure sync decision rules

pub mod algorithm;
pub mod auto_grade;
pub mod clock;
pub mod config;
pub mod deck;
pub mod error;
pub mod extra_study;
pub mod grading;
pub mod profile;
pub mod quota;
pub mod selector;
pub mod sync;
pub mod types;

pub use algorithm::{
    format_delta, EngineKind, GradeOutcome, GradePreview, RecallEngine, RecallEngines, RecordLog,
};
pub use auto_grade::{AutoGradeLog, StrokeResult};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use deck::{DeckData, DeckProgress, DeckProgressPercent, Group};
pub use error::{CoreError, Result};
pub use extra_study::{ExtraStudy, ExtraStudyDescription, ExtraStudyRequest};
pub use grading::rate_card;
pub use profile::{ProfileData, ProfileMeta};
pub use quota::DailyQuota;
pub use selector::next_card;
pub use sync::{ProfileInfo, SyncConflictInfo, SyncDecision, UploadMode};
pub use types::{
    Card, CardId, CardStatus, CustomState, GradingMethod, InterleaveOrder, Rating, ReviewLog,
    ReviewLogEntry,
};
