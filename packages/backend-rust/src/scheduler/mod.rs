//! Pure scheduling algorithms: mastery transitions, history aggregation,
//! daily-target adjustment and queue assembly. No I/O happens here.

pub mod history;
pub mod mastery;
pub mod queue;
pub mod target;

pub use history::{average_session_minutes, streak, summarize_behavior, StudyBehavior};
pub use mastery::{apply_review, MasteryLevel, ReviewOutcome};
pub use queue::{select_queue, CandidatePools, StoredStrength, WeaknessRanker};
pub use target::adjust_daily_target;

/// Rounds halves towards positive infinity.
pub(crate) fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
