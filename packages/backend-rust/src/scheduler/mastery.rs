use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Familiarity with a word on a fixed 0..=5 scale. 0 means never answered correctly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct MasteryLevel(u8);

impl MasteryLevel {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(5);

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX.0).then_some(Self(value))
    }

    /// Storage rows may carry anything; out-of-range values are pulled back onto the scale.
    pub fn saturating_from(value: i64) -> Self {
        Self(value.clamp(Self::MIN.0 as i64, Self::MAX.0 as i64) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_new(self) -> bool {
        self.0 == 0
    }

    pub fn promoted(self) -> Self {
        Self((self.0 + 1).min(Self::MAX.0))
    }

    pub fn demoted(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    pub fn review_interval(self) -> Duration {
        match self.0 {
            0 => Duration::hours(1),
            1 => Duration::days(1),
            2 => Duration::days(3),
            3 => Duration::days(7),
            4 => Duration::days(14),
            _ => Duration::days(30),
        }
    }
}

impl TryFrom<u8> for MasteryLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("mastery level {value} out of range 0..=5"))
    }
}

impl From<MasteryLevel> for u8 {
    fn from(level: MasteryLevel) -> Self {
        level.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub level: MasteryLevel,
    pub next_review_at: DateTime<Utc>,
}

pub fn apply_review(current: MasteryLevel, correct: bool, now: DateTime<Utc>) -> ReviewOutcome {
    let level = if correct {
        current.promoted()
    } else {
        current.demoted()
    };

    ReviewOutcome {
        level,
        next_review_at: now + level.review_interval(),
    }
}
