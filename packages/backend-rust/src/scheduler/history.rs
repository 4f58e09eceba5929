use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::StudyZone;
use crate::db::models::StudySession;

use super::round_half_up;

pub const BEHAVIOR_WINDOW_DAYS: i64 = 7;
pub const NO_PREFERRED_HOUR: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyBehavior {
    pub avg_duration_minutes: i32,
    pub preferred_hour: i32,
    pub focus_score: i32,
    pub consistency_score: i32,
    pub sessions_last_7_days: i32,
    pub today_minutes: i32,
}

impl StudyBehavior {
    pub fn empty() -> Self {
        Self {
            avg_duration_minutes: 0,
            preferred_hour: NO_PREFERRED_HOUR,
            focus_score: 0,
            consistency_score: 0,
            sessions_last_7_days: 0,
            today_minutes: 0,
        }
    }
}

pub fn behavior_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(BEHAVIOR_WINDOW_DAYS)
}

/// Length of the consecutive-day run ending at the most recent study day.
///
/// `days_desc` must be sorted most recent first; the walk stops at the first gap.
pub fn streak(days_desc: &[NaiveDate]) -> u32 {
    let Some(&first) = days_desc.first() else {
        return 0;
    };

    let mut streak = 1;
    let mut prev = first;
    for &current in &days_desc[1..] {
        if prev.pred_opt() == Some(current) {
            streak += 1;
            prev = current;
        } else {
            break;
        }
    }
    streak
}

/// Rounded mean session length in minutes, never below one minute. `None` without sessions.
pub fn average_session_minutes(sessions: &[StudySession]) -> Option<i32> {
    if sessions.is_empty() {
        return None;
    }
    let total_seconds: i64 = sessions.iter().map(|s| s.duration_seconds.max(0)).sum();
    let avg = round_half_up(total_seconds as f64 / 60.0 / sessions.len() as f64);
    Some(avg.max(1) as i32)
}

pub fn summarize_behavior(
    sessions: &[StudySession],
    streak_days: u32,
    zone: &StudyZone,
    now: DateTime<Utc>,
) -> StudyBehavior {
    let Some(avg_minutes) = average_session_minutes(sessions) else {
        return StudyBehavior::empty();
    };

    let (today_start, today_end) = zone.day_window(now);
    let today_seconds: i64 = sessions
        .iter()
        .filter(|s| s.started_at >= today_start && s.started_at < today_end)
        .map(|s| s.duration_seconds.max(0))
        .sum();
    let today_minutes = round_half_up(today_seconds as f64 / 60.0) as i32;

    let mut hour_buckets = [0u32; 24];
    for session in sessions {
        hour_buckets[zone.hour_of(session.started_at) as usize] += 1;
    }
    let mut preferred_hour = 0usize;
    for hour in 1..hour_buckets.len() {
        if hour_buckets[hour] > hour_buckets[preferred_hour] {
            preferred_hour = hour;
        }
    }

    let session_count = sessions.len() as i64;
    let focus_score = (avg_minutes as i64 * 5).min(100) as i32;
    let consistency_score = (streak_days as i64 * 10 + session_count * 3).min(100) as i32;

    StudyBehavior {
        avg_duration_minutes: avg_minutes,
        preferred_hour: preferred_hour as i32,
        focus_score,
        consistency_score,
        sessions_last_7_days: session_count as i32,
        today_minutes,
    }
}
