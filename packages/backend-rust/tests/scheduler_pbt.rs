//! Property tests for review scheduling and daily queue selection.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use wordapp_backend_rust::db::models::{WordCard, WordDraft};
use wordapp_backend_rust::scheduler::queue::split_target;
use wordapp_backend_rust::scheduler::{
    adjust_daily_target, apply_review, select_queue, streak, CandidatePools, MasteryLevel,
    StoredStrength,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap()
}

fn arb_level() -> impl Strategy<Value = MasteryLevel> {
    (0u8..=5).prop_map(|v| MasteryLevel::new(v).unwrap())
}

// (mastery, next review offset in hours, stored strength)
fn arb_word_row() -> impl Strategy<Value = (u8, Option<i64>, Option<f64>)> {
    (
        0u8..=5,
        proptest::option::of(-72i64..72),
        proptest::option::of((0u32..=100).prop_map(|v| v as f64 / 100.0)),
    )
}

fn build_words(rows: &[(u8, Option<i64>, Option<f64>)]) -> Vec<WordCard> {
    rows
        .iter()
        .enumerate()
        .map(|(i, (level, offset, strength))| {
            let mut card = WordCard::new(
                "owner".to_string(),
                WordDraft::new(format!("w{i}"), "d"),
                now(),
            );
            card.mastery_level = MasteryLevel::new(*level).unwrap();
            card.next_review_at = offset.map(|h| now() + Duration::hours(h));
            card.memory_strength = *strength;
            card
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_review_stays_on_scale(level in arb_level(), correct in any::<bool>()) {
        let outcome = apply_review(level, correct, now());
        prop_assert!(outcome.level <= MasteryLevel::MAX);
        prop_assert!(outcome.next_review_at > now());
        if correct {
            prop_assert!(outcome.level >= level);
        } else {
            prop_assert!(outcome.level <= level);
        }
        prop_assert_eq!(outcome.next_review_at - now(), outcome.level.review_interval());
    }

    #[test]
    fn prop_intervals_grow_with_level(a in arb_level(), b in arb_level()) {
        if a <= b {
            prop_assert!(a.review_interval() <= b.review_interval());
        }
    }

    #[test]
    fn prop_split_covers_remaining(remaining in 0usize..200, ratio in 0u32..=150) {
        let (review, fresh) = split_target(remaining, ratio);
        prop_assert_eq!(review + fresh, remaining);
    }

    #[test]
    fn prop_queue_is_bounded_and_distinct(
        rows in prop::collection::vec(arb_word_row(), 0..40),
        remaining in 0usize..30,
        ratio in 0u32..=100,
    ) {
        let all = build_words(&rows);
        let due: Vec<WordCard> = all.iter().filter(|w| w.is_due(now())).cloned().collect();
        let pools = CandidatePools::from_words(due, all.clone());

        let queue = select_queue(pools, remaining, ratio, &StoredStrength);

        prop_assert_eq!(queue.len(), remaining.min(all.len()));
        let ids: HashSet<&str> = queue.iter().map(|w| w.id.as_str()).collect();
        prop_assert_eq!(ids.len(), queue.len());
    }

    #[test]
    fn prop_adjusted_target_respects_bounds(requested in 1i64..200, avg in 1i32..60) {
        let adjusted = adjust_daily_target(requested, Some(avg));
        if avg < 5 {
            prop_assert!(adjusted >= 5);
            prop_assert!(adjusted <= requested.max(5));
        } else if avg > 20 {
            prop_assert!(adjusted <= 80);
        } else {
            prop_assert_eq!(adjusted, requested);
        }
    }

    #[test]
    fn prop_streak_never_exceeds_days(offsets in prop::collection::btree_set(0i64..60, 0..30)) {
        let base = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let days: Vec<NaiveDate> = offsets
            .iter()
            .map(|d| base - Duration::days(*d))
            .collect();
        let s = streak(&days) as usize;
        prop_assert!(s <= days.len());
        prop_assert_eq!(s == 0, days.is_empty());
    }
}
