use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::db::models::WordCard;

use super::round_half_up;

/// Strength assumed for words that carry no stored estimate.
pub const DEFAULT_MEMORY_STRENGTH: f64 = 0.2;

/// Orders candidates weakest first. Lower strength is studied earlier.
pub trait WeaknessRanker: Send + Sync {
    fn strength(&self, word: &WordCard) -> f64;
}

/// Ranks by the stored `memory_strength`, falling back to a fixed weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredStrength;

impl WeaknessRanker for StoredStrength {
    fn strength(&self, word: &WordCard) -> f64 {
        word.memory_strength.unwrap_or(DEFAULT_MEMORY_STRENGTH)
    }
}

/// Candidate pools, each already in its natural storage order.
#[derive(Debug, Clone, Default)]
pub struct CandidatePools {
    pub due: Vec<WordCard>,
    pub fresh: Vec<WordCard>,
    pub all: Vec<WordCard>,
}

impl CandidatePools {
    /// `due` as loaded; `fresh` is derived from `all` (mastery level 0).
    pub fn from_words(due: Vec<WordCard>, all: Vec<WordCard>) -> Self {
        let fresh = all
            .iter()
            .filter(|word| word.mastery_level.is_new())
            .cloned()
            .collect();
        Self { due, fresh, all }
    }

    /// Keeps only words created at or after `after` in every pool.
    pub fn restrict_to_cohort(self, after: DateTime<Utc>) -> Self {
        let keep = |words: Vec<WordCard>| -> Vec<WordCard> {
            words.into_iter().filter(|w| w.created_at >= after).collect()
        };
        Self {
            due: keep(self.due),
            fresh: keep(self.fresh),
            all: keep(self.all),
        }
    }
}

/// Review/new split of `remaining` slots.
pub fn split_target(remaining: usize, new_ratio_percent: u32) -> (usize, usize) {
    let ratio = new_ratio_percent.min(100) as f64;
    let target_new = (round_half_up(remaining as f64 * ratio / 100.0).max(0) as usize).min(remaining);
    (remaining - target_new, target_new)
}

pub fn select_queue(
    pools: CandidatePools,
    remaining: usize,
    new_ratio_percent: u32,
    ranker: &dyn WeaknessRanker,
) -> Vec<WordCard> {
    if remaining == 0 {
        return Vec::new();
    }

    let (target_review, target_new) = split_target(remaining, new_ratio_percent);
    let CandidatePools {
        mut due,
        mut fresh,
        all,
    } = pools;
    rank_weakest_first(&mut due, ranker);
    rank_weakest_first(&mut fresh, ranker);

    let mut picker = QueuePicker::with_capacity(remaining);
    picker.take_from(due, target_review);
    picker.take_from(fresh, target_review + target_new);
    if picker.len() < remaining {
        picker.take_from(all, remaining);
    }
    picker.finish()
}

fn rank_weakest_first(words: &mut [WordCard], ranker: &dyn WeaknessRanker) {
    words.sort_by(|a, b| {
        ranker
            .strength(a)
            .partial_cmp(&ranker.strength(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

struct QueuePicker {
    seen: HashSet<String>,
    picked: Vec<WordCard>,
}

impl QueuePicker {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            picked: Vec::with_capacity(capacity),
        }
    }

    fn len(&self) -> usize {
        self.picked.len()
    }

    /// Appends unseen candidates in order until the queue holds `limit` words.
    fn take_from(&mut self, candidates: Vec<WordCard>, limit: usize) {
        for word in candidates {
            if self.picked.len() >= limit {
                break;
            }
            if self.seen.insert(word.id.clone()) {
                self.picked.push(word);
            }
        }
    }

    fn finish(self) -> Vec<WordCard> {
        self.picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::MasteryLevel;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn word(id: &str, level: u8) -> WordCard {
        let mut card = WordCard::new(
            "owner".to_string(),
            crate::db::models::WordDraft::new(id, "definition"),
            base_time(),
        );
        card.id = id.to_string();
        card.mastery_level = MasteryLevel::new(level).unwrap();
        card
    }

    fn ids(words: &[WordCard]) -> Vec<&str> {
        words.iter().map(|w| w.id.as_str()).collect()
    }

    #[test]
    fn test_mixes_review_and_new_by_ratio() {
        let due: Vec<WordCard> = (0..20).map(|i| word(&format!("due-{i}"), 2)).collect();
        let fresh: Vec<WordCard> = (0..5).map(|i| word(&format!("new-{i}"), 0)).collect();
        let mut all = due.clone();
        all.extend(fresh.clone());
        let pools = CandidatePools { due, fresh, all };

        let queue = select_queue(pools, 10, 30, &StoredStrength);

        assert_eq!(queue.len(), 10);
        let new_count = queue.iter().filter(|w| w.id.starts_with("new-")).count();
        assert_eq!(new_count, 3);
        let unique: HashSet<&str> = ids(&queue).into_iter().collect();
        assert_eq!(unique.len(), queue.len());
        assert_eq!(&ids(&queue)[..7], &["due-0", "due-1", "due-2", "due-3", "due-4", "due-5", "due-6"]);
    }

    #[test]
    fn test_zero_remaining_is_empty() {
        let pools = CandidatePools::from_words(vec![word("a", 0)], vec![word("a", 0)]);
        assert!(select_queue(pools, 0, 50, &StoredStrength).is_empty());
    }

    #[test]
    fn test_pure_review_and_pure_new() {
        assert_eq!(split_target(10, 0), (10, 0));
        assert_eq!(split_target(10, 100), (0, 10));
        assert_eq!(split_target(5, 50), (2, 3));
        assert_eq!(split_target(5, 250), (0, 5));
    }

    #[test]
    fn test_never_new_words_in_due_pool_are_not_repeated() {
        // a new word that is also due shows up in both pools
        let shared = word("shared", 0);
        let pools = CandidatePools {
            due: vec![shared.clone(), word("d1", 1)],
            fresh: vec![shared.clone(), word("n1", 0)],
            all: vec![shared, word("d1", 1), word("n1", 0)],
        };
        let queue = select_queue(pools, 4, 50, &StoredStrength);
        assert_eq!(ids(&queue), vec!["shared", "d1", "n1"]);
    }

    #[test]
    fn test_top_up_from_all_when_pools_run_dry() {
        let pools = CandidatePools {
            due: vec![word("d1", 3)],
            fresh: vec![],
            all: vec![word("x1", 4), word("d1", 3), word("x2", 5)],
        };
        let queue = select_queue(pools, 3, 50, &StoredStrength);
        assert_eq!(ids(&queue), vec!["d1", "x1", "x2"]);
    }

    #[test]
    fn test_smaller_library_returns_everything_without_padding() {
        let all = vec![word("a", 0), word("b", 2)];
        let pools = CandidatePools::from_words(vec![], all);
        let queue = select_queue(pools, 20, 30, &StoredStrength);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_weakest_first_with_stable_ties() {
        let mut strong = word("strong", 2);
        strong.memory_strength = Some(0.9);
        let mut weak = word("weak", 2);
        weak.memory_strength = Some(0.05);
        let pools = CandidatePools {
            due: vec![strong, word("plain-1", 2), weak, word("plain-2", 2)],
            fresh: vec![],
            all: vec![],
        };
        let queue = select_queue(pools, 4, 0, &StoredStrength);
        assert_eq!(ids(&queue), vec!["weak", "plain-1", "plain-2", "strong"]);
    }

    #[test]
    fn test_cohort_filter_is_inclusive() {
        let mut old = word("old", 0);
        old.created_at = base_time() - Duration::days(1);
        let mut cutoff = word("cutoff", 0);
        cutoff.created_at = base_time();
        let all = vec![old, cutoff];
        let pools = CandidatePools::from_words(all.clone(), all).restrict_to_cohort(base_time());
        assert_eq!(ids(&pools.all), vec!["cutoff"]);
        assert_eq!(ids(&pools.due), vec!["cutoff"]);
        assert_eq!(ids(&pools.fresh), vec!["cutoff"]);
    }
}
