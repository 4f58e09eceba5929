use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheView, Mutation};
use crate::db::models::{StudySession, User, WordCard};
use crate::scheduler::history::behavior_window_start;
use crate::scheduler::{
    adjust_daily_target, average_session_minutes, select_queue, streak, summarize_behavior,
    CandidatePools, StudyBehavior,
};

use super::{StudyEngine, StudyError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyStats {
    pub total_days: i64,
    pub streak_days: i64,
    pub last_study_date: Option<NaiveDate>,
    pub today_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyOverview {
    pub stats: StudyStats,
    pub word_count: i64,
    pub due_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayStudy {
    pub words: Vec<WordCard>,
    pub today_count: i64,
}

fn parse_import_after(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, StudyError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|_| StudyError::validation("importAfter 格式不正确"))
}

impl StudyEngine {
    pub async fn stats(&self, username: &str) -> Result<StudyStats, StudyError> {
        let user = self.find_user(username).await?;
        self.cache
            .get_or_compute(CacheView::Stats, &user.id, || self.compute_stats(&user))
            .await
    }

    pub async fn overview(&self, username: &str) -> Result<StudyOverview, StudyError> {
        let user = self.find_user(username).await?;
        self.cache
            .get_or_compute(CacheView::Overview, &user.id, || async {
                let stats = self.compute_stats(&user).await?;
                let word_count = self.repos.words.count_by_owner(&user.id).await?;
                let due_count = self.repos.words.count_due(&user.id, self.clock.now()).await?;
                Ok::<_, StudyError>(StudyOverview {
                    stats,
                    word_count,
                    due_count,
                })
            })
            .await
    }

    pub async fn behavior(&self, username: &str) -> Result<StudyBehavior, StudyError> {
        let user = self.find_user(username).await?;
        let now = self.clock.now();
        let sessions = self.recent_sessions(&user, now).await?;
        if sessions.is_empty() {
            return Ok(StudyBehavior::empty());
        }
        let streak_days = self.streak_days(&user).await?;
        Ok(summarize_behavior(&sessions, streak_days, &self.zone, now))
    }

    /// Assembles today's study queue. Never cached: it depends on the request's
    /// target and ratio as well as on stored state.
    pub async fn today_queue(
        &self,
        username: &str,
        daily_target: i64,
        new_ratio_percent: i64,
        import_after: Option<&str>,
    ) -> Result<TodayStudy, StudyError> {
        let import_after = parse_import_after(import_after)?;
        let user = self.find_user(username).await?;
        let now = self.clock.now();

        let sessions = self.recent_sessions(&user, now).await?;
        let target = adjust_daily_target(daily_target, average_session_minutes(&sessions));
        let today_count = self.today_review_count(&user, now).await?;
        let remaining = usize::try_from(target.saturating_sub(today_count)).unwrap_or(0);
        if remaining == 0 {
            return Ok(TodayStudy {
                words: Vec::new(),
                today_count,
            });
        }

        let due = self.repos.words.list_due(&user.id, now).await?;
        let all = self.repos.words.list_by_owner(&user.id).await?;
        let mut pools = CandidatePools::from_words(due, all);
        if let Some(after) = import_after {
            pools = pools.restrict_to_cohort(after);
        }

        let ratio = new_ratio_percent.clamp(0, 100) as u32;
        let words = select_queue(pools, remaining, ratio, self.ranker.as_ref());
        tracing::debug!(
            user_id = %user.id,
            target,
            today_count,
            queued = words.len(),
            "today queue assembled"
        );
        Ok(TodayStudy { words, today_count })
    }

    /// Marks today as a study day (idempotent per calendar date) and returns fresh stats.
    pub async fn record_study_day(&self, username: &str) -> Result<StudyStats, StudyError> {
        let user = self.find_user(username).await?;
        self.mark_study_day(&user.id, self.clock.now()).await?;
        self.cache.invalidate(Mutation::RecordStudyDay, &user.id).await;
        self.compute_stats(&user).await
    }

    pub async fn record_session(
        &self,
        username: &str,
        started_at: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<StudySession, StudyError> {
        if duration_seconds < self.min_session_seconds {
            return Err(StudyError::validation("学习时长过短"));
        }
        let user = self.find_user(username).await?;
        let session = StudySession {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id,
            started_at,
            duration_seconds,
            created_at: self.clock.now(),
        };
        self.repos.sessions.insert_session(&session).await?;
        Ok(session)
    }

    async fn compute_stats(&self, user: &User) -> Result<StudyStats, StudyError> {
        let records = self.repos.study_days.list_desc(&user.id).await?;
        let dates: Vec<NaiveDate> = records.iter().map(|r| r.study_date).collect();
        Ok(StudyStats {
            total_days: dates.len() as i64,
            streak_days: i64::from(streak(&dates)),
            last_study_date: dates.first().copied(),
            today_count: self.today_review_count(user, self.clock.now()).await?,
        })
    }

    async fn streak_days(&self, user: &User) -> Result<u32, StudyError> {
        let records = self.repos.study_days.list_desc(&user.id).await?;
        let dates: Vec<NaiveDate> = records.iter().map(|r| r.study_date).collect();
        Ok(streak(&dates))
    }

    async fn today_review_count(&self, user: &User, now: DateTime<Utc>) -> Result<i64, StudyError> {
        let (start, end) = self.zone.day_window(now);
        Ok(self.repos.reviews.count_between(&user.id, start, end).await?)
    }

    async fn recent_sessions(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Vec<StudySession>, StudyError> {
        Ok(self
            .repos
            .sessions
            .list_between(&user.id, behavior_window_start(now), now)
            .await?)
    }
}
