pub mod import;
pub mod study;
pub mod words;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cache::ViewCache;
use crate::clock::{Clock, StudyZone};
use crate::db::models::{StudyDayRecord, User};
use crate::db::{Repositories, StoreError};
use crate::scheduler::{StoredStrength, WeaknessRanker};

pub use import::ImportSummary;
pub use study::{StudyOverview, StudyStats, TodayStudy};

pub const DEFAULT_MIN_SESSION_SECONDS: i64 = 10;

#[derive(Debug, Error)]
pub enum StudyError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl StudyError {
    fn not_found(message: &str) -> Self {
        Self::NotFound(message.to_string())
    }

    fn validation(message: &str) -> Self {
        Self::Validation(message.to_string())
    }
}

/// Entry point for every study operation, shared across requests.
pub struct StudyEngine {
    repos: Repositories,
    cache: ViewCache,
    clock: Arc<dyn Clock>,
    zone: StudyZone,
    ranker: Arc<dyn WeaknessRanker>,
    min_session_seconds: i64,
}

impl StudyEngine {
    pub fn new(repos: Repositories, cache: ViewCache, clock: Arc<dyn Clock>, zone: StudyZone) -> Self {
        Self {
            repos,
            cache,
            clock,
            zone,
            ranker: Arc::new(StoredStrength),
            min_session_seconds: DEFAULT_MIN_SESSION_SECONDS,
        }
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn WeaknessRanker>) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn with_min_session_seconds(mut self, seconds: i64) -> Self {
        self.min_session_seconds = seconds;
        self
    }

    pub fn cache(&self) -> &ViewCache {
        &self.cache
    }

    pub fn zone(&self) -> &StudyZone {
        &self.zone
    }

    /// Resolves an authenticated username, creating the user record on first sight.
    pub async fn provision_user(&self, username: &str) -> Result<User, StudyError> {
        if let Some(user) = self.repos.users.find_by_username(username).await? {
            return Ok(user);
        }
        let user = self
            .repos
            .users
            .ensure_user(username, self.clock.now())
            .await?;
        tracing::info!(user_id = %user.id, username = %user.username, "user provisioned");
        Ok(user)
    }

    async fn find_user(&self, username: &str) -> Result<User, StudyError> {
        self.repos
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| StudyError::not_found("用户不存在"))
    }

    /// Ensures a study-day record exists for the local date of `now`.
    /// A concurrent insert for the same date is not an error.
    async fn mark_study_day(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), StudyError> {
        let today = self.zone.date_of(now);
        if self.repos.study_days.exists_for_date(user_id, today).await? {
            return Ok(());
        }
        let record = StudyDayRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            study_date: today,
            created_at: now,
        };
        if !self.repos.study_days.insert_if_absent(&record).await? {
            tracing::debug!(user_id = %user_id, date = %today, "study day already recorded");
        }
        Ok(())
    }
}
