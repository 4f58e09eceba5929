pub mod memory;
pub mod models;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::db::models::{ReviewEvent, StudyDayRecord, StudySession, User, WordCard};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("invalid database url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Returns the user, creating it on first sight. Concurrent calls converge on one row.
    async fn ensure_user(&self, username: &str, now: DateTime<Utc>) -> Result<User, StoreError>;
}

#[async_trait]
pub trait WordRepository: Send + Sync {
    async fn insert_words(&self, words: &[WordCard]) -> Result<(), StoreError>;

    /// Persists the editable content and `updated_at` of an existing word.
    async fn update_content(&self, word: &WordCard) -> Result<(), StoreError>;

    async fn delete_word(&self, owner_id: &str, word_id: &str) -> Result<bool, StoreError>;

    async fn find_owned(&self, owner_id: &str, word_id: &str)
        -> Result<Option<WordCard>, StoreError>;

    /// Most recently updated first; ties keep insertion order.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WordCard>, StoreError>;

    /// Case-insensitive substring match on the term, same order as `list_by_owner`.
    async fn search_by_term(&self, owner_id: &str, term: &str)
        -> Result<Vec<WordCard>, StoreError>;

    /// Unscheduled words first, then by `next_review_at` ascending.
    async fn list_due(&self, owner_id: &str, now: DateTime<Utc>)
        -> Result<Vec<WordCard>, StoreError>;

    async fn count_by_owner(&self, owner_id: &str) -> Result<i64, StoreError>;

    async fn count_due(&self, owner_id: &str, now: DateTime<Utc>) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Writes the word's scheduling state and appends the event as one unit.
    async fn record_review(&self, word: &WordCard, event: &ReviewEvent) -> Result<(), StoreError>;

    async fn count_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Incorrect reviews joined with their word, most recent first.
    async fn incorrect_with_word(
        &self,
        user_id: &str,
    ) -> Result<Vec<(ReviewEvent, WordCard)>, StoreError>;
}

#[async_trait]
pub trait StudyDayRepository: Send + Sync {
    async fn exists_for_date(&self, user_id: &str, date: NaiveDate) -> Result<bool, StoreError>;

    /// Returns `false` when a record for the same (user, date) already exists.
    async fn insert_if_absent(&self, record: &StudyDayRecord) -> Result<bool, StoreError>;

    async fn list_desc(&self, user_id: &str) -> Result<Vec<StudyDayRecord>, StoreError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert_session(&self, session: &StudySession) -> Result<(), StoreError>;

    /// Sessions started in `(since, until]`, most recent first.
    async fn list_between(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<StudySession>, StoreError>;
}

/// The collaborator set the study engine reads and writes through.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub words: Arc<dyn WordRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub study_days: Arc<dyn StudyDayRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl Repositories {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRepository
            + WordRepository
            + ReviewRepository
            + StudyDayRepository
            + SessionRepository
            + 'static,
    {
        Self {
            users: store.clone(),
            words: store.clone(),
            reviews: store.clone(),
            study_days: store.clone(),
            sessions: store,
        }
    }
}
