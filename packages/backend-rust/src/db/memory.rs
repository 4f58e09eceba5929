use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

use crate::db::models::{ReviewEvent, StudyDayRecord, StudySession, User, WordCard};
use crate::db::{
    ReviewRepository, SessionRepository, StoreError, StudyDayRepository, UserRepository,
    WordRepository,
};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    words: Vec<WordCard>,
    reviews: Vec<ReviewEvent>,
    study_days: Vec<StudyDayRecord>,
    sessions: Vec<StudySession>,
}

/// Process-local store. Rows live in insertion order, which is the tie-break
/// order every listing falls back on.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, username: &str, now: DateTime<Utc>) -> User {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.users.iter().find(|u| u.username == username) {
            return existing.clone();
        }
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            created_at: now,
        };
        tables.users.push(user.clone());
        user
    }

    pub fn study_day_count(&self, user_id: &str) -> usize {
        self.tables
            .read()
            .study_days
            .iter()
            .filter(|r| r.user_id == user_id)
            .count()
    }

    pub fn review_count(&self, user_id: &str) -> usize {
        self.tables
            .read()
            .reviews
            .iter()
            .filter(|r| r.user_id == user_id)
            .count()
    }

    fn owned_words(&self, owner_id: &str) -> Vec<WordCard> {
        self.tables
            .read()
            .words
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect()
    }
}

fn newest_first(mut words: Vec<WordCard>) -> Vec<WordCard> {
    words.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    words
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables
            .read()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn ensure_user(&self, username: &str, now: DateTime<Utc>) -> Result<User, StoreError> {
        Ok(self.insert_user(username, now))
    }
}

#[async_trait]
impl WordRepository for MemoryStore {
    async fn insert_words(&self, words: &[WordCard]) -> Result<(), StoreError> {
        self.tables.write().words.extend_from_slice(words);
        Ok(())
    }

    async fn update_content(&self, word: &WordCard) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if let Some(stored) = tables
            .words
            .iter_mut()
            .find(|w| w.id == word.id && w.owner_id == word.owner_id)
        {
            stored.term = word.term.clone();
            stored.definition = word.definition.clone();
            stored.example = word.example.clone();
            stored.meanings = word.meanings.clone();
            stored.examples = word.examples.clone();
            stored.word_root = word.word_root.clone();
            stored.similar_words = word.similar_words.clone();
            stored.exam_tag = word.exam_tag.clone();
            stored.updated_at = word.updated_at;
        }
        Ok(())
    }

    async fn delete_word(&self, owner_id: &str, word_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        let before = tables.words.len();
        tables
            .words
            .retain(|w| !(w.id == word_id && w.owner_id == owner_id));
        // Review events are history and outlive their word.
        Ok(tables.words.len() != before)
    }

    async fn find_owned(
        &self,
        owner_id: &str,
        word_id: &str,
    ) -> Result<Option<WordCard>, StoreError> {
        Ok(self
            .tables
            .read()
            .words
            .iter()
            .find(|w| w.id == word_id && w.owner_id == owner_id)
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WordCard>, StoreError> {
        Ok(newest_first(self.owned_words(owner_id)))
    }

    async fn search_by_term(
        &self,
        owner_id: &str,
        term: &str,
    ) -> Result<Vec<WordCard>, StoreError> {
        let needle = term.to_lowercase();
        let matches = self
            .owned_words(owner_id)
            .into_iter()
            .filter(|w| w.term.to_lowercase().contains(&needle))
            .collect();
        Ok(newest_first(matches))
    }

    async fn list_due(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<WordCard>, StoreError> {
        let mut due: Vec<WordCard> = self
            .owned_words(owner_id)
            .into_iter()
            .filter(|w| w.is_due(now))
            .collect();
        // None sorts before Some, so unscheduled words lead.
        due.sort_by(|a, b| a.next_review_at.cmp(&b.next_review_at));
        Ok(due)
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<i64, StoreError> {
        Ok(self
            .tables
            .read()
            .words
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .count() as i64)
    }

    async fn count_due(&self, owner_id: &str, now: DateTime<Utc>) -> Result<i64, StoreError> {
        Ok(self
            .tables
            .read()
            .words
            .iter()
            .filter(|w| w.owner_id == owner_id && w.is_due(now))
            .count() as i64)
    }
}

#[async_trait]
impl ReviewRepository for MemoryStore {
    async fn record_review(&self, word: &WordCard, event: &ReviewEvent) -> Result<(), StoreError> {
        // Single write guard: the word update and the event land together.
        let mut tables = self.tables.write();
        let Some(stored) = tables
            .words
            .iter_mut()
            .find(|w| w.id == word.id && w.owner_id == word.owner_id)
        else {
            return Err(StoreError::Corrupt {
                table: "words",
                reason: format!("word {} vanished before review", word.id),
            });
        };
        stored.mastery_level = word.mastery_level;
        stored.next_review_at = word.next_review_at;
        stored.updated_at = word.updated_at;
        tables.reviews.push(event.clone());
        Ok(())
    }

    async fn count_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        Ok(self
            .tables
            .read()
            .reviews
            .iter()
            .filter(|r| r.user_id == user_id && r.reviewed_at >= start && r.reviewed_at < end)
            .count() as i64)
    }

    async fn incorrect_with_word(
        &self,
        user_id: &str,
    ) -> Result<Vec<(ReviewEvent, WordCard)>, StoreError> {
        let tables = self.tables.read();
        let mut rows: Vec<(ReviewEvent, WordCard)> = tables
            .reviews
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id && !r.correct)
            .filter_map(|r| {
                tables
                    .words
                    .iter()
                    .find(|w| w.id == r.word_id)
                    .map(|w| (r.clone(), w.clone()))
            })
            .collect();
        rows.sort_by(|a, b| b.0.reviewed_at.cmp(&a.0.reviewed_at));
        Ok(rows)
    }
}

#[async_trait]
impl StudyDayRepository for MemoryStore {
    async fn exists_for_date(&self, user_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .read()
            .study_days
            .iter()
            .any(|r| r.user_id == user_id && r.study_date == date))
    }

    async fn insert_if_absent(&self, record: &StudyDayRecord) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        let duplicate = tables
            .study_days
            .iter()
            .any(|r| r.user_id == record.user_id && r.study_date == record.study_date);
        if duplicate {
            return Ok(false);
        }
        tables.study_days.push(record.clone());
        Ok(true)
    }

    async fn list_desc(&self, user_id: &str) -> Result<Vec<StudyDayRecord>, StoreError> {
        let mut days: Vec<StudyDayRecord> = self
            .tables
            .read()
            .study_days
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        days.sort_by(|a, b| b.study_date.cmp(&a.study_date));
        Ok(days)
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn insert_session(&self, session: &StudySession) -> Result<(), StoreError> {
        self.tables.write().sessions.push(session.clone());
        Ok(())
    }

    async fn list_between(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<StudySession>, StoreError> {
        let mut sessions: Vec<StudySession> = self
            .tables
            .read()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.started_at > since && s.started_at <= until)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }
}
