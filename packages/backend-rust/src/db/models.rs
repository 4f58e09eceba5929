use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::MasteryLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordCard {
    pub id: String,
    pub owner_id: String,
    pub term: String,
    pub definition: String,
    pub example: Option<String>,
    pub meanings: Option<String>,
    pub examples: Option<String>,
    pub word_root: Option<String>,
    pub similar_words: Option<String>,
    pub exam_tag: Option<String>,
    pub mastery_level: MasteryLevel,
    pub next_review_at: Option<DateTime<Utc>>,
    pub memory_strength: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WordCard {
    /// A never-reviewed card, immediately eligible for study.
    pub fn new(owner_id: String, draft: WordDraft, now: DateTime<Utc>) -> Self {
        let mut card = Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id,
            term: String::new(),
            definition: String::new(),
            example: None,
            meanings: None,
            examples: None,
            word_root: None,
            similar_words: None,
            exam_tag: None,
            mastery_level: MasteryLevel::MIN,
            next_review_at: None,
            memory_strength: None,
            created_at: now,
            updated_at: now,
        };
        card.apply_draft(draft, now);
        card
    }

    /// Replaces the editable content. Scheduling state is left untouched.
    pub fn apply_draft(&mut self, draft: WordDraft, now: DateTime<Utc>) {
        self.term = draft.term;
        self.definition = draft.definition;
        self.example = draft.example;
        self.meanings = draft.meanings;
        self.examples = draft.examples;
        self.word_root = draft.word_root;
        self.similar_words = draft.similar_words;
        self.exam_tag = draft.exam_tag;
        self.updated_at = now;
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at.map_or(true, |at| at <= now)
    }
}

/// User-editable part of a word.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordDraft {
    pub term: String,
    pub definition: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub meanings: Option<String>,
    #[serde(default)]
    pub examples: Option<String>,
    #[serde(default)]
    pub word_root: Option<String>,
    #[serde(default)]
    pub similar_words: Option<String>,
    #[serde(default)]
    pub exam_tag: Option<String>,
}

impl WordDraft {
    pub fn new(term: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            definition: definition.into(),
            ..Default::default()
        }
    }

    /// Trims every field and drops empty optional ones.
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            term: self.term.trim().to_string(),
            definition: self.definition.trim().to_string(),
            example: clean(self.example),
            meanings: clean(self.meanings),
            examples: clean(self.examples),
            word_root: clean(self.word_root),
            similar_words: clean(self.similar_words),
            exam_tag: clean(self.exam_tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEvent {
    pub id: String,
    pub word_id: String,
    pub user_id: String,
    pub correct: bool,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyDayRecord {
    pub id: String,
    pub user_id: String,
    pub study_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub created_at: DateTime<Utc>,
}
