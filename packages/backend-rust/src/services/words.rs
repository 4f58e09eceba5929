use std::collections::HashSet;

use crate::cache::{CacheView, Mutation};
use crate::db::models::{ReviewEvent, WordCard, WordDraft};
use crate::scheduler::apply_review;

use super::import::{parse_word_list, ImportSummary};
use super::{StudyEngine, StudyError};

fn validate_draft(draft: WordDraft) -> Result<WordDraft, StudyError> {
    let draft = draft.normalized();
    if draft.term.is_empty() {
        return Err(StudyError::validation("单词不能为空"));
    }
    if draft.definition.is_empty() {
        return Err(StudyError::validation("释义不能为空"));
    }
    Ok(draft)
}

impl StudyEngine {
    /// The user's words, most recently updated first. Only the unfiltered list is cached.
    pub async fn list_words(
        &self,
        username: &str,
        query: Option<&str>,
    ) -> Result<Vec<WordCard>, StudyError> {
        let user = self.find_user(username).await?;
        if let Some(term) = query.map(str::trim).filter(|q| !q.is_empty()) {
            return Ok(self.repos.words.search_by_term(&user.id, term).await?);
        }
        self.cache
            .get_or_compute(CacheView::WordList, &user.id, || async {
                Ok::<_, StudyError>(self.repos.words.list_by_owner(&user.id).await?)
            })
            .await
    }

    pub async fn create_word(
        &self,
        username: &str,
        draft: WordDraft,
    ) -> Result<WordCard, StudyError> {
        let draft = validate_draft(draft)?;
        let user = self.find_user(username).await?;
        let word = WordCard::new(user.id.clone(), draft, self.clock.now());
        self.repos
            .words
            .insert_words(std::slice::from_ref(&word))
            .await?;
        self.cache.invalidate(Mutation::CreateWord, &user.id).await;
        Ok(word)
    }

    pub async fn update_word(
        &self,
        username: &str,
        word_id: &str,
        draft: WordDraft,
    ) -> Result<WordCard, StudyError> {
        let draft = validate_draft(draft)?;
        let user = self.find_user(username).await?;
        let mut word = self.find_owned_word(&user.id, word_id).await?;
        word.apply_draft(draft, self.clock.now());
        self.repos.words.update_content(&word).await?;
        self.cache.invalidate(Mutation::UpdateWord, &user.id).await;
        Ok(word)
    }

    pub async fn delete_word(&self, username: &str, word_id: &str) -> Result<(), StudyError> {
        let user = self.find_user(username).await?;
        if !self.repos.words.delete_word(&user.id, word_id).await? {
            return Err(StudyError::not_found("未找到该单词"));
        }
        self.cache.invalidate(Mutation::DeleteWord, &user.id).await;
        Ok(())
    }

    /// Grades one review, reschedules the word and marks today as a study day.
    pub async fn review(
        &self,
        username: &str,
        word_id: &str,
        correct: bool,
    ) -> Result<WordCard, StudyError> {
        let user = self.find_user(username).await?;
        let mut word = self.find_owned_word(&user.id, word_id).await?;
        let now = self.clock.now();

        let outcome = apply_review(word.mastery_level, correct, now);
        word.mastery_level = outcome.level;
        word.next_review_at = Some(outcome.next_review_at);
        word.updated_at = now;

        let event = ReviewEvent {
            id: uuid::Uuid::new_v4().to_string(),
            word_id: word.id.clone(),
            user_id: user.id.clone(),
            correct,
            reviewed_at: now,
        };
        self.repos.reviews.record_review(&word, &event).await?;
        self.mark_study_day(&user.id, now).await?;
        self.cache.invalidate(Mutation::Review, &user.id).await;

        tracing::debug!(
            user_id = %user.id,
            word_id = %word.id,
            correct,
            level = word.mastery_level.value(),
            "review recorded"
        );
        Ok(word)
    }

    pub async fn due_words(&self, username: &str) -> Result<Vec<WordCard>, StudyError> {
        let user = self.find_user(username).await?;
        self.cache
            .get_or_compute(CacheView::DueWords, &user.id, || async {
                Ok::<_, StudyError>(self.repos.words.list_due(&user.id, self.clock.now()).await?)
            })
            .await
    }

    /// Words with at least one incorrect review, most recent mistake first.
    pub async fn incorrect_words(&self, username: &str) -> Result<Vec<WordCard>, StudyError> {
        let user = self.find_user(username).await?;
        self.cache
            .get_or_compute(CacheView::IncorrectWords, &user.id, || async {
                let rows = self.repos.reviews.incorrect_with_word(&user.id).await?;
                let mut seen = HashSet::new();
                Ok::<_, StudyError>(rows
                    .into_iter()
                    .filter_map(|(_, word)| seen.insert(word.id.clone()).then_some(word))
                    .collect())
            })
            .await
    }

    pub async fn import_words(
        &self,
        username: &str,
        content: &str,
    ) -> Result<ImportSummary, StudyError> {
        if content.trim().is_empty() {
            return Err(StudyError::validation("请上传有效的单词本文件"));
        }
        let user = self.find_user(username).await?;
        let parsed = parse_word_list(content);
        let summary = ImportSummary {
            imported: parsed.drafts.len(),
            skipped: parsed.skipped,
        };
        if summary.imported == 0 {
            return Ok(summary);
        }

        let now = self.clock.now();
        let words: Vec<WordCard> = parsed
            .drafts
            .into_iter()
            .map(|draft| WordCard::new(user.id.clone(), draft, now))
            .collect();
        self.repos.words.insert_words(&words).await?;
        self.cache.invalidate(Mutation::ImportWords, &user.id).await;
        tracing::info!(
            user_id = %user.id,
            imported = summary.imported,
            skipped = summary.skipped,
            "word list imported"
        );
        Ok(summary)
    }

    async fn find_owned_word(&self, user_id: &str, word_id: &str) -> Result<WordCard, StudyError> {
        self.repos
            .words
            .find_owned(user_id, word_id)
            .await?
            .ok_or_else(|| StudyError::not_found("未找到该单词"))
    }
}
