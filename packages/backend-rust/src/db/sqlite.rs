use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::db::models::{ReviewEvent, StudyDayRecord, StudySession, User, WordCard};
use crate::db::{
    DbInitError, ReviewRepository, SessionRepository, StoreError, StudyDayRepository,
    UserRepository, WordRepository,
};
use crate::scheduler::MasteryLevel;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS "users" (
    "id" TEXT PRIMARY KEY,
    "username" TEXT NOT NULL UNIQUE,
    "created_at" INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS "words" (
    "id" TEXT PRIMARY KEY,
    "owner_id" TEXT NOT NULL REFERENCES "users"("id") ON DELETE CASCADE,
    "term" TEXT NOT NULL,
    "definition" TEXT NOT NULL,
    "example" TEXT,
    "meanings" TEXT,
    "examples" TEXT,
    "word_root" TEXT,
    "similar_words" TEXT,
    "exam_tag" TEXT,
    "mastery_level" INTEGER NOT NULL DEFAULT 0,
    "next_review_at" INTEGER,
    "memory_strength" REAL,
    "created_at" INTEGER NOT NULL,
    "updated_at" INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS "idx_words_owner_updated" ON "words" ("owner_id", "updated_at");
CREATE INDEX IF NOT EXISTS "idx_words_owner_next_review" ON "words" ("owner_id", "next_review_at");

CREATE TABLE IF NOT EXISTS "review_events" (
    "id" TEXT PRIMARY KEY,
    "word_id" TEXT NOT NULL,
    "user_id" TEXT NOT NULL,
    "correct" INTEGER NOT NULL,
    "reviewed_at" INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS "idx_review_events_user_time" ON "review_events" ("user_id", "reviewed_at");

CREATE TABLE IF NOT EXISTS "study_days" (
    "id" TEXT PRIMARY KEY,
    "user_id" TEXT NOT NULL,
    "study_date" TEXT NOT NULL,
    "created_at" INTEGER NOT NULL,
    UNIQUE ("user_id", "study_date")
);

CREATE TABLE IF NOT EXISTS "study_sessions" (
    "id" TEXT PRIMARY KEY,
    "user_id" TEXT NOT NULL,
    "started_at" INTEGER NOT NULL,
    "duration_seconds" INTEGER NOT NULL DEFAULT 0,
    "created_at" INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS "idx_study_sessions_user_start" ON "study_sessions" ("user_id", "started_at");
"#;

const WORD_COLUMNS: &str = r#"w."id", w."owner_id", w."term", w."definition", w."example", w."meanings",
    w."examples", w."word_root", w."similar_words", w."exam_tag", w."mastery_level",
    w."next_review_at", w."memory_strength", w."created_at", w."updated_at""#;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self, DbInitError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|err| DbInitError::InvalidUrl(err.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        // Every connection to an in-memory database gets its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 10 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn millis_to_datetime(ms: i64, table: &'static str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| StoreError::Corrupt {
        table,
        reason: format!("timestamp {ms} out of range"),
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn word_from_row(row: &SqliteRow) -> Result<WordCard, StoreError> {
    let next_review_ms: Option<i64> = row.try_get("next_review_at")?;
    let next_review_at = match next_review_ms {
        Some(ms) => Some(millis_to_datetime(ms, "words")?),
        None => None,
    };

    Ok(WordCard {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        term: row.try_get("term")?,
        definition: row.try_get("definition")?,
        example: row.try_get("example")?,
        meanings: row.try_get("meanings")?,
        examples: row.try_get("examples")?,
        word_root: row.try_get("word_root")?,
        similar_words: row.try_get("similar_words")?,
        exam_tag: row.try_get("exam_tag")?,
        mastery_level: MasteryLevel::saturating_from(row.try_get::<i64, _>("mastery_level")?),
        next_review_at,
        memory_strength: row.try_get("memory_strength")?,
        created_at: millis_to_datetime(row.try_get("created_at")?, "words")?,
        updated_at: millis_to_datetime(row.try_get("updated_at")?, "words")?,
    })
}

fn words_from_rows(rows: &[SqliteRow]) -> Result<Vec<WordCard>, StoreError> {
    rows.iter().map(word_from_row).collect()
}

fn study_day_from_row(row: &SqliteRow) -> Result<StudyDayRecord, StoreError> {
    let raw_date: String = row.try_get("study_date")?;
    let study_date =
        NaiveDate::parse_from_str(&raw_date, DATE_FORMAT).map_err(|err| StoreError::Corrupt {
            table: "study_days",
            reason: format!("study_date {raw_date}: {err}"),
        })?;

    Ok(StudyDayRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        study_date,
        created_at: millis_to_datetime(row.try_get("created_at")?, "study_days")?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<StudySession, StoreError> {
    Ok(StudySession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        started_at: millis_to_datetime(row.try_get("started_at")?, "study_sessions")?,
        duration_seconds: row.try_get("duration_seconds")?,
        created_at: millis_to_datetime(row.try_get("created_at")?, "study_sessions")?,
    })
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            r#"SELECT "id", "username", "created_at" FROM "users" WHERE "username" = ? LIMIT 1"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            created_at: millis_to_datetime(row.try_get("created_at")?, "users")?,
        }))
    }

    async fn ensure_user(&self, username: &str, now: DateTime<Utc>) -> Result<User, StoreError> {
        sqlx::query(
            r#"INSERT INTO "users" ("id", "username", "created_at") VALUES (?, ?, ?)
               ON CONFLICT ("username") DO NOTHING"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(username)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        self.find_by_username(username)
            .await?
            .ok_or_else(|| StoreError::Corrupt {
                table: "users",
                reason: format!("user {username} missing after insert"),
            })
    }
}

#[async_trait]
impl WordRepository for SqliteStore {
    async fn insert_words(&self, words: &[WordCard]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for word in words {
            sqlx::query(
                r#"INSERT INTO "words"
                  ("id","owner_id","term","definition","example","meanings","examples","word_root",
                   "similar_words","exam_tag","mastery_level","next_review_at","memory_strength",
                   "created_at","updated_at")
                VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)"#,
            )
            .bind(&word.id)
            .bind(&word.owner_id)
            .bind(&word.term)
            .bind(&word.definition)
            .bind(&word.example)
            .bind(&word.meanings)
            .bind(&word.examples)
            .bind(&word.word_root)
            .bind(&word.similar_words)
            .bind(&word.exam_tag)
            .bind(word.mastery_level.value() as i64)
            .bind(word.next_review_at.map(|at| at.timestamp_millis()))
            .bind(word.memory_strength)
            .bind(word.created_at.timestamp_millis())
            .bind(word.updated_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_content(&self, word: &WordCard) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE "words" SET
                "term" = ?, "definition" = ?, "example" = ?, "meanings" = ?, "examples" = ?,
                "word_root" = ?, "similar_words" = ?, "exam_tag" = ?, "updated_at" = ?
               WHERE "id" = ? AND "owner_id" = ?"#,
        )
        .bind(&word.term)
        .bind(&word.definition)
        .bind(&word.example)
        .bind(&word.meanings)
        .bind(&word.examples)
        .bind(&word.word_root)
        .bind(&word.similar_words)
        .bind(&word.exam_tag)
        .bind(word.updated_at.timestamp_millis())
        .bind(&word.id)
        .bind(&word.owner_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_word(&self, owner_id: &str, word_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(r#"DELETE FROM "words" WHERE "id" = ? AND "owner_id" = ?"#)
            .bind(word_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_owned(
        &self,
        owner_id: &str,
        word_id: &str,
    ) -> Result<Option<WordCard>, StoreError> {
        let sql = format!(
            r#"SELECT {WORD_COLUMNS} FROM "words" w WHERE w."id" = ? AND w."owner_id" = ? LIMIT 1"#
        );
        let row = sqlx::query(&sql)
            .bind(word_id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(word_from_row).transpose()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WordCard>, StoreError> {
        let sql = format!(
            r#"SELECT {WORD_COLUMNS} FROM "words" w WHERE w."owner_id" = ?
               ORDER BY w."updated_at" DESC, w.rowid ASC"#
        );
        let rows = sqlx::query(&sql).bind(owner_id).fetch_all(&self.pool).await?;
        words_from_rows(&rows)
    }

    async fn search_by_term(
        &self,
        owner_id: &str,
        term: &str,
    ) -> Result<Vec<WordCard>, StoreError> {
        let sql = format!(
            r#"SELECT {WORD_COLUMNS} FROM "words" w
               WHERE w."owner_id" = ? AND instr(lower(w."term"), lower(?)) > 0
               ORDER BY w."updated_at" DESC, w.rowid ASC"#
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .bind(term)
            .fetch_all(&self.pool)
            .await?;
        words_from_rows(&rows)
    }

    async fn list_due(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<WordCard>, StoreError> {
        let sql = format!(
            r#"SELECT {WORD_COLUMNS} FROM "words" w
               WHERE w."owner_id" = ? AND (w."next_review_at" IS NULL OR w."next_review_at" <= ?)
               ORDER BY w."next_review_at" IS NOT NULL, w."next_review_at" ASC, w.rowid ASC"#
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .bind(now.timestamp_millis())
            .fetch_all(&self.pool)
            .await?;
        words_from_rows(&rows)
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "words" WHERE "owner_id" = ?"#)
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_due(&self, owner_id: &str, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM "words"
               WHERE "owner_id" = ? AND ("next_review_at" IS NULL OR "next_review_at" <= ?)"#,
        )
        .bind(owner_id)
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl ReviewRepository for SqliteStore {
    async fn record_review(&self, word: &WordCard, event: &ReviewEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE "words" SET "mastery_level" = ?, "next_review_at" = ?, "updated_at" = ?
               WHERE "id" = ? AND "owner_id" = ?"#,
        )
        .bind(word.mastery_level.value() as i64)
        .bind(word.next_review_at.map(|at| at.timestamp_millis()))
        .bind(word.updated_at.timestamp_millis())
        .bind(&word.id)
        .bind(&word.owner_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Corrupt {
                table: "words",
                reason: format!("word {} vanished before review", word.id),
            });
        }

        sqlx::query(
            r#"INSERT INTO "review_events" ("id", "word_id", "user_id", "correct", "reviewed_at")
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&event.id)
        .bind(&event.word_id)
        .bind(&event.user_id)
        .bind(event.correct)
        .bind(event.reviewed_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM "review_events"
               WHERE "user_id" = ? AND "reviewed_at" >= ? AND "reviewed_at" < ?"#,
        )
        .bind(user_id)
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn incorrect_with_word(
        &self,
        user_id: &str,
    ) -> Result<Vec<(ReviewEvent, WordCard)>, StoreError> {
        let sql = format!(
            r#"SELECT r."id" AS "review_id", r."word_id" AS "review_word_id",
                      r."user_id" AS "review_user_id", r."correct" AS "review_correct",
                      r."reviewed_at" AS "review_reviewed_at", {WORD_COLUMNS}
               FROM "review_events" r
               JOIN "words" w ON w."id" = r."word_id"
               WHERE r."user_id" = ? AND r."correct" = 0
               ORDER BY r."reviewed_at" DESC, r.rowid DESC"#
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let event = ReviewEvent {
                    id: row.try_get("review_id")?,
                    word_id: row.try_get("review_word_id")?,
                    user_id: row.try_get("review_user_id")?,
                    correct: row.try_get("review_correct")?,
                    reviewed_at: millis_to_datetime(
                        row.try_get("review_reviewed_at")?,
                        "review_events",
                    )?,
                };
                Ok((event, word_from_row(row)?))
            })
            .collect()
    }
}

#[async_trait]
impl StudyDayRepository for SqliteStore {
    async fn exists_for_date(&self, user_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"SELECT 1 FROM "study_days" WHERE "user_id" = ? AND "study_date" = ? LIMIT 1"#,
        )
        .bind(user_id)
        .bind(format_date(date))
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn insert_if_absent(&self, record: &StudyDayRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"INSERT INTO "study_days" ("id", "user_id", "study_date", "created_at")
               VALUES (?, ?, ?, ?)
               ON CONFLICT ("user_id", "study_date") DO NOTHING"#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(format_date(record.study_date))
        .bind(record.created_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_desc(&self, user_id: &str) -> Result<Vec<StudyDayRecord>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT "id", "user_id", "study_date", "created_at" FROM "study_days"
               WHERE "user_id" = ? ORDER BY "study_date" DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(study_day_from_row).collect()
    }
}

#[async_trait]
impl SessionRepository for SqliteStore {
    async fn insert_session(&self, session: &StudySession) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO "study_sessions" ("id", "user_id", "started_at", "duration_seconds", "created_at")
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(session.started_at.timestamp_millis())
        .bind(session.duration_seconds)
        .bind(session.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_between(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<StudySession>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT "id", "user_id", "started_at", "duration_seconds", "created_at"
               FROM "study_sessions"
               WHERE "user_id" = ? AND "started_at" > ? AND "started_at" <= ?
               ORDER BY "started_at" DESC"#,
        )
        .bind(user_id)
        .bind(since.timestamp_millis())
        .bind(until.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(session_from_row).collect()
    }
}
