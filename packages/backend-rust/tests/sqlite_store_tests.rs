use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use wordapp_backend_rust::db::models::{
    ReviewEvent, StudyDayRecord, StudySession, User, WordCard, WordDraft,
};
use wordapp_backend_rust::db::{
    ReviewRepository, SessionRepository, SqliteStore, StoreError, StudyDayRepository,
    UserRepository, WordRepository,
};
use wordapp_backend_rust::scheduler::MasteryLevel;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap()
}

async fn open_store(dir: &TempDir) -> SqliteStore {
    let db_path = dir.path().join("wordapp.db");
    let url = format!("sqlite:{}?mode=rwc", db_path.display());
    SqliteStore::connect(&url).await.expect("open sqlite store")
}

async fn seed_user(store: &SqliteStore, username: &str) -> User {
    store.ensure_user(username, now()).await.unwrap()
}

fn word(owner: &User, term: &str, next_review_at: Option<DateTime<Utc>>) -> WordCard {
    let mut card = WordCard::new(owner.id.clone(), WordDraft::new(term, "释义"), now());
    card.next_review_at = next_review_at;
    card
}

fn event(owner: &User, word: &WordCard, correct: bool, at: DateTime<Utc>) -> ReviewEvent {
    ReviewEvent {
        id: uuid::Uuid::new_v4().to_string(),
        word_id: word.id.clone(),
        user_id: owner.id.clone(),
        correct,
        reviewed_at: at,
    }
}

#[tokio::test]
async fn test_ensure_user_converges_on_one_row() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let first = seed_user(&store, "alice").await;
    let second = store
        .ensure_user("alice", now() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(first, second);

    let found = store.find_by_username("alice").await.unwrap();
    assert_eq!(found.map(|u| u.id), Some(first.id));
    assert!(store.find_by_username("bob").await.unwrap().is_none());
}

#[tokio::test]
async fn test_study_day_is_unique_per_user_and_date() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let user = seed_user(&store, "alice").await;
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    let record = |id: &str| StudyDayRecord {
        id: id.to_string(),
        user_id: user.id.clone(),
        study_date: date,
        created_at: now(),
    };

    assert!(store.insert_if_absent(&record("a")).await.unwrap());
    assert!(!store.insert_if_absent(&record("b")).await.unwrap());
    assert!(store.exists_for_date(&user.id, date).await.unwrap());

    let earlier = StudyDayRecord {
        id: "c".to_string(),
        user_id: user.id.clone(),
        study_date: date.pred_opt().unwrap(),
        created_at: now(),
    };
    assert!(store.insert_if_absent(&earlier).await.unwrap());

    let days: Vec<NaiveDate> = store
        .list_desc(&user.id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.study_date)
        .collect();
    assert_eq!(days, vec![date, date.pred_opt().unwrap()]);
}

#[tokio::test]
async fn test_record_review_is_atomic() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let user = seed_user(&store, "alice").await;

    let ghost = word(&user, "ghost", None);
    let err = store
        .record_review(&ghost, &event(&user, &ghost, false, now()))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { table: "words", .. }));
    let count = store
        .count_between(&user.id, now() - Duration::days(1), now() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(count, 0);

    let mut apple = word(&user, "apple", None);
    store.insert_words(std::slice::from_ref(&apple)).await.unwrap();
    apple.mastery_level = MasteryLevel::new(1).unwrap();
    apple.next_review_at = Some(now() + Duration::days(1));
    store
        .record_review(&apple, &event(&user, &apple, true, now()))
        .await
        .unwrap();

    let stored = store.find_owned(&user.id, &apple.id).await.unwrap().unwrap();
    assert_eq!(stored.mastery_level.value(), 1);
    assert_eq!(stored.next_review_at, Some(now() + Duration::days(1)));
    let count = store
        .count_between(&user.id, now(), now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_list_due_puts_unscheduled_first() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let user = seed_user(&store, "alice").await;

    let late = word(&user, "late", Some(now() - Duration::minutes(5)));
    let fresh = word(&user, "fresh", None);
    let early = word(&user, "early", Some(now() - Duration::hours(3)));
    let future = word(&user, "future", Some(now() + Duration::hours(3)));
    store
        .insert_words(&[late.clone(), fresh.clone(), early.clone(), future])
        .await
        .unwrap();

    let due: Vec<String> = store
        .list_due(&user.id, now())
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.term)
        .collect();
    assert_eq!(due, vec!["fresh", "early", "late"]);
    assert_eq!(store.count_due(&user.id, now()).await.unwrap(), 3);
    assert_eq!(store.count_by_owner(&user.id).await.unwrap(), 4);
}

#[tokio::test]
async fn test_search_is_case_insensitive_and_scoped() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let alice = seed_user(&store, "alice").await;
    let bob = seed_user(&store, "bob").await;

    store
        .insert_words(&[
            word(&alice, "Apple", None),
            word(&alice, "pineapple", None),
            word(&alice, "banana", None),
            word(&bob, "apple", None),
        ])
        .await
        .unwrap();

    let found: Vec<String> = store
        .search_by_term(&alice.id, "APP")
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.term)
        .collect();
    assert_eq!(found, vec!["Apple", "pineapple"]);
}

#[tokio::test]
async fn test_incorrect_reviews_most_recent_first() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let user = seed_user(&store, "alice").await;

    let apple = word(&user, "apple", None);
    let pear = word(&user, "pear", None);
    store
        .insert_words(&[apple.clone(), pear.clone()])
        .await
        .unwrap();

    store
        .record_review(&apple, &event(&user, &apple, false, now()))
        .await
        .unwrap();
    store
        .record_review(&pear, &event(&user, &pear, true, now() + Duration::minutes(1)))
        .await
        .unwrap();
    store
        .record_review(&pear, &event(&user, &pear, false, now() + Duration::minutes(2)))
        .await
        .unwrap();

    let terms: Vec<String> = store
        .incorrect_with_word(&user.id)
        .await
        .unwrap()
        .into_iter()
        .map(|(event, word)| {
            assert!(!event.correct);
            word.term
        })
        .collect();
    assert_eq!(terms, vec!["pear", "apple"]);
}

#[tokio::test]
async fn test_deleting_word_keeps_its_reviews() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let user = seed_user(&store, "alice").await;

    let apple = word(&user, "apple", None);
    store.insert_words(std::slice::from_ref(&apple)).await.unwrap();
    store
        .record_review(&apple, &event(&user, &apple, false, now()))
        .await
        .unwrap();

    assert!(store.delete_word(&user.id, &apple.id).await.unwrap());
    assert!(!store.delete_word(&user.id, &apple.id).await.unwrap());

    let count = store
        .count_between(&user.id, now(), now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert!(store.incorrect_with_word(&user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sessions_within_window_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let user = seed_user(&store, "alice").await;

    for (id, offset_hours) in [
        ("old", -200),
        ("edge", -168),
        ("a", -24),
        ("b", -1),
        ("now", 0),
        ("later", 72),
    ] {
        store
            .insert_session(&StudySession {
                id: id.to_string(),
                user_id: user.id.clone(),
                started_at: now() + Duration::hours(offset_hours),
                duration_seconds: 600,
                created_at: now(),
            })
            .await
            .unwrap();
    }

    let ids: Vec<String> = store
        .list_between(&user.id, now() - Duration::days(7), now())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec!["now", "b", "a"]);
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let user_id = {
        let store = open_store(&dir).await;
        let user = seed_user(&store, "alice").await;
        store
            .insert_words(&[word(&user, "apple", None)])
            .await
            .unwrap();
        store.pool().close().await;
        user.id
    };

    let store = open_store(&dir).await;
    assert_eq!(store.count_by_owner(&user_id).await.unwrap(), 1);
}
