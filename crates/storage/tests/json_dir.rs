use std::sync::Arc;

use chrono::Duration;
use storage::json_dir::JsonDirRepository;
use storage::repository::{SessionRepository, StorageError};
use syneval_core::model::{AnswerSlot, ClassId, OptionId, Session, SessionId, Trial, TrialSet};
use syneval_core::time::fixed_now;

fn study() -> Arc<TrialSet> {
    let set: TrialSet = r#"{"classes": ["a", "b", "c"], "tasks": [
        {"options": [12, 10, 11], "truth": 0},
        {"options": [21, 22, 20], "truth": 1},
        {"options": [30, 31, 32], "truth": 2}
    ]}"#
    .parse()
    .unwrap();
    Arc::new(set)
}

fn trial(index: usize) -> Trial {
    Trial::new(
        index,
        vec![OptionId::new(1), OptionId::new(2), OptionId::new(3)],
        (0..3).map(ClassId::new).collect(),
        1,
    )
    .unwrap()
}

#[tokio::test]
async fn writes_one_file_per_session() {
    let dir = tempfile::tempdir().unwrap();
    let repo = JsonDirRepository::new(dir.path(), study());

    let id = SessionId::new("abc123").unwrap();
    let mut session = Session::new(id.clone(), 2, fixed_now());
    repo.create(&session).await.unwrap();
    assert!(dir.path().join("abc123.json").is_file());

    let later = fixed_now() + Duration::seconds(90);
    session.record(&trial(1), 0, later).unwrap();
    repo.store(&session).await.unwrap();

    let loaded = repo.load(&id).await.unwrap();
    assert_eq!(
        loaded.answers(),
        &[AnswerSlot::Unanswered, AnswerSlot::Answered(0)]
    );
    assert_eq!(repo.last_modified(&id).await.unwrap(), later);
    assert!(matches!(
        repo.create(&session).await,
        Err(StorageError::Conflict)
    ));
}

#[tokio::test]
async fn lists_legacy_and_current_files_and_skips_noise() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("OldUser01.json"), "[10, 22, null]").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
    std::fs::write(dir.path().join("broken.json"), "{").unwrap();

    let repo = JsonDirRepository::new(dir.path(), study());
    let fresh = Session::new(SessionId::new("fresh").unwrap(), 3, fixed_now());
    repo.create(&fresh).await.unwrap();

    let listed = repo.list().await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|s| s.id().as_str()).collect();
    assert_eq!(ids, vec!["OldUser01", "fresh"]);
    assert_eq!(
        listed[0].answers(),
        &[
            AnswerSlot::Answered(1),
            AnswerSlot::Answered(1),
            AnswerSlot::Unanswered
        ]
    );
}

#[tokio::test]
async fn legacy_ids_outside_the_trial_load_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("stray.json"), "[12, 99, 32]").unwrap();

    let repo = JsonDirRepository::new(dir.path(), study());
    let session = repo.load(&SessionId::new("stray").unwrap()).await.unwrap();
    assert_eq!(
        session.answers(),
        &[
            AnswerSlot::Answered(0),
            AnswerSlot::Answered(3),
            AnswerSlot::Answered(2)
        ]
    );
}

#[tokio::test]
async fn missing_directory_lists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let repo = JsonDirRepository::new(dir.path().join("not-yet"), study());
    assert!(repo.list().await.unwrap().is_empty());
    let id = SessionId::new("nobody").unwrap();
    assert!(matches!(repo.load(&id).await, Err(StorageError::NotFound)));
    assert!(!repo.exists(&id).await.unwrap());
}
