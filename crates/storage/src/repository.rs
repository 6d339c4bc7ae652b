use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use syneval_core::model::{AnswerSlot, Session, SessionId, SessionStateError, TrialSet};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound
        } else {
            StorageError::Io(e.to_string())
        }
    }
}

/// Persisted shape for a session.
///
/// Answers are nullable canonical option indices, matching the result files
/// written by earlier runs of the study (`[0, null, 2]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub answers: Vec<Option<usize>>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionRecord {
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.id().clone(),
            answers: session.answers().iter().map(AnswerSlot::option).collect(),
            created_at: session.created_at(),
            last_activity: session.last_activity(),
        }
    }

    /// Convert the record back into a domain `Session`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if the timestamps are inconsistent.
    pub fn into_session(self) -> Result<Session, SessionStateError> {
        Session::from_persisted(
            self.id,
            self.answers.into_iter().map(AnswerSlot::from).collect(),
            self.created_at,
            self.last_activity,
        )
    }
}

/// Keyed persistence of one answer vector per participant session.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a freshly created session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is already taken.
    async fn create(&self, session: &Session) -> Result<(), StorageError>;

    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn load(&self, id: &SessionId) -> Result<Session, StorageError>;

    /// Overwrite the answers and activity timestamp of an existing session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session was never created.
    async fn store(&self, session: &Session) -> Result<(), StorageError>;

    /// Last recorded participant activity for a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn last_modified(&self, id: &SessionId) -> Result<DateTime<Utc>, StorageError> {
        Ok(self.load(id).await?.last_activity())
    }

    /// # Errors
    ///
    /// Returns storage errors other than a missing session.
    async fn exists(&self, id: &SessionId) -> Result<bool, StorageError> {
        match self.load(id).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Point-in-time snapshot of every stored session, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    async fn list(&self) -> Result<Vec<Session>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create(&self, session: &Session) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.contains_key(session.id()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> Result<Session, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(id).cloned().ok_or(StorageError::NotFound)
    }

    async fn store(&self, session: &Session) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let slot = guard.get_mut(session.id()).ok_or(StorageError::NotFound)?;
        *slot = session.clone();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Session>, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut all: Vec<Session> = guard.values().cloned().collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(all)
    }
}

/// Bundles the session repository behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let sessions: Arc<dyn SessionRepository> = Arc::new(InMemoryRepository::new());
        Self { sessions }
    }

    /// Build a `Storage` over a result directory with one JSON file per session.
    ///
    /// `trials` resolves the option ids found in legacy result files.
    #[must_use]
    pub fn json_dir(root: impl Into<std::path::PathBuf>, trials: Arc<TrialSet>) -> Self {
        let sessions: Arc<dyn SessionRepository> =
            Arc::new(crate::json_dir::JsonDirRepository::new(root, trials));
        Self { sessions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use syneval_core::model::{ClassId, OptionId, Trial};
    use syneval_core::time::fixed_now;

    fn trial(index: usize) -> Trial {
        Trial::new(
            index,
            vec![OptionId::new(1), OptionId::new(2)],
            vec![ClassId::new(0), ClassId::new(1)],
            0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn round_trips_answers_and_activity() {
        let repo = InMemoryRepository::new();
        let id = SessionId::new("p1").unwrap();
        let mut session = Session::new(id.clone(), 2, fixed_now());
        repo.create(&session).await.unwrap();

        let later = fixed_now() + Duration::minutes(3);
        session.record(&trial(1), 1, later).unwrap();
        repo.store(&session).await.unwrap();

        let fetched = repo.load(&id).await.unwrap();
        assert_eq!(fetched.answers(), session.answers());
        assert_eq!(repo.last_modified(&id).await.unwrap(), later);
        assert!(repo.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn create_conflicts_and_store_requires_existing() {
        let repo = InMemoryRepository::new();
        let session = Session::new(SessionId::new("p1").unwrap(), 2, fixed_now());
        repo.create(&session).await.unwrap();
        assert!(matches!(
            repo.create(&session).await,
            Err(StorageError::Conflict)
        ));

        let ghost = Session::new(SessionId::new("ghost").unwrap(), 2, fixed_now());
        assert!(matches!(repo.store(&ghost).await, Err(StorageError::NotFound)));
        assert!(!repo.exists(ghost.id()).await.unwrap());
    }

    #[tokio::test]
    async fn list_is_sorted_snapshot() {
        let repo = InMemoryRepository::new();
        for id in ["c", "a", "b"] {
            let s = Session::new(SessionId::new(id).unwrap(), 1, fixed_now());
            repo.create(&s).await.unwrap();
        }
        let ids: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn record_serializes_nullable_answers() {
        let session = Session::new(SessionId::new("p1").unwrap(), 2, fixed_now());
        let json = serde_json::to_value(SessionRecord::from_session(&session)).unwrap();
        assert_eq!(json["answers"], serde_json::json!([null, null]));
        assert_eq!(json["id"], "p1");
    }
}
