//! File-per-session store: `<root>/<session id>.json`.
//!
//! New files hold a `SessionRecord` object. Bare JSON arrays written by earlier
//! runs (`[17, null, 9]`) are still readable. Those hold the chosen option *ids*,
//! which are mapped to canonical positions through the study's trial set on
//! load. An id that is not among its trial's options loads as position `K`, so
//! aggregation reports the session as malformed instead of mis-scoring it.
//! Legacy files carry no activity timestamp and load with
//! `created_at = last_activity = UNIX_EPOCH`: never resumable, still aggregated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use syneval_core::model::{Session, SessionId, TrialSet};
use tracing::{debug, warn};

use crate::repository::{SessionRecord, SessionRepository, StorageError};

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredFile {
    Record(SessionRecord),
    Legacy(Vec<Option<u64>>),
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[derive(Debug, Clone)]
pub struct JsonDirRepository {
    root: PathBuf,
    trials: Arc<TrialSet>,
}

impl JsonDirRepository {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, trials: Arc<TrialSet>) -> Self {
        Self {
            root: root.into(),
            trials,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn positions_from_ids(
        &self,
        session_id: &SessionId,
        ids: Vec<Option<u64>>,
    ) -> Vec<Option<usize>> {
        ids.into_iter()
            .enumerate()
            .map(|(index, value)| {
                let option_id = value?;
                let position = self
                    .trials
                    .trial(index)
                    .and_then(|t| t.options().iter().position(|o| o.value() == option_id));
                if position.is_none() {
                    debug!(
                        %session_id,
                        trial = index,
                        option_id,
                        "legacy answer is not an option of its trial"
                    );
                }
                Some(position.unwrap_or_else(|| self.trials.option_count()))
            })
            .collect()
    }

    fn decode(&self, id: SessionId, bytes: &[u8]) -> Result<Session, StorageError> {
        let record = match serde_json::from_slice::<StoredFile>(bytes).map_err(ser)? {
            StoredFile::Record(record) => {
                if record.id != id {
                    return Err(StorageError::Serialization(format!(
                        "file for {id} holds session {}",
                        record.id
                    )));
                }
                record
            }
            StoredFile::Legacy(option_ids) => SessionRecord {
                answers: self.positions_from_ids(&id, option_ids),
                id,
                created_at: DateTime::<Utc>::UNIX_EPOCH,
                last_activity: DateTime::<Utc>::UNIX_EPOCH,
            },
        };
        record.into_session().map_err(ser)
    }

    /// Write via a temp file and rename so readers never see partial JSON.
    async fn write_atomic(&self, session: &Session) -> Result<(), StorageError> {
        let body = serde_json::to_vec(&SessionRecord::from_session(session)).map_err(ser)?;
        let tmp = self.root.join(format!(".{}.json.tmp", session.id()));
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, self.path_for(session.id())).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for JsonDirRepository {
    async fn create(&self, session: &Session) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        if tokio::fs::try_exists(self.path_for(session.id())).await? {
            return Err(StorageError::Conflict);
        }
        self.write_atomic(session).await
    }

    async fn load(&self, id: &SessionId) -> Result<Session, StorageError> {
        let bytes = tokio::fs::read(self.path_for(id)).await?;
        self.decode(id.clone(), &bytes)
    }

    async fn store(&self, session: &Session) -> Result<(), StorageError> {
        if !tokio::fs::try_exists(self.path_for(session.id())).await? {
            return Err(StorageError::NotFound);
        }
        self.write_atomic(session).await
    }

    async fn exists(&self, id: &SessionId) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.path_for(id)).await?)
    }

    async fn list(&self) -> Result<Vec<Session>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<SessionId>().ok())
            else {
                debug!(path = %path.display(), "ignoring file without a session id name");
                continue;
            };
            let bytes = tokio::fs::read(&path).await?;
            match self.decode(id, &bytes) {
                Ok(session) => out.push(session),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable session file"),
            }
        }

        out.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syneval_core::model::AnswerSlot;
    use syneval_core::time::fixed_now;

    fn repo() -> JsonDirRepository {
        let trials: TrialSet = r#"{"classes": ["a", "b", "c"], "tasks": [
            {"options": [2, 0, 1], "truth": 0},
            {"options": [5, 3, 4], "truth": 0},
            {"options": [8, 6, 7], "truth": 2}
        ]}"#
        .parse()
        .unwrap();
        JsonDirRepository::new("unused", Arc::new(trials))
    }

    #[test]
    fn legacy_array_ids_become_canonical_positions() {
        let id = SessionId::new("legacy1").unwrap();
        let session = repo().decode(id, b"[2, null, 7]").unwrap();
        assert_eq!(
            session.answers(),
            &[
                AnswerSlot::Answered(0),
                AnswerSlot::Unanswered,
                AnswerSlot::Answered(2)
            ]
        );
        assert_eq!(session.last_activity(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn unknown_legacy_id_loads_out_of_range() {
        let id = SessionId::new("legacy2").unwrap();
        let session = repo().decode(id, b"[2, 99, 7]").unwrap();
        assert_eq!(session.answers()[1], AnswerSlot::Answered(3));
    }

    #[test]
    fn rejects_record_with_foreign_id() {
        let other = Session::new(SessionId::new("other").unwrap(), 1, fixed_now());
        let body = serde_json::to_vec(&SessionRecord::from_session(&other)).unwrap();
        let err = repo()
            .decode(SessionId::new("mine").unwrap(), &body)
            .unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
