use sqlx::Row;
use syneval_core::model::{AnswerSlot, Session, SessionId};

use crate::repository::{SessionRecord, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn encode_answers(session: &Session) -> Result<String, StorageError> {
    let answers: Vec<Option<usize>> = session.answers().iter().map(AnswerSlot::option).collect();
    serde_json::to_string(&answers).map_err(ser)
}

pub(crate) fn trial_count_to_i64(session: &Session) -> Result<i64, StorageError> {
    i64::try_from(session.trial_count())
        .map_err(|_| StorageError::Serialization("trial_count overflow".into()))
}

pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StorageError> {
    let id: SessionId = row
        .try_get::<String, _>("id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let trial_count: i64 = row.try_get("trial_count").map_err(ser)?;
    let raw_answers: String = row.try_get("answers").map_err(ser)?;
    let answers: Vec<Option<usize>> = serde_json::from_str(&raw_answers).map_err(ser)?;

    if usize::try_from(trial_count).ok() != Some(answers.len()) {
        return Err(StorageError::Serialization(format!(
            "session {id}: trial_count {trial_count} but {} answers",
            answers.len()
        )));
    }

    SessionRecord {
        id,
        answers,
        created_at: row.try_get("created_at").map_err(ser)?,
        last_activity: row.try_get("last_activity").map_err(ser)?,
    }
    .into_session()
    .map_err(ser)
}
