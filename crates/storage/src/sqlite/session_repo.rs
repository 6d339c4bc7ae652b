use syneval_core::model::{Session, SessionId};
use tracing::{debug, warn};

use super::{
    SqliteRepository,
    mapping::{encode_answers, map_session_row, trial_count_to_i64},
};
use crate::repository::{SessionRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create(&self, session: &Session) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO sessions (id, trial_count, answers, created_at, last_activity)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(session.id().as_str())
        .bind(trial_count_to_i64(session)?)
        .bind(encode_answers(session)?)
        .bind(session.created_at())
        .bind(session.last_activity())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> Result<Session, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, trial_count, answers, created_at, last_activity
                FROM sessions
                WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_session_row(&row)
    }

    async fn store(&self, session: &Session) -> Result<(), StorageError> {
        // Answers and activity are written in one statement so they never diverge.
        let res = sqlx::query(
            r"
                UPDATE sessions
                SET answers = ?2, last_activity = ?3
                WHERE id = ?1 AND trial_count = ?4
            ",
        )
        .bind(session.id().as_str())
        .bind(encode_answers(session)?)
        .bind(session.last_activity())
        .bind(trial_count_to_i64(session)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn last_modified(
        &self,
        id: &SessionId,
    ) -> Result<chrono::DateTime<chrono::Utc>, StorageError> {
        let row = sqlx::query("SELECT last_activity FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        sqlx::Row::try_get(&row, "last_activity")
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn exists(&self, id: &SessionId) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        Ok(row.is_some())
    }

    async fn list(&self) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, trial_count, answers, created_at, last_activity
                FROM sessions
                ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match map_session_row(&row) {
                Ok(session) => out.push(session),
                Err(e) => {
                    let id: Option<String> = sqlx::Row::try_get(&row, "id").ok();
                    warn!(session_id = ?id, error = %e, "skipping undecodable session row");
                }
            }
        }
        debug!(sessions = out.len(), "listed sessions");
        Ok(out)
    }
}
