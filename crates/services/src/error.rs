//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use syneval_core::model::SessionStateError;

/// Errors emitted by `SessionMachine`.
///
/// All variants are local to one request; none affect other sessions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// No session exists for the id; the caller must start over.
    #[error("session not found")]
    NotFound,
    /// The session exists but has been idle past the activity timeout; a new
    /// session is required.
    #[error("session expired")]
    Expired,
    #[error("{what} index {index} is out of range (limit {limit})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        limit: usize,
    },
    /// Submitted without a choice; re-prompt without changing anything.
    #[error("no selection made")]
    NoSelectionMade,
    #[error(transparent)]
    State(SessionStateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<SessionStateError> for SessionError {
    fn from(e: SessionStateError) -> Self {
        match e {
            SessionStateError::TrialOutOfRange { index, len } => Self::trial_out_of_range(index, len),
            SessionStateError::OptionOutOfRange { option, len } => {
                Self::option_out_of_range(option, len)
            }
            other => Self::State(other),
        }
    }
}

impl SessionError {
    pub(crate) fn trial_out_of_range(index: usize, limit: usize) -> Self {
        Self::IndexOutOfRange {
            what: "trial",
            index,
            limit,
        }
    }

    pub(crate) fn option_out_of_range(index: usize, limit: usize) -> Self {
        Self::IndexOutOfRange {
            what: "option",
            index,
            limit,
        }
    }

    /// True when the participant has to be sent back to start a new session.
    #[must_use]
    pub fn requires_restart(&self) -> bool {
        matches!(self, Self::NotFound | Self::Expired)
    }
}

/// Errors emitted by `AggregationService`.
///
/// Statistical degeneracies are reported inside the report, not here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AggregationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while reading session settings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("invalid {name} value: {raw}")]
    InvalidValue { name: &'static str, raw: String },
}
