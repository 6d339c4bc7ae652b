use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{SessionId, Trial};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("trial {index} is out of range for {len} trials")]
    TrialOutOfRange { index: usize, len: usize },

    #[error("option {option} is out of range for {len} options")]
    OptionOutOfRange { option: usize, len: usize },

    #[error("last activity is before session creation")]
    InvalidTimeRange,
}

/// One slot of a participant's answer vector.
///
/// `Answered` holds a position into the trial's canonical option list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<usize>", into = "Option<usize>")]
pub enum AnswerSlot {
    #[default]
    Unanswered,
    Answered(usize),
}

impl AnswerSlot {
    #[must_use]
    pub fn is_answered(&self) -> bool {
        matches!(self, AnswerSlot::Answered(_))
    }

    #[must_use]
    pub fn option(&self) -> Option<usize> {
        match self {
            AnswerSlot::Answered(option) => Some(*option),
            AnswerSlot::Unanswered => None,
        }
    }
}

impl From<Option<usize>> for AnswerSlot {
    fn from(value: Option<usize>) -> Self {
        value.map_or(AnswerSlot::Unanswered, AnswerSlot::Answered)
    }
}

impl From<AnswerSlot> for Option<usize> {
    fn from(value: AnswerSlot) -> Self {
        value.option()
    }
}

/// Coarse lifecycle stage derived from the answer vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStage {
    New,
    InProgress,
    Complete,
}

/// One participant's answer vector across all trials of a study.
///
/// The vector length is fixed at creation and equals the trial count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    answers: Vec<AnswerSlot>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Session {
    /// Start a session with every slot unanswered.
    #[must_use]
    pub fn new(id: SessionId, trial_count: usize, now: DateTime<Utc>) -> Self {
        Self {
            id,
            answers: vec![AnswerSlot::Unanswered; trial_count],
            created_at: now,
            last_activity: now,
        }
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTimeRange` if `last_activity` precedes `created_at`.
    pub fn from_persisted(
        id: SessionId,
        answers: Vec<AnswerSlot>,
        created_at: DateTime<Utc>,
        last_activity: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        if last_activity < created_at {
            return Err(SessionStateError::InvalidTimeRange);
        }
        Ok(Self {
            id,
            answers,
            created_at,
            last_activity,
        })
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn answers(&self) -> &[AnswerSlot] {
        &self.answers
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Length of the answer vector (`N`).
    #[must_use]
    pub fn trial_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_answered()).count()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.answers.iter().all(AnswerSlot::is_answered)
    }

    /// Index of the first unanswered trial, or `N` when complete.
    #[must_use]
    pub fn current_trial(&self) -> usize {
        self.answers
            .iter()
            .position(|a| !a.is_answered())
            .unwrap_or(self.answers.len())
    }

    #[must_use]
    pub fn stage(&self) -> SessionStage {
        match self.answered_count() {
            0 if !self.answers.is_empty() => SessionStage::New,
            n if n == self.answers.len() => SessionStage::Complete,
            _ => SessionStage::InProgress,
        }
    }

    /// True while `now - last_activity` is within `timeout`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity <= timeout
    }

    /// Store `option` (a canonical option position) for `trial` and bump activity.
    ///
    /// Re-recording a slot overwrites the previous answer.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if the trial is outside the answer vector or
    /// the option is outside the trial's option list. The session is unchanged on error.
    pub fn record(
        &mut self,
        trial: &Trial,
        option: usize,
        at: DateTime<Utc>,
    ) -> Result<(), SessionStateError> {
        let len = self.answers.len();
        let Some(slot) = self.answers.get_mut(trial.index()) else {
            return Err(SessionStateError::TrialOutOfRange {
                index: trial.index(),
                len,
            });
        };
        if option >= trial.option_count() {
            return Err(SessionStateError::OptionOutOfRange {
                option,
                len: trial.option_count(),
            });
        }

        *slot = AnswerSlot::Answered(option);
        if at > self.last_activity {
            self.last_activity = at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassId, OptionId};
    use crate::time::fixed_now;

    fn trial(index: usize) -> Trial {
        Trial::new(
            index,
            vec![OptionId::new(1), OptionId::new(2), OptionId::new(3)],
            (0..3).map(ClassId::new).collect(),
            0,
        )
        .unwrap()
    }

    fn session(n: usize) -> Session {
        Session::new(SessionId::new("abc").unwrap(), n, fixed_now())
    }

    #[test]
    fn new_session_is_all_unanswered() {
        let s = session(3);
        assert_eq!(s.trial_count(), 3);
        assert_eq!(s.current_trial(), 0);
        assert_eq!(s.stage(), SessionStage::New);
        assert!(!s.is_complete());
    }

    #[test]
    fn recording_advances_current_trial_and_never_resizes() {
        let mut s = session(2);
        let later = fixed_now() + Duration::seconds(5);
        s.record(&trial(0), 2, later).unwrap();
        assert_eq!(s.current_trial(), 1);
        assert_eq!(s.stage(), SessionStage::InProgress);
        assert_eq!(s.last_activity(), later);

        s.record(&trial(1), 0, later).unwrap();
        assert!(s.is_complete());
        assert_eq!(s.current_trial(), 2);
        assert_eq!(s.trial_count(), 2);
    }

    #[test]
    fn out_of_order_answers_leave_gap_as_current_trial() {
        let mut s = session(3);
        s.record(&trial(1), 1, fixed_now()).unwrap();
        assert_eq!(s.current_trial(), 0);
    }

    #[test]
    fn rejects_out_of_range_without_mutation() {
        let mut s = session(2);
        let err = s.record(&trial(5), 0, fixed_now()).unwrap_err();
        assert_eq!(err, SessionStateError::TrialOutOfRange { index: 5, len: 2 });
        let err = s.record(&trial(0), 3, fixed_now()).unwrap_err();
        assert_eq!(err, SessionStateError::OptionOutOfRange { option: 3, len: 3 });
        assert_eq!(s.answered_count(), 0);
    }

    #[test]
    fn activity_window_is_inclusive() {
        let s = session(1);
        let timeout = Duration::minutes(10);
        assert!(s.is_active(fixed_now() + timeout, timeout));
        assert!(!s.is_active(fixed_now() + timeout + Duration::seconds(1), timeout));
    }

    #[test]
    fn answer_slots_serialize_like_nullable_indices() {
        let slots = vec![AnswerSlot::Answered(2), AnswerSlot::Unanswered];
        let json = serde_json::to_string(&slots).unwrap();
        assert_eq!(json, "[2,null]");
        let back: Vec<AnswerSlot> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, slots);
    }
}
