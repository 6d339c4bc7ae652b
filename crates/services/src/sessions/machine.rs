use std::fmt;
use std::sync::Arc;

use storage::repository::{SessionRepository, StorageError};
use syneval_core::Clock;
use syneval_core::model::{Session, SessionId, Trial, TrialSet};
use tracing::{debug, info, warn};

use super::display::{DisplayOrder, TrialPresentation};
use super::locks::SessionLocks;
use super::progress::{SessionProgress, SubmitOutcome};
use crate::error::SessionError;
use crate::settings::SessionSettings;

/// Drives participant sessions through `New → InProgress → Complete` over a
/// fixed trial set, with idle expiry.
///
/// Operations on one session id are serialized; different ids run in parallel.
pub struct SessionMachine {
    clock: Clock,
    trials: Arc<TrialSet>,
    sessions: Arc<dyn SessionRepository>,
    settings: SessionSettings,
    locks: SessionLocks,
}

impl SessionMachine {
    #[must_use]
    pub fn new(
        clock: Clock,
        trials: Arc<TrialSet>,
        sessions: Arc<dyn SessionRepository>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            clock,
            trials,
            sessions,
            settings,
            locks: SessionLocks::default(),
        }
    }

    #[must_use]
    pub fn trials(&self) -> &TrialSet {
        &self.trials
    }

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Allocate and persist a fresh session with every slot unanswered.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the session cannot be persisted.
    pub async fn create(&self) -> Result<SessionId, SessionError> {
        let session = Session::new(SessionId::generate(), self.trials.len(), self.clock.now());
        self.sessions.create(&session).await?;
        info!(session_id = %session.id(), trials = self.trials.len(), "session created");
        Ok(session.id().clone())
    }

    /// Whether the session exists and has been active within the timeout.
    ///
    /// Fails closed: an unknown id is simply inactive.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` for storage failures other than a missing session.
    pub async fn is_active(&self, id: &SessionId) -> Result<bool, SessionError> {
        match self.sessions.last_modified(id).await {
            Ok(last_activity) => {
                Ok(self.clock.elapsed_since(last_activity) <= self.settings.activity_timeout())
            }
            Err(StorageError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Index of the first unanswered trial, or `N` when complete. Read-only,
    /// and available for expired sessions too.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for unknown ids.
    pub async fn current_trial(&self, id: &SessionId) -> Result<usize, SessionError> {
        Ok(self.load(id).await?.current_trial())
    }

    /// Progress of any stored session, expired or not. Read-only.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for unknown ids.
    pub async fn progress(&self, id: &SessionId) -> Result<SessionProgress, SessionError> {
        Ok(SessionProgress::from(&self.load(id).await?))
    }

    /// Progress of an active session, for picking up where a participant left off.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` or `SessionError::Expired`.
    pub async fn resume(&self, id: &SessionId) -> Result<SessionProgress, SessionError> {
        let session = self.load_active(id).await?;
        debug!(session_id = %id, next = session.current_trial(), "session resumed");
        Ok(SessionProgress::from(&session))
    }

    /// Build a freshly shuffled presentation of one trial.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::IndexOutOfRange` for a bad trial index, or
    /// `NotFound`/`Expired` for an unusable session.
    pub async fn present(
        &self,
        id: &SessionId,
        trial_index: usize,
    ) -> Result<TrialPresentation, SessionError> {
        let trial = self.trial(trial_index)?;
        let session = self.load_active(id).await?;
        let order = DisplayOrder::shuffled(trial.option_count(), &mut rand::rng());
        Ok(self.presentation(&session, trial, order))
    }

    /// Like `present`, with a caller-chosen display order.
    ///
    /// # Errors
    ///
    /// As `present`; additionally `IndexOutOfRange` if `order` does not cover
    /// the trial's options.
    pub async fn present_with_order(
        &self,
        id: &SessionId,
        trial_index: usize,
        order: DisplayOrder,
    ) -> Result<TrialPresentation, SessionError> {
        let trial = self.trial(trial_index)?;
        if order.len() != trial.option_count() {
            return Err(SessionError::option_out_of_range(
                order.len(),
                trial.option_count(),
            ));
        }
        let session = self.load_active(id).await?;
        Ok(self.presentation(&session, trial, order))
    }

    /// Record the canonical option `choice` for `trial_index`.
    ///
    /// Re-submitting a trial overwrites the earlier answer. Nothing is written
    /// on error.
    ///
    /// # Errors
    ///
    /// - `IndexOutOfRange` if the trial or option index is invalid.
    /// - `NotFound` / `Expired` if the session cannot be used.
    /// - `NoSelectionMade` if `choice` is `None`.
    pub async fn submit(
        &self,
        id: &SessionId,
        trial_index: usize,
        choice: Option<usize>,
    ) -> Result<SubmitOutcome, SessionError> {
        let trial = self.trial(trial_index)?;

        let _guard = self.locks.acquire(id).await;
        let mut session = self.load_active(id).await?;

        let Some(choice) = choice else {
            return Err(SessionError::NoSelectionMade);
        };
        session.record(trial, choice, self.clock.now())?;
        self.sessions.store(&session).await?;
        debug!(session_id = %id, trial = trial_index, choice, "answer stored");

        let outcome = self.next_after(&session, trial_index);
        if outcome == SubmitOutcome::Complete {
            info!(session_id = %id, "session complete");
        }
        Ok(outcome)
    }

    /// Record a choice given as a position in the display order the trial was
    /// rendered with. The position is mapped to the canonical option before storing.
    ///
    /// # Errors
    ///
    /// As `submit`; `IndexOutOfRange` also covers a display position outside
    /// `order` or an order that does not match the trial.
    pub async fn submit_displayed(
        &self,
        id: &SessionId,
        trial_index: usize,
        order: &DisplayOrder,
        display_choice: Option<usize>,
    ) -> Result<SubmitOutcome, SessionError> {
        let trial = self.trial(trial_index)?;
        if order.len() != trial.option_count() {
            return Err(SessionError::option_out_of_range(
                order.len(),
                trial.option_count(),
            ));
        }
        let canonical = match display_choice {
            Some(position) => Some(
                order
                    .canonical_index(position)
                    .ok_or_else(|| SessionError::option_out_of_range(position, order.len()))?,
            ),
            None => None,
        };
        self.submit(id, trial_index, canonical).await
    }

    fn trial(&self, index: usize) -> Result<&Trial, SessionError> {
        self.trials
            .trial(index)
            .ok_or_else(|| SessionError::trial_out_of_range(index, self.trials.len()))
    }

    async fn load(&self, id: &SessionId) -> Result<Session, SessionError> {
        match self.sessions.load(id).await {
            Ok(session) => Ok(session),
            Err(StorageError::NotFound) => Err(SessionError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_active(&self, id: &SessionId) -> Result<Session, SessionError> {
        let session = self.load(id).await?;
        if !session.is_active(self.clock.now(), self.settings.activity_timeout()) {
            warn!(
                session_id = %id,
                last_activity = %session.last_activity(),
                "session expired"
            );
            return Err(SessionError::Expired);
        }
        Ok(session)
    }

    fn presentation(
        &self,
        session: &Session,
        trial: &Trial,
        order: DisplayOrder,
    ) -> TrialPresentation {
        let previous_choice = session
            .answers()
            .get(trial.index())
            .and_then(|slot| slot.option())
            .and_then(|canonical| order.display_position(canonical));
        TrialPresentation {
            trial_index: trial.index(),
            total_trials: self.trials.len(),
            options: order.arrange(trial),
            order,
            previous_choice,
        }
    }

    /// The trial after `answered`, or the first gap once the last trial is done.
    fn next_after(&self, session: &Session, answered: usize) -> SubmitOutcome {
        let next = answered + 1;
        if next < self.trials.len() {
            SubmitOutcome::Next(next)
        } else if session.is_complete() {
            SubmitOutcome::Complete
        } else {
            SubmitOutcome::Next(session.current_trial())
        }
    }
}

impl fmt::Debug for SessionMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMachine")
            .field("clock", &self.clock)
            .field("trials", &self.trials.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storage::repository::InMemoryRepository;
    use syneval_core::model::{AnswerSlot, SessionStage};
    use syneval_core::time::{fixed_clock, fixed_now};

    fn trials() -> Arc<TrialSet> {
        let set: TrialSet = r#"{"classes": ["a", "b", "c"], "tasks": [
            {"options": [1, 2, 3], "truth": 0},
            {"options": [4, 5, 6], "truth": 1}
        ]}"#
        .parse()
        .unwrap();
        Arc::new(set)
    }

    fn machine_at(clock: Clock, repo: &InMemoryRepository) -> SessionMachine {
        SessionMachine::new(
            clock,
            trials(),
            Arc::new(repo.clone()),
            SessionSettings::default(),
        )
    }

    #[tokio::test]
    async fn create_allocates_unanswered_session() {
        let repo = InMemoryRepository::new();
        let machine = machine_at(fixed_clock(), &repo);
        let id = machine.create().await.unwrap();

        let stored = repo.load(&id).await.unwrap();
        assert_eq!(stored.answers(), &[AnswerSlot::Unanswered; 2]);
        assert_eq!(stored.last_activity(), fixed_now());
        assert!(machine.is_active(&id).await.unwrap());
        assert_eq!(machine.current_trial(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_session_is_inactive_and_not_found() {
        let repo = InMemoryRepository::new();
        let machine = machine_at(fixed_clock(), &repo);
        let ghost = SessionId::new("ghost").unwrap();
        assert!(!machine.is_active(&ghost).await.unwrap());
        let err = machine.submit(&ghost, 0, Some(0)).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
        assert!(err.requires_restart());
    }

    #[tokio::test]
    async fn submit_walks_to_completion() {
        let repo = InMemoryRepository::new();
        let machine = machine_at(fixed_clock(), &repo);
        let id = machine.create().await.unwrap();

        assert_eq!(
            machine.submit(&id, 0, Some(0)).await.unwrap(),
            SubmitOutcome::Next(1)
        );
        assert_eq!(
            machine.submit(&id, 1, Some(2)).await.unwrap(),
            SubmitOutcome::Complete
        );
        assert_eq!(machine.current_trial(&id).await.unwrap(), 2);
        let progress = machine.resume(&id).await.unwrap();
        assert!(progress.is_complete);
        assert_eq!(progress.stage, SessionStage::Complete);
    }

    #[tokio::test]
    async fn answering_last_trial_with_gap_points_back() {
        let repo = InMemoryRepository::new();
        let machine = machine_at(fixed_clock(), &repo);
        let id = machine.create().await.unwrap();
        assert_eq!(
            machine.submit(&id, 1, Some(1)).await.unwrap(),
            SubmitOutcome::Next(0)
        );
    }

    #[tokio::test]
    async fn missing_choice_leaves_state_untouched() {
        let repo = InMemoryRepository::new();
        let machine = machine_at(fixed_clock(), &repo);
        let id = machine.create().await.unwrap();
        let err = machine.submit(&id, 0, None).await.unwrap_err();
        assert!(matches!(err, SessionError::NoSelectionMade));
        assert_eq!(repo.load(&id).await.unwrap().answered_count(), 0);
    }

    #[tokio::test]
    async fn out_of_range_indices_are_rejected() {
        let repo = InMemoryRepository::new();
        let machine = machine_at(fixed_clock(), &repo);
        let id = machine.create().await.unwrap();
        assert!(matches!(
            machine.submit(&id, 2, Some(0)).await.unwrap_err(),
            SessionError::IndexOutOfRange { what: "trial", index: 2, limit: 2 }
        ));
        assert!(matches!(
            machine.submit(&id, 0, Some(3)).await.unwrap_err(),
            SessionError::IndexOutOfRange { what: "option", index: 3, limit: 3 }
        ));
        assert_eq!(repo.load(&id).await.unwrap().answered_count(), 0);
    }

    #[tokio::test]
    async fn expired_session_rejects_submission_without_mutation() {
        let repo = InMemoryRepository::new();
        let id = machine_at(fixed_clock(), &repo).create().await.unwrap();

        let mut later = fixed_clock();
        later.advance(Duration::minutes(10) + Duration::seconds(1));
        let machine = machine_at(later, &repo);

        assert!(!machine.is_active(&id).await.unwrap());
        let err = machine.submit(&id, 0, Some(0)).await.unwrap_err();
        assert!(matches!(err, SessionError::Expired));
        assert!(err.requires_restart());
        assert_eq!(repo.load(&id).await.unwrap().answered_count(), 0);
        // Still readable for reporting.
        assert_eq!(machine.current_trial(&id).await.unwrap(), 0);
        let progress = machine.progress(&id).await.unwrap();
        assert_eq!(progress.stage, SessionStage::New);
        assert_eq!(progress.answered, 0);
    }

    #[tokio::test]
    async fn each_answer_extends_the_activity_window() {
        let repo = InMemoryRepository::new();
        let id = machine_at(fixed_clock(), &repo).create().await.unwrap();

        let mut clock = fixed_clock();
        clock.advance(Duration::minutes(9));
        machine_at(clock, &repo).submit(&id, 0, Some(1)).await.unwrap();

        clock.advance(Duration::minutes(9));
        assert!(machine_at(clock, &repo).is_active(&id).await.unwrap());
    }

    #[tokio::test]
    async fn displayed_choice_is_stored_canonically() {
        let repo = InMemoryRepository::new();
        let machine = machine_at(fixed_clock(), &repo);
        let id = machine.create().await.unwrap();

        let order = DisplayOrder::from_canonical(vec![2, 0, 1]).unwrap();
        machine
            .submit_displayed(&id, 0, &order, Some(0))
            .await
            .unwrap();
        let stored = repo.load(&id).await.unwrap();
        assert_eq!(stored.answers()[0], AnswerSlot::Answered(2));

        // A later rendering with a different order re-shows the same option.
        let reshuffled = DisplayOrder::from_canonical(vec![1, 2, 0]).unwrap();
        let view = machine.present_with_order(&id, 0, reshuffled).await.unwrap();
        assert_eq!(view.previous_choice, Some(1));
        assert_eq!(view.options[1].value(), 3);
    }

    #[tokio::test]
    async fn present_shuffles_all_options() {
        let repo = InMemoryRepository::new();
        let machine = machine_at(fixed_clock(), &repo);
        let id = machine.create().await.unwrap();
        let view = machine.present(&id, 1).await.unwrap();
        let mut shown: Vec<u64> = view.options.iter().map(|o| o.value()).collect();
        shown.sort_unstable();
        assert_eq!(shown, vec![4, 5, 6]);
        assert_eq!(view.total_trials, 2);
        assert_eq!(view.previous_choice, None);
    }
}
