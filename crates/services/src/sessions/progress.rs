use serde::Serialize;
use syneval_core::model::{Session, SessionStage};

/// Aggregated view of session progress, useful for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    /// First unanswered trial, or `total` when complete.
    pub next_trial: usize,
    pub is_complete: bool,
    pub stage: SessionStage,
}

impl From<&Session> for SessionProgress {
    fn from(session: &Session) -> Self {
        let answered = session.answered_count();
        Self {
            total: session.trial_count(),
            answered,
            remaining: session.trial_count() - answered,
            next_trial: session.current_trial(),
            is_complete: session.is_complete(),
            stage: session.stage(),
        }
    }
}

/// Where the participant goes after a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmitOutcome {
    /// Present this trial next.
    Next(usize),
    /// Every trial is answered.
    Complete,
}
