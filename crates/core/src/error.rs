use thiserror::Error;

use crate::model::{SessionStateError, StudyConfigError, TrialError, TrialSetError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Trial(#[from] TrialError),
    #[error(transparent)]
    TrialSet(#[from] TrialSetError),
    #[error(transparent)]
    StudyConfig(#[from] StudyConfigError),
    #[error(transparent)]
    SessionState(#[from] SessionStateError),
}
