mod config;
mod ids;
mod session;
mod trial;

pub use config::{StudyConfig, StudyConfigError, TaskConfig};
pub use ids::{ClassId, OptionId, ParseIdError, SessionId};

pub use session::{AnswerSlot, Session, SessionStage, SessionStateError};
pub use trial::{Trial, TrialError, TrialSet, TrialSetError};
