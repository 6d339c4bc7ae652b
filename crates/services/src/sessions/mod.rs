mod display;
mod locks;
mod machine;
mod progress;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use display::{DisplayOrder, TrialPresentation};
pub use machine::SessionMachine;
pub use progress::{SessionProgress, SubmitOutcome};
