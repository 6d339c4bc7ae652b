#![forbid(unsafe_code)]

pub mod aggregation;
pub mod error;
pub mod sessions;
pub mod settings;

pub use syneval_core::Clock;

pub use aggregation::AggregationService;
pub use error::{AggregationError, SessionError, SettingsError};
pub use settings::SessionSettings;

pub use sessions::{
    DisplayOrder, SessionMachine, SessionProgress, SubmitOutcome, TrialPresentation,
};
