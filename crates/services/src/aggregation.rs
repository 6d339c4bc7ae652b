use std::sync::Arc;

use storage::repository::SessionRepository;
use syneval_core::model::TrialSet;
use syneval_core::stats::{AggregateReport, aggregate};
use tracing::info;

use crate::error::AggregationError;

/// Runs the statistics engine over a snapshot of all stored sessions.
#[derive(Clone)]
pub struct AggregationService {
    trials: Arc<TrialSet>,
    sessions: Arc<dyn SessionRepository>,
}

impl AggregationService {
    #[must_use]
    pub fn new(trials: Arc<TrialSet>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self { trials, sessions }
    }

    /// Aggregate the sessions stored right now.
    ///
    /// Sessions written while this runs may or may not be included.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::Storage` if the snapshot cannot be read.
    pub async fn run(&self) -> Result<AggregateReport, AggregationError> {
        let snapshot = self.sessions.list().await?;
        info!(
            sessions = snapshot.len(),
            study = self.trials.name(),
            "aggregating session snapshot"
        );
        Ok(aggregate(&self.trials, &snapshot))
    }
}
