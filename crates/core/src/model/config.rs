//! Study configuration document.
//!
//! The document is JSON:
//!
//! ```json
//! {
//!   "name": "Timbre study",
//!   "classes": ["piano", "strings", "brass"],
//!   "tasks": [
//!     { "options": [17, 4, 9], "truth": 0 },
//!     { "options": [3, 12, 8], "truth": 2, "classes": [0, 1, 2] }
//!   ]
//! }
//! ```
//!
//! When a task has no `classes` list, option position `j` belongs to class `j`.
//! Keys used only by the presentation layer (`code`, `examples`, `data_path`, ...)
//! are ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ClassId, OptionId, Trial, TrialError, TrialSet, TrialSetError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StudyConfigError {
    #[error("invalid study configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("task {index}: {source}")]
    Trial {
        index: usize,
        #[source]
        source: TrialError,
    },

    #[error(transparent)]
    TrialSet(#[from] TrialSetError),
}

/// Raw study document as it appears on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub classes: Vec<String>,
    pub tasks: Vec<TaskConfig>,
}

/// One task entry of the study document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub options: Vec<OptionId>,
    pub truth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<usize>>,
}

impl StudyConfig {
    /// Parse a study document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `StudyConfigError::Parse` on malformed JSON.
    pub fn from_json(text: &str) -> Result<Self, StudyConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate the document and build the immutable trial set.
    ///
    /// # Errors
    ///
    /// Returns `StudyConfigError` if any task or the set as a whole is invalid.
    pub fn into_trial_set(self) -> Result<TrialSet, StudyConfigError> {
        let mut trials = Vec::with_capacity(self.tasks.len());
        for (index, task) in self.tasks.into_iter().enumerate() {
            let option_classes = match task.classes {
                Some(classes) => classes.into_iter().map(ClassId::new).collect(),
                None => (0..task.options.len()).map(ClassId::new).collect(),
            };
            let trial = Trial::new(index, task.options, option_classes, task.truth)
                .map_err(|source| StudyConfigError::Trial { index, source })?;
            trials.push(trial);
        }

        let set = TrialSet::new(self.name, self.classes, trials)?;
        tracing::debug!(
            trials = set.len(),
            options = set.option_count(),
            classes = set.classes().len(),
            "study configuration loaded"
        );
        Ok(set)
    }
}

impl std::str::FromStr for TrialSet {
    type Err = StudyConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StudyConfig::from_json(s)?.into_trial_set()
    }
}
