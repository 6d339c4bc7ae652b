use std::collections::HashSet;

use thiserror::Error;

use crate::model::{ClassId, OptionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrialError {
    #[error("trial needs at least two options, got {len}")]
    TooFewOptions { len: usize },

    #[error("option {option} appears more than once")]
    DuplicateOption { option: OptionId },

    #[error("truth index {truth} is out of range for {len} options")]
    TruthOutOfRange { truth: usize, len: usize },

    #[error("{classes} class labels given for {options} options")]
    ClassCountMismatch { options: usize, classes: usize },
}

/// One forced-choice question: a fixed, ordered option list and the index of
/// the correct option in it.
///
/// The order of `options` is canonical. Stored answers always index into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trial {
    index: usize,
    options: Vec<OptionId>,
    option_classes: Vec<ClassId>,
    truth: usize,
}

impl Trial {
    /// Build a trial, validating the option list and truth index.
    ///
    /// `option_classes[j]` is the class of `options[j]`.
    ///
    /// # Errors
    ///
    /// Returns `TrialError` if fewer than two options are given, options repeat,
    /// `truth` is out of range, or the class list does not match the options.
    pub fn new(
        index: usize,
        options: Vec<OptionId>,
        option_classes: Vec<ClassId>,
        truth: usize,
    ) -> Result<Self, TrialError> {
        if options.len() < 2 {
            return Err(TrialError::TooFewOptions { len: options.len() });
        }
        let mut seen = HashSet::with_capacity(options.len());
        for option in &options {
            if !seen.insert(*option) {
                return Err(TrialError::DuplicateOption { option: *option });
            }
        }
        if truth >= options.len() {
            return Err(TrialError::TruthOutOfRange {
                truth,
                len: options.len(),
            });
        }
        if option_classes.len() != options.len() {
            return Err(TrialError::ClassCountMismatch {
                options: options.len(),
                classes: option_classes.len(),
            });
        }

        Ok(Self {
            index,
            options,
            option_classes,
            truth,
        })
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn options(&self) -> &[OptionId] {
        &self.options
    }

    /// Number of options (`K`).
    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn truth(&self) -> usize {
        self.truth
    }

    #[must_use]
    pub fn truth_option(&self) -> OptionId {
        self.options[self.truth]
    }

    /// Class of the correct option; the grouping key for per-class accuracy.
    #[must_use]
    pub fn truth_class(&self) -> ClassId {
        self.option_classes[self.truth]
    }

    #[must_use]
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.truth
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrialSetError {
    #[error("a study needs at least one trial")]
    Empty,

    #[error("trial {index} has {found} options, expected {expected}")]
    OptionCountMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("trial at position {position} carries index {index}")]
    IndexMismatch { position: usize, index: usize },

    #[error("trial {index} references class {class} but only {classes} classes exist")]
    UnknownClass {
        index: usize,
        class: usize,
        classes: usize,
    },
}

/// Immutable, ordered description of a study.
///
/// Every trial has the same option count `K`. Shared read-only across all
/// sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialSet {
    name: String,
    classes: Vec<String>,
    trials: Vec<Trial>,
    option_count: usize,
}

impl TrialSet {
    /// Assemble a trial set.
    ///
    /// # Errors
    ///
    /// Returns `TrialSetError` if there are no trials, trial indices do not
    /// match their position, option counts differ, or a class index has no label.
    pub fn new(
        name: impl Into<String>,
        classes: Vec<String>,
        trials: Vec<Trial>,
    ) -> Result<Self, TrialSetError> {
        let Some(first) = trials.first() else {
            return Err(TrialSetError::Empty);
        };
        let option_count = first.option_count();

        for (position, trial) in trials.iter().enumerate() {
            if trial.index() != position {
                return Err(TrialSetError::IndexMismatch {
                    position,
                    index: trial.index(),
                });
            }
            if trial.option_count() != option_count {
                return Err(TrialSetError::OptionCountMismatch {
                    index: position,
                    expected: option_count,
                    found: trial.option_count(),
                });
            }
            if let Some(class) = trial
                .option_classes
                .iter()
                .find(|c| c.index() >= classes.len())
            {
                return Err(TrialSetError::UnknownClass {
                    index: position,
                    class: class.index(),
                    classes: classes.len(),
                });
            }
        }

        Ok(Self {
            name: name.into(),
            classes,
            trials,
            option_count,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of trials (`N`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    /// Always false for a constructed set; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Options per trial (`K`).
    #[must_use]
    pub fn option_count(&self) -> usize {
        self.option_count
    }

    #[must_use]
    pub fn trial(&self, index: usize) -> Option<&Trial> {
        self.trials.get(index)
    }

    #[must_use]
    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(ids: &[u64]) -> Vec<OptionId> {
        ids.iter().copied().map(OptionId::new).collect()
    }

    fn classes(n: usize) -> Vec<ClassId> {
        (0..n).map(ClassId::new).collect()
    }

    #[test]
    fn trial_rejects_truth_out_of_range() {
        let err = Trial::new(0, opts(&[1, 2, 3]), classes(3), 3).unwrap_err();
        assert_eq!(err, TrialError::TruthOutOfRange { truth: 3, len: 3 });
    }

    #[test]
    fn trial_rejects_duplicate_options() {
        let err = Trial::new(0, opts(&[1, 2, 1]), classes(3), 0).unwrap_err();
        assert_eq!(
            err,
            TrialError::DuplicateOption {
                option: OptionId::new(1)
            }
        );
    }

    #[test]
    fn trial_rejects_single_option() {
        let err = Trial::new(0, opts(&[1]), classes(1), 0).unwrap_err();
        assert_eq!(err, TrialError::TooFewOptions { len: 1 });
    }

    #[test]
    fn truth_class_follows_truth_position() {
        let trial = Trial::new(0, opts(&[5, 6, 7]), classes(3), 2).unwrap();
        assert_eq!(trial.truth_class(), ClassId::new(2));
        assert_eq!(trial.truth_option(), OptionId::new(7));
        assert!(trial.is_correct(2));
        assert!(!trial.is_correct(0));
    }

    #[test]
    fn trial_set_requires_constant_option_count() {
        let t0 = Trial::new(0, opts(&[1, 2, 3]), classes(3), 0).unwrap();
        let t1 = Trial::new(1, opts(&[4, 5]), classes(2), 1).unwrap();
        let labels = vec!["a".into(), "b".into(), "c".into()];
        let err = TrialSet::new("study", labels, vec![t0, t1]).unwrap_err();
        assert_eq!(
            err,
            TrialSetError::OptionCountMismatch {
                index: 1,
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn trial_set_rejects_unknown_class() {
        let t0 = Trial::new(0, opts(&[1, 2, 3]), classes(3), 0).unwrap();
        let err = TrialSet::new("study", vec!["a".into()], vec![t0]).unwrap_err();
        assert!(matches!(err, TrialSetError::UnknownClass { class: 1, .. }));
    }

    #[test]
    fn trial_set_rejects_empty() {
        let err = TrialSet::new("study", Vec::new(), Vec::new()).unwrap_err();
        assert_eq!(err, TrialSetError::Empty);
    }
}
