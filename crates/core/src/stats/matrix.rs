use serde::Serialize;

use crate::model::{Session, TrialSet};

/// Trial × option count matrix of how often each canonical option was chosen.
///
/// Shape is `N × K`. Sufficient statistic for per-class accuracy, agreement
/// and extremal reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionMatrix {
    counts: Vec<u32>,
    trials: usize,
    options: usize,
}

impl SelectionMatrix {
    #[must_use]
    pub fn new(trials: usize, options: usize) -> Self {
        Self {
            counts: vec![0; trials * options],
            trials,
            options,
        }
    }

    /// Build from literal rows. Returns `None` if the rows are ragged.
    #[must_use]
    pub fn from_rows(rows: &[Vec<u32>]) -> Option<Self> {
        let options = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != options) {
            return None;
        }
        Some(Self {
            counts: rows.iter().flatten().copied().collect(),
            trials: rows.len(),
            options,
        })
    }

    /// Count the answers of `sessions`.
    ///
    /// Callers pass only complete sessions that fit `trials`; unanswered or
    /// out-of-range slots are ignored.
    #[must_use]
    pub fn from_sessions<'a>(
        trials: &TrialSet,
        sessions: impl IntoIterator<Item = &'a Session>,
    ) -> Self {
        let mut matrix = Self::new(trials.len(), trials.option_count());
        for session in sessions {
            for (trial, slot) in session.answers().iter().enumerate() {
                if let Some(option) = slot.option() {
                    matrix.record(trial, option);
                }
            }
        }
        matrix
    }

    /// Add one selection. Out-of-range coordinates are ignored.
    pub fn record(&mut self, trial: usize, option: usize) {
        if trial < self.trials && option < self.options {
            self.counts[trial * self.options + option] += 1;
        }
    }

    #[must_use]
    pub fn trial_count(&self) -> usize {
        self.trials
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options
    }

    #[must_use]
    pub fn get(&self, trial: usize, option: usize) -> u32 {
        if trial < self.trials && option < self.options {
            self.counts[trial * self.options + option]
        } else {
            0
        }
    }

    #[must_use]
    pub fn row(&self, trial: usize) -> &[u32] {
        let start = trial * self.options;
        self.counts.get(start..start + self.options).unwrap_or(&[])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u32]> {
        // `chunks` panics on zero; an N×0 matrix has no meaningful rows.
        self.counts.chunks(self.options.max(1))
    }

    /// Total ratings for one trial.
    #[must_use]
    pub fn row_sum(&self, trial: usize) -> u32 {
        self.row(trial).iter().sum()
    }

    /// Total times option position `option` was chosen over all trials.
    #[must_use]
    pub fn column_sum(&self, option: usize) -> u32 {
        (0..self.trials).map(|t| self.get(t, option)).sum()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<u32>> {
        self.rows().map(<[u32]>::to_vec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_sums() {
        let mut m = SelectionMatrix::new(2, 3);
        m.record(0, 0);
        m.record(0, 0);
        m.record(0, 1);
        m.record(1, 1);
        m.record(5, 0);
        assert_eq!(m.to_rows(), vec![vec![2, 1, 0], vec![0, 1, 0]]);
        assert_eq!(m.row_sum(0), 3);
        assert_eq!(m.column_sum(1), 2);
        assert_eq!(m.total(), 4);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(SelectionMatrix::from_rows(&[vec![1, 2], vec![3]]).is_none());
    }
}
