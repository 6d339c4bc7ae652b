use serde::Serialize;

use crate::model::TrialSet;
use crate::stats::SelectionMatrix;

/// An extreme count and every trial that reaches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extremum {
    pub count: u32,
    pub trials: Vec<usize>,
}

/// The largest single cell of the selection matrix and every `(trial, option)`
/// cell that reaches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgreementPeak {
    pub count: u32,
    pub cells: Vec<(usize, usize)>,
}

impl AgreementPeak {
    /// Distinct trials among the peak cells, ascending.
    #[must_use]
    pub fn trials(&self) -> Vec<usize> {
        let mut trials: Vec<usize> = self.cells.iter().map(|&(t, _)| t).collect();
        trials.dedup();
        trials
    }
}

/// Most-agreed-upon cell(s). `None` for an empty matrix.
#[must_use]
pub fn max_agreement(matrix: &SelectionMatrix) -> Option<AgreementPeak> {
    let count = matrix.rows().flat_map(|r| r.iter().copied()).max()?;
    let cells = (0..matrix.trial_count())
        .flat_map(|t| (0..matrix.option_count()).map(move |o| (t, o)))
        .filter(|&(t, o)| matrix.get(t, o) == count)
        .collect();
    Some(AgreementPeak { count, cells })
}

/// `C[t][truth(t)]` for every trial, in trial order.
#[must_use]
pub fn correct_counts(trials: &TrialSet, matrix: &SelectionMatrix) -> Vec<u32> {
    trials
        .trials()
        .iter()
        .map(|t| matrix.get(t.index(), t.truth()))
        .collect()
}

/// Highest and lowest correct counts with all tied trials. `None` when empty.
#[must_use]
pub fn correct_extrema(counts: &[u32]) -> Option<(Extremum, Extremum)> {
    let max = *counts.iter().max()?;
    let min = *counts.iter().min()?;
    let ties = |target: u32| -> Vec<usize> {
        counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == target)
            .map(|(t, _)| t)
            .collect()
    };
    Some((
        Extremum {
            count: max,
            trials: ties(max),
        },
        Extremum {
            count: min,
            trials: ties(min),
        },
    ))
}
