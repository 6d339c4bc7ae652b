//! Fleiss' Kappa over a selection matrix.
//!
//! With `n` ratings per trial, `N` trials and counts `C[i][j]`:
//!
//! - `p_j = Σ_i C[i][j] / (N · n)`
//! - `P_i = (Σ_j C[i][j]² − n) / (n · (n − 1))`
//! - `κ = (P̄ − P̄ₑ) / (1 − P̄ₑ)` with `P̄ = mean(P_i)` and `P̄ₑ = Σ_j p_j²`

use serde::Serialize;
use thiserror::Error;

use crate::stats::SelectionMatrix;

/// Why an agreement statistic could not be computed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub enum UndefinedStatistic {
    #[error("no trials to rate")]
    NoTrials,

    #[error("agreement needs at least two raters per trial, got {raters}")]
    TooFewRaters { raters: u32 },

    #[error("trial {trial} has {found} ratings, expected {expected}")]
    UnevenRatings {
        trial: usize,
        expected: u32,
        found: u32,
    },

    #[error("all ratings fall on a single option; chance agreement is 1")]
    SaturatedChance,
}

/// Compute Fleiss' Kappa.
///
/// # Errors
///
/// Returns `UndefinedStatistic` for degenerate inputs instead of producing NaN.
pub fn fleiss_kappa(matrix: &SelectionMatrix) -> Result<f64, UndefinedStatistic> {
    let trials = matrix.trial_count();
    if trials == 0 || matrix.option_count() == 0 {
        return Err(UndefinedStatistic::NoTrials);
    }

    let raters = matrix.row_sum(0);
    if let Some(trial) = (1..trials).find(|&t| matrix.row_sum(t) != raters) {
        return Err(UndefinedStatistic::UnevenRatings {
            trial,
            expected: raters,
            found: matrix.row_sum(trial),
        });
    }
    if raters <= 1 {
        return Err(UndefinedStatistic::TooFewRaters { raters });
    }

    let n = f64::from(raters);
    #[allow(clippy::cast_precision_loss)]
    let trials_f = trials as f64;

    let chance: f64 = (0..matrix.option_count())
        .map(|j| {
            let p = f64::from(matrix.column_sum(j)) / (trials_f * n);
            p * p
        })
        .sum();

    let observed: f64 = matrix
        .rows()
        .map(|row| {
            let squares: f64 = row.iter().map(|&c| f64::from(c) * f64::from(c)).sum();
            (squares - n) / (n * (n - 1.0))
        })
        .sum::<f64>()
        / trials_f;

    if (1.0 - chance).abs() <= f64::EPSILON {
        return Err(UndefinedStatistic::SaturatedChance);
    }

    Ok((observed - chance) / (1.0 - chance))
}
