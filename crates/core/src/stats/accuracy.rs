use serde::Serialize;

use crate::model::{ClassId, Session, SessionId, TrialSet};
use crate::stats::SelectionMatrix;

/// Share of a participant's answers that hit the truth option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantAccuracy {
    pub session_id: SessionId,
    pub correct: usize,
    pub accuracy: f64,
}

impl ParticipantAccuracy {
    /// `matches / N` for a complete session.
    #[must_use]
    pub fn of(trials: &TrialSet, session: &Session) -> Self {
        let correct = trials
            .trials()
            .iter()
            .zip(session.answers())
            .filter(|(trial, slot)| slot.option().is_some_and(|o| trial.is_correct(o)))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let accuracy = if trials.is_empty() {
            0.0
        } else {
            correct as f64 / trials.len() as f64
        };
        Self {
            session_id: session.id().clone(),
            correct,
            accuracy,
        }
    }
}

/// Mean, population standard deviation and range of participant accuracies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccuracySummary {
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
    pub min: f64,
}

impl AccuracySummary {
    /// Summarise a list of accuracies. `None` when the list is empty.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            max,
            min,
        })
    }
}

/// Accuracy over all trials whose truth option belongs to one class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassAccuracy {
    pub class: ClassId,
    pub label: String,
    pub trials: usize,
    pub correct: u32,
    pub ratings: u32,
    /// `None` when no trial has its truth in this class.
    pub accuracy: Option<f64>,
}

/// Group trials by the class of their truth option and compute
/// `Σ C[t][truth] / Σ C[t][*]` per class, in class order.
#[must_use]
pub fn class_accuracy(trials: &TrialSet, matrix: &SelectionMatrix) -> Vec<ClassAccuracy> {
    let mut out: Vec<ClassAccuracy> = trials
        .classes()
        .iter()
        .enumerate()
        .map(|(index, label)| ClassAccuracy {
            class: ClassId::new(index),
            label: label.clone(),
            trials: 0,
            correct: 0,
            ratings: 0,
            accuracy: None,
        })
        .collect();

    for trial in trials.trials() {
        let Some(entry) = out.get_mut(trial.truth_class().index()) else {
            continue;
        };
        entry.trials += 1;
        entry.correct += matrix.get(trial.index(), trial.truth());
        entry.ratings += matrix.row_sum(trial.index());
    }

    for entry in &mut out {
        if entry.ratings > 0 {
            entry.accuracy = Some(f64::from(entry.correct) / f64::from(entry.ratings));
        }
    }
    out
}
