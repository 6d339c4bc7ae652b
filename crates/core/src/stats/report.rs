use serde::Serialize;
use tracing::{info, warn};

use crate::model::{Session, SessionId, TrialSet};
use crate::stats::{
    AccuracySummary, AgreementPeak, ClassAccuracy, Extremum, ParticipantAccuracy,
    SelectionMatrix, UndefinedStatistic, class_accuracy, correct_counts, correct_extrema,
    fleiss_kappa, max_agreement,
};

/// Non-fatal conditions met while aggregating.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub enum AggregateWarning {
    /// Sessions with at least one unanswered slot.
    SkippedIncomplete { count: usize },
    /// A session whose answer vector does not fit the trial set.
    Malformed { session_id: SessionId, reason: String },
    /// Agreement could not be computed.
    UndefinedKappa(UndefinedStatistic),
}

/// Statistics over the included sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    pub participants: Vec<ParticipantAccuracy>,
    pub accuracy: AccuracySummary,
    pub matrix: SelectionMatrix,
    pub class_accuracy: Vec<ClassAccuracy>,
    pub kappa: Result<f64, UndefinedStatistic>,
    pub max_agreement: AgreementPeak,
    pub correct_counts: Vec<u32>,
    pub max_correct: Extremum,
    pub min_correct: Extremum,
}

impl AggregateStats {
    /// `count` as a fraction of the participants included.
    #[must_use]
    pub fn share_of_participants(&self, count: u32) -> f64 {
        if self.participants.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.participants.len() as f64;
        f64::from(count) / n
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AggregateOutcome {
    /// No complete session survived filtering; no numeric statistics.
    InsufficientData,
    Computed(Box<AggregateStats>),
}

/// Result of one aggregation run over a snapshot of sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub trial_count: usize,
    pub option_count: usize,
    pub included: usize,
    pub skipped_incomplete: usize,
    pub skipped_malformed: usize,
    pub warnings: Vec<AggregateWarning>,
    pub outcome: AggregateOutcome,
}

impl AggregateReport {
    #[must_use]
    pub fn stats(&self) -> Option<&AggregateStats> {
        match &self.outcome {
            AggregateOutcome::Computed(stats) => Some(stats),
            AggregateOutcome::InsufficientData => None,
        }
    }

    #[must_use]
    pub fn is_insufficient(&self) -> bool {
        matches!(self.outcome, AggregateOutcome::InsufficientData)
    }
}

/// Check that `session` fits `trials`. Unanswered slots are not an error here.
fn malformed_reason(trials: &TrialSet, session: &Session) -> Option<String> {
    if session.trial_count() != trials.len() {
        return Some(format!(
            "answer vector has {} slots, study has {} trials",
            session.trial_count(),
            trials.len()
        ));
    }
    trials
        .trials()
        .iter()
        .zip(session.answers())
        .find_map(|(trial, slot)| match slot.option() {
            Some(option) if option >= trial.option_count() => Some(format!(
                "trial {} answered with option {option} of {}",
                trial.index(),
                trial.option_count()
            )),
            _ => None,
        })
}

/// Aggregate a snapshot of sessions against the study's trial set.
///
/// Pure: incomplete and malformed sessions are counted and reported, never
/// included. Undefined agreement is carried in the report next to the
/// statistics that could be computed.
#[must_use]
pub fn aggregate<'a>(
    trials: &TrialSet,
    sessions: impl IntoIterator<Item = &'a Session>,
) -> AggregateReport {
    let mut warnings = Vec::new();
    let mut included: Vec<&Session> = Vec::new();
    let mut skipped_incomplete = 0;
    let mut skipped_malformed = 0;

    for session in sessions {
        if let Some(reason) = malformed_reason(trials, session) {
            warn!(session_id = %session.id(), %reason, "skipping malformed session");
            skipped_malformed += 1;
            warnings.push(AggregateWarning::Malformed {
                session_id: session.id().clone(),
                reason,
            });
        } else if session.is_complete() {
            included.push(session);
        } else {
            skipped_incomplete += 1;
        }
    }

    if skipped_incomplete > 0 {
        warn!(count = skipped_incomplete, "skipped incomplete sessions");
        warnings.push(AggregateWarning::SkippedIncomplete {
            count: skipped_incomplete,
        });
    }

    let report = |warnings, outcome| AggregateReport {
        trial_count: trials.len(),
        option_count: trials.option_count(),
        included: included.len(),
        skipped_incomplete,
        skipped_malformed,
        warnings,
        outcome,
    };

    let participants: Vec<ParticipantAccuracy> = included
        .iter()
        .map(|s| ParticipantAccuracy::of(trials, s))
        .collect();
    let values: Vec<f64> = participants.iter().map(|p| p.accuracy).collect();
    let Some(accuracy) = AccuracySummary::from_values(&values) else {
        warn!("no complete sessions to aggregate");
        return report(warnings, AggregateOutcome::InsufficientData);
    };

    let matrix = SelectionMatrix::from_sessions(trials, included.iter().copied());
    let class_accuracy = class_accuracy(trials, &matrix);

    let kappa = fleiss_kappa(&matrix);
    if let Err(reason) = kappa {
        warn!(%reason, "fleiss' kappa is undefined");
        warnings.push(AggregateWarning::UndefinedKappa(reason));
    }

    let correct_counts = correct_counts(trials, &matrix);
    let (Some(max_agreement), Some((max_correct, min_correct))) =
        (max_agreement(&matrix), correct_extrema(&correct_counts))
    else {
        return report(warnings, AggregateOutcome::InsufficientData);
    };

    info!(
        included = participants.len(),
        ratings = matrix.total(),
        mean_accuracy = accuracy.mean,
        "aggregation complete"
    );

    let stats = AggregateStats {
        participants,
        accuracy,
        matrix,
        class_accuracy,
        kappa,
        max_agreement,
        correct_counts,
        max_correct,
        min_correct,
    };
    report(warnings, AggregateOutcome::Computed(Box::new(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerSlot, SessionId};
    use crate::time::fixed_now;

    fn study() -> TrialSet {
        r#"{"classes": ["a", "b", "c"], "tasks": [
            {"options": [1, 2, 3], "truth": 0},
            {"options": [4, 5, 6], "truth": 1}
        ]}"#
        .parse()
        .unwrap()
    }

    fn session(id: &str, answers: &[Option<usize>]) -> Session {
        Session::from_persisted(
            SessionId::new(id).unwrap(),
            answers.iter().map(|&a| AnswerSlot::from(a)).collect(),
            fixed_now(),
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn three_participant_example() {
        let sessions = vec![
            session("p1", &[Some(0), Some(1)]),
            session("p2", &[Some(0), Some(1)]),
            session("p3", &[Some(1), Some(1)]),
        ];
        let report = aggregate(&study(), &sessions);
        let stats = report.stats().unwrap();

        let accs: Vec<f64> = stats.participants.iter().map(|p| p.accuracy).collect();
        assert_eq!(accs, vec![1.0, 1.0, 0.5]);
        assert!((stats.accuracy.mean - 0.8333).abs() < 1e-3);
        assert_eq!(stats.matrix.to_rows(), vec![vec![2, 1, 0], vec![0, 3, 0]]);
        assert_eq!(stats.correct_counts, vec![2, 3]);
        assert_eq!(stats.max_correct, Extremum { count: 3, trials: vec![1] });
        assert_eq!(stats.min_correct, Extremum { count: 2, trials: vec![0] });
        assert_eq!(stats.max_agreement.cells, vec![(1, 1)]);
        assert!((stats.kappa.unwrap() - 0.25).abs() < 1e-12);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn incomplete_sessions_are_counted_not_used() {
        let sessions = vec![
            session("p1", &[Some(0), Some(1)]),
            session("p2", &[Some(0), None]),
        ];
        let report = aggregate(&study(), &sessions);
        assert_eq!(report.included, 1);
        assert_eq!(report.skipped_incomplete, 1);
        assert!(
            report
                .warnings
                .contains(&AggregateWarning::SkippedIncomplete { count: 1 })
        );
        let stats = report.stats().unwrap();
        for trial in 0..2 {
            assert_eq!(stats.matrix.row_sum(trial), 1);
        }
        // A single rater leaves kappa undefined but keeps accuracy.
        assert_eq!(stats.kappa, Err(UndefinedStatistic::TooFewRaters { raters: 1 }));
        assert_eq!(stats.accuracy.mean, 1.0);
    }

    #[test]
    fn zero_complete_sessions_is_insufficient() {
        let sessions = vec![session("p1", &[None, None])];
        let report = aggregate(&study(), &sessions);
        assert!(report.is_insufficient());
        assert!(report.stats().is_none());
        assert_eq!(report.skipped_incomplete, 1);

        let empty: Vec<Session> = Vec::new();
        assert!(aggregate(&study(), &empty).is_insufficient());
    }

    #[test]
    fn malformed_sessions_are_skipped() {
        let sessions = vec![
            session("short", &[Some(0)]),
            session("wide", &[Some(7), Some(0)]),
            session("ok", &[Some(0), Some(1)]),
        ];
        let report = aggregate(&study(), &sessions);
        assert_eq!(report.skipped_malformed, 2);
        assert_eq!(report.included, 1);
    }

    #[test]
    fn identical_answers_give_perfect_kappa() {
        let sessions: Vec<Session> = (0..4)
            .map(|i| session(&format!("p{i}"), &[Some(2), Some(1)]))
            .collect();
        let stats_report = aggregate(&study(), &sessions);
        let stats = stats_report.stats().unwrap();
        assert!((stats.kappa.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(stats.accuracy.mean, 0.5);
    }
}
