//! Aggregation and agreement statistics over completed sessions.

mod accuracy;
mod extremal;
mod kappa;
mod matrix;
mod report;

pub use accuracy::{AccuracySummary, ClassAccuracy, ParticipantAccuracy, class_accuracy};
pub use extremal::{AgreementPeak, Extremum, correct_counts, correct_extrema, max_agreement};
pub use kappa::{UndefinedStatistic, fleiss_kappa};
pub use matrix::SelectionMatrix;
pub use report::{AggregateOutcome, AggregateReport, AggregateStats, AggregateWarning, aggregate};
