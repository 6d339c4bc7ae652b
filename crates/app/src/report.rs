//! Plain-text rendering of an aggregation report.

use std::fmt::{self, Write};

use syneval_core::stats::{AggregateReport, AggregateStats};

fn index_list(indices: &[usize]) -> String {
    let items: Vec<String> = indices.iter().map(usize::to_string).collect();
    format!("[{}]", items.join(", "))
}

fn percent(stats: &AggregateStats, count: u32) -> f64 {
    stats.share_of_participants(count) * 100.0
}

/// Write the human-readable report to `out`.
///
/// # Errors
///
/// Propagates formatter errors from `out`.
pub fn render(out: &mut impl Write, report: &AggregateReport) -> fmt::Result {
    if report.skipped_incomplete > 0 {
        writeln!(
            out,
            "[Warning] Skipped {} incomplete sessions.",
            report.skipped_incomplete
        )?;
    }
    if report.skipped_malformed > 0 {
        writeln!(
            out,
            "[Warning] Skipped {} malformed sessions.",
            report.skipped_malformed
        )?;
    }
    writeln!(
        out,
        "Loaded {} evaluation sessions with {} tasks each.",
        report.included, report.trial_count
    )?;

    let Some(stats) = report.stats() else {
        return writeln!(out, "Insufficient data: no complete sessions to aggregate.");
    };

    let acc = &stats.accuracy;
    writeln!(
        out,
        "Accuracy: {:.2} avg, {:.2} stddev, {:.2} max, {:.2} min",
        acc.mean, acc.std_dev, acc.max, acc.min
    )?;
    let values: Vec<String> = stats
        .participants
        .iter()
        .map(|p| format!("{:.2}", p.accuracy))
        .collect();
    writeln!(out, "  [{}]", values.join(", "))?;

    writeln!(out, "Accuracy per class:")?;
    for class in &stats.class_accuracy {
        match class.accuracy {
            Some(value) => writeln!(out, "  '{}': {value:.2} avg", class.label)?,
            None => writeln!(out, "  '{}': n/a (no trials)", class.label)?,
        }
    }

    let peak = &stats.max_agreement;
    let peak_trials = peak.trials();
    let kappa = match stats.kappa {
        Ok(value) => format!("{value:.2}"),
        Err(reason) => format!("undefined ({reason})"),
    };
    writeln!(
        out,
        "Fleiss' Kappa: {kappa} (max agreement: {:.2}% ({} tasks)).",
        percent(stats, peak.count),
        peak_trials.len()
    )?;
    writeln!(out, "  {}", index_list(&peak_trials))?;

    for (label, extremum) in [("Maximum", &stats.max_correct), ("Minimum", &stats.min_correct)] {
        writeln!(
            out,
            "{label} correct choices: {:.2}% ({} tasks)",
            percent(stats, extremum.count),
            extremum.trials.len()
        )?;
        writeln!(out, "  {}", index_list(&extremum.trials))?;
    }

    let per_task: Vec<String> = stats
        .correct_counts
        .iter()
        .enumerate()
        .map(|(t, &count)| format!("task {}: {}%", t + 1, percent(stats, count).floor()))
        .collect();
    writeln!(out, "Percentages of correct choices: {}.", per_task.join(", "))
}
