//! Corpus quality checks run after a build and before training.

use crate::types::{DatasetReport, ValidationOutcome, ValidationReport, ValidationThresholds};

fn warn_over_ratio(
    label: &str,
    ratio: f32,
    max_ratio: Option<f32>,
    outcome: &mut ValidationOutcome,
    reasons: &mut Vec<String>,
) {
    let Some(max_r) = max_ratio else {
        return;
    };
    if ratio > max_r {
        if *outcome == ValidationOutcome::Pass {
            *outcome = ValidationOutcome::Warn;
        }
        reasons.push(format!("{label}: ratio {ratio:.3} exceeds max {max_r:.3}"));
    }
}

/// Any nonzero `count` warns; a `ratio` over `max_ratio` fails instead. Either
/// way the check contributes a single reason.
fn observe(
    label: &str,
    count: usize,
    ratio: f32,
    max_ratio: Option<f32>,
    outcome: &mut ValidationOutcome,
    reasons: &mut Vec<String>,
) {
    if count == 0 {
        return;
    }
    match max_ratio.filter(|&max_r| ratio > max_r) {
        Some(max_r) => {
            *outcome = ValidationOutcome::Fail;
            reasons.push(format!(
                "{label}: {count} observed, ratio {ratio:.3} exceeds max {max_r:.3}"
            ));
        }
        None => {
            if *outcome == ValidationOutcome::Pass {
                *outcome = ValidationOutcome::Warn;
            }
            reasons.push(format!("{label}: {count} observed"));
        }
    }
}

/// Majority/minority sequence ratio across classes; infinite if a class is empty.
pub fn class_imbalance(report: &DatasetReport) -> f32 {
    let counts: Vec<usize> = report.classes.values().map(|c| c.sequences).collect();
    let (Some(&max), Some(&min)) = (counts.iter().max(), counts.iter().min()) else {
        return 1.0;
    };
    if min == 0 {
        return f32::INFINITY;
    }
    max as f32 / min as f32
}

/// Grade a build report. Imbalance only warns; too-short and skipped-frame
/// ratios over their limits fail.
pub fn validate_report(report: DatasetReport, thresholds: &ValidationThresholds) -> ValidationReport {
    let mut outcome = ValidationOutcome::Pass;
    let mut reasons = Vec::new();

    warn_over_ratio(
        "class imbalance",
        class_imbalance(&report),
        thresholds.max_class_imbalance,
        &mut outcome,
        &mut reasons,
    );

    let videos = report.total_videos();
    let too_short = report.total_too_short();
    observe(
        "too-short videos",
        too_short,
        too_short as f32 / videos.max(1) as f32,
        thresholds.max_too_short_ratio,
        &mut outcome,
        &mut reasons,
    );

    let decoded: usize = report.classes.values().map(|c| c.frames_decoded).sum();
    let skipped: usize = report.classes.values().map(|c| c.frames_skipped).sum();
    observe(
        "skipped frames",
        skipped,
        skipped as f32 / (decoded + skipped).max(1) as f32,
        thresholds.max_skipped_frame_ratio,
        &mut outcome,
        &mut reasons,
    );

    match outcome {
        ValidationOutcome::Pass => tracing::info!("dataset validation passed"),
        ValidationOutcome::Warn => {
            tracing::warn!(reasons = ?reasons, "dataset validation raised warnings")
        }
        ValidationOutcome::Fail => tracing::error!(reasons = ?reasons, "dataset validation failed"),
    }

    ValidationReport {
        outcome,
        reasons,
        report,
    }
}
