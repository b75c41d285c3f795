//! Core types, error definitions, and report structures for sequence_dataset.

use data_contracts::FallLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use vision_core::prelude::{Sequence, ShapeMismatchError};

pub type DatasetResult<T> = Result<T, DatasetError>;

/// The corpus cannot support training. Always fatal; raised before any model exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSufficiencyError {
    #[error("class {label} was declared but has no video sources")]
    EmptyClass { label: FallLabel },
    #[error(
        "need sequences from at least 2 classes, got {}",
        format_counts(.counts)
    )]
    TooFewClasses { counts: Vec<(FallLabel, usize)> },
    #[error(
        "corpus is empty: {videos} videos read, {too_short} shorter than the {required}-frame window"
    )]
    EmptyCorpus {
        videos: usize,
        too_short: usize,
        required: usize,
    },
    #[error("{partition} partition is empty after split (train={train}, test={test})")]
    EmptyPartition {
        partition: &'static str,
        train: usize,
        test: usize,
    },
}

fn format_counts(counts: &[(FallLabel, usize)]) -> String {
    if counts.is_empty() {
        return "none".to_string();
    }
    counts
        .iter()
        .map(|(label, n)| format!("{label}={n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Sufficiency(#[from] DataSufficiencyError),
    #[error(transparent)]
    Shape(#[from] ShapeMismatchError),
    #[error("{0}")]
    Other(String),
}

/// Position of a video within one corpus build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VideoId(pub usize);

#[derive(Debug, Clone)]
pub struct LabeledSequence {
    pub sequence: Sequence,
    pub label: FallLabel,
    pub video: VideoId,
    /// Index of the window's first frame within its video.
    pub start: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: VideoId,
    pub name: String,
    pub label: FallLabel,
    pub frames: usize,
    pub sequences: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub videos_declared: usize,
    pub videos_used: usize,
    pub videos_too_short: usize,
    pub frames_decoded: usize,
    pub frames_skipped: usize,
    pub sequences: usize,
}

/// Per-class summary of one corpus build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetReport {
    pub classes: BTreeMap<FallLabel, ClassReport>,
    pub sequence_length: usize,
    pub stride: usize,
}

impl DatasetReport {
    pub fn total_sequences(&self) -> usize {
        self.classes.values().map(|c| c.sequences).sum()
    }

    pub fn total_videos(&self) -> usize {
        self.classes.values().map(|c| c.videos_declared).sum()
    }

    pub fn total_too_short(&self) -> usize {
        self.classes.values().map(|c| c.videos_too_short).sum()
    }

    /// (label, sequences) for every declared class, in label order.
    pub fn class_counts(&self) -> Vec<(FallLabel, usize)> {
        self.classes
            .iter()
            .map(|(label, c)| (*label, c.sequences))
            .collect()
    }

    pub fn log(&self) {
        tracing::info!(
            sequences = self.total_sequences(),
            videos = self.total_videos(),
            sequence_length = self.sequence_length,
            stride = self.stride,
            "dataset summary"
        );
        for (label, c) in &self.classes {
            tracing::info!(
                class = %label,
                videos = c.videos_declared,
                used = c.videos_used,
                too_short = c.videos_too_short,
                frames = c.frames_decoded,
                skipped_frames = c.frames_skipped,
                sequences = c.sequences,
                "class summary"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Pass,
    Warn,
    Fail,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Pass => "pass",
            ValidationOutcome::Warn => "warn",
            ValidationOutcome::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationThresholds {
    /// Majority/minority sequence ratio that turns the outcome into a warning.
    pub max_class_imbalance: Option<f32>,
    /// Fraction of too-short videos that fails validation.
    pub max_too_short_ratio: Option<f32>,
    /// Fraction of undecodable frames that fails validation.
    pub max_skipped_frame_ratio: Option<f32>,
}

impl ValidationThresholds {
    pub fn from_env() -> Self {
        fn parse_ratio(key: &str) -> Option<f32> {
            std::env::var(key).ok()?.parse().ok()
        }
        ValidationThresholds {
            max_class_imbalance: parse_ratio("FALLWATCH_MAX_CLASS_IMBALANCE"),
            max_too_short_ratio: parse_ratio("FALLWATCH_MAX_TOO_SHORT_RATIO"),
            max_skipped_frame_ratio: parse_ratio("FALLWATCH_MAX_SKIPPED_FRAME_RATIO"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,
    pub reasons: Vec<String>,
    pub report: DatasetReport,
}
