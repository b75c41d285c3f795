use data_contracts::FallLabel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::sequence::{Sequence, ShapeMismatchError};

/// A raw frame as delivered by a source, before normalization.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub id: u64,
    /// Capture timestamp (seconds).
    pub timestamp: f64,
    /// Optional packed RGB8 data; `None` for file-backed frames decoded lazily.
    pub rgb: Option<Vec<u8>>,
    /// Image dimensions (width, height) of `rgb`.
    pub size: (u32, u32),
    /// Optional on-disk location for lazy decoding.
    pub path: Option<PathBuf>,
}

impl RawFrame {
    pub fn from_rgb(id: u64, timestamp: f64, image: image::RgbImage) -> Self {
        let size = image.dimensions();
        Self {
            id,
            timestamp,
            rgb: Some(image.into_raw()),
            size,
            path: None,
        }
    }

    pub fn from_path(id: u64, timestamp: f64, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            timestamp,
            rgb: None,
            size: (0, 0),
            path: Some(path.into()),
        }
    }
}

/// Pulls raw frames from some ordered, finite or live source.
pub trait FrameSource {
    /// Next raw frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Option<RawFrame>;

    /// Human-readable identifier used in reports and logs.
    fn name(&self) -> &str;
}

/// Outcome of classifying one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: FallLabel,
    /// Model output, P(Fall).
    pub probability: f32,
    /// `probability` when Fall, `1 - probability` when Normal.
    pub confidence: f32,
}

impl Prediction {
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        if probability > threshold {
            Self {
                label: FallLabel::Fall,
                probability,
                confidence: probability,
            }
        } else {
            Self {
                label: FallLabel::Normal,
                probability,
                confidence: 1.0 - probability,
            }
        }
    }

    pub fn is_fall(&self) -> bool {
        self.label == FallLabel::Fall
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Shape(#[from] ShapeMismatchError),
    #[error("classifier backend failure: {0}")]
    Backend(String),
}

/// Maps one fixed-shape sequence to P(Fall).
pub trait SequenceClassifier {
    fn predict(&self, sequence: &Sequence) -> Result<f32, ClassifyError>;

    /// Expected (L, H, W, C).
    fn input_shape(&self) -> [usize; 4];

    fn classify(&self, sequence: &Sequence, threshold: f32) -> Result<Prediction, ClassifyError> {
        let p = self.predict(sequence)?;
        Ok(Prediction::from_probability(p, threshold))
    }
}
