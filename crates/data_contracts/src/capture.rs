use crate::label::FallLabel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sidecar file name written next to a recorded clip's frames.
pub const CLIP_METADATA_FILE: &str = "clip.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipMetadata {
    pub label: FallLabel,
    pub frame_count: usize,
    /// Stored frame size (width, height).
    pub frame_size: (u32, u32),
    pub started_unix: f64,
    /// Sequence length the clip was recorded for.
    pub sequence_length: usize,
    /// Frame file names in temporal order.
    pub frames: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("clip declares {declared} frames but lists {listed}")]
    FrameCountMismatch { declared: usize, listed: usize },
    #[error("clip frame size must be non-zero, got {0:?}")]
    InvalidFrameSize((u32, u32)),
    #[error("clip start time is invalid: {0}")]
    InvalidStartTime(f64),
    #[error("empty frame file name at position {0}")]
    EmptyFrameName(usize),
}

impl ClipMetadata {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.frames.len() != self.frame_count {
            return Err(ValidationError::FrameCountMismatch {
                declared: self.frame_count,
                listed: self.frames.len(),
            });
        }
        if self.frame_size.0 == 0 || self.frame_size.1 == 0 {
            return Err(ValidationError::InvalidFrameSize(self.frame_size));
        }
        if self.started_unix.is_nan() || self.started_unix < 0.0 {
            return Err(ValidationError::InvalidStartTime(self.started_unix));
        }
        if let Some(pos) = self.frames.iter().position(|f| f.trim().is_empty()) {
            return Err(ValidationError::EmptyFrameName(pos));
        }
        Ok(())
    }
}
