//! Live monitor: normalize each incoming frame, keep the last L, classify every full window.

use std::sync::Arc;

use data_contracts::PipelineConfig;
use serde::Serialize;
use vision_core::prelude::{FrameNormalizer, Prediction, RawFrame, SequenceClassifier, ShapeMismatchError};

use crate::buffer::RollingBuffer;
use crate::factory::{InferenceError, InferenceFactory};

/// What happened to one ingested frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum LiveStatus {
    /// Fewer than L frames seen since the last restart.
    Buffering { have: usize, need: usize },
    /// Buffer is full but no model is loaded.
    NoModel,
    Prediction(Prediction),
    /// The frame could not be decoded and was dropped.
    SkippedFrame,
}

pub struct LiveMonitor {
    normalizer: FrameNormalizer,
    buffer: RollingBuffer,
    classifier: Option<Box<dyn SequenceClassifier>>,
    threshold: f32,
    frames_seen: u64,
    skipped: u64,
}

impl LiveMonitor {
    /// Build a monitor around an optional classifier; its input shape must match the config.
    pub fn new(
        cfg: &PipelineConfig,
        classifier: Option<Box<dyn SequenceClassifier>>,
    ) -> Result<Self, ShapeMismatchError> {
        let shape = cfg.sequence_shape();
        if let Some(actual) = classifier.as_ref().map(|c| c.input_shape()) {
            if actual != shape {
                return Err(ShapeMismatchError {
                    expected: shape,
                    actual,
                });
            }
        }
        Ok(Self {
            normalizer: FrameNormalizer::from_config(cfg),
            buffer: RollingBuffer::new(shape),
            classifier,
            threshold: cfg.decision_threshold,
            frames_seen: 0,
            skipped: 0,
        })
    }

    /// Load the configured checkpoint, falling back to degraded mode when it is missing.
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self, InferenceError> {
        let classifier = InferenceFactory
            .load_optional(cfg, &cfg.checkpoint_path)?
            .map(|c| Box::new(c) as Box<dyn SequenceClassifier>);
        Ok(Self::new(cfg, classifier)?)
    }

    pub fn has_model(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Normalize, buffer and (when L frames are buffered) classify one frame.
    pub fn ingest(&mut self, raw: &RawFrame) -> Result<LiveStatus, InferenceError> {
        self.frames_seen += 1;
        let frame = match self.normalizer.normalize(raw) {
            Ok(frame) => frame,
            Err(err) => {
                self.skipped += 1;
                tracing::warn!(frame_id = raw.id, "skipping frame: {err}");
                return Ok(LiveStatus::SkippedFrame);
            }
        };
        self.buffer.push(Arc::new(frame))?;

        let Some(sequence) = self.buffer.snapshot() else {
            return Ok(LiveStatus::Buffering {
                have: self.buffer.len(),
                need: self.buffer.capacity(),
            });
        };
        match &self.classifier {
            Some(classifier) => {
                let prediction = classifier.classify(&sequence, self.threshold)?;
                Ok(LiveStatus::Prediction(prediction))
            }
            None => Ok(LiveStatus::NoModel),
        }
    }

    /// Forget buffered frames, e.g. when the stream restarts.
    pub fn restart(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_contracts::FallLabel;
    use image::{Rgb, RgbImage};
    use vision_core::prelude::{ClassifyError, Sequence};

    /// Scores a window by how much darker its last frame is than its first.
    struct DarkeningClassifier {
        shape: [usize; 4],
    }

    impl SequenceClassifier for DarkeningClassifier {
        fn predict(&self, sequence: &Sequence) -> Result<f32, ClassifyError> {
            sequence.check_shape(self.shape)?;
            let frames = sequence.frames();
            let first = frames[0].mean_intensity();
            let last = frames[frames.len() - 1].mean_intensity();
            Ok((first - last).clamp(0.0, 1.0))
        }

        fn input_shape(&self) -> [usize; 4] {
            self.shape
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            sequence_length: 3,
            frame_height: 4,
            frame_width: 4,
            ..PipelineConfig::default()
        }
    }

    fn raw(id: u64, v: u8) -> RawFrame {
        RawFrame::from_rgb(id, id as f64 / 30.0, RgbImage::from_pixel(8, 8, Rgb([v, v, v])))
    }

    #[test]
    fn predicts_once_the_window_is_full() {
        let cfg = config();
        let classifier = DarkeningClassifier {
            shape: cfg.sequence_shape(),
        };
        let mut monitor = LiveMonitor::new(&cfg, Some(Box::new(classifier))).unwrap();
        assert_eq!(
            monitor.ingest(&raw(0, 250)).unwrap(),
            LiveStatus::Buffering { have: 1, need: 3 }
        );
        assert_eq!(
            monitor.ingest(&raw(1, 120)).unwrap(),
            LiveStatus::Buffering { have: 2, need: 3 }
        );
        match monitor.ingest(&raw(2, 10)).unwrap() {
            LiveStatus::Prediction(p) => assert_eq!(p.label, FallLabel::Fall),
            other => panic!("expected a prediction, got {other:?}"),
        }
        match monitor.ingest(&raw(3, 10)).unwrap() {
            LiveStatus::Prediction(p) => assert_eq!(p.label, FallLabel::Normal),
            other => panic!("expected a prediction, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_frame_is_skipped_without_touching_the_buffer() {
        let cfg = config();
        let mut monitor = LiveMonitor::new(&cfg, None).unwrap();
        monitor.ingest(&raw(0, 100)).unwrap();
        let broken = RawFrame {
            id: 1,
            timestamp: 0.0,
            rgb: Some(vec![0; 5]),
            size: (8, 8),
            path: None,
        };
        assert_eq!(monitor.ingest(&broken).unwrap(), LiveStatus::SkippedFrame);
        assert_eq!(
            monitor.ingest(&raw(2, 100)).unwrap(),
            LiveStatus::Buffering { have: 2, need: 3 }
        );
        assert_eq!(monitor.skipped(), 1);
        assert_eq!(monitor.frames_seen(), 3);
    }

    #[test]
    fn classifier_with_other_shape_is_rejected() {
        let cfg = config();
        let classifier = DarkeningClassifier {
            shape: [5, 4, 4, 3],
        };
        let err = LiveMonitor::new(&cfg, Some(Box::new(classifier))).err().unwrap();
        assert_eq!(err.expected, [3, 4, 4, 3]);
        assert_eq!(err.actual, [5, 4, 4, 3]);
    }

    #[test]
    fn restart_empties_the_window() {
        let cfg = config();
        let mut monitor = LiveMonitor::new(&cfg, None).unwrap();
        for i in 0..3 {
            monitor.ingest(&raw(i, 50)).unwrap();
        }
        monitor.restart();
        assert_eq!(
            monitor.ingest(&raw(3, 50)).unwrap(),
            LiveStatus::Buffering { have: 1, need: 3 }
        );
    }
}
