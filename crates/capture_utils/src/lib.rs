//! Labeled clip recording: a small state machine that turns a raw frame stream into
//! `root/<Class>/clip_<unix_ms>_<n>/frame_XXXXX.png` directories the dataset indexer reads.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use data_contracts::capture::CLIP_METADATA_FILE;
use data_contracts::{ClipMetadata, FallLabel, PipelineConfig, ValidationError};
use thiserror::Error;
use vision_core::prelude::{Frame, FrameNormalizer, RawFrame};

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write frame {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to serialize clip metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("clip metadata failed validation: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording(FallLabel),
}

#[derive(Debug, Clone)]
pub enum RecorderEvent {
    Start(FallLabel),
    Frame(RawFrame),
    Stop,
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderOutcome {
    /// Event had no effect in the current state.
    Ignored,
    Started(FallLabel),
    Buffered { have: usize, need: usize },
    /// A full clip was written; the recorder is idle again.
    ClipWritten(PathBuf),
    /// `Stop` dropped a partial clip of this many frames.
    Discarded(usize),
    /// Frame could not be decoded and was dropped.
    SkippedFrame,
}

pub struct ClipRecorder {
    root: PathBuf,
    normalizer: FrameNormalizer,
    clip_length: usize,
    sequence_length: usize,
    state: RecorderState,
    frames: Vec<Frame>,
    started_unix: f64,
    clips_written: usize,
}

impl ClipRecorder {
    /// Clips land under `root` at the configured frame size, `sequence_length` frames each.
    pub fn new(root: impl Into<PathBuf>, cfg: &PipelineConfig) -> Self {
        Self {
            root: root.into(),
            normalizer: FrameNormalizer::from_config(cfg),
            clip_length: cfg.sequence_length.max(1),
            sequence_length: cfg.sequence_length,
            state: RecorderState::Idle,
            frames: Vec::new(),
            started_unix: 0.0,
            clips_written: 0,
        }
    }

    pub fn with_clip_length(mut self, frames: usize) -> Self {
        self.clip_length = frames.max(1);
        self
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn clip_length(&self) -> usize {
        self.clip_length
    }

    pub fn clips_written(&self) -> usize {
        self.clips_written
    }

    pub fn handle(&mut self, event: RecorderEvent) -> Result<RecorderOutcome, RecorderError> {
        match (self.state, event) {
            (RecorderState::Idle, RecorderEvent::Start(label)) => {
                self.state = RecorderState::Recording(label);
                self.frames.clear();
                self.started_unix = unix_now();
                tracing::info!(class = %label, frames = self.clip_length, "recording clip");
                Ok(RecorderOutcome::Started(label))
            }
            (RecorderState::Recording(current), RecorderEvent::Start(requested)) => {
                tracing::warn!(%current, %requested, "already recording; start ignored");
                Ok(RecorderOutcome::Ignored)
            }
            (RecorderState::Idle, RecorderEvent::Frame(_)) => Ok(RecorderOutcome::Ignored),
            (RecorderState::Idle, RecorderEvent::Stop) => Ok(RecorderOutcome::Ignored),
            (RecorderState::Recording(label), RecorderEvent::Frame(raw)) => {
                let frame = match self.normalizer.normalize(&raw) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(frame_id = raw.id, "skipping frame: {err}");
                        return Ok(RecorderOutcome::SkippedFrame);
                    }
                };
                self.frames.push(frame);
                if self.frames.len() < self.clip_length {
                    return Ok(RecorderOutcome::Buffered {
                        have: self.frames.len(),
                        need: self.clip_length,
                    });
                }
                let frames = std::mem::take(&mut self.frames);
                self.state = RecorderState::Idle;
                let dir = self.write_clip(label, &frames)?;
                Ok(RecorderOutcome::ClipWritten(dir))
            }
            (RecorderState::Recording(label), RecorderEvent::Stop) => {
                let dropped = self.frames.len();
                self.frames.clear();
                self.state = RecorderState::Idle;
                tracing::info!(class = %label, frames = dropped, "recording stopped; partial clip discarded");
                Ok(RecorderOutcome::Discarded(dropped))
            }
        }
    }

    fn write_clip(&mut self, label: FallLabel, frames: &[Frame]) -> Result<PathBuf, RecorderError> {
        let unix_ms = (self.started_unix * 1000.0) as u64;
        let dir = self
            .root
            .join(label.as_str())
            .join(format!("clip_{unix_ms}_{}", self.clips_written));
        fs::create_dir_all(&dir).map_err(|source| RecorderError::Io {
            path: dir.clone(),
            source,
        })?;

        let names: Vec<String> = (0..frames.len())
            .map(|i| format!("frame_{i:05}.png"))
            .collect();
        let (w, h) = self.normalizer.target_size();
        let meta = ClipMetadata {
            label,
            frame_count: frames.len(),
            frame_size: (w, h),
            started_unix: self.started_unix,
            sequence_length: self.sequence_length,
            frames: names.clone(),
        };
        meta.validate()?;

        for (frame, name) in frames.iter().zip(&names) {
            let path = dir.join(name);
            frame
                .to_rgb8()
                .save(&path)
                .map_err(|source| RecorderError::Image { path, source })?;
        }
        write_metadata(&dir.join(CLIP_METADATA_FILE), &meta)?;

        self.clips_written += 1;
        tracing::info!(clip = %dir.display(), class = %label, frames = frames.len(), "clip written");
        Ok(dir)
    }
}

fn write_metadata(path: &Path, meta: &ClipMetadata) -> Result<(), RecorderError> {
    let io_err = |source: std::io::Error| RecorderError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(fs::File::create(path).map_err(io_err)?);
    serde_json::to_writer_pretty(&mut writer, meta)?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
