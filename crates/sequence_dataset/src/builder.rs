//! Corpus construction: normalize every video, window it, tag the windows.

use std::collections::BTreeMap;
use std::sync::Arc;

use data_contracts::{FallLabel, PipelineConfig};
use rayon::prelude::*;
use vision_core::prelude::{Frame, FrameNormalizer, FrameSource, RawFrame};

use crate::types::{
    ClassReport, DataSufficiencyError, DatasetReport, DatasetResult, LabeledSequence, VideoId,
    VideoInfo,
};
use crate::windower::{SequenceWindower, WindowOutcome};

/// Video sources grouped by their ground-truth class. Every key is a declared class.
pub type LabeledSources = BTreeMap<FallLabel, Vec<Box<dyn FrameSource>>>;

/// Every labeled window of every video, all with the same (L, H, W, 3) shape.
#[derive(Debug, Clone)]
pub struct Corpus {
    samples: Vec<LabeledSequence>,
    videos: Vec<VideoInfo>,
    shape: [usize; 4],
}

impl Corpus {
    pub fn new(samples: Vec<LabeledSequence>, videos: Vec<VideoInfo>, shape: [usize; 4]) -> Self {
        Self {
            samples,
            videos,
            shape,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[LabeledSequence] {
        &self.samples
    }

    pub fn videos(&self) -> &[VideoInfo] {
        &self.videos
    }

    /// (L, H, W, C) of every member.
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn class_counts(&self) -> BTreeMap<FallLabel, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.samples {
            *counts.entry(s.label).or_insert(0) += 1;
        }
        counts
    }

    /// Same corpus restricted to the given sample indices (in the given order).
    pub fn subset(&self, indices: &[usize]) -> Corpus {
        let samples: Vec<LabeledSequence> =
            indices.iter().map(|&i| self.samples[i].clone()).collect();
        let mut keep: Vec<VideoId> = samples.iter().map(|s| s.video).collect();
        keep.sort();
        keep.dedup();
        let videos = self
            .videos
            .iter()
            .filter(|v| keep.binary_search(&v.id).is_ok())
            .cloned()
            .collect();
        Corpus::new(samples, videos, self.shape)
    }

    /// Non-empty and at least two classes represented.
    pub fn check_sufficiency(&self) -> Result<(), DataSufficiencyError> {
        let counts = self.class_counts();
        if self.samples.is_empty() {
            return Err(DataSufficiencyError::EmptyCorpus {
                videos: self.videos.len(),
                too_short: self.videos.iter().filter(|v| v.sequences == 0).count(),
                required: self.shape[0],
            });
        }
        if counts.len() < 2 {
            return Err(DataSufficiencyError::TooFewClasses {
                counts: counts.into_iter().collect(),
            });
        }
        Ok(())
    }
}

pub struct DatasetBuilder {
    normalizer: FrameNormalizer,
    windower: SequenceWindower,
}

impl DatasetBuilder {
    pub fn new(normalizer: FrameNormalizer, windower: SequenceWindower) -> Self {
        Self {
            normalizer,
            windower,
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(
            FrameNormalizer::from_config(cfg),
            SequenceWindower::from_config(cfg),
        )
    }

    pub fn windower(&self) -> &SequenceWindower {
        &self.windower
    }

    /// Build the corpus. Undecodable frames are logged and skipped; an empty
    /// declared class, an empty corpus, or a single-class corpus is an error.
    pub fn build(&self, sources: LabeledSources) -> DatasetResult<(Corpus, DatasetReport)> {
        if let Some((label, _)) = sources.iter().find(|(_, videos)| videos.is_empty()) {
            return Err(DataSufficiencyError::EmptyClass { label: *label }.into());
        }

        let mut report = DatasetReport {
            classes: BTreeMap::new(),
            sequence_length: self.windower.length(),
            stride: self.windower.stride(),
        };
        let mut samples = Vec::new();
        let mut videos = Vec::new();

        for (label, class_sources) in sources {
            let class = report.classes.entry(label).or_insert_with(ClassReport::default);
            class.videos_declared = class_sources.len();
            for mut source in class_sources {
                let id = VideoId(videos.len());
                let name = source.name().to_string();
                let (frames, skipped) = self.normalize_video(source.as_mut());
                class.frames_decoded += frames.len();
                class.frames_skipped += skipped;

                let produced = match self.windower.window(&frames)? {
                    WindowOutcome::TooShort { frames, required } => {
                        tracing::warn!(
                            video = %name,
                            class = %label,
                            frames,
                            required,
                            "video too short for one window; skipping"
                        );
                        class.videos_too_short += 1;
                        0
                    }
                    WindowOutcome::Windows(windows) => {
                        let n = windows.len();
                        tracing::debug!(video = %name, class = %label, frames = frames.len(), sequences = n, "windowed video");
                        samples.extend(windows.into_iter().map(|(start, sequence)| {
                            LabeledSequence {
                                sequence,
                                label,
                                video: id,
                                start,
                            }
                        }));
                        class.videos_used += 1;
                        n
                    }
                };
                class.sequences += produced;
                videos.push(VideoInfo {
                    id,
                    name,
                    label,
                    frames: frames.len(),
                    sequences: produced,
                });
            }
        }

        report.log();
        let corpus = Corpus::new(samples, videos, self.windower.sequence_shape());
        if corpus.is_empty() {
            return Err(DataSufficiencyError::EmptyCorpus {
                videos: report.total_videos(),
                too_short: report.total_too_short(),
                required: self.windower.length(),
            }
            .into());
        }
        let present = report
            .classes
            .values()
            .filter(|c| c.sequences > 0)
            .count();
        if present < 2 {
            return Err(DataSufficiencyError::TooFewClasses {
                counts: report.class_counts(),
            }
            .into());
        }
        Ok((corpus, report))
    }

    /// Pull every raw frame, then normalize in parallel keeping source order.
    /// Returns the decoded frames and how many were skipped.
    fn normalize_video(&self, source: &mut dyn FrameSource) -> (Vec<Arc<Frame>>, usize) {
        let raw: Vec<RawFrame> = std::iter::from_fn(|| source.next_frame()).collect();
        let normalizer = self.normalizer;
        let decoded: Vec<_> = raw
            .par_iter()
            .map(|frame| normalizer.normalize(frame))
            .collect();
        let mut frames = Vec::with_capacity(decoded.len());
        let mut skipped = 0usize;
        for (raw, res) in raw.iter().zip(decoded) {
            match res {
                Ok(frame) => frames.push(Arc::new(frame)),
                Err(e) => {
                    tracing::warn!(video = source.name(), frame_id = raw.id, "skipping frame: {e}");
                    skipped += 1;
                }
            }
        }
        (frames, skipped)
    }
}
