//! Sliding-window extraction of fixed-length sequences from one video.
//!
//! For N frames, window length L and stride `step`, windows start at
//! `0, step, 2*step, ...` while `start + L <= N`, giving `(N - L) / step + 1`
//! windows when N >= L and none otherwise. Trailing frames that do not fill a
//! window are dropped; nothing is ever padded.

use std::sync::Arc;

use data_contracts::PipelineConfig;
use vision_core::prelude::{Frame, Sequence, ShapeMismatchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceWindower {
    length: usize,
    stride: usize,
    frame_height: usize,
    frame_width: usize,
}

/// Result of windowing one video.
#[derive(Debug, Clone)]
pub enum WindowOutcome {
    Windows(Vec<(usize, Sequence)>),
    /// Fewer frames than one window needs. A diagnostic, not an error.
    TooShort { frames: usize, required: usize },
}

impl WindowOutcome {
    pub fn len(&self) -> usize {
        match self {
            WindowOutcome::Windows(w) => w.len(),
            WindowOutcome::TooShort { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_sequences(self) -> Vec<(usize, Sequence)> {
        match self {
            WindowOutcome::Windows(w) => w,
            WindowOutcome::TooShort { .. } => Vec::new(),
        }
    }
}

impl SequenceWindower {
    /// `length` and `stride` are clamped to at least 1.
    pub fn new(length: usize, stride: usize, frame_size: (u32, u32)) -> Self {
        Self {
            length: length.max(1),
            stride: stride.max(1),
            frame_width: frame_size.0 as usize,
            frame_height: frame_size.1 as usize,
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(
            cfg.sequence_length,
            cfg.window_stride(),
            (cfg.frame_width, cfg.frame_height),
        )
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn sequence_shape(&self) -> [usize; 4] {
        [self.length, self.frame_height, self.frame_width, 3]
    }

    /// Number of windows for a video of `n` frames.
    pub fn count(&self, n: usize) -> usize {
        if n < self.length {
            0
        } else {
            (n - self.length) / self.stride + 1
        }
    }

    pub fn window_starts(&self, n: usize) -> impl Iterator<Item = usize> {
        let stride = self.stride;
        (0..self.count(n)).map(move |i| i * stride)
    }

    /// Contiguous windows over any ordered slice.
    pub fn window_slices<'a, T>(&self, items: &'a [T]) -> impl Iterator<Item = &'a [T]> + 'a {
        let length = self.length;
        self.window_starts(items.len())
            .map(move |start| &items[start..start + length])
    }

    /// Window one video's normalized frames. Each window shares the frames by `Arc`.
    pub fn window(&self, frames: &[Arc<Frame>]) -> Result<WindowOutcome, ShapeMismatchError> {
        if frames.len() < self.length {
            return Ok(WindowOutcome::TooShort {
                frames: frames.len(),
                required: self.length,
            });
        }
        let shape = self.sequence_shape();
        let windows = self
            .window_starts(frames.len())
            .map(|start| {
                Sequence::new(frames[start..start + self.length].to_vec(), shape)
                    .map(|seq| (start, seq))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WindowOutcome::Windows(windows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use vision_core::prelude::FrameNormalizer;

    fn frames(n: usize) -> Vec<Arc<Frame>> {
        let norm = FrameNormalizer::new(2, 2);
        (0..n)
            .map(|i| {
                let v = (i % 256) as u8;
                let img = RgbImage::from_pixel(2, 2, Rgb([v, v, v]));
                Arc::new(norm.normalize_image(&DynamicImage::ImageRgb8(img)).unwrap())
            })
            .collect()
    }

    #[test]
    fn count_matches_formula_for_all_small_inputs() {
        for length in 1..8 {
            for stride in 1..6 {
                let w = SequenceWindower::new(length, stride, (2, 2));
                for n in 0..40 {
                    let items: Vec<usize> = (0..n).collect();
                    let windows: Vec<&[usize]> = w.window_slices(&items).collect();
                    let expected = if n >= length {
                        (n - length) / stride + 1
                    } else {
                        0
                    };
                    assert_eq!(windows.len(), expected, "n={n} L={length} step={stride}");
                    for (i, win) in windows.iter().enumerate() {
                        assert_eq!(win.len(), length);
                        let start = i * stride;
                        assert_eq!(*win, &items[start..start + length]);
                        assert!(start + length <= n);
                    }
                }
            }
        }
    }

    #[test]
    fn too_short_video_produces_no_windows() {
        let w = SequenceWindower::new(20, 10, (2, 2));
        match w.window(&frames(19)).unwrap() {
            WindowOutcome::TooShort { frames, required } => {
                assert_eq!((frames, required), (19, 20));
            }
            other => panic!("expected TooShort, got {} windows", other.len()),
        }
    }

    #[test]
    fn forty_frames_with_half_overlap_give_three_windows() {
        let input = frames(40);
        let w = SequenceWindower::new(20, 10, (2, 2));
        let windows = w.window(&input).unwrap().into_sequences();
        let starts: Vec<usize> = windows.iter().map(|(s, _)| *s).collect();
        assert_eq!(starts, vec![0, 10, 20]);
        for (start, seq) in &windows {
            assert_eq!(seq.len(), 20);
            for (offset, frame) in seq.frames().iter().enumerate() {
                assert!(Arc::ptr_eq(frame, &input[start + offset]));
            }
        }
    }

    #[test]
    fn remainder_frames_are_dropped_not_padded() {
        let w = SequenceWindower::new(4, 3, (2, 2));
        let windows = w.window(&frames(9)).unwrap().into_sequences();
        // starts 0, 3; frame 8 is left over
        assert_eq!(windows.len(), 2);
        assert!(windows.iter().all(|(_, s)| s.len() == 4));
    }

    #[test]
    fn wrong_frame_size_is_a_shape_error() {
        let w = SequenceWindower::new(2, 1, (3, 3));
        assert!(w.window(&frames(2)).is_err());
    }

    #[test]
    fn default_stride_is_half_the_window() {
        let w = SequenceWindower::from_config(&PipelineConfig::default());
        assert_eq!((w.length(), w.stride()), (20, 10));
    }
}
