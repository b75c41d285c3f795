use std::collections::VecDeque;
use std::sync::Arc;

use vision_core::prelude::{Frame, Sequence, ShapeMismatchError};

/// The L most recent normalized frames, oldest first.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    frames: VecDeque<Arc<Frame>>,
    shape: [usize; 4],
}

impl RollingBuffer {
    /// `shape` is the sequence shape (L, H, W, C); L is the capacity.
    pub fn new(shape: [usize; 4]) -> Self {
        let capacity = shape[0].max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            shape: [capacity, shape[1], shape[2], shape[3]],
        }
    }

    pub fn capacity(&self) -> usize {
        self.shape[0]
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.frames.len() == self.capacity()
    }

    /// Append the newest frame, evicting (and returning) the oldest once full.
    pub fn push(&mut self, frame: Arc<Frame>) -> Result<Option<Arc<Frame>>, ShapeMismatchError> {
        let [h, w, c] = frame.shape();
        if [h, w, c] != [self.shape[1], self.shape[2], self.shape[3]] {
            return Err(ShapeMismatchError {
                expected: self.shape,
                actual: [1, h, w, c],
            });
        }
        let evicted = if self.is_ready() {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        Ok(evicted)
    }

    /// Current contents as one sequence, or `None` until L frames have arrived.
    pub fn snapshot(&self) -> Option<Sequence> {
        if !self.is_ready() {
            return None;
        }
        Sequence::new(self.frames.iter().cloned().collect(), self.shape).ok()
    }

    /// Drop everything, e.g. when the stream restarts.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use vision_core::prelude::FrameNormalizer;

    fn frame(v: u8) -> Arc<Frame> {
        let img = RgbImage::from_pixel(2, 2, Rgb([v, v, v]));
        Arc::new(
            FrameNormalizer::new(2, 2)
                .normalize_image(&DynamicImage::ImageRgb8(img))
                .unwrap(),
        )
    }

    fn first_values(seq: &Sequence) -> Vec<f32> {
        seq.frames().iter().map(|f| f.data()[0]).collect()
    }

    #[test]
    fn ready_after_exactly_l_frames_in_push_order() {
        let mut buf = RollingBuffer::new([3, 2, 2, 3]);
        for v in [10u8, 20] {
            buf.push(frame(v)).unwrap();
            assert!(buf.snapshot().is_none());
        }
        buf.push(frame(30)).unwrap();
        assert!(buf.is_ready());
        let seq = buf.snapshot().unwrap();
        assert_eq!(seq.shape(), [3, 2, 2, 3]);
        assert_eq!(
            first_values(&seq),
            vec![10.0 / 255.0, 20.0 / 255.0, 30.0 / 255.0]
        );
    }

    #[test]
    fn l_plus_one_frames_evict_the_oldest() {
        let mut buf = RollingBuffer::new([3, 2, 2, 3]);
        let first = frame(1);
        buf.push(first.clone()).unwrap();
        buf.push(frame(2)).unwrap();
        buf.push(frame(3)).unwrap();
        let evicted = buf.push(frame(4)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&evicted, &first));
        assert_eq!(buf.len(), 3);
        let seq = buf.snapshot().unwrap();
        assert_eq!(
            first_values(&seq),
            vec![2.0 / 255.0, 3.0 / 255.0, 4.0 / 255.0]
        );
    }

    #[test]
    fn clear_resets_readiness() {
        let mut buf = RollingBuffer::new([2, 2, 2, 3]);
        buf.push(frame(1)).unwrap();
        buf.push(frame(2)).unwrap();
        buf.clear();
        assert!(buf.is_empty());
        assert!(!buf.is_ready());
    }

    #[test]
    fn wrong_frame_size_is_rejected() {
        let mut buf = RollingBuffer::new([2, 4, 4, 3]);
        let err = buf.push(frame(1)).unwrap_err();
        assert_eq!(err.actual, [1, 2, 2, 3]);
        assert!(buf.is_empty());
    }
}
