use std::sync::Arc;

use thiserror::Error;

use crate::normalize::Frame;

/// A sequence (or a frame inside one) does not match the declared (L, H, W, C) contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sequence shape mismatch: expected (L, H, W, C) = {expected:?}, got {actual:?}")]
pub struct ShapeMismatchError {
    pub expected: [usize; 4],
    pub actual: [usize; 4],
}

/// Exactly L normalized frames in source temporal order.
///
/// Frames are shared (`Arc`) so overlapping windows do not copy pixel data.
#[derive(Debug, Clone)]
pub struct Sequence {
    frames: Vec<Arc<Frame>>,
}

impl Sequence {
    /// Build a sequence, checking it against the expected (L, H, W, C) shape.
    pub fn new(frames: Vec<Arc<Frame>>, expected: [usize; 4]) -> Result<Self, ShapeMismatchError> {
        let seq = Self { frames };
        seq.check_shape(expected)?;
        Ok(seq)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    /// (L, H, W, C) of the first frame; a mixed-size sequence never passes `check_shape`.
    pub fn shape(&self) -> [usize; 4] {
        match self.frames.first() {
            Some(f) => {
                let [h, w, c] = f.shape();
                [self.frames.len(), h, w, c]
            }
            None => [0, 0, 0, 3],
        }
    }

    pub fn check_shape(&self, expected: [usize; 4]) -> Result<(), ShapeMismatchError> {
        if self.frames.len() != expected[0] {
            return Err(ShapeMismatchError {
                expected,
                actual: self.shape(),
            });
        }
        for frame in &self.frames {
            let [h, w, c] = frame.shape();
            if [h, w, c] != [expected[1], expected[2], expected[3]] {
                return Err(ShapeMismatchError {
                    expected,
                    actual: [self.frames.len(), h, w, c],
                });
            }
        }
        Ok(())
    }

    /// Append the sequence as flat LHWC floats.
    pub fn write_flat(&self, out: &mut Vec<f32>) {
        for frame in &self.frames {
            out.extend_from_slice(frame.data());
        }
    }

    pub fn to_flat(&self) -> Vec<f32> {
        let [l, h, w, c] = self.shape();
        let mut out = Vec::with_capacity(l * h * w * c);
        self.write_flat(&mut out);
        out
    }
}
