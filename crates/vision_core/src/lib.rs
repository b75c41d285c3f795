//! vision_core: frame normalization, fixed-length sequences, and the
//! source/classifier interfaces shared by training and live inference.

pub mod interfaces;
pub mod normalize;
pub mod sequence;
pub mod source;

pub mod prelude {
    pub use crate::interfaces::*;
    pub use crate::normalize::{DecodeError, Frame, FrameNormalizer, RESIZE_FILTER};
    pub use crate::sequence::{Sequence, ShapeMismatchError};
    pub use crate::source::{ImageSequenceSource, MemorySource, IMAGE_EXTENSIONS};
}
