//! Frame normalization: any decodable colour image to a fixed (H, W, 3) frame in [0, 1].
//!
//! This is the only place frames are resized. Training and live inference both go
//! through [`FrameNormalizer`], so they always share [`RESIZE_FILTER`].

use std::path::PathBuf;

use data_contracts::PipelineConfig;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgb, Rgb32FImage, RgbImage};
use thiserror::Error;

use crate::interfaces::RawFrame;

/// Resampling filter used for every resize (bilinear).
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to decode in-memory frame: {0}")]
    Bytes(#[source] image::ImageError),
    #[error("rgb buffer for {width}x{height} frame has {actual} bytes, expected {expected}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame has zero-sized dimensions {width}x{height}")]
    EmptyImage { width: u32, height: u32 },
    #[error("frame {frame_id} carries neither pixel data nor a path")]
    MissingPayload { frame_id: u64 },
}

/// Normalized frame: row-major HWC `f32` RGB in [0, 1]. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// (H, W, C)
    pub fn shape(&self) -> [usize; 3] {
        [self.height as usize, self.width as usize, 3]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let base = ((y * self.width + x) * 3) as usize;
        [self.data[base], self.data[base + 1], self.data[base + 2]]
    }

    pub fn mean_intensity(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    pub fn to_rgb32f(&self) -> Rgb32FImage {
        ImageBuffer::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| ImageBuffer::new(self.width, self.height))
    }

    /// Quantize back to 8-bit RGB (used when persisting recorded clips).
    pub fn to_rgb8(&self) -> RgbImage {
        let bytes = self
            .data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        ImageBuffer::from_raw(self.width, self.height, bytes)
            .unwrap_or_else(|| ImageBuffer::new(self.width, self.height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameNormalizer {
    width: u32,
    height: u32,
}

impl FrameNormalizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(cfg.frame_width, cfg.frame_height)
    }

    /// Target (width, height).
    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn normalize(&self, raw: &RawFrame) -> Result<Frame, DecodeError> {
        match (&raw.rgb, &raw.path) {
            (Some(buf), _) => {
                let (width, height) = raw.size;
                let expected = width as usize * height as usize * 3;
                let img = RgbImage::from_raw(width, height, buf.clone()).ok_or(
                    DecodeError::BufferSize {
                        width,
                        height,
                        expected,
                        actual: buf.len(),
                    },
                )?;
                self.normalize_image(&DynamicImage::ImageRgb8(img))
            }
            (None, Some(path)) => {
                let img = image::open(path).map_err(|source| DecodeError::Image {
                    path: path.clone(),
                    source,
                })?;
                self.normalize_image(&img)
            }
            (None, None) => Err(DecodeError::MissingPayload { frame_id: raw.id }),
        }
    }

    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<Frame, DecodeError> {
        let img = image::load_from_memory(bytes).map_err(DecodeError::Bytes)?;
        self.normalize_image(&img)
    }

    /// Convert to RGB, rescale intensities to [0, 1] and resize to the target size.
    /// Inputs that already have the target size are not resampled.
    pub fn normalize_image(&self, img: &DynamicImage) -> Result<Frame, DecodeError> {
        let (w, h) = (img.width(), img.height());
        if w == 0 || h == 0 {
            return Err(DecodeError::EmptyImage {
                width: w,
                height: h,
            });
        }
        let rgb: ImageBuffer<Rgb<f32>, Vec<f32>> = img.to_rgb32f();
        let resized = if (w, h) == (self.width, self.height) {
            rgb
        } else {
            image::imageops::resize(&rgb, self.width, self.height, RESIZE_FILTER)
        };
        let data = resized
            .into_raw()
            .into_iter()
            .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
            .collect();
        Ok(Frame {
            width: self.width,
            height: self.height,
            data,
        })
    }
}
