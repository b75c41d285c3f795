//! Burn model for fall detection on fixed-length frame sequences.
//!
//! Three explicit stages:
//! - `FrameFeatureExtractor`: frozen per-frame conv encoder, `[N, 3, H, W]` -> `[N, F]`.
//! - `TemporalAggregator`: LSTM over the L feature vectors, final hidden state `[B, D]`.
//! - head: dropout + `Linear(D -> 1)` + sigmoid = P(Fall).
//!
//! These are pure Burn modules. The `inference` crate wraps them behind the
//! `SequenceClassifier` trait; `training` owns the optimizer loop.

pub mod checkpoint;

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Lstm, LstmConfig, PaddingConfig2d};
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use checkpoint::{
    load_checkpoint, load_extractor_weights, record_path, save_checkpoint,
    save_extractor_weights, CheckpointMeta,
};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("checkpoint record error at {path}: {source}")]
    Record {
        path: std::path::PathBuf,
        #[source]
        source: burn::record::RecorderError,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint metadata at {path}: {source}")]
    Meta {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("input has {actual} values, expected {expected} for {batch} sequence(s) of {shape:?}")]
    InputSize {
        batch: usize,
        shape: [usize; 4],
        expected: usize,
        actual: usize,
    },
}

/// Architecture and input contract. Stored next to each checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialTemporalConfig {
    pub sequence_length: usize,
    pub frame_height: usize,
    pub frame_width: usize,
    /// Conv channels in the extractor; also the per-frame feature size F.
    pub extractor_channels: usize,
    /// LSTM hidden size D.
    pub hidden_size: usize,
    pub dropout: f64,
}

impl Default for SpatialTemporalConfig {
    fn default() -> Self {
        Self {
            sequence_length: 20,
            frame_height: 224,
            frame_width: 224,
            extractor_channels: 32,
            hidden_size: 64,
            dropout: 0.5,
        }
    }
}

impl SpatialTemporalConfig {
    /// (L, H, W, C)
    pub fn input_shape(&self) -> [usize; 4] {
        [self.sequence_length, self.frame_height, self.frame_width, 3]
    }

    pub fn feature_size(&self) -> usize {
        self.extractor_channels.max(1)
    }
}

/// Two strided 3x3 conv blocks with ReLU, then global average pooling.
#[derive(Module, Debug)]
pub struct FrameFeatureExtractor<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
}

impl<B: Backend> FrameFeatureExtractor<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        let channels = channels.max(1);
        let mid = (channels / 2).max(1);
        let conv1 = Conv2dConfig::new([3, mid], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv2 = Conv2dConfig::new([mid, channels], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        Self { conv1, conv2, pool }
    }

    /// `[N, 3, H, W]` -> `[N, F]`
    pub fn forward(&self, frames: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.conv1.forward(frames));
        let x = relu(self.conv2.forward(x));
        let x = self.pool.forward(x);
        let [n, f, _, _] = x.dims();
        x.reshape([n, f])
    }
}

/// LSTM over per-frame features; keeps only the last hidden state.
#[derive(Module, Debug)]
pub struct TemporalAggregator<B: Backend> {
    lstm: Lstm<B>,
}

impl<B: Backend> TemporalAggregator<B> {
    pub fn new(features: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            lstm: LstmConfig::new(features, hidden.max(1), true).init(device),
        }
    }

    /// `[B, L, F]` -> `[B, D]`
    pub fn forward(&self, features: Tensor<B, 3>) -> Tensor<B, 2> {
        let (_, state) = self.lstm.forward(features, None);
        state.hidden
    }
}

#[derive(Module, Debug)]
pub struct SpatialTemporalModel<B: Backend> {
    extractor: FrameFeatureExtractor<B>,
    aggregator: TemporalAggregator<B>,
    dropout: Dropout,
    head: Linear<B>,
    pub config: Ignored<SpatialTemporalConfig>,
}

impl<B: Backend> SpatialTemporalModel<B> {
    /// Fresh model; the extractor is frozen immediately.
    pub fn new(config: SpatialTemporalConfig, device: &B::Device) -> Self {
        let extractor = FrameFeatureExtractor::new(config.feature_size(), device).no_grad();
        let aggregator =
            TemporalAggregator::new(config.feature_size(), config.hidden_size, device);
        let dropout = DropoutConfig::new(config.dropout).init();
        let head = LinearConfig::new(config.hidden_size.max(1), 1).init(device);
        Self {
            extractor,
            aggregator,
            dropout,
            head,
            config: Ignored(config),
        }
    }

    /// Seeded initialization, reproducible for a given backend.
    pub fn seeded(config: SpatialTemporalConfig, seed: u64, device: &B::Device) -> Self {
        B::seed(seed);
        Self::new(config, device)
    }

    pub fn extractor(&self) -> &FrameFeatureExtractor<B> {
        &self.extractor
    }

    /// Swap in an extractor (for instance pretrained weights); it is frozen on the way in.
    pub fn with_extractor(mut self, extractor: FrameFeatureExtractor<B>) -> Self {
        self.extractor = extractor.no_grad();
        self
    }

    /// Re-freeze after a record load, which restores trainable flags.
    pub fn freeze_extractor(mut self) -> Self {
        self.extractor = self.extractor.no_grad();
        self
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.config.0.input_shape()
    }

    /// `[B, L, H, W, 3]` -> P(Fall) `[B, 1]`.
    ///
    /// Dropout is only active on an autodiff backend; use `valid()` for evaluation.
    pub fn forward(&self, sequences: Tensor<B, 5>) -> Tensor<B, 2> {
        let [b, l, h, w, c] = sequences.dims();
        let frames = sequences
            .reshape([b * l, h, w, c])
            .swap_dims(1, 3)
            .swap_dims(2, 3);
        let features = self.extractor.forward(frames).detach();
        let f = features.dims()[1];
        let hidden = self.aggregator.forward(features.reshape([b, l, f]));
        let hidden = self.dropout.forward(hidden);
        sigmoid(self.head.forward(hidden))
    }

    /// Probabilities for `batch` sequences given as flat LHWC floats.
    pub fn predict_flat(
        &self,
        data: Vec<f32>,
        batch: usize,
        device: &B::Device,
    ) -> Result<Vec<f32>, ModelError> {
        let shape = self.input_shape();
        let [l, h, w, c] = shape;
        let expected = batch * l * h * w * c;
        if data.len() != expected || batch == 0 {
            return Err(ModelError::InputSize {
                batch,
                shape,
                expected,
                actual: data.len(),
            });
        }
        let input = Tensor::<B, 5>::from_data(TensorData::new(data, [batch, l, h, w, c]), device);
        Ok(self
            .forward(input)
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default())
    }
}

/// Mean binary cross-entropy on probabilities, log clamped at `eps = 1e-6`.
pub fn binary_cross_entropy<B: Backend>(probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let eps = 1e-6;
    let p = probs.clamp(eps, 1.0 - eps);
    let ones = Tensor::<B, 2>::ones(targets.dims(), &targets.device());
    let pos = targets.clone() * p.clone().log();
    let neg = (ones.clone() - targets) * (ones - p).log();
    (pos + neg).neg().mean()
}

pub mod prelude {
    pub use super::{
        binary_cross_entropy, FrameFeatureExtractor, ModelError, SpatialTemporalConfig,
        SpatialTemporalModel, TemporalAggregator,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn tiny() -> SpatialTemporalConfig {
        SpatialTemporalConfig {
            sequence_length: 3,
            frame_height: 8,
            frame_width: 8,
            extractor_channels: 4,
            hidden_size: 5,
            dropout: 0.5,
        }
    }

    #[test]
    fn forward_yields_one_probability_per_sequence() {
        let device = Default::default();
        let model = SpatialTemporalModel::<B>::seeded(tiny(), 1, &device);
        let input = Tensor::<B, 5>::ones([2, 3, 8, 8, 3], &device) * 0.5;
        let out = model.forward(input);
        assert_eq!(out.dims(), [2, 1]);
        for p in out.into_data().to_vec::<f32>().unwrap() {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn extractor_maps_frames_to_channel_features() {
        let device = Default::default();
        let extractor = FrameFeatureExtractor::<B>::new(6, &device);
        let out = extractor.forward(Tensor::zeros([4, 3, 9, 7], &device));
        assert_eq!(out.dims(), [4, 6]);
    }

    #[test]
    fn predict_flat_checks_length() {
        let device = Default::default();
        let model = SpatialTemporalModel::<B>::new(tiny(), &device);
        let err = model.predict_flat(vec![0.0; 10], 1, &device).unwrap_err();
        assert!(matches!(err, ModelError::InputSize { expected: 576, actual: 10, .. }));
    }

    #[test]
    fn bce_is_small_for_confident_correct_predictions() {
        let device = Default::default();
        let probs = Tensor::<B, 2>::from_data(TensorData::new(vec![0.99f32, 0.01], [2, 1]), &device);
        let targets = Tensor::<B, 2>::from_data(TensorData::new(vec![1.0f32, 0.0], [2, 1]), &device);
        let loss = binary_cross_entropy(probs, targets).into_scalar();
        assert!(loss < 0.02, "loss {loss}");

        let zero = Tensor::<B, 2>::zeros([1, 1], &device);
        let one = Tensor::<B, 2>::ones([1, 1], &device);
        let clamped = binary_cross_entropy(zero, one).into_scalar();
        assert!(clamped.is_finite());
    }
}
