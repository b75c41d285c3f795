#![recursion_limit = "256"]

pub mod controller;
pub mod metrics;
pub mod util;

pub use controller::{
    evaluate, evaluate_checkpoint, EarlyStopping, TrainError, TrainerConfig, TrainingController,
};
pub use metrics::{ConfusionMatrix, EpochReport, EvalMetrics, MetricsSink, TrainReport};
pub use models::{SpatialTemporalConfig, SpatialTemporalModel};
pub use util::{run_train, TrainArgs};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
