//! Live fall inference: a rolling window of normalized frames classified by a loaded checkpoint.

#![recursion_limit = "256"]

pub mod buffer;
pub mod factory;
pub mod monitor;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use buffer::RollingBuffer;
pub use factory::{BurnSequenceClassifier, InferenceError, InferenceFactory, ModelNotFoundError};
pub use monitor::{LiveMonitor, LiveStatus};

pub mod prelude {
    pub use crate::buffer::RollingBuffer;
    pub use crate::factory::{
        BurnSequenceClassifier, InferenceError, InferenceFactory, ModelNotFoundError,
    };
    pub use crate::monitor::{LiveMonitor, LiveStatus};
    pub use crate::InferenceBackend;
}
