//! Shared data contracts for clips, labels, and pipeline configuration.

pub mod capture;
pub mod config;
pub mod label;

pub use capture::{ClipMetadata, ValidationError};
pub use config::{ConfigError, PipelineConfig, CONFIG_ENV_VAR};
pub use label::FallLabel;
