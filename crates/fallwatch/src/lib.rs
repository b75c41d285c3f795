//! Fallwatch umbrella crate: re-export the pipeline crates with feature wiring.

#[cfg(feature = "data-contracts")]
pub use data_contracts;

#[cfg(feature = "vision-core")]
pub use vision_core;

#[cfg(feature = "sequence-dataset")]
pub use sequence_dataset;

#[cfg(feature = "models")]
pub use models;

#[cfg(feature = "training")]
pub use training;

#[cfg(feature = "inference")]
pub use inference;

#[cfg(feature = "capture-utils")]
pub use capture_utils;

#[cfg(feature = "cli-support")]
pub use cli_support;
