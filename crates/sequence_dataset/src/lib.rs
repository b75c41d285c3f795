//! Turning labeled videos into a training corpus of fixed-length sequences.
//!
//! This crate provides:
//! - Sliding-window extraction with shared frames (`windower`)
//! - Corpus construction and sufficiency checks (`builder`)
//! - Clip directory indexing on disk (`capture`)
//! - Deterministic stratified, video-grouped splits (`splits`)
//! - Post-build quality checks (`validation`)
//! - Burn batch iteration (`batch`, behind `burn-runtime`)

pub mod builder;
pub mod capture;
pub mod splits;
pub mod types;
pub mod validation;
pub mod windower;

#[cfg(feature = "burn-runtime")]
pub mod batch;

pub use builder::{Corpus, DatasetBuilder, LabeledSources};
pub use capture::{index_clip_root, load_corpus, open_sources, ClipIndex};
pub use splits::{split_indices, split_stratified, CorpusSplit, SplitConfig};
pub use types::*;
pub use validation::{class_imbalance, validate_report};
pub use windower::{SequenceWindower, WindowOutcome};

#[cfg(feature = "burn-runtime")]
pub use batch::{collate, BatchIter, SequenceBatch};
