//! Checkpoint persistence via Burn's `BinFileRecorder<FullPrecisionSettings>`.
//!
//! A checkpoint is the record file plus a JSON sidecar (same stem, `.json`)
//! holding the `SpatialTemporalConfig` needed to rebuild the module.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::{FrameFeatureExtractor, ModelError, SpatialTemporalConfig, SpatialTemporalModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub config: SpatialTemporalConfig,
    /// Test accuracy at the time of saving, if known.
    pub test_accuracy: Option<f32>,
    pub epoch: Option<usize>,
}

/// File the recorder actually writes for `path`: the extension is always `.bin`.
pub fn record_path(path: &Path) -> PathBuf {
    path.with_extension("bin")
}

pub fn meta_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

/// Write the model record and its metadata sidecar, creating parent directories.
///
/// Returns the record file that was written (see [`record_path`]).
pub fn save_checkpoint<B: Backend>(
    model: &SpatialTemporalModel<B>,
    path: &Path,
    meta: &CheckpointMeta,
) -> Result<PathBuf, ModelError> {
    let path = &record_path(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ModelError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|source| ModelError::Record {
            path: path.to_path_buf(),
            source,
        })?;
    let sidecar = meta_path(path);
    let json = serde_json::to_vec_pretty(meta).map_err(|source| ModelError::Meta {
        path: sidecar.clone(),
        source,
    })?;
    fs::write(&sidecar, json).map_err(|source| ModelError::Io {
        path: sidecar.clone(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "saved checkpoint");
    Ok(path.to_path_buf())
}

pub fn read_meta(path: &Path) -> Result<CheckpointMeta, ModelError> {
    let sidecar = meta_path(path);
    let raw = fs::read(&sidecar).map_err(|source| ModelError::Io {
        path: sidecar.clone(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| ModelError::Meta {
        path: sidecar,
        source,
    })
}

/// Rebuild a model from its sidecar config and load the record into it.
pub fn load_checkpoint<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(SpatialTemporalModel<B>, CheckpointMeta), ModelError> {
    let path = &record_path(path);
    let meta = read_meta(path)?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = SpatialTemporalModel::<B>::new(meta.config, device)
        .load_file(path, &recorder, device)
        .map_err(|source| ModelError::Record {
            path: path.to_path_buf(),
            source,
        })?
        .freeze_extractor();
    Ok((model, meta))
}

pub fn save_extractor_weights<B: Backend>(
    extractor: &FrameFeatureExtractor<B>,
    path: &Path,
) -> Result<(), ModelError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    extractor
        .clone()
        .save_file(path, &recorder)
        .map_err(|source| ModelError::Record {
            path: path.to_path_buf(),
            source,
        })
}

/// Load pretrained extractor weights for a model of `channels` features. Returned frozen.
pub fn load_extractor_weights<B: Backend>(
    path: &Path,
    channels: usize,
    device: &B::Device,
) -> Result<FrameFeatureExtractor<B>, ModelError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let extractor = FrameFeatureExtractor::<B>::new(channels, device)
        .load_file(path, &recorder, device)
        .map_err(|source| ModelError::Record {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(extractor.no_grad())
}
