use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::tensor::backend::Backend;
use data_contracts::PipelineConfig;
use models::{load_checkpoint, record_path, ModelError, SpatialTemporalModel};
use thiserror::Error;
use vision_core::prelude::{ClassifyError, Sequence, SequenceClassifier, ShapeMismatchError};

use crate::InferenceBackend;

/// No checkpoint at the configured path. Callers usually degrade instead of failing.
#[derive(Debug, Clone, Error)]
#[error("no model checkpoint at {}", path.display())]
pub struct ModelNotFoundError {
    pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    NotFound(#[from] ModelNotFoundError),
    #[error("failed to load checkpoint {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
    #[error(transparent)]
    Shape(#[from] ShapeMismatchError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

/// A loaded spatial-temporal model behind the `SequenceClassifier` seam.
///
/// Parameters are immutable after load, so the model is shared without locks.
pub struct BurnSequenceClassifier<B: Backend> {
    model: Arc<SpatialTemporalModel<B>>,
    device: B::Device,
}

impl<B: Backend> BurnSequenceClassifier<B> {
    pub fn new(model: SpatialTemporalModel<B>, device: B::Device) -> Self {
        Self {
            model: Arc::new(model),
            device,
        }
    }

    pub fn model(&self) -> &SpatialTemporalModel<B> {
        &self.model
    }
}

impl<B: Backend> Clone for BurnSequenceClassifier<B> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            device: self.device.clone(),
        }
    }
}

impl<B: Backend> SequenceClassifier for BurnSequenceClassifier<B> {
    fn predict(&self, sequence: &Sequence) -> Result<f32, ClassifyError> {
        sequence.check_shape(self.input_shape())?;
        let probs = self
            .model
            .predict_flat(sequence.to_flat(), 1, &self.device)
            .map_err(|e| ClassifyError::Backend(e.to_string()))?;
        probs
            .first()
            .copied()
            .ok_or_else(|| ClassifyError::Backend("model returned no probability".into()))
    }

    fn input_shape(&self) -> [usize; 4] {
        self.model.input_shape()
    }
}

/// Loads checkpoints for serving.
pub struct InferenceFactory;

impl InferenceFactory {
    /// Load the checkpoint at `path` and check it against the configured sequence shape.
    pub fn load(
        &self,
        cfg: &PipelineConfig,
        path: &Path,
    ) -> Result<BurnSequenceClassifier<InferenceBackend>, InferenceError> {
        let device = <InferenceBackend as Backend>::Device::default();
        self.load_on::<InferenceBackend>(cfg, path, device)
    }

    pub fn load_on<B: Backend>(
        &self,
        cfg: &PipelineConfig,
        path: &Path,
        device: B::Device,
    ) -> Result<BurnSequenceClassifier<B>, InferenceError> {
        let record = record_path(path);
        if !record.exists() {
            return Err(ModelNotFoundError { path: record }.into());
        }
        let (model, meta) =
            load_checkpoint::<B>(path, &device).map_err(|source| InferenceError::Load {
                path: path.to_path_buf(),
                source,
            })?;
        let expected = cfg.sequence_shape();
        let actual = model.input_shape();
        if expected != actual {
            return Err(ShapeMismatchError { expected, actual }.into());
        }
        tracing::info!(
            path = %path.display(),
            epoch = ?meta.epoch,
            test_accuracy = ?meta.test_accuracy,
            "loaded fall classifier"
        );
        Ok(BurnSequenceClassifier::new(model, device))
    }

    /// Like `load`, but a missing checkpoint yields `None` (degraded mode) with a warning.
    pub fn load_optional(
        &self,
        cfg: &PipelineConfig,
        path: &Path,
    ) -> Result<Option<BurnSequenceClassifier<InferenceBackend>>, InferenceError> {
        match self.load(cfg, path) {
            Ok(classifier) => Ok(Some(classifier)),
            Err(InferenceError::NotFound(err)) => {
                tracing::warn!("{err}; running without predictions");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
