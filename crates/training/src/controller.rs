//! Epoch loop: split, Adam steps, per-epoch test evaluation, best-accuracy
//! checkpointing and loss-based early stopping.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData};
use data_contracts::PipelineConfig;
use models::checkpoint::{load_checkpoint, load_extractor_weights, save_checkpoint, CheckpointMeta};
use models::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sequence_dataset::{
    split_stratified, BatchIter, Corpus, CorpusSplit, DataSufficiencyError, DatasetError,
    SplitConfig,
};
use thiserror::Error;
use vision_core::prelude::{Prediction, ShapeMismatchError};

use crate::metrics::{ConfusionMatrix, EpochReport, EvalMetrics, MetricsSink, TrainReport};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Sufficiency(#[from] DataSufficiencyError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Shape(#[from] ShapeMismatchError),
    #[error("metrics file {path}: {source}")]
    Metrics {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub model: SpatialTemporalConfig,
    pub split: SplitConfig,
    pub epochs: usize,
    pub batch_size: usize,
    pub patience: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub threshold: f32,
    /// Where the best-accuracy snapshot goes; `None` keeps training in memory.
    pub checkpoint_path: Option<PathBuf>,
    pub metrics_path: Option<PathBuf>,
    /// Pretrained extractor record; the extractor is frozen either way.
    pub extractor_weights: Option<PathBuf>,
}

impl TrainerConfig {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            model: SpatialTemporalConfig {
                sequence_length: cfg.sequence_length,
                frame_height: cfg.frame_height as usize,
                frame_width: cfg.frame_width as usize,
                extractor_channels: cfg.extractor_channels,
                hidden_size: cfg.hidden_size,
                dropout: cfg.dropout,
            },
            split: SplitConfig::from_config(cfg),
            epochs: cfg.epochs,
            batch_size: cfg.batch_size,
            patience: cfg.early_stopping_patience,
            learning_rate: cfg.learning_rate,
            seed: cfg.seed,
            threshold: cfg.decision_threshold,
            checkpoint_path: Some(cfg.checkpoint_path.clone()),
            metrics_path: cfg.metrics_path.clone(),
            extractor_weights: None,
        }
    }
}

/// Counts epochs without a strict test-loss improvement.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: Option<f32>,
    stale: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience: patience.max(1),
            best: None,
            stale: 0,
        }
    }

    /// Record one epoch's loss; returns whether it is a new best.
    pub fn observe(&mut self, loss: f32) -> bool {
        let improved = match self.best {
            None => !loss.is_nan(),
            Some(best) => loss < best,
        };
        if improved {
            self.best = Some(loss);
            self.stale = 0;
        } else {
            self.stale += 1;
        }
        improved
    }

    pub fn should_stop(&self) -> bool {
        self.stale >= self.patience
    }

    pub fn best(&self) -> Option<f32> {
        self.best
    }
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    first_value(t.into_data())
}

/// An unreadable loss is NaN, which early stopping never counts as an improvement.
fn first_value(data: TensorData) -> f32 {
    data.to_vec::<f32>()
        .ok()
        .and_then(|v| v.first().copied())
        .unwrap_or(f32::NAN)
}

fn check_corpus_shape(corpus: &Corpus, expected: [usize; 4]) -> Result<(), ShapeMismatchError> {
    if corpus.shape() != expected {
        return Err(ShapeMismatchError {
            expected,
            actual: corpus.shape(),
        });
    }
    Ok(())
}

/// Loss, accuracy and confusion of `model` over `corpus` in corpus order.
pub fn evaluate<B: Backend>(
    model: &SpatialTemporalModel<B>,
    corpus: &Corpus,
    batch_size: usize,
    threshold: f32,
    device: &B::Device,
) -> EvalMetrics {
    let mut confusion = ConfusionMatrix::default();
    let mut loss_sum = 0.0f32;
    let mut iter = BatchIter::sequential(corpus, batch_size);
    while let Some(batch) = iter.next_batch::<B>(device) {
        let n = batch.len();
        let probs = model.forward(batch.sequences);
        loss_sum += scalar(binary_cross_entropy(probs.clone(), batch.targets)) * n as f32;
        let probs = probs.into_data().to_vec::<f32>().unwrap_or_default();
        for (p, truth) in probs.iter().zip(&batch.labels) {
            confusion.record(*truth, Prediction::from_probability(*p, threshold).label);
        }
    }
    let total = confusion.total();
    EvalMetrics {
        loss: if total == 0 { 0.0 } else { loss_sum / total as f32 },
        accuracy: confusion.accuracy(),
        confusion,
    }
}

/// Load a persisted checkpoint and score it on `corpus`.
pub fn evaluate_checkpoint<B: Backend>(
    path: &Path,
    corpus: &Corpus,
    batch_size: usize,
    threshold: f32,
    device: &B::Device,
) -> Result<(EvalMetrics, CheckpointMeta), TrainError> {
    let (model, meta) = load_checkpoint::<B>(path, device)?;
    check_corpus_shape(corpus, model.input_shape())?;
    Ok((evaluate(&model, corpus, batch_size, threshold, device), meta))
}

pub struct TrainingController<B: AutodiffBackend> {
    cfg: TrainerConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> TrainingController<B> {
    pub fn new(cfg: TrainerConfig, device: B::Device) -> Self {
        Self { cfg, device }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.cfg
    }

    /// Split the corpus, then train. Insufficient data fails before any model exists.
    pub fn fit(&self, corpus: &Corpus) -> Result<(SpatialTemporalModel<B>, TrainReport), TrainError> {
        corpus.check_sufficiency()?;
        let split = split_stratified(corpus, &self.cfg.split);
        self.fit_split(&split)
    }

    pub fn fit_split(
        &self,
        split: &CorpusSplit,
    ) -> Result<(SpatialTemporalModel<B>, TrainReport), TrainError> {
        split.ensure_non_empty()?;
        let expected = self.cfg.model.input_shape();
        check_corpus_shape(&split.train, expected)?;
        check_corpus_shape(&split.test, expected)?;

        let mut model = self.init_model()?;
        let mut optim = AdamConfig::new().init();
        let mut sink = match &self.cfg.metrics_path {
            Some(path) => Some(MetricsSink::open(path).map_err(|source| TrainError::Metrics {
                path: path.clone(),
                source,
            })?),
            None => None,
        };
        tracing::info!(
            train = split.train.len(),
            test = split.test.len(),
            epochs = self.cfg.epochs,
            batch_size = self.cfg.batch_size,
            patience = self.cfg.patience,
            "starting training"
        );

        let mut stopper = EarlyStopping::new(self.cfg.patience);
        let mut best_accuracy: Option<f32> = None;
        let mut best_epoch = None;
        let mut saved = None;
        let mut best_loss_model: Option<(usize, SpatialTemporalModel<B>)> = None;
        let mut history = Vec::new();
        let mut stopped_early = false;
        let mut restored_epoch = None;

        for epoch in 1..=self.cfg.epochs {
            let started = Instant::now();
            let mut rng = StdRng::seed_from_u64(self.cfg.seed.wrapping_add(epoch as u64));
            let mut batches = BatchIter::shuffled(&split.train, self.cfg.batch_size, &mut rng);
            let mut loss_sum = 0.0f32;
            let mut seen = 0usize;
            while let Some(batch) = batches.next_batch::<B>(&self.device) {
                let n = batch.len();
                let probs = model.forward(batch.sequences);
                let loss = binary_cross_entropy(probs, batch.targets);
                let loss_val = scalar(loss.clone().detach());
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(self.cfg.learning_rate, model, grads);
                loss_sum += loss_val * n as f32;
                seen += n;
            }
            let train_loss = loss_sum / seen.max(1) as f32;

            let valid = model.valid();
            let test = evaluate(
                &valid,
                &split.test,
                self.cfg.batch_size,
                self.cfg.threshold,
                &self.device,
            );

            let accuracy_improved = best_accuracy.map_or(true, |best| test.accuracy > best);
            if accuracy_improved {
                best_accuracy = Some(test.accuracy);
                best_epoch = Some(epoch);
                if let Some(path) = &self.cfg.checkpoint_path {
                    let meta = CheckpointMeta {
                        config: self.cfg.model,
                        test_accuracy: Some(test.accuracy),
                        epoch: Some(epoch),
                    };
                    let written = save_checkpoint(&valid, path, &meta)?;
                    tracing::info!(epoch, accuracy = test.accuracy, path = %written.display(), "saved best checkpoint");
                    saved = Some(written);
                }
            }
            let loss_improved = stopper.observe(test.loss);
            if loss_improved {
                best_loss_model = Some((epoch, model.clone()));
            }

            let report = EpochReport {
                epoch,
                train_loss,
                test_loss: test.loss,
                test_accuracy: test.accuracy,
                accuracy_improved,
                loss_improved,
                elapsed_secs: started.elapsed().as_secs_f32(),
            };
            report.log();
            if let Some(sink) = sink.as_mut() {
                sink.write(&report).map_err(|source| TrainError::Metrics {
                    path: sink.path().to_path_buf(),
                    source,
                })?;
            }
            history.push(report);

            if stopper.should_stop() {
                stopped_early = true;
                if let Some((best, best_model)) = best_loss_model.take() {
                    tracing::info!(
                        epoch,
                        restored_epoch = best,
                        best_test_loss = ?stopper.best(),
                        "early stopping; restoring best-loss parameters"
                    );
                    model = best_model;
                    restored_epoch = Some(best);
                }
                break;
            }
        }

        let final_test = evaluate(
            &model.valid(),
            &split.test,
            self.cfg.batch_size,
            self.cfg.threshold,
            &self.device,
        );
        let report = TrainReport {
            train_sequences: split.train.len(),
            test_sequences: split.test.len(),
            epochs_run: history.len(),
            stopped_early,
            restored_epoch,
            best_epoch,
            best_test_accuracy: best_accuracy.unwrap_or(0.0),
            final_test,
            checkpoint: saved,
            history,
        };
        report.log();
        Ok((model, report))
    }

    fn init_model(&self) -> Result<SpatialTemporalModel<B>, TrainError> {
        let model = SpatialTemporalModel::<B>::seeded(self.cfg.model, self.cfg.seed, &self.device);
        match &self.cfg.extractor_weights {
            Some(path) => {
                let extractor = load_extractor_weights::<B>(
                    path,
                    self.cfg.model.feature_size(),
                    &self.device,
                )?;
                tracing::info!(path = %path.display(), "loaded pretrained extractor");
                Ok(model.with_extractor(extractor))
            }
            None => Ok(model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_stopping_counts_only_strict_improvements() {
        let mut stop = EarlyStopping::new(2);
        assert!(stop.observe(1.0));
        assert!(!stop.observe(1.0));
        assert!(!stop.should_stop());
        assert!(stop.observe(0.9));
        assert!(!stop.observe(0.95));
        assert!(!stop.observe(0.91));
        assert!(stop.should_stop());
        assert_eq!(stop.best(), Some(0.9));
    }

    #[test]
    fn unreadable_loss_is_nan_not_zero() {
        assert_eq!(first_value(TensorData::from([0.25f32, 1.0])), 0.25);
        assert!(first_value(TensorData::new(Vec::<f32>::new(), [0])).is_nan());
        assert!(first_value(TensorData::from([3i64])).is_nan());

        let mut stop = EarlyStopping::new(1);
        assert!(stop.observe(0.5));
        assert!(!stop.observe(first_value(TensorData::new(Vec::<f32>::new(), [0]))));
        assert!(stop.should_stop());
        assert_eq!(stop.best(), Some(0.5));
    }

    #[test]
    fn nan_loss_never_counts_as_improvement() {
        let mut stop = EarlyStopping::new(1);
        assert!(!stop.observe(f32::NAN));
        assert!(stop.should_stop());
    }
}
