use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::label::FallLabel;

pub const DEFAULT_CONFIG_NAME: &str = "fallwatch.toml";
pub const CONFIG_ENV_VAR: &str = "FALLWATCH_CONFIG";
const MAX_EPOCHS: usize = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config value for {field}: {msg}")]
    Invalid { field: &'static str, msg: String },
}

/// Immutable pipeline configuration handed to every component at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Frames per sequence (L).
    pub sequence_length: usize,
    pub frame_height: u32,
    pub frame_width: u32,
    /// Window stride; `None` derives L/2.
    pub window_stride: Option<usize>,
    /// Fraction of each class that goes to the train partition.
    pub train_test_split_ratio: f32,
    pub epochs: usize,
    pub batch_size: usize,
    pub early_stopping_patience: usize,
    pub decision_threshold: f32,
    pub learning_rate: f64,
    pub seed: u64,
    pub hidden_size: usize,
    pub dropout: f64,
    pub extractor_channels: usize,
    /// Keep every window of a video in the same partition.
    pub group_split_by_video: bool,
    /// Majority/minority sequence ratio above which the dataset report warns.
    pub max_class_imbalance: f32,
    pub checkpoint_path: PathBuf,
    pub metrics_path: Option<PathBuf>,
    pub data_root: PathBuf,
    pub classes: Vec<FallLabel>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sequence_length: 20,
            frame_height: 224,
            frame_width: 224,
            window_stride: None,
            train_test_split_ratio: 0.8,
            epochs: 20,
            batch_size: 4,
            early_stopping_patience: 5,
            decision_threshold: 0.5,
            learning_rate: 1e-3,
            seed: 42,
            hidden_size: 64,
            dropout: 0.5,
            extractor_channels: 32,
            group_split_by_video: true,
            max_class_imbalance: 4.0,
            checkpoint_path: PathBuf::from("models/fall_model.bin"),
            metrics_path: None,
            data_root: PathBuf::from("data/raw"),
            classes: FallLabel::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    data_root: Option<String>,
    classes: Option<Vec<String>>,
    sequence: Option<SequenceSection>,
    training: Option<TrainingSection>,
    model: Option<ModelSection>,
    inference: Option<InferenceSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SequenceSection {
    sequence_length: Option<usize>,
    frame_height: Option<u32>,
    frame_width: Option<u32>,
    window_stride: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrainingSection {
    train_test_split_ratio: Option<f32>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    early_stopping_patience: Option<usize>,
    learning_rate: Option<f64>,
    seed: Option<u64>,
    group_split_by_video: Option<bool>,
    max_class_imbalance: Option<f32>,
    metrics_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelSection {
    hidden_size: Option<usize>,
    dropout: Option<f64>,
    extractor_channels: Option<usize>,
    checkpoint_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InferenceSection {
    decision_threshold: Option<f32>,
}

impl PipelineConfig {
    /// Load from `$FALLWATCH_CONFIG`, else `./fallwatch.toml` if present, else defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_path(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_NAME);
        if default_path.exists() {
            return Self::from_path(default_path);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: PipelineConfigFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(root) = file.data_root {
            cfg.data_root = PathBuf::from(root);
        }
        if let Some(classes) = file.classes {
            cfg.classes = classes
                .iter()
                .map(|c| c.parse::<FallLabel>())
                .collect::<Result<_, _>>()
                .map_err(|e| ConfigError::Invalid {
                    field: "classes",
                    msg: e.to_string(),
                })?;
        }
        let seq = file.sequence.unwrap_or_default();
        cfg.sequence_length = seq.sequence_length.unwrap_or(cfg.sequence_length);
        cfg.frame_height = seq.frame_height.unwrap_or(cfg.frame_height);
        cfg.frame_width = seq.frame_width.unwrap_or(cfg.frame_width);
        cfg.window_stride = seq.window_stride.or(cfg.window_stride);

        let train = file.training.unwrap_or_default();
        cfg.train_test_split_ratio = train
            .train_test_split_ratio
            .unwrap_or(cfg.train_test_split_ratio);
        cfg.epochs = train.epochs.unwrap_or(cfg.epochs);
        cfg.batch_size = train.batch_size.unwrap_or(cfg.batch_size);
        cfg.early_stopping_patience = train
            .early_stopping_patience
            .unwrap_or(cfg.early_stopping_patience);
        cfg.learning_rate = train.learning_rate.unwrap_or(cfg.learning_rate);
        cfg.seed = train.seed.unwrap_or(cfg.seed);
        cfg.group_split_by_video = train
            .group_split_by_video
            .unwrap_or(cfg.group_split_by_video);
        cfg.max_class_imbalance = train.max_class_imbalance.unwrap_or(cfg.max_class_imbalance);
        cfg.metrics_path = train.metrics_path.map(PathBuf::from).or(cfg.metrics_path);

        let model = file.model.unwrap_or_default();
        cfg.hidden_size = model.hidden_size.unwrap_or(cfg.hidden_size);
        cfg.dropout = model.dropout.unwrap_or(cfg.dropout);
        cfg.extractor_channels = model.extractor_channels.unwrap_or(cfg.extractor_channels);
        if let Some(path) = model.checkpoint_path {
            cfg.checkpoint_path = PathBuf::from(path);
        }

        let infer = file.inference.unwrap_or_default();
        cfg.decision_threshold = infer.decision_threshold.unwrap_or(cfg.decision_threshold);
        Ok(cfg)
    }

    /// Effective stride: the configured value, or L/2 (at least 1).
    pub fn window_stride(&self) -> usize {
        self.window_stride
            .unwrap_or(self.sequence_length / 2)
            .max(1)
    }

    /// Shape of one sequence as (L, H, W, C).
    pub fn sequence_shape(&self) -> [usize; 4] {
        [
            self.sequence_length,
            self.frame_height as usize,
            self.frame_width as usize,
            3,
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, msg: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                msg: msg.into(),
            }
        }
        if self.sequence_length == 0 {
            return Err(invalid("sequence_length", "must be at least 1"));
        }
        if self.frame_height == 0 || self.frame_width == 0 {
            return Err(invalid(
                "frame_height/frame_width",
                format!("must be non-zero, got {}x{}", self.frame_width, self.frame_height),
            ));
        }
        if self.window_stride == Some(0) {
            return Err(invalid("window_stride", "must be at least 1"));
        }
        if !(self.train_test_split_ratio > 0.0 && self.train_test_split_ratio < 1.0) {
            return Err(invalid(
                "train_test_split_ratio",
                format!("must be in (0, 1), got {}", self.train_test_split_ratio),
            ));
        }
        if self.epochs == 0 || self.epochs > MAX_EPOCHS {
            return Err(invalid(
                "epochs",
                format!("must be in 1..={MAX_EPOCHS}, got {}", self.epochs),
            ));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.early_stopping_patience == 0 {
            return Err(invalid("early_stopping_patience", "must be at least 1"));
        }
        if !(self.decision_threshold > 0.0 && self.decision_threshold < 1.0) {
            return Err(invalid(
                "decision_threshold",
                format!("must be in (0, 1), got {}", self.decision_threshold),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid("learning_rate", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(invalid("dropout", format!("must be in [0, 1), got {}", self.dropout)));
        }
        if self.hidden_size == 0 || self.extractor_channels == 0 {
            return Err(invalid("hidden_size/extractor_channels", "must be at least 1"));
        }
        if self.classes.is_empty() {
            return Err(invalid("classes", "at least one class must be declared"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recognized_options() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.sequence_shape(), [20, 224, 224, 3]);
        assert_eq!(cfg.window_stride(), 10);
        assert_eq!(cfg.batch_size, 4);
        assert_eq!(cfg.early_stopping_patience, 5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn stride_never_zero_for_single_frame_sequences() {
        let cfg = PipelineConfig {
            sequence_length: 1,
            ..Default::default()
        };
        assert_eq!(cfg.window_stride(), 1);
    }

    #[test]
    fn rejects_out_of_range_split() {
        let cfg = PipelineConfig {
            train_test_split_ratio: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "train_test_split_ratio",
                ..
            })
        ));
    }
}
