use clap::{Args, ValueEnum};
use data_contracts::{ConfigError, PipelineConfig};
use std::path::PathBuf;

/// Tensor backend selection shared by the training and inference binaries.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

/// Whether the binary was built with the WGPU backend.
pub fn wgpu_enabled() -> bool {
    cfg!(feature = "backend-wgpu")
}

/// Config file plus per-field overrides. Precedence: defaults < file < flags.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// TOML config file (falls back to $FALLWATCH_CONFIG, then ./fallwatch.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Root holding one directory per class (Normal/, Fall/).
    #[arg(long)]
    pub data_root: Option<PathBuf>,
    /// Frames per sequence (L).
    #[arg(long)]
    pub sequence_length: Option<usize>,
    /// Sliding-window stride; defaults to L/2.
    #[arg(long)]
    pub window_stride: Option<usize>,
    /// Square frame size (sets both height and width).
    #[arg(long)]
    pub frame_size: Option<u32>,
    #[arg(long)]
    pub epochs: Option<usize>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Epochs without test-loss improvement before stopping.
    #[arg(long)]
    pub patience: Option<usize>,
    #[arg(long)]
    pub learning_rate: Option<f64>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// P(Fall) above which a sequence is classified Fall.
    #[arg(long)]
    pub threshold: Option<f32>,
    /// Checkpoint path to write (train) or read (eval, live_infer).
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
    /// Append one JSON line per epoch to this file.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load the base config, apply flags, validate.
    pub fn resolve(&self) -> Result<PipelineConfig, ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::from_path(path)?,
            None => PipelineConfig::load()?,
        };
        self.apply(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(v) = &self.data_root {
            cfg.data_root = v.clone();
        }
        if let Some(v) = self.sequence_length {
            cfg.sequence_length = v;
        }
        if let Some(v) = self.window_stride {
            cfg.window_stride = Some(v);
        }
        if let Some(v) = self.frame_size {
            cfg.frame_height = v;
            cfg.frame_width = v;
        }
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.patience {
            cfg.early_stopping_patience = v;
        }
        if let Some(v) = self.learning_rate {
            cfg.learning_rate = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if let Some(v) = self.threshold {
            cfg.decision_threshold = v;
        }
        if let Some(v) = &self.checkpoint {
            cfg.checkpoint_path = v.clone();
        }
        if let Some(v) = &self.metrics_out {
            cfg.metrics_path = Some(v.clone());
        }
    }
}
