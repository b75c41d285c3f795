use std::fs;
use std::path::{Path, PathBuf};

use burn::backend::Autodiff;
use clap::Parser;
use cli_support::{BackendKind, ConfigArgs};
use sequence_dataset::{load_corpus, validate_report, ValidationOutcome, ValidationThresholds};

use crate::controller::{TrainerConfig, TrainingController};
use crate::metrics::TrainReport;
use crate::TrainBackend;

type ADBackend = Autodiff<TrainBackend>;

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train the spatial-temporal fall classifier on labeled clip directories"
)]
pub struct TrainArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Pretrained extractor record to load (and freeze) instead of a seeded init.
    #[arg(long)]
    pub extractor_weights: Option<PathBuf>,
    /// Write the dataset build report (JSON) here.
    #[arg(long)]
    pub dataset_report: Option<PathBuf>,
    /// Write the final training report (JSON) here.
    #[arg(long)]
    pub report_out: Option<PathBuf>,
    /// Abort when dataset validation fails instead of warning.
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cli_support::wgpu_enabled();
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; using the WGPU backend despite --backend nd-array");
        }
        _ => {}
    }
    Ok(())
}

pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<TrainReport> {
    validate_backend_choice(args.backend)?;
    let cfg = args.config.resolve()?;
    tracing::info!(data_root = %cfg.data_root.display(), "loading corpus");

    let (corpus, report) = load_corpus(&cfg)?;
    let mut thresholds = ValidationThresholds::from_env();
    thresholds
        .max_class_imbalance
        .get_or_insert(cfg.max_class_imbalance);
    let validation = validate_report(report, &thresholds);
    if let Some(path) = &args.dataset_report {
        write_json(path, &validation)?;
    }
    if validation.outcome == ValidationOutcome::Fail && args.strict {
        anyhow::bail!("dataset validation failed: {}", validation.reasons.join("; "));
    }

    let mut trainer_cfg = TrainerConfig::from_config(&cfg);
    trainer_cfg.extractor_weights = args.extractor_weights.clone();
    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let controller = TrainingController::<ADBackend>::new(trainer_cfg, device);
    let (_, report) = controller.fit(&corpus)?;

    if let Some(path) = &args.report_out {
        write_json(path, &report)?;
    }
    match &report.checkpoint {
        Some(path) => println!(
            "Saved best checkpoint (epoch {}, test accuracy {:.3}) to {}",
            report.best_epoch.unwrap_or(0),
            report.best_test_accuracy,
            path.display()
        ),
        None => println!("No checkpoint written"),
    }
    println!(
        "Final test accuracy {:.3}, loss {:.4} after {} epoch(s){}",
        report.final_test.accuracy,
        report.final_test.loss,
        report.epochs_run,
        if report.stopped_early {
            " (stopped early)"
        } else {
            ""
        }
    );
    Ok(report)
}
