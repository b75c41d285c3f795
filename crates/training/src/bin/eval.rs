use clap::Parser;
use cli_support::{BackendKind, ConfigArgs};
use data_contracts::FallLabel;
use sequence_dataset::{load_corpus, split_stratified, SplitConfig};
use training::util::{validate_backend_choice, write_json};
use training::{evaluate_checkpoint, TrainBackend};

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate a fall-classifier checkpoint on labeled clip directories (accuracy, loss, confusion)"
)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
    /// Score only the held-out partition the trainer would produce for this seed.
    #[arg(long, default_value_t = false)]
    test_split_only: bool,
    /// Write the metrics (JSON) here.
    #[arg(long)]
    out: Option<std::path::PathBuf>,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    let args = Args::parse();
    validate_backend_choice(args.backend)?;
    let cfg = args.config.resolve()?;

    let (corpus, _) = load_corpus(&cfg)?;
    let corpus = if args.test_split_only {
        split_stratified(&corpus, &SplitConfig::from_config(&cfg)).test
    } else {
        corpus
    };
    if corpus.is_empty() {
        anyhow::bail!("no sequences to evaluate under {}", cfg.data_root.display());
    }

    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();
    let (metrics, meta) = evaluate_checkpoint::<TrainBackend>(
        &cfg.checkpoint_path,
        &corpus,
        cfg.batch_size,
        cfg.decision_threshold,
        &device,
    )?;
    if let Some(path) = &args.out {
        write_json(path, &metrics)?;
    }

    let n = FallLabel::Normal.index();
    let f = FallLabel::Fall.index();
    let c = metrics.confusion.counts;
    println!(
        "Eval complete: accuracy={:.3}, loss={:.4}, fall precision={:.3}, fall recall={:.3} over {} sequences (checkpoint epoch {:?})",
        metrics.accuracy,
        metrics.loss,
        metrics.confusion.fall_precision(),
        metrics.confusion.fall_recall(),
        metrics.confusion.total(),
        meta.epoch,
    );
    println!("              pred Normal  pred Fall");
    println!("true Normal   {:>11}  {:>9}", c[n][n], c[n][f]);
    println!("true Fall     {:>11}  {:>9}", c[f][n], c[f][f]);
    Ok(())
}
