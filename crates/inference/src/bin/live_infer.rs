use std::path::PathBuf;

use clap::Parser;
use cli_support::{BackendKind, ConfigArgs};
use inference::prelude::{LiveMonitor, LiveStatus};
use vision_core::prelude::{FrameSource, ImageSequenceSource};

#[derive(Parser, Debug)]
#[command(
    name = "live_infer",
    about = "Replay a clip directory through the rolling-buffer fall monitor"
)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
    /// Directory of frame images, read in file-name order as a live stream.
    #[arg(long)]
    source: PathBuf,
    /// Emit one JSON object per frame instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    let args = Args::parse();
    if args.backend == BackendKind::Wgpu && !cli_support::wgpu_enabled() {
        anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend");
    }
    let cfg = args.config.resolve()?;

    let mut source = ImageSequenceSource::open(&args.source)?;
    let mut monitor = LiveMonitor::from_config(&cfg)?;
    if !monitor.has_model() {
        println!(
            "No checkpoint at {}; buffering only, no predictions",
            cfg.checkpoint_path.display()
        );
    }

    let mut falls = 0usize;
    while let Some(raw) = source.next_frame() {
        let id = raw.id;
        let status = monitor.ingest(&raw)?;
        if args.json {
            println!(
                "{}",
                serde_json::json!({ "frame": id, "status": status })
            );
            continue;
        }
        match status {
            LiveStatus::Buffering { have, need } => println!("frame {id}: buffering {have}/{need}"),
            LiveStatus::NoModel => println!("frame {id}: window ready, no model loaded"),
            LiveStatus::SkippedFrame => println!("frame {id}: skipped (decode failed)"),
            LiveStatus::Prediction(p) if p.is_fall() => {
                falls += 1;
                println!(
                    "frame {id}: FALL DETECTED (p={:.3}, confidence {:.3})",
                    p.probability, p.confidence
                );
            }
            LiveStatus::Prediction(p) => println!(
                "frame {id}: {} (p={:.3}, confidence {:.3})",
                p.label, p.probability, p.confidence
            ),
        }
    }
    println!(
        "Processed {} frame(s) from {} ({} skipped, {} fall alert(s))",
        monitor.frames_seen(),
        source.name(),
        monitor.skipped(),
        falls
    );
    Ok(())
}
