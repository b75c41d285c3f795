use std::path::PathBuf;

use capture_utils::{ClipRecorder, RecorderEvent, RecorderOutcome};
use clap::Parser;
use cli_support::ConfigArgs;
use data_contracts::FallLabel;
use vision_core::prelude::{FrameSource, ImageSequenceSource};

#[derive(Parser, Debug)]
#[command(
    name = "record_clips",
    about = "Cut a frame directory into labeled fixed-length clips under the data root"
)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    /// Directory of frame images to record from, in file-name order.
    #[arg(long)]
    source: PathBuf,
    /// Class label for every clip recorded in this run (Normal or Fall).
    #[arg(long)]
    label: FallLabel,
    /// Frames per clip (defaults to the sequence length).
    #[arg(long)]
    clip_length: Option<usize>,
    /// Output root (defaults to the configured data root).
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    let args = Args::parse();
    let cfg = args.config.resolve()?;
    let root = args.output.clone().unwrap_or_else(|| cfg.data_root.clone());

    let mut recorder = ClipRecorder::new(&root, &cfg);
    if let Some(n) = args.clip_length {
        recorder = recorder.with_clip_length(n);
    }
    let mut source = ImageSequenceSource::open(&args.source)?;

    recorder.handle(RecorderEvent::Start(args.label))?;
    let mut skipped = 0usize;
    while let Some(raw) = source.next_frame() {
        match recorder.handle(RecorderEvent::Frame(raw))? {
            RecorderOutcome::ClipWritten(dir) => {
                println!("wrote {}", dir.display());
                recorder.handle(RecorderEvent::Start(args.label))?;
            }
            RecorderOutcome::SkippedFrame => skipped += 1,
            _ => {}
        }
    }
    if let RecorderOutcome::Discarded(n) = recorder.handle(RecorderEvent::Stop)? {
        if n > 0 {
            println!("discarded {n} trailing frame(s) shorter than one clip");
        }
    }
    println!(
        "Recorded {} {} clip(s) of {} frames into {} ({} frame(s) skipped)",
        recorder.clips_written(),
        args.label,
        recorder.clip_length(),
        root.display(),
        skipped
    );
    Ok(())
}
