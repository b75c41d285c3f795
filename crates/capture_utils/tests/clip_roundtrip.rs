use capture_utils::{ClipRecorder, RecorderEvent, RecorderOutcome};
use data_contracts::{FallLabel, PipelineConfig};
use image::{Rgb, RgbImage};
use sequence_dataset::{index_clip_root, load_corpus};
use vision_core::prelude::RawFrame;

fn config(root: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        sequence_length: 3,
        frame_height: 4,
        frame_width: 4,
        data_root: root.to_path_buf(),
        ..PipelineConfig::default()
    }
}

fn record(rec: &mut ClipRecorder, label: FallLabel, levels: &[u8]) -> anyhow::Result<()> {
    rec.handle(RecorderEvent::Start(label))?;
    for (id, &v) in levels.iter().enumerate() {
        let img = RgbImage::from_pixel(4, 4, Rgb([v, v, v]));
        let outcome = rec.handle(RecorderEvent::Frame(RawFrame::from_rgb(id as u64, 0.0, img)))?;
        if id + 1 == levels.len() {
            assert!(matches!(outcome, RecorderOutcome::ClipWritten(_)));
        }
    }
    Ok(())
}

#[test]
fn recorded_clips_load_as_a_corpus() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = config(tmp.path());
    let mut rec = ClipRecorder::new(tmp.path(), &cfg);
    record(&mut rec, FallLabel::Fall, &[220, 120, 20])?;
    record(&mut rec, FallLabel::Fall, &[200, 100, 30])?;
    record(&mut rec, FallLabel::Normal, &[90, 90, 90])?;
    record(&mut rec, FallLabel::Normal, &[150, 150, 150])?;
    assert_eq!(rec.clips_written(), 4);

    let index = index_clip_root(tmp.path(), &FallLabel::ALL)?;
    for label in FallLabel::ALL {
        assert_eq!(index[&label].len(), 2);
        for clip in &index[&label] {
            assert_eq!(clip.frames.len(), 3);
            let meta = clip.metadata.as_ref().expect("clip.json is read back");
            assert_eq!(meta.label, label);
            assert_eq!(meta.sequence_length, 3);
        }
    }

    let (corpus, report) = load_corpus(&cfg)?;
    assert_eq!(corpus.len(), 4);
    assert_eq!(corpus.shape(), [3, 4, 4, 3]);
    assert_eq!(report.total_too_short(), 0);

    let fall = corpus
        .samples()
        .iter()
        .find(|s| s.label == FallLabel::Fall)
        .expect("a fall sequence");
    let firsts: Vec<f32> = fall.sequence.frames().iter().map(|f| f.data()[0]).collect();
    assert!(firsts.windows(2).all(|w| w[0] > w[1]), "frames out of order: {firsts:?}");
    Ok(())
}

#[test]
fn partial_clip_leaves_nothing_on_disk() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = config(tmp.path());
    let mut rec = ClipRecorder::new(tmp.path(), &cfg).with_clip_length(5);
    rec.handle(RecorderEvent::Start(FallLabel::Fall))?;
    rec.handle(RecorderEvent::Frame(RawFrame::from_rgb(
        0,
        0.0,
        RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])),
    )))?;
    rec.handle(RecorderEvent::Stop)?;
    let index = index_clip_root(tmp.path(), &FallLabel::ALL)?;
    assert!(index.values().all(|clips| clips.is_empty()));
    Ok(())
}
