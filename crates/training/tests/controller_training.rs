use std::sync::Arc;

use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn_ndarray::NdArray;
use data_contracts::FallLabel;
use image::{DynamicImage, Rgb, RgbImage};
use models::checkpoint::read_meta;
use sequence_dataset::{
    Corpus, DataSufficiencyError, DatasetBuilder, LabeledSequence, LabeledSources,
    SequenceWindower, SplitConfig, VideoId, VideoInfo,
};
use training::{
    evaluate_checkpoint, SpatialTemporalConfig, TrainError, TrainerConfig, TrainingController,
};
use vision_core::prelude::{FrameNormalizer, FrameSource, MemorySource, Sequence};

type B = Autodiff<NdArray<f32>>;
type Inner = NdArray<f32>;

const L: usize = 4;
const SIZE: u32 = 4;

fn gray(level: f32) -> RgbImage {
    let v = (level.clamp(0.0, 1.0) * 255.0).round() as u8;
    RgbImage::from_pixel(SIZE, SIZE, Rgb([v, v, v]))
}

fn video(name: String, levels: &[f32]) -> Box<dyn FrameSource> {
    Box::new(MemorySource::new(name, levels.iter().map(|&l| gray(l)).collect()))
}

fn ramp(start: f32, end: f32) -> Vec<f32> {
    (0..L)
        .map(|i| start + (end - start) * i as f32 / (L - 1) as f32)
        .collect()
}

/// Falls darken over the window; normal clips hold one brightness.
fn synthetic_corpus(per_class: usize) -> Corpus {
    let mut sources = LabeledSources::new();
    let falls = (0..per_class)
        .map(|i| {
            let t = i as f32 / per_class.max(2) as f32;
            video(format!("fall_{i}"), &ramp(0.75 + 0.2 * t, 0.25 - 0.2 * t))
        })
        .collect();
    let normals = (0..per_class)
        .map(|i| {
            let level = 0.1 + 0.8 * i as f32 / (per_class - 1).max(1) as f32;
            video(format!("normal_{i}"), &[level; L])
        })
        .collect();
    sources.insert(FallLabel::Fall, falls);
    sources.insert(FallLabel::Normal, normals);
    let builder = DatasetBuilder::new(
        FrameNormalizer::new(SIZE, SIZE),
        SequenceWindower::new(L, L, (SIZE, SIZE)),
    );
    builder.build(sources).expect("synthetic corpus").0
}

fn trainer(epochs: usize, lr: f64, patience: usize) -> TrainerConfig {
    TrainerConfig {
        model: SpatialTemporalConfig {
            sequence_length: L,
            frame_height: SIZE as usize,
            frame_width: SIZE as usize,
            extractor_channels: 16,
            hidden_size: 8,
            dropout: 0.0,
        },
        split: SplitConfig::default(),
        epochs,
        batch_size: 4,
        patience,
        learning_rate: lr,
        seed: 42,
        threshold: 0.5,
        checkpoint_path: None,
        metrics_path: None,
        extractor_weights: None,
    }
}

fn flat_sequence(levels: &[f32]) -> Vec<f32> {
    levels
        .iter()
        .flat_map(|&l| std::iter::repeat((l * 255.0).round() / 255.0).take((SIZE * SIZE * 3) as usize))
        .collect()
}

#[test]
fn single_class_corpus_fails_before_training() {
    let norm = FrameNormalizer::new(SIZE, SIZE);
    let frame = Arc::new(norm.normalize_image(&DynamicImage::ImageRgb8(gray(0.3))).unwrap());
    let shape = [L, SIZE as usize, SIZE as usize, 3];
    let samples = (0..3)
        .map(|i| LabeledSequence {
            sequence: Sequence::new(vec![frame.clone(); L], shape).unwrap(),
            label: FallLabel::Fall,
            video: VideoId(i),
            start: 0,
        })
        .collect();
    let videos = (0..3)
        .map(|i| VideoInfo {
            id: VideoId(i),
            name: format!("v{i}"),
            label: FallLabel::Fall,
            frames: L,
            sequences: 1,
        })
        .collect();
    let corpus = Corpus::new(samples, videos, shape);

    let controller = TrainingController::<B>::new(trainer(1, 1e-3, 1), Default::default());
    match controller.fit(&corpus) {
        Err(TrainError::Sufficiency(DataSufficiencyError::TooFewClasses { counts })) => {
            assert_eq!(counts, vec![(FallLabel::Fall, 3)]);
        }
        other => panic!("expected TooFewClasses, got {:?}", other.map(|(_, r)| r)),
    }
}

#[test]
fn one_sequence_per_class_leaves_test_empty() {
    let corpus = synthetic_corpus(1);
    let controller = TrainingController::<B>::new(trainer(1, 1e-3, 1), Default::default());
    match controller.fit(&corpus) {
        Err(TrainError::Sufficiency(DataSufficiencyError::EmptyPartition {
            partition,
            train,
            test,
        })) => {
            assert_eq!((partition, train, test), ("test", 2, 0));
        }
        other => panic!("expected EmptyPartition, got {:?}", other.map(|(_, r)| r)),
    }
}

#[test]
fn stalled_loss_stops_after_patience_and_keeps_first_checkpoint() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let ckpt = tmp.path().join("models/fall_model.bin");
    let metrics = tmp.path().join("metrics.jsonl");
    let mut cfg = trainer(10, 0.0, 2);
    cfg.checkpoint_path = Some(ckpt.clone());
    cfg.metrics_path = Some(metrics.clone());

    let corpus = synthetic_corpus(6);
    let (_, report) = TrainingController::<B>::new(cfg, Default::default()).fit(&corpus)?;

    assert!(report.stopped_early);
    assert_eq!(report.epochs_run, 3);
    assert_eq!(report.restored_epoch, Some(1));
    assert_eq!(report.best_epoch, Some(1));
    let improved: Vec<bool> = report.history.iter().map(|e| e.accuracy_improved).collect();
    assert_eq!(improved, vec![true, false, false]);
    assert!(report.history.iter().skip(1).all(|e| !e.loss_improved));

    assert_eq!(report.checkpoint.as_deref(), Some(ckpt.as_path()));
    assert_eq!(read_meta(&ckpt)?.epoch, Some(1));
    assert_eq!(std::fs::read_to_string(&metrics)?.lines().count(), 3);
    Ok(())
}

#[test]
fn persisted_checkpoint_scores_like_its_epoch() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let ckpt = tmp.path().join("fall_model.bin");
    let mut cfg = trainer(4, 1e-2, 10);
    cfg.checkpoint_path = Some(ckpt.clone());
    let split_cfg = cfg.split;

    let corpus = synthetic_corpus(6);
    let (_, report) = TrainingController::<B>::new(cfg, Default::default()).fit(&corpus)?;
    let best = report.best_epoch.expect("first epoch always checkpoints");
    let saved_accuracy = report.history[best - 1].test_accuracy;
    for (i, epoch) in report.history.iter().enumerate() {
        let prior_best = report.history[..i]
            .iter()
            .map(|e| e.test_accuracy)
            .fold(f32::NEG_INFINITY, f32::max);
        assert_eq!(epoch.accuracy_improved, epoch.test_accuracy > prior_best);
    }

    let test = sequence_dataset::split_stratified(&corpus, &split_cfg).test;
    let (metrics, meta) =
        evaluate_checkpoint::<Inner>(&ckpt, &test, 4, 0.5, &Default::default())?;
    assert_eq!(meta.epoch, Some(best));
    assert!((metrics.accuracy - saved_accuracy).abs() < 1e-6);
    Ok(())
}

#[test]
fn trained_model_does_not_call_a_static_scene_a_fall() -> anyhow::Result<()> {
    let corpus = synthetic_corpus(12);
    let device = Default::default();
    let (model, report) = TrainingController::<B>::new(trainer(150, 1e-2, 1000), device).fit(&corpus)?;
    assert!(!report.stopped_early);

    let model = model.valid();
    let device = Default::default();
    let p_static = model.predict_flat(flat_sequence(&[0.5; L]), 1, &device)?[0];
    let p_fall = model.predict_flat(flat_sequence(&ramp(0.85, 0.15)), 1, &device)?[0];
    assert!(p_static < 0.5, "static scene scored {p_static}");
    assert!(p_fall > p_static, "fall {p_fall} vs static {p_static}");
    Ok(())
}
