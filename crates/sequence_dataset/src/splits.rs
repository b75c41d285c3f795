//! Deterministic stratified train/test splitting.
//!
//! Overlapping windows of one video are strongly correlated, so by default a
//! class's videos (not its windows) are assigned to partitions. Classes with
//! fewer than two contributing videos fall back to window-level assignment.

use std::collections::BTreeMap;

use data_contracts::{FallLabel, PipelineConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::builder::Corpus;
use crate::types::{DataSufficiencyError, VideoId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitConfig {
    /// Fraction of each class assigned to train.
    pub train_ratio: f32,
    pub seed: u64,
    pub group_by_video: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.8,
            seed: 42,
            group_by_video: true,
        }
    }
}

impl SplitConfig {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            train_ratio: cfg.train_test_split_ratio,
            seed: cfg.seed,
            group_by_video: cfg.group_split_by_video,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorpusSplit {
    pub train: Corpus,
    pub test: Corpus,
}

impl CorpusSplit {
    /// Both partitions must hold at least one sequence before training starts.
    pub fn ensure_non_empty(&self) -> Result<(), DataSufficiencyError> {
        let (train, test) = (self.train.len(), self.test.len());
        if train == 0 {
            return Err(DataSufficiencyError::EmptyPartition {
                partition: "train",
                train,
                test,
            });
        }
        if test == 0 {
            return Err(DataSufficiencyError::EmptyPartition {
                partition: "test",
                train,
                test,
            });
        }
        Ok(())
    }
}

/// Test-set size for a class of `n` items: rounded, and never emptying train
/// when the class has at least two items.
fn test_count(n: usize, train_ratio: f32) -> usize {
    if n < 2 {
        return 0;
    }
    let raw = (n as f32 * (1.0 - train_ratio)).round() as usize;
    raw.clamp(1, n - 1)
}

/// Choose which videos (given their window counts) go to test so the test
/// total lands as close to `target` as whole videos allow.
///
/// Larger videos are considered first; ties keep the incoming (shuffled) order.
/// A video is taken only if it moves the total strictly closer to `target`, and
/// at least one video always stays in train. With two or more videos at least
/// one goes to test, the smallest if nothing else qualified.
fn pick_test_videos(sizes: &[usize], target: usize) -> Vec<bool> {
    let mut in_test = vec![false; sizes.len()];
    if sizes.len() < 2 {
        return in_test;
    }
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]));

    let mut assigned = 0usize;
    let mut picked = 0usize;
    for &i in &order {
        if picked + 1 >= sizes.len() {
            break;
        }
        if (assigned + sizes[i]).abs_diff(target) < assigned.abs_diff(target) {
            in_test[i] = true;
            assigned += sizes[i];
            picked += 1;
        }
    }
    if picked == 0 {
        if let Some(&smallest) = order.last() {
            in_test[smallest] = true;
        }
    }
    in_test
}

/// Split sample indices; both returned lists are in corpus order.
pub fn split_indices(corpus: &Corpus, cfg: &SplitConfig) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: BTreeMap<FallLabel, Vec<usize>> = BTreeMap::new();
    for (i, s) in corpus.samples().iter().enumerate() {
        by_class.entry(s.label).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for (label, mut indices) in by_class {
        let mut videos: Vec<VideoId> = indices
            .iter()
            .map(|&i| corpus.samples()[i].video)
            .collect();
        videos.sort();
        videos.dedup();

        if cfg.group_by_video && videos.len() >= 2 {
            let target = test_count(indices.len(), cfg.train_ratio);
            let mut per_video: BTreeMap<VideoId, Vec<usize>> = BTreeMap::new();
            for &i in &indices {
                per_video.entry(corpus.samples()[i].video).or_default().push(i);
            }
            videos.shuffle(&mut rng);
            let sizes: Vec<usize> = videos.iter().map(|v| per_video[v].len()).collect();
            let in_test = pick_test_videos(&sizes, target);
            let mut assigned = 0usize;
            for (video, to_test) in videos.iter().zip(in_test) {
                let members = &per_video[video];
                if to_test {
                    test.extend_from_slice(members);
                    assigned += members.len();
                } else {
                    train.extend_from_slice(members);
                }
            }
            tracing::debug!(
                class = %label,
                videos = videos.len(),
                test_sequences = assigned,
                target,
                "video-grouped split"
            );
        } else {
            if cfg.group_by_video {
                tracing::warn!(
                    class = %label,
                    videos = videos.len(),
                    "too few videos to split by video; splitting windows (test windows may overlap train)"
                );
            }
            indices.shuffle(&mut rng);
            let n_test = test_count(indices.len(), cfg.train_ratio);
            test.extend_from_slice(&indices[..n_test]);
            train.extend_from_slice(&indices[n_test..]);
        }
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

pub fn split_stratified(corpus: &Corpus, cfg: &SplitConfig) -> CorpusSplit {
    let (train, test) = split_indices(corpus, cfg);
    tracing::info!(train = train.len(), test = test.len(), seed = cfg.seed, "split corpus");
    CorpusSplit {
        train: corpus.subset(&train),
        test: corpus.subset(&test),
    }
}
