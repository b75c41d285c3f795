//! Epoch/run reports, evaluation metrics and the JSONL metrics sink.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use data_contracts::FallLabel;
use serde::{Deserialize, Serialize};

/// Rows are ground truth, columns are predictions, both indexed by `FallLabel::index`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn record(&mut self, truth: FallLabel, predicted: FallLabel) {
        self.counts[truth.index()][predicted.index()] += 1;
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        self.counts[0][0] + self.counts[1][1]
    }

    pub fn accuracy(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f32 / total as f32
        }
    }

    fn fall(&self) -> (usize, usize, usize) {
        let f = FallLabel::Fall.index();
        let n = FallLabel::Normal.index();
        (self.counts[f][f], self.counts[n][f], self.counts[f][n])
    }

    /// Of the sequences flagged Fall, how many were falls.
    pub fn fall_precision(&self) -> f32 {
        let (tp, fp, _) = self.fall();
        if tp + fp == 0 {
            0.0
        } else {
            tp as f32 / (tp + fp) as f32
        }
    }

    /// Of the actual falls, how many were flagged.
    pub fn fall_recall(&self) -> f32 {
        let (tp, _, fn_) = self.fall();
        if tp + fn_ == 0 {
            0.0
        } else {
            tp as f32 / (tp + fn_) as f32
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Mean BCE over all evaluated sequences.
    pub loss: f32,
    pub accuracy: f32,
    pub confusion: ConfusionMatrix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub train_loss: f32,
    pub test_loss: f32,
    pub test_accuracy: f32,
    /// Test accuracy strictly beat every earlier epoch (checkpoint written).
    pub accuracy_improved: bool,
    /// Test loss beat the best so far (early-stopping counter reset).
    pub loss_improved: bool,
    pub elapsed_secs: f32,
}

impl EpochReport {
    pub fn log(&self) {
        tracing::info!(
            epoch = self.epoch,
            train_loss = self.train_loss,
            test_loss = self.test_loss,
            test_accuracy = self.test_accuracy,
            checkpoint = self.accuracy_improved,
            elapsed_secs = self.elapsed_secs,
            "epoch complete"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub train_sequences: usize,
    pub test_sequences: usize,
    pub epochs_run: usize,
    pub stopped_early: bool,
    /// Epoch whose parameters were restored at an early-stop halt.
    pub restored_epoch: Option<usize>,
    /// Epoch of the persisted (best-accuracy) checkpoint.
    pub best_epoch: Option<usize>,
    pub best_test_accuracy: f32,
    /// Metrics of the model held at the end of training.
    pub final_test: EvalMetrics,
    pub checkpoint: Option<PathBuf>,
    pub history: Vec<EpochReport>,
}

impl TrainReport {
    pub fn log(&self) {
        tracing::info!(
            epochs = self.epochs_run,
            stopped_early = self.stopped_early,
            final_test_accuracy = self.final_test.accuracy,
            final_test_loss = self.final_test.loss,
            best_test_accuracy = self.best_test_accuracy,
            best_epoch = ?self.best_epoch,
            checkpoint = ?self.checkpoint,
            "training finished"
        );
    }
}

/// Appends one JSON object per line.
pub struct MetricsSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl MetricsSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write<T: Serialize>(&mut self, row: &T) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, row)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confusion_matrix_rates() {
        let mut m = ConfusionMatrix::default();
        m.record(FallLabel::Fall, FallLabel::Fall);
        m.record(FallLabel::Fall, FallLabel::Normal);
        m.record(FallLabel::Normal, FallLabel::Normal);
        m.record(FallLabel::Normal, FallLabel::Fall);
        m.record(FallLabel::Normal, FallLabel::Normal);
        assert_eq!(m.total(), 5);
        assert!((m.accuracy() - 0.6).abs() < 1e-6);
        assert!((m.fall_precision() - 0.5).abs() < 1e-6);
        assert!((m.fall_recall() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn metrics_sink_appends_json_lines() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out/metrics.jsonl");
        let row = EpochReport {
            epoch: 1,
            train_loss: 0.5,
            test_loss: 0.6,
            test_accuracy: 0.7,
            accuracy_improved: true,
            loss_improved: true,
            elapsed_secs: 0.1,
        };
        {
            let mut sink = MetricsSink::open(&path)?;
            sink.write(&row)?;
        }
        MetricsSink::open(&path)?.write(&row)?;
        let text = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: EpochReport = serde_json::from_str(lines[1])?;
        assert_eq!(parsed, row);
        Ok(())
    }
}
