//! Batch iteration over a corpus for training and evaluation.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use data_contracts::FallLabel;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::builder::Corpus;
use crate::types::LabeledSequence;

/// One mini-batch: sequences `[B, L, H, W, 3]` and targets `[B, 1]` (1.0 = Fall).
pub struct SequenceBatch<B: Backend> {
    pub sequences: Tensor<B, 5>,
    pub targets: Tensor<B, 2>,
    pub labels: Vec<FallLabel>,
}

impl<B: Backend> SequenceBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Stack labeled sequences of one shape into a batch. `None` for an empty slice.
pub fn collate<B: Backend>(
    samples: &[&LabeledSequence],
    shape: [usize; 4],
    device: &B::Device,
) -> Option<SequenceBatch<B>> {
    if samples.is_empty() {
        return None;
    }
    let [l, h, w, c] = shape;
    let mut flat = Vec::with_capacity(samples.len() * l * h * w * c);
    let mut targets = Vec::with_capacity(samples.len());
    let mut labels = Vec::with_capacity(samples.len());
    for s in samples {
        s.sequence.write_flat(&mut flat);
        targets.push(s.label.target());
        labels.push(s.label);
    }
    let n = samples.len();
    let sequences = Tensor::<B, 5>::from_data(TensorData::new(flat, [n, l, h, w, c]), device);
    let targets = Tensor::<B, 2>::from_data(TensorData::new(targets, [n, 1]), device);
    Some(SequenceBatch {
        sequences,
        targets,
        labels,
    })
}

/// Walks a corpus in fixed-size batches; the last batch may be short.
pub struct BatchIter<'a> {
    corpus: &'a Corpus,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
}

impl<'a> BatchIter<'a> {
    /// Corpus order, for deterministic evaluation.
    pub fn sequential(corpus: &'a Corpus, batch_size: usize) -> Self {
        Self {
            corpus,
            order: (0..corpus.len()).collect(),
            cursor: 0,
            batch_size: batch_size.max(1),
        }
    }

    /// A fresh permutation drawn from `rng`; reuse one seeded rng across epochs.
    pub fn shuffled(corpus: &'a Corpus, batch_size: usize, rng: &mut StdRng) -> Self {
        let mut iter = Self::sequential(corpus, batch_size);
        iter.order.shuffle(rng);
        iter
    }

    pub fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    pub fn next_batch<B: Backend>(&mut self, device: &B::Device) -> Option<SequenceBatch<B>> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let samples: Vec<&LabeledSequence> = self.order[self.cursor..end]
            .iter()
            .map(|&i| &self.corpus.samples()[i])
            .collect();
        self.cursor = end;
        collate(&samples, self.corpus.shape(), device)
    }
}
