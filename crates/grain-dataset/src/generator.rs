//! Cycling batch generators.
//!
//! A [`BatchGenerator`] walks its samples in passes. Each pass visits every
//! sample exactly once, in shuffled order when shuffling is enabled and in
//! scan order otherwise; when a pass is exhausted the next one starts, so
//! the generator never runs dry. Shuffling and augmentation draw from a
//! `ChaCha8Rng` seeded at construction, and [`BatchGenerator::reset`]
//! restores that initial state.

use grain_core::{ClassIndex, DataSplit, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

use crate::augmentation::AugmentationPolicy;
use crate::burn_dataset::{FolderDataset, ImageItem};

/// Lazy, restartable, infinite source of labeled image batches
pub struct BatchGenerator {
    dataset: FolderDataset,
    class_index: ClassIndex,
    split: DataSplit,
    batch_size: usize,
    shuffle: bool,
    policy: Arc<dyn AugmentationPolicy>,
    seed: u64,
    rng: ChaCha8Rng,
    order: Vec<usize>,
    cursor: usize,
    passes: usize,
}

impl BatchGenerator {
    pub fn new(
        dataset: FolderDataset,
        class_index: ClassIndex,
        split: DataSplit,
        batch_size: usize,
        shuffle: bool,
        policy: Arc<dyn AugmentationPolicy>,
        seed: u64,
    ) -> Self {
        let mut generator = Self {
            dataset,
            class_index,
            split,
            batch_size: batch_size.max(1),
            shuffle,
            policy,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            order: Vec::new(),
            cursor: 0,
            passes: 0,
        };
        generator.reset();
        generator
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Batches per pass; the last one may be short
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn class_index(&self) -> &ClassIndex {
        &self.class_index
    }

    pub fn num_classes(&self) -> usize {
        self.class_index.len()
    }

    pub fn split(&self) -> DataSplit {
        self.split
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    pub fn image_size(&self) -> usize {
        self.dataset.preprocessor().image_size
    }

    pub fn dataset(&self) -> &FolderDataset {
        &self.dataset
    }

    /// Augmentation policy name
    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    /// Completed passes since construction or the last reset
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Ground-truth labels in the order of the current pass.
    ///
    /// For an unshuffled generator this is the scan order and never changes,
    /// which is what aligns predictions with labels.
    pub fn labels(&self) -> Vec<usize> {
        let samples = self.dataset.samples();
        self.order.iter().map(|&i| samples[i].label).collect()
    }

    /// Restores the state right after construction
    pub fn reset(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.order = (0..self.dataset.samples().len()).collect();
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        self.cursor = 0;
        self.passes = 0;
    }

    fn begin_pass(&mut self) {
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        self.cursor = 0;
        self.passes += 1;
    }

    /// Loads the next batch, starting a new pass when the current one is done
    pub fn next_batch(&mut self) -> Result<Vec<ImageItem>> {
        if self.cursor >= self.order.len() {
            self.begin_pass();
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let mut items = Vec::with_capacity(indices.len());
        for index in indices {
            items.push(
                self.dataset
                    .load_augmented(index, self.policy.as_ref(), &mut self.rng)?,
            );
        }
        Ok(items)
    }

    /// Iterator over exactly one pass, starting at a pass boundary
    pub fn epoch(&mut self) -> EpochBatches<'_> {
        if self.cursor != 0 {
            self.begin_pass();
        }
        let remaining = self.num_batches();
        EpochBatches {
            generator: self,
            remaining,
        }
    }
}

impl Iterator for BatchGenerator {
    type Item = Result<Vec<ImageItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.order.is_empty() {
            return None;
        }
        Some(self.next_batch())
    }
}

/// One pass over a [`BatchGenerator`]
pub struct EpochBatches<'a> {
    generator: &'a mut BatchGenerator,
    remaining: usize,
}

impl Iterator for EpochBatches<'_> {
    type Item = Result<Vec<ImageItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.generator.next_batch())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for EpochBatches<'_> {}

impl std::fmt::Debug for BatchGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchGenerator")
            .field("split", &self.split)
            .field("samples", &self.len())
            .field("batch_size", &self.batch_size)
            .field("shuffle", &self.shuffle)
            .field("policy", &self.policy.name())
            .field("classes", &self.class_index.names())
            .finish()
    }
}
