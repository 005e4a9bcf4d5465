//! Evaluation and prediction over batch generators.

use std::path::PathBuf;

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, ElementConversion},
};
use grain_core::{ClassIndex, ClassificationReport, DataSplit, Error, Result};
use grain_dataset::{BatchGenerator, ImageBatch, ImageBatcher};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loss::{argmax_rows, categorical_crossentropy, count_correct};
use crate::model::Classifier;

/// Mean loss and accuracy over one pass of a generator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub split: DataSplit,
    pub loss: f64,
    /// Fraction in [0, 1]
    pub accuracy: f64,
    pub samples: usize,
}

impl std::fmt::Display for EvaluationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} loss: {:.4}, accuracy: {:.2}% ({} samples)",
            self.split,
            self.loss,
            self.accuracy * 100.0,
            self.samples
        )
    }
}

/// Per-sample class probabilities, aligned with the true labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    /// Row-major `[samples, num_classes]`
    pub probabilities: Vec<f32>,
    pub num_classes: usize,
    pub labels: Vec<usize>,
    pub paths: Vec<PathBuf>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Probability row of one sample
    pub fn row(&self, index: usize) -> &[f32] {
        &self.probabilities[index * self.num_classes..(index + 1) * self.num_classes]
    }

    /// Argmax of every probability row
    pub fn predicted_labels(&self) -> Vec<usize> {
        argmax_rows(&self.probabilities, self.num_classes)
    }

    pub fn report(&self, classes: &ClassIndex) -> Result<ClassificationReport> {
        ClassificationReport::from_predictions(&self.labels, &self.predicted_labels(), classes)
    }
}

/// Runs a classifier over generators without touching its weights
pub struct Evaluator<B: Backend> {
    device: B::Device,
}

impl<B: Backend> Evaluator<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn evaluate(
        &self,
        model: &Classifier<B>,
        generator: &mut BatchGenerator,
    ) -> Result<EvaluationSummary> {
        self.run(model, generator).map(|(summary, _)| summary)
    }

    /// Class probabilities for every sample of one pass
    pub fn predict(
        &self,
        model: &Classifier<B>,
        generator: &mut BatchGenerator,
    ) -> Result<Predictions> {
        self.run(model, generator).map(|(_, predictions)| predictions)
    }

    /// Summary and predictions from a single pass
    pub fn evaluate_with_predictions(
        &self,
        model: &Classifier<B>,
        generator: &mut BatchGenerator,
    ) -> Result<(EvaluationSummary, Predictions)> {
        self.run(model, generator)
    }

    fn run(
        &self,
        model: &Classifier<B>,
        generator: &mut BatchGenerator,
    ) -> Result<(EvaluationSummary, Predictions)> {
        if generator.is_empty() {
            return Err(Error::Training(format!("No {} samples to evaluate", generator.split())));
        }

        let num_classes = generator.num_classes();
        if model.num_classes() != num_classes {
            return Err(Error::Model(format!(
                "Model predicts {} classes but the {} data has {}",
                model.num_classes(),
                generator.split(),
                num_classes
            )));
        }

        let split = generator.split();
        let batcher =
            ImageBatcher::<B>::new(self.device.clone(), generator.image_size(), num_classes);

        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut predictions = Predictions {
            probabilities: Vec::with_capacity(generator.len() * num_classes),
            num_classes,
            labels: Vec::with_capacity(generator.len()),
            paths: Vec::with_capacity(generator.len()),
        };

        for items in generator.epoch() {
            let items = items?;
            let batch_size = items.len();
            for item in &items {
                predictions.labels.push(item.label);
                predictions.paths.push(item.path.clone());
            }

            let batch: ImageBatch<B> = batcher.batch(items);
            let probs = model.forward(batch.images);

            let loss: f64 = categorical_crossentropy(probs.clone(), batch.one_hot)
                .into_scalar()
                .elem();
            loss_sum += loss * batch_size as f64;
            correct += count_correct(probs.clone(), batch.targets);

            let values = probs
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| Error::Model(format!("Failed to read probabilities: {e:?}")))?;
            predictions.probabilities.extend(values);
        }

        let samples = predictions.len();
        let summary = EvaluationSummary {
            split,
            loss: loss_sum / samples as f64,
            accuracy: correct as f64 / samples as f64,
            samples,
        };
        debug!("{}", summary);

        Ok((summary, predictions))
    }
}
