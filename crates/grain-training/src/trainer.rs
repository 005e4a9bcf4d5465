//! Training loop for the dense head on top of a frozen extractor.
//!
//! The extractor runs on the inner (non-autodiff) backend, so no gradients
//! are tracked through it and its batch-norm layers stay in inference mode.
//! Only the head's parameters are handed to the Adam optimizer.

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{activation::softmax, backend::AutodiffBackend, ElementConversion, Tensor},
};
use grain_core::{Error, Result, TrainingHistory, TrainingParams};
use grain_dataset::{BatchGenerator, ImageBatch, ImageBatcher};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::evaluator::Evaluator;
use crate::loss::{categorical_crossentropy, count_correct};
use crate::model::Classifier;

/// Fits a [`Classifier`] for a fixed number of epochs
pub struct Trainer<B: AutodiffBackend> {
    params: TrainingParams,
    device: B::Device,
    show_progress: bool,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(params: TrainingParams, device: B::Device) -> Self {
        Self {
            params,
            device,
            show_progress: false,
        }
    }

    /// Draw a progress bar per epoch
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    /// Trains the head, evaluating on `validation` after every epoch.
    ///
    /// Each epoch consumes exactly `train.num_batches()` batches. Returns the
    /// updated model and one history entry per epoch.
    pub fn fit(
        &self,
        model: Classifier<B>,
        train: &mut BatchGenerator,
        validation: &mut BatchGenerator,
    ) -> Result<(Classifier<B>, TrainingHistory)> {
        if train.is_empty() {
            return Err(Error::Training("Training partition is empty".to_string()));
        }
        train.class_index().ensure_matches(validation.class_index(), "validation")?;

        let num_classes = train.num_classes();
        if model.num_classes() != num_classes {
            return Err(Error::Model(format!(
                "Model predicts {} classes but the training data has {}",
                model.num_classes(),
                num_classes
            )));
        }

        let Classifier { extractor, mut head } = model;
        let frozen = extractor.valid();

        let adam = &self.params.adam;
        let mut optimizer = AdamConfig::new()
            .with_beta_1(adam.beta_1)
            .with_beta_2(adam.beta_2)
            .with_epsilon(adam.epsilon)
            .init();

        let batcher = ImageBatcher::<B::InnerBackend>::new(
            self.device.clone(),
            train.image_size(),
            num_classes,
        );
        let evaluator = Evaluator::<B::InnerBackend>::new(self.device.clone());
        let mut history = TrainingHistory::new();
        let epochs = self.params.epochs;

        info!(
            "Training on {} samples, validating on {} samples",
            train.len(),
            validation.len()
        );

        for epoch in 1..=epochs {
            let progress = self.progress_bar(epoch, epochs, train.num_batches());

            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;
            let mut seen = 0usize;

            for items in train.epoch() {
                let items = items?;
                let batch_size = items.len();
                let batch: ImageBatch<B::InnerBackend> = batcher.batch(items);

                let features = Tensor::<B, 2>::from_inner(frozen.forward(batch.images));
                let one_hot = Tensor::<B, 2>::from_inner(batch.one_hot);

                let probs = softmax(head.forward(features), 1);
                let loss = categorical_crossentropy(probs.clone(), one_hot);

                let loss_value: f64 = loss.clone().into_scalar().elem();
                loss_sum += loss_value * batch_size as f64;
                correct += count_correct(probs.inner(), batch.targets);
                seen += batch_size;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &head);
                head = optimizer.step(adam.learning_rate, head, grads);

                progress.set_message(format!(
                    "loss: {:.4} - accuracy: {:.4}",
                    loss_sum / seen as f64,
                    correct as f64 / seen as f64
                ));
                progress.inc(1);
            }
            progress.finish_and_clear();

            let train_loss = loss_sum / seen.max(1) as f64;
            let train_accuracy = correct as f64 / seen.max(1) as f64;

            let snapshot = Classifier {
                extractor: frozen.clone(),
                head: head.valid(),
            };
            let val = evaluator.evaluate(&snapshot, validation)?;

            info!(
                "Epoch {}/{} - loss: {:.4} - accuracy: {:.4} - \
                 val_loss: {:.4} - val_accuracy: {:.4}",
                epoch, epochs, train_loss, train_accuracy, val.loss, val.accuracy
            );
            if !train_loss.is_finite() {
                return Err(Error::Training(format!("Loss diverged at epoch {epoch}")));
            }

            history.add_epoch(train_loss, train_accuracy, val.loss, val.accuracy);
        }

        if let (Some(best), Some(best_epoch)) =
            (history.best_val_accuracy(), history.best_epoch())
        {
            info!("Best validation accuracy: {:.2}% (epoch {})", best * 100.0, best_epoch);
        }

        Ok((Classifier { extractor, head }, history))
    }

    fn progress_bar(&self, epoch: usize, epochs: usize, batches: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(batches as u64);
        progress.set_style(
            ProgressStyle::with_template(&format!(
                "Epoch {epoch}/{epochs} [{{bar:30.cyan/blue}}] {{pos}}/{{len}} {{msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::FeatureExtractorConfig;
    use crate::model::ClassifierConfig;
    use crate::testing::{small_data_config, write_class_tree};
    use burn::backend::Autodiff;
    use burn::module::Module;
    use burn_ndarray::NdArray;
    use grain_dataset::FolderLoader;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn params(epochs: usize) -> TrainingParams {
        let mut params = TrainingParams::default();
        params.epochs = epochs;
        params.adam.learning_rate = 0.01;
        params
    }

    fn setup(temp_dir: &TempDir) -> (BatchGenerator, BatchGenerator, Classifier<TestBackend>) {
        let train = write_class_tree(temp_dir.path(), "train", &["Arborio", "Basmati"], 10);
        let loader = FolderLoader::new(small_data_config(&train, &train), 3).unwrap();
        let (train_gen, val_gen) = loader.split_generators(&train).unwrap();

        let device = Default::default();
        let extractor = FeatureExtractorConfig::new().with_width_multiplier(0.35);
        let config = ClassifierConfig::new(2, extractor).with_image_size(32);
        let extractor = config.extractor.init::<TestBackend>(&device);
        let model = config.assemble(extractor, &device);
        (train_gen, val_gen, model)
    }

    #[test]
    fn test_fit_records_every_epoch() {
        let temp_dir = TempDir::new().unwrap();
        let (mut train_gen, mut val_gen, model) = setup(&temp_dir);

        let trainer = Trainer::<TestBackend>::new(params(2), Default::default());
        let (model, history) = trainer.fit(model, &mut train_gen, &mut val_gen).unwrap();

        assert_eq!(history.len(), 2);
        assert!(history.loss.iter().all(|l| l.is_finite() && *l >= 0.0));
        assert!(history.val_accuracy.iter().all(|a| (0.0..=1.0).contains(a)));
        assert_eq!(model.num_classes(), 2);
        assert_eq!(train_gen.passes(), 1);
    }

    #[test]
    fn test_fit_leaves_extractor_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let (mut train_gen, mut val_gen, model) = setup(&temp_dir);

        let input = Tensor::<NdArray, 4>::ones([1, 3, 32, 32], &Default::default());
        let before = model.extractor.valid().forward(input.clone()).into_data();
        let head_before = model.head.valid().weight.val().into_data();

        let trainer = Trainer::<TestBackend>::new(params(1), Default::default());
        let (model, _) = trainer.fit(model, &mut train_gen, &mut val_gen).unwrap();

        let after = model.extractor.valid().forward(input).into_data();
        before.assert_approx_eq(&after, 5);

        let head_after = model.head.valid().weight.val().into_data();
        assert_ne!(head_before, head_after);
        assert_eq!(model.head.num_params(), 1280 * 2 + 2);
    }

    #[test]
    fn test_fit_rejects_wrong_class_count() {
        let temp_dir = TempDir::new().unwrap();
        let (mut train_gen, mut val_gen, _) = setup(&temp_dir);

        let device = Default::default();
        let extractor = FeatureExtractorConfig::new().with_width_multiplier(0.35);
        let model = ClassifierConfig::new(3, extractor)
            .with_image_size(32)
            .init::<TestBackend>(&device);

        let trainer = Trainer::<TestBackend>::new(params(1), device);
        let result = trainer.fit(model, &mut train_gen, &mut val_gen);
        assert!(matches!(result, Err(Error::Model(_))));
    }
}
