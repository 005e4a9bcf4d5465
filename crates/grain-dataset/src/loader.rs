//! Builds batch generators from dataset roots.

use grain_core::{ClassIndex, DataConfig, DataSplit, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::augmentation::{policy_from_config, AugmentationPolicy, NoAugmentation};
use crate::burn_dataset::FolderDataset;
use crate::generator::BatchGenerator;
use crate::preprocess::Preprocessor;
use crate::scan::scan_dataset;
use crate::split::ValidationSplit;

/// Creates train, validation and test generators with one shared config
pub struct FolderLoader {
    config: DataConfig,
    seed: u64,
    policy: Arc<dyn AugmentationPolicy>,
}

impl FolderLoader {
    /// Validates the config and builds the augmentation policy it describes
    pub fn new(config: DataConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let policy = policy_from_config(&config.augmentation);
        Ok(Self {
            config,
            seed,
            policy,
        })
    }

    /// Replaces the augmentation policy used by train/validation generators
    pub fn with_policy(mut self, policy: Arc<dyn AugmentationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    pub fn preprocessor(&self) -> Preprocessor {
        Preprocessor::new(self.config.image_size, self.config.rescale)
    }

    /// Splits `root` into a shuffled training generator and an unshuffled
    /// validation generator. Both share the class index and the augmentation
    /// policy.
    pub fn split_generators(&self, root: &Path) -> Result<(BatchGenerator, BatchGenerator)> {
        let scanned = scan_dataset(root)?;
        let split = ValidationSplit::from_scan(scanned, self.config.validation_split)?;

        info!(
            "Found {} images belonging to {} classes in {} ({} train, {} validation)",
            split.total(),
            split.class_index.len(),
            root.display(),
            split.train.len(),
            split.validation.len()
        );

        let train = BatchGenerator::new(
            FolderDataset::new(split.train, self.preprocessor()),
            split.class_index.clone(),
            DataSplit::Train,
            self.config.batch_size,
            true,
            self.policy.clone(),
            self.seed,
        );
        let validation = BatchGenerator::new(
            FolderDataset::new(split.validation, self.preprocessor()),
            split.class_index,
            DataSplit::Validation,
            self.config.batch_size,
            false,
            self.policy.clone(),
            self.seed.wrapping_add(1),
        );

        Ok((train, validation))
    }

    /// Unshuffled, unaugmented generator over a separate test root. Its
    /// classes must match `expected` exactly.
    pub fn test_generator(&self, root: &Path, expected: &ClassIndex) -> Result<BatchGenerator> {
        let generator = self.generator(root, DataSplit::Test, false)?;
        expected.ensure_matches(
            generator.class_index(),
            &format!("test partition {}", root.display()),
        )?;
        Ok(generator)
    }

    /// Generator over a whole root without augmentation
    pub fn generator(
        &self,
        root: &Path,
        split: DataSplit,
        shuffle: bool,
    ) -> Result<BatchGenerator> {
        let scanned = scan_dataset(root)?;
        info!(
            "Found {} images belonging to {} classes in {}",
            scanned.samples.len(),
            scanned.class_index.len(),
            root.display()
        );

        Ok(BatchGenerator::new(
            FolderDataset::new(scanned.samples, self.preprocessor()),
            scanned.class_index,
            split,
            self.config.batch_size,
            shuffle,
            Arc::new(NoAugmentation),
            self.seed.wrapping_add(2),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augmentation::AugmentationPresets;
    use grain_core::Error;
    use std::fs;
    use tempfile::TempDir;

    fn write_tree(root: &Path, classes: &[(&str, usize)]) {
        for (class, count) in classes {
            let dir = root.join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                image::ImageBuffer::from_fn(6, 6, |_, _| image::Rgb([i as u8, 0u8, 0u8]))
                    .save(dir.join(format!("{i:03}.png")))
                    .unwrap();
            }
        }
    }

    fn config() -> DataConfig {
        DataConfig {
            image_size: 8,
            batch_size: 32,
            ..Default::default()
        }
    }

    #[test]
    fn test_reference_split_counts() {
        let temp_dir = TempDir::new().unwrap();
        write_tree(temp_dir.path(), &[("Arborio", 100), ("Basmati", 100)]);

        let loader = FolderLoader::new(config(), 42).unwrap();
        let (train, validation) = loader.split_generators(temp_dir.path()).unwrap();

        assert_eq!(train.len(), 160);
        assert_eq!(validation.len(), 40);
        assert_eq!(train.num_batches(), 5);
        assert_eq!(validation.num_batches(), 2);
        assert!(train.is_shuffled());
        assert!(!validation.is_shuffled());
    }

    #[test]
    fn test_train_and_validation_share_class_index() {
        let temp_dir = TempDir::new().unwrap();
        write_tree(temp_dir.path(), &[("Jasmine", 10), ("Arborio", 10), ("Ipsala", 10)]);

        let loader = FolderLoader::new(config(), 1).unwrap();
        let (train, validation) = loader.split_generators(temp_dir.path()).unwrap();

        assert_eq!(train.class_index(), validation.class_index());
        assert_eq!(train.class_index().names(), &["Arborio", "Ipsala", "Jasmine"]);
    }

    #[test]
    fn test_augmentation_shared_by_train_and_validation() {
        let temp_dir = TempDir::new().unwrap();
        write_tree(temp_dir.path(), &[("Arborio", 5), ("Basmati", 5)]);

        let data = DataConfig {
            augmentation: AugmentationPresets::light(),
            ..config()
        };
        let loader = FolderLoader::new(data, 1).unwrap();
        let (train, validation) = loader.split_generators(temp_dir.path()).unwrap();
        assert_eq!(train.policy_name(), "random");
        assert_eq!(validation.policy_name(), "random");

        let test = loader.generator(temp_dir.path(), DataSplit::Test, false).unwrap();
        assert_eq!(test.policy_name(), "rescale-only");
    }

    #[test]
    fn test_test_generator_support() {
        let train_dir = TempDir::new().unwrap();
        let test_dir = TempDir::new().unwrap();
        write_tree(train_dir.path(), &[("Arborio", 10), ("Basmati", 10)]);
        write_tree(test_dir.path(), &[("Arborio", 20), ("Basmati", 20)]);

        let loader = FolderLoader::new(config(), 42).unwrap();
        let (train, _) = loader.split_generators(train_dir.path()).unwrap();
        let test = loader.test_generator(test_dir.path(), train.class_index()).unwrap();

        assert_eq!(test.len(), 40);
        let labels = test.labels();
        assert_eq!(labels.iter().filter(|&&l| l == 0).count(), 20);
        assert_eq!(labels.iter().filter(|&&l| l == 1).count(), 20);
    }

    #[test]
    fn test_test_generator_class_mismatch() {
        let train_dir = TempDir::new().unwrap();
        let test_dir = TempDir::new().unwrap();
        write_tree(train_dir.path(), &[("Arborio", 10), ("Basmati", 10)]);
        write_tree(test_dir.path(), &[("Arborio", 5), ("Karacadag", 5)]);

        let loader = FolderLoader::new(config(), 42).unwrap();
        let (train, _) = loader.split_generators(train_dir.path()).unwrap();
        let result = loader.test_generator(test_dir.path(), train.class_index());

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let loader = FolderLoader::new(config(), 42).unwrap();
        let result = loader.split_generators(Path::new("/nonexistent/rice"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let data = DataConfig {
            batch_size: 0,
            ..config()
        };
        assert!(FolderLoader::new(data, 0).is_err());
    }
}
