//! Burn Dataset integration
//!
//! [`FolderDataset`] implements Burn's `Dataset` trait over scanned samples and
//! [`ImageBatcher`] turns loaded items into tensors on a device.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use grain_core::{ImageSample, Result};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::augmentation::AugmentationPolicy;
use crate::preprocess::Preprocessor;

/// A single preprocessed image ready for Burn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    /// Image data as flattened CHW float array [3 * H * W]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Source file
    pub path: PathBuf,
}

/// Samples of one partition, loaded lazily from disk
#[derive(Debug, Clone)]
pub struct FolderDataset {
    samples: Vec<ImageSample>,
    preprocessor: Preprocessor,
}

impl FolderDataset {
    pub fn new(samples: Vec<ImageSample>, preprocessor: Preprocessor) -> Self {
        Self {
            samples,
            preprocessor,
        }
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Loads and preprocesses one sample without augmentation
    pub fn load(&self, index: usize) -> Result<ImageItem> {
        let sample = &self.samples[index];
        let image = self.preprocessor.open(&sample.path)?;
        Ok(self.item(sample, &image))
    }

    /// Loads one sample and applies `policy` before resizing
    pub fn load_augmented(
        &self,
        index: usize,
        policy: &dyn AugmentationPolicy,
        rng: &mut ChaCha8Rng,
    ) -> Result<ImageItem> {
        let sample = &self.samples[index];
        let image = policy.apply(self.preprocessor.open(&sample.path)?, rng);
        Ok(self.item(sample, &image))
    }

    fn item(&self, sample: &ImageSample, image: &image::DynamicImage) -> ImageItem {
        ImageItem {
            image: self.preprocessor.process(image),
            label: sample.label,
            path: sample.path.clone(),
        }
    }
}

impl Dataset<ImageItem> for FolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        if index >= self.samples.len() {
            return None;
        }
        match self.load(index) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(
                    "Skipping unreadable sample {}: {}",
                    self.samples[index].path.display(),
                    e
                );
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Batch of images for training or inference
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Images tensor [batch_size, 3, H, W]
    pub images: Tensor<B, 4>,
    /// Class indices [batch_size]
    pub targets: Tensor<B, 1, Int>,
    /// Categorical targets [batch_size, num_classes]
    pub one_hot: Tensor<B, 2>,
}

/// Batcher producing [`ImageBatch`]es on a fixed device
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
    num_classes: usize,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, image_size: usize, num_classes: usize) -> Self {
        Self {
            device,
            image_size,
            num_classes,
        }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B: Backend> Batcher<ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let mut images = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets = Vec::with_capacity(batch_size);
        let mut one_hot = vec![0.0f32; batch_size * self.num_classes];

        for (row, item) in items.into_iter().enumerate() {
            images.extend(item.image);
            targets.push(item.label as i64);
            one_hot[row * self.num_classes + item.label] = 1.0;
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images, [batch_size, 3, size, size]),
            &self.device,
        );
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [batch_size]), &self.device);
        let one_hot = Tensor::<B, 2>::from_data(
            TensorData::new(one_hot, [batch_size, self.num_classes]),
            &self.device,
        );

        ImageBatch {
            images,
            targets,
            one_hot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn item(label: usize, value: f32, size: usize) -> ImageItem {
        ImageItem {
            image: vec![value; 3 * size * size],
            label,
            path: PathBuf::from(format!("{label}.png")),
        }
    }

    #[test]
    fn test_batcher_shapes() {
        let batcher = ImageBatcher::<TestBackend>::new(Default::default(), 4, 3);
        let batch = batcher.batch(vec![item(0, 0.1, 4), item(2, 0.5, 4)]);

        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [2]);
        assert_eq!(batch.one_hot.dims(), [2, 3]);
    }

    #[test]
    fn test_batcher_one_hot_rows() {
        let batcher = ImageBatcher::<TestBackend>::new(Default::default(), 2, 3);
        let batch = batcher.batch(vec![item(1, 0.0, 2), item(2, 0.0, 2)]);

        let one_hot: Vec<f32> = batch.one_hot.into_data().to_vec().unwrap();
        assert_eq!(one_hot, vec![0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![1, 2]);
    }

    #[test]
    fn test_folder_dataset_get() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("grain.png");
        image::ImageBuffer::from_fn(6, 6, |_, _| image::Rgb([255u8, 255u8, 255u8]))
            .save(&path)
            .unwrap();

        let samples = vec![ImageSample::new(path, 0, "Arborio")];
        let dataset = FolderDataset::new(samples, Preprocessor::new(4, 1.0 / 255.0));

        assert_eq!(dataset.len(), 1);
        let loaded = dataset.get(0).unwrap();
        assert_eq!(loaded.image.len(), 3 * 4 * 4);
        assert!(loaded.image.iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(dataset.get(1).is_none());
    }

    #[test]
    fn test_folder_dataset_unreadable_sample() {
        let samples = vec![ImageSample::new(PathBuf::from("/nonexistent/a.png"), 0, "Arborio")];
        let dataset = FolderDataset::new(samples, Preprocessor::new(4, 1.0));

        assert!(dataset.get(0).is_none());
        assert!(dataset.load(0).is_err());
    }
}
