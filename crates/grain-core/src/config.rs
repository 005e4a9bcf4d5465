//! Configuration structures for the grain classification pipeline.
//!
//! Every section implements [`Default`] with the reference settings
//! (224x224 inputs, batch size 32, 20% validation split, 10 epochs of Adam),
//! so a TOML file only needs to name the fields it changes.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default location of the pretrained MobileNetV2 feature-vector record.
pub const DEFAULT_EXTRACTOR_SOURCE: &str = "models/mobilenet_v2_feature_vector.mpk";

/// Main configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Dataset configuration
    pub data: DataConfig,
    /// Model configuration
    pub model: ModelConfig,
    /// Training hyperparameters
    pub training: TrainingParams,
    /// Output locations
    pub output: OutputConfig,
    /// Random seed for shuffling and augmentation
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            model: ModelConfig::default(),
            training: TrainingParams::default(),
            output: OutputConfig::default(),
            seed: 42,
        }
    }
}

impl PipelineConfig {
    /// Checks parameter ranges. Path existence is checked by the loaders.
    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;

        if self.training.epochs == 0 {
            return Err(Error::Config("Number of epochs must be greater than 0".to_string()));
        }
        if self.training.adam.learning_rate <= 0.0 {
            return Err(Error::Config("Learning rate must be positive".to_string()));
        }
        if self.model.width_multiplier <= 0.0 {
            return Err(Error::Config("Width multiplier must be positive".to_string()));
        }
        if self.model.num_classes == Some(0) {
            return Err(Error::Config("Number of classes must be greater than 0".to_string()));
        }

        Ok(())
    }
}

/// Dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root of the training tree, split into train and validation
    pub train_dir: PathBuf,
    /// Root of the separate test tree
    pub test_dir: PathBuf,
    /// Square side every image is resized to
    pub image_size: usize,
    /// Images per batch
    pub batch_size: usize,
    /// Fraction of each class held out for validation
    pub validation_split: f64,
    /// Multiplier applied to raw 0-255 pixel values
    pub rescale: f32,
    /// Augmentation applied to training and validation images
    pub augmentation: AugmentationConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_dir: PathBuf::from("data/Rice_Image_Dataset"),
            test_dir: PathBuf::from("data/Rice_Test_Dataset"),
            image_size: 224,
            batch_size: 32,
            validation_split: 0.2,
            rescale: 1.0 / 255.0,
            augmentation: AugmentationConfig::default(),
        }
    }
}

impl DataConfig {
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(Error::Config("Image size must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("Batch size must be greater than 0".to_string()));
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(Error::Config(format!(
                "Validation split must lie strictly between 0 and 1, got {}",
                self.validation_split
            )));
        }
        if self.rescale <= 0.0 {
            return Err(Error::Config("Rescale factor must be positive".to_string()));
        }
        self.augmentation.validate()
    }
}

/// Data augmentation configuration
///
/// The default is the identity: images are only rescaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Random horizontal flip
    pub horizontal_flip: bool,
    /// Random vertical flip
    pub vertical_flip: bool,
    /// Maximum rotation in degrees, snapped to quarter turns
    pub rotation_range: f32,
    /// Brightness factor range
    pub brightness_range: (f32, f32),
    /// Zoom factor range (crop then resize back)
    pub zoom_range: (f32, f32),
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            horizontal_flip: false,
            vertical_flip: false,
            rotation_range: 0.0,
            brightness_range: (1.0, 1.0),
            zoom_range: (1.0, 1.0),
        }
    }
}

impl AugmentationConfig {
    /// True when no transform would ever change an image.
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.brightness_range;
        if lo <= 0.0 || lo > hi {
            return Err(Error::Config(format!("Invalid brightness range ({lo}, {hi})")));
        }
        let (lo, hi) = self.zoom_range;
        if lo <= 0.0 || lo > hi {
            return Err(Error::Config(format!("Invalid zoom range ({lo}, {hi})")));
        }
        if self.rotation_range < 0.0 {
            return Err(Error::Config("Rotation range must not be negative".to_string()));
        }
        Ok(())
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Registered name of the feature extractor architecture
    pub extractor: String,
    /// URL (`http://`, `https://`) or local path of the pretrained extractor weights
    pub extractor_source: String,
    /// MobileNetV2 width multiplier (alpha)
    pub width_multiplier: f64,
    /// Number of output classes; inferred from the training tree when absent
    pub num_classes: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            extractor: "mobilenet_v2".to_string(),
            extractor_source: DEFAULT_EXTRACTOR_SOURCE.to_string(),
            width_multiplier: 1.0,
            num_classes: None,
        }
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Number of passes over the training partition
    pub epochs: usize,
    /// Adam optimizer settings
    pub adam: AdamParams,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 10,
            adam: AdamParams::default(),
        }
    }
}

/// Adam optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamParams {
    pub learning_rate: f64,
    pub beta_1: f32,
    pub beta_2: f32,
    pub epsilon: f32,
}

impl Default for AdamParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-7,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for charts, sample previews and run summaries
    pub output_dir: PathBuf,
    /// Where the trained model is saved (single-file archive)
    pub model_path: PathBuf,
    /// Download cache for pretrained components
    pub cache_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            model_path: PathBuf::from("rice.mpk"),
            cache_dir: PathBuf::from(".cache/grain"),
        }
    }
}
