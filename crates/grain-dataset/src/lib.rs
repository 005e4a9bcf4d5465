//! Dataset loading and batching for grain image classification.
//!
//! This crate provides:
//! - Directory scanning of `<root>/<class_name>/<image>` trees
//! - Positional per-class train/validation splits
//! - Resize + rescale preprocessing into CHW float arrays
//! - Pluggable augmentation policies
//! - Cycling batch generators and Burn `Dataset`/`Batcher` integration

pub mod augmentation;
pub mod burn_dataset;
pub mod generator;
pub mod loader;
pub mod preprocess;
pub mod scan;
pub mod split;

pub use augmentation::{
    policy_from_config, AugmentationPolicy, AugmentationPresets, NoAugmentation, RandomAugmentation,
};
pub use burn_dataset::{FolderDataset, ImageBatch, ImageBatcher, ImageItem};
pub use generator::{BatchGenerator, EpochBatches};
pub use loader::FolderLoader;
pub use preprocess::{chw_to_rgb, Preprocessor};
pub use scan::{scan_dataset, ScannedDataset};
pub use split::ValidationSplit;
